use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Presence label: 1 = confirmed observation, 0 = synthesized background
pub type Label = u8;

pub const PRESENCE: Label = 1;
pub const BACKGROUND: Label = 0;

/// Environmental features matched onto every point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ChlorA,
    CarbonPhyto,
    Sst,
    SshaKarin,
}

impl Feature {
    /// All features in output column order
    pub const ALL: [Feature; 4] = [
        Feature::ChlorA,
        Feature::CarbonPhyto,
        Feature::Sst,
        Feature::SshaKarin,
    ];

    /// Column name used in the training table
    pub fn name(&self) -> &'static str {
        match self {
            Feature::ChlorA => "chlor_a",
            Feature::CarbonPhyto => "carbon_phyto",
            Feature::Sst => "sst",
            Feature::SshaKarin => "ssha_karin",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Feature::ChlorA => 0,
            Feature::CarbonPhyto => 1,
            Feature::Sst => 2,
            Feature::SshaKarin => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A geolocated, timestamped point to be matched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub label: Label,
}

impl ObservationPoint {
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64, label: Label) -> Self {
        Self { timestamp, latitude, longitude, label }
    }

    /// Calendar day used to group points into daily batches
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Latitude/longitude envelope of a point set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Matched environmental values for one point. `None` marks a missing value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub chlor_a: Option<f64>,
    pub carbon_phyto: Option<f64>,
    pub sst: Option<f64>,
    pub ssha_karin: Option<f64>,
}

impl FeatureRow {
    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::ChlorA => self.chlor_a,
            Feature::CarbonPhyto => self.carbon_phyto,
            Feature::Sst => self.sst,
            Feature::SshaKarin => self.ssha_karin,
        }
    }

    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        match feature {
            Feature::ChlorA => self.chlor_a = value,
            Feature::CarbonPhyto => self.carbon_phyto = value,
            Feature::Sst => self.sst = value,
            Feature::SshaKarin => self.ssha_karin = value,
        }
    }

    /// All four values, or `None` if any is missing
    pub fn complete(&self) -> Option<[f64; 4]> {
        Some([self.chlor_a?, self.carbon_phyto?, self.sst?, self.ssha_karin?])
    }

    pub fn has_missing(&self) -> bool {
        self.complete().is_none()
    }
}

/// One row of the assembled training table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRow {
    pub point: ObservationPoint,
    pub features: FeatureRow,
}

impl TrainingRow {
    pub fn date(&self) -> NaiveDate {
        self.point.date()
    }
}

/// Data-quality counters emitted alongside the training table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub rows_loaded: usize,
    pub malformed_dropped: usize,
    pub outside_date_range: usize,
    pub presence_points: usize,
    pub background_points: usize,
    pub days_processed: usize,
    pub missing_by_feature: BTreeMap<Feature, usize>,
    pub days_without_source: BTreeMap<Feature, usize>,
    pub rows_with_missing: usize,
}

impl AssemblyReport {
    pub fn total_points(&self) -> usize {
        self.presence_points + self.background_points
    }
}

/// Assembled table of labelled points and their matched features
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    pub rows: Vec<TrainingRow>,
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with every feature present, as (features, label)
    pub fn complete_rows(&self) -> Vec<([f64; 4], Label)> {
        self.rows
            .iter()
            .filter_map(|r| r.features.complete().map(|f| (f, r.point.label)))
            .collect()
    }
}

/// Error types for dataset assembly and model training
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Raster error in {path}: {message}")]
    Raster { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for matching operations
pub type MatchResult<T> = Result<T, MatchError>;
