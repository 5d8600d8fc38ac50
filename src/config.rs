use crate::types::{Feature, MatchError, MatchResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Date string embedded in every daily raster and swath filename
pub fn date_tag(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// One regular-grid source: a directory of per-day files for a single variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSourceConfig {
    pub feature: Feature,
    pub root: PathBuf,
    /// Mission prefix, e.g. `AQUA_MODIS`
    pub mission: String,
    /// Processing level and product, e.g. `L3m.DAY.CHL`
    pub product_tag: String,
    /// Variable stored in the file, also the fourth filename field
    pub variable: String,
    pub resolution: String,
    pub extension: String,
}

impl GridSourceConfig {
    pub fn modis(feature: Feature, root: impl Into<PathBuf>, product_tag: &str) -> Self {
        Self {
            feature,
            root: root.into(),
            mission: "AQUA_MODIS".to_string(),
            product_tag: product_tag.to_string(),
            variable: feature.name().to_string(),
            resolution: "4km".to_string(),
            extension: "nc".to_string(),
        }
    }

    /// `<mission>.<YYYYMMDD>.<productTag>.<variable>.<resolution>.<ext>`
    pub fn file_name(&self, date: NaiveDate) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.mission,
            date_tag(date),
            self.product_tag,
            self.variable,
            self.resolution,
            self.extension
        )
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.root.join(self.file_name(date))
    }
}

/// Irregular swath source: any file in `root` whose name contains the date tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwathSourceConfig {
    pub feature: Feature,
    pub root: PathBuf,
    pub extension: String,
    /// Value variable names, tried in order
    pub variable_candidates: Vec<String>,
    pub latitude_variable: String,
    pub longitude_variable: String,
    /// Wrap longitudes in [0, 360) to [-180, 180)
    pub normalize_longitude: bool,
}

impl SwathSourceConfig {
    pub fn swot(root: impl Into<PathBuf>) -> Self {
        Self {
            feature: Feature::SshaKarin,
            root: root.into(),
            extension: "nc".to_string(),
            variable_candidates: ["ssha_karin", "ssh_karin", "ssha", "ssha_karin_2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            latitude_variable: "latitude".to_string(),
            longitude_variable: "longitude".to_string(),
            normalize_longitude: true,
        }
    }
}

/// Everything the dataset assembler needs, passed in at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub observation_files: Vec<PathBuf>,
    pub grid_sources: Vec<GridSourceConfig>,
    pub swath_source: SwathSourceConfig,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Seed for background point sampling; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self::with_base_dir(".")
    }
}

impl AssemblyConfig {
    /// Conventional directory layout under a single data directory
    pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            observation_files: Vec::new(),
            grid_sources: vec![
                GridSourceConfig::modis(Feature::ChlorA, base.join("chlorophyll"), "L3m.DAY.CHL"),
                GridSourceConfig::modis(
                    Feature::CarbonPhyto,
                    base.join("phytoplankton"),
                    "L4m.DAY.CARBON",
                ),
                GridSourceConfig::modis(Feature::Sst, base.join("SST"), "L3m.DAY.SST"),
            ],
            swath_source: SwathSourceConfig::swot(base.join("SSH")),
            start_date: NaiveDate::from_ymd_opt(2014, 4, 12).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2015, 12, 31).unwrap_or_default(),
            seed: None,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MatchResult<Self> {
        log::info!("Loading assembly configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AssemblyConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> MatchResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn validate(&self) -> MatchResult<()> {
        if self.start_date > self.end_date {
            return Err(MatchError::Config(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.swath_source.variable_candidates.is_empty() {
            return Err(MatchError::Config(
                "swath source needs at least one variable candidate".to_string(),
            ));
        }
        for (i, source) in self.grid_sources.iter().enumerate() {
            if self.grid_sources[..i].iter().any(|s| s.feature == source.feature)
                || source.feature == self.swath_source.feature
            {
                return Err(MatchError::Config(format!(
                    "feature {} is configured by more than one source",
                    source.feature
                )));
            }
        }
        Ok(())
    }

    /// Collect `*.csv` observation files from a directory, sorted by name
    pub fn discover_observations<P: AsRef<Path>>(&mut self, dir: P) -> MatchResult<usize> {
        let dir = glob::Pattern::escape(&dir.as_ref().to_string_lossy());
        let pattern = Path::new(&dir).join("*.csv");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| MatchError::Config(format!("bad observation pattern {}: {}", pattern, e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("Bad path from glob: {:?}", e);
                    None
                }
            })
            .collect();
        files.sort();

        let found = files.len();
        self.observation_files.extend(files);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_file_name_convention() {
        let source = GridSourceConfig::modis(Feature::ChlorA, "/data/chlorophyll", "L3m.DAY.CHL");
        let date = NaiveDate::from_ymd_opt(2014, 4, 12).unwrap();
        assert_eq!(
            source.file_name(date),
            "AQUA_MODIS.20140412.L3m.DAY.CHL.chlor_a.4km.nc"
        );
        assert_eq!(
            source.path_for(date),
            PathBuf::from("/data/chlorophyll/AQUA_MODIS.20140412.L3m.DAY.CHL.chlor_a.4km.nc")
        );
    }

    #[test]
    fn test_default_layout() {
        let config = AssemblyConfig::with_base_dir("/data");
        assert_eq!(config.grid_sources.len(), 3);
        assert_eq!(config.swath_source.root, PathBuf::from("/data/SSH"));
        assert_eq!(config.swath_source.variable_candidates[0], "ssha_karin");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = AssemblyConfig::default();
        config.start_date = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap();
        assert!(matches!(config.validate(), Err(MatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_feature() {
        let mut config = AssemblyConfig::default();
        let duplicate = config.grid_sources[0].clone();
        config.grid_sources.push(duplicate);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AssemblyConfig::with_base_dir("/data");
        config.seed = Some(7);
        config.to_json_file(&path).unwrap();

        let loaded = AssemblyConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_discover_observations_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "date,lat,lon\n").unwrap();
        std::fs::write(dir.path().join("a.csv"), "date,lat,lon\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let mut config = AssemblyConfig::default();
        let found = config.discover_observations(dir.path()).unwrap();
        assert_eq!(found, 2);
        assert!(config.observation_files[0].ends_with("a.csv"));
        assert!(config.observation_files[1].ends_with("b.csv"));
    }

    #[test]
    fn test_discover_observations_in_bracketed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = dir.path().join("shark_data[1]");
        std::fs::create_dir(&tracks).unwrap();
        std::fs::write(tracks.join("shark_01.csv"), "date,lat,lon\n").unwrap();

        let mut config = AssemblyConfig::default();
        assert_eq!(config.discover_observations(&tracks).unwrap(), 1);
        assert_eq!(config.observation_files, vec![tracks.join("shark_01.csv")]);
    }
}
