use crate::config::AssemblyConfig;
use crate::core::matcher::{DailyMatcher, DayMatch};
use crate::io::observations::read_observations;
use crate::io::raster::RasterBackend;
use crate::types::{
    AssemblyReport, BoundingBox, Feature, FeatureRow, MatchError, MatchResult, ObservationPoint,
    TrainingRow, TrainingTable, BACKGROUND,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Background points generated per presence point
pub const BACKGROUND_RATIO: usize = 2;

/// Spatial and temporal extent of the presence points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceEnvelope {
    pub bounds: BoundingBox,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PresenceEnvelope {
    pub fn of(points: &[ObservationPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut envelope = PresenceEnvelope {
            bounds: BoundingBox {
                min_lon: first.longitude,
                max_lon: first.longitude,
                min_lat: first.latitude,
                max_lat: first.latitude,
            },
            start: first.timestamp,
            end: first.timestamp,
        };

        for p in &points[1..] {
            let b = &mut envelope.bounds;
            b.min_lat = b.min_lat.min(p.latitude);
            b.max_lat = b.max_lat.max(p.latitude);
            b.min_lon = b.min_lon.min(p.longitude);
            b.max_lon = b.max_lon.max(p.longitude);
            envelope.start = envelope.start.min(p.timestamp);
            envelope.end = envelope.end.max(p.timestamp);
        }
        Some(envelope)
    }
}

/// Keep points whose calendar date lies in `[start, end]`; returns (kept, dropped count)
pub fn filter_date_range(
    points: Vec<ObservationPoint>,
    start: NaiveDate,
    end: NaiveDate,
) -> (Vec<ObservationPoint>, usize) {
    let before = points.len();
    let kept: Vec<ObservationPoint> = points
        .into_iter()
        .filter(|p| (start..=end).contains(&p.date()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Uniformly sample `count` background points inside the presence envelope.
///
/// Latitude, longitude and timestamp are drawn independently.
pub fn generate_background<R: Rng>(
    presence: &[ObservationPoint],
    count: usize,
    rng: &mut R,
) -> Vec<ObservationPoint> {
    let Some(envelope) = PresenceEnvelope::of(presence) else {
        return Vec::new();
    };
    let bounds = envelope.bounds;
    let (t_min, t_max) = (envelope.start.timestamp_millis(), envelope.end.timestamp_millis());

    (0..count)
        .map(|_| {
            let latitude = rng.gen_range(bounds.min_lat..=bounds.max_lat);
            let longitude = rng.gen_range(bounds.min_lon..=bounds.max_lon);
            let millis = rng.gen_range(t_min..=t_max);
            let timestamp = Utc.timestamp_millis_opt(millis).single().unwrap_or(envelope.start);
            ObservationPoint::new(timestamp, latitude, longitude, BACKGROUND)
        })
        .collect()
}

/// Group point indices by calendar day, preserving input order inside each day
pub fn group_by_day(points: &[ObservationPoint]) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut groups: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, point) in points.iter().enumerate() {
        groups.entry(point.date()).or_default().push(i);
    }
    groups
}

/// Assembled table and its data-quality report
#[derive(Debug, Clone)]
pub struct Assembly {
    pub table: TrainingTable,
    pub report: AssemblyReport,
}

/// Builds the labelled training table from observations and daily sources
pub struct DatasetAssembler<'a> {
    config: &'a AssemblyConfig,
    backend: &'a dyn RasterBackend,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(config: &'a AssemblyConfig, backend: &'a dyn RasterBackend) -> Self {
        Self { config, backend }
    }

    /// Load, filter, add background points, match and join.
    ///
    /// Fails on schema errors and when no observation survives the date filter.
    pub fn assemble(&self) -> MatchResult<Assembly> {
        self.config.validate()?;

        log::info!("Loading {} observation file(s)", self.config.observation_files.len());
        let load = read_observations(&self.config.observation_files)?;

        let (presence, outside) =
            filter_date_range(load.points, self.config.start_date, self.config.end_date);
        if presence.is_empty() {
            return Err(MatchError::EmptyResult(format!(
                "no observations between {} and {}",
                self.config.start_date, self.config.end_date
            )));
        }
        log::info!(
            "Filtered to {} presence point(s) ({} outside date range)",
            presence.len(),
            outside
        );

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let background = generate_background(&presence, presence.len() * BACKGROUND_RATIO, &mut rng);
        log::info!("Generated {} background point(s)", background.len());

        let mut report = AssemblyReport {
            rows_loaded: load.rows_read,
            malformed_dropped: load.malformed,
            outside_date_range: outside,
            presence_points: presence.len(),
            background_points: background.len(),
            ..Default::default()
        };

        let mut points = presence;
        points.extend(background);

        let table = self.match_points(&points, &mut report);
        if table.is_empty() {
            return Err(MatchError::EmptyResult("no training rows produced".to_string()));
        }

        log::info!(
            "Assembled {} row(s) over {} day(s); {} row(s) with missing features",
            table.len(),
            report.days_processed,
            report.rows_with_missing
        );
        Ok(Assembly { table, report })
    }

    /// Match an arbitrary point set day by day and join results back by position.
    ///
    /// The output has exactly one row per input point, in input order.
    pub fn match_points(&self, points: &[ObservationPoint], report: &mut AssemblyReport) -> TrainingTable {
        let groups: Vec<(NaiveDate, Vec<usize>)> = group_by_day(points).into_iter().collect();
        let matcher = DailyMatcher::new(self.config, self.backend);

        let run_day = |(date, indices): &(NaiveDate, Vec<usize>)| -> DayMatch {
            let batch: Vec<ObservationPoint> = indices.iter().map(|&i| points[i]).collect();
            matcher.match_day(*date, &batch)
        };

        #[cfg(feature = "parallel")]
        let days: Vec<DayMatch> = groups.par_iter().map(run_day).collect();

        #[cfg(not(feature = "parallel"))]
        let days: Vec<DayMatch> = groups.iter().map(run_day).collect();

        let mut features = vec![FeatureRow::default(); points.len()];
        for ((_, indices), day) in groups.iter().zip(&days) {
            for (&i, row) in indices.iter().zip(&day.rows) {
                features[i] = *row;
            }
            for feature in &day.missing_sources {
                *report.days_without_source.entry(*feature).or_insert(0) += 1;
            }
        }
        report.days_processed = days.len();

        let rows: Vec<TrainingRow> = points
            .iter()
            .zip(features)
            .map(|(point, features)| TrainingRow { point: *point, features })
            .collect();

        for feature in Feature::ALL {
            let missing = rows.iter().filter(|r| r.features.get(feature).is_none()).count();
            report.missing_by_feature.insert(feature, missing);
        }
        report.rows_with_missing = rows.iter().filter(|r| r.features.has_missing()).count();

        TrainingTable { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PRESENCE;

    fn presence_points() -> Vec<ObservationPoint> {
        vec![
            ObservationPoint::new(Utc.with_ymd_and_hms(2014, 4, 12, 6, 0, 0).unwrap(), 10.0, -40.0, PRESENCE),
            ObservationPoint::new(Utc.with_ymd_and_hms(2014, 4, 15, 18, 0, 0).unwrap(), 12.5, -38.0, PRESENCE),
            ObservationPoint::new(Utc.with_ymd_and_hms(2014, 4, 13, 0, 0, 0).unwrap(), 11.0, -42.0, PRESENCE),
        ]
    }

    #[test]
    fn test_envelope() {
        let envelope = PresenceEnvelope::of(&presence_points()).unwrap();
        assert_eq!(envelope.bounds.min_lat, 10.0);
        assert_eq!(envelope.bounds.max_lat, 12.5);
        assert_eq!(envelope.bounds.min_lon, -42.0);
        assert_eq!(envelope.bounds.max_lon, -38.0);
        assert_eq!(envelope.start, Utc.with_ymd_and_hms(2014, 4, 12, 6, 0, 0).unwrap());
        assert_eq!(envelope.end, Utc.with_ymd_and_hms(2014, 4, 15, 18, 0, 0).unwrap());
        assert!(PresenceEnvelope::of(&[]).is_none());
    }

    #[test]
    fn test_background_count_and_bounds() {
        let presence = presence_points();
        let envelope = PresenceEnvelope::of(&presence).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let background = generate_background(&presence, presence.len() * BACKGROUND_RATIO, &mut rng);
        assert_eq!(background.len(), 6);
        for p in &background {
            assert_eq!(p.label, BACKGROUND);
            assert!(envelope.bounds.contains(p.latitude, p.longitude));
            assert!(p.timestamp >= envelope.start && p.timestamp <= envelope.end);
        }
    }

    #[test]
    fn test_background_from_single_point_collapses() {
        let presence = vec![presence_points()[0]];
        let mut rng = StdRng::seed_from_u64(1);
        let background = generate_background(&presence, 2, &mut rng);
        assert_eq!(background.len(), 2);
        assert!(background.iter().all(|p| p.latitude == 10.0 && p.longitude == -40.0));
        assert!(background.iter().all(|p| p.timestamp == presence[0].timestamp));
    }

    #[test]
    fn test_background_is_reproducible_with_seed() {
        let presence = presence_points();
        let a = generate_background(&presence, 4, &mut StdRng::seed_from_u64(9));
        let b = generate_background(&presence, 4, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_filter_date_range_inclusive() {
        let start = NaiveDate::from_ymd_opt(2014, 4, 12).unwrap();
        let end = NaiveDate::from_ymd_opt(2014, 4, 13).unwrap();
        let (kept, dropped) = filter_date_range(presence_points(), start, end);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_group_by_day_preserves_order() {
        let mut points = presence_points();
        points.push(ObservationPoint::new(
            Utc.with_ymd_and_hms(2014, 4, 12, 23, 0, 0).unwrap(),
            0.0,
            0.0,
            BACKGROUND,
        ));

        let groups = group_by_day(&points);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&NaiveDate::from_ymd_opt(2014, 4, 12).unwrap()], vec![0, 3]);
        assert_eq!(groups[&NaiveDate::from_ymd_opt(2014, 4, 15).unwrap()], vec![1]);
    }
}
