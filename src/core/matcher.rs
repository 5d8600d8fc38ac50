use crate::config::{AssemblyConfig, GridSourceConfig, SwathSourceConfig};
use crate::core::swath_index::SwathPointIndex;
use crate::io::grid::GridHandle;
use crate::io::raster::RasterBackend;
use crate::io::swath::files_for_day;
use crate::types::{Feature, FeatureRow, ObservationPoint};
use chrono::NaiveDate;

/// Feature rows for one daily batch plus where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct DayMatch {
    pub date: NaiveDate,
    /// One row per input point, in input order
    pub rows: Vec<FeatureRow>,
    /// Features with no usable source that day
    pub missing_sources: Vec<Feature>,
    pub swath_files: usize,
    pub swath_samples: usize,
}

/// Matches one day's points against that day's grids and swaths
pub struct DailyMatcher<'a> {
    grid_sources: &'a [GridSourceConfig],
    swath_source: &'a SwathSourceConfig,
    backend: &'a dyn RasterBackend,
}

impl<'a> DailyMatcher<'a> {
    pub fn new(config: &'a AssemblyConfig, backend: &'a dyn RasterBackend) -> Self {
        Self {
            grid_sources: &config.grid_sources,
            swath_source: &config.swath_source,
            backend,
        }
    }

    /// Match every point of the batch. Never fails: unavailable sources and
    /// failed lookups leave the affected values missing.
    pub fn match_day(&self, date: NaiveDate, points: &[ObservationPoint]) -> DayMatch {
        let mut result = DayMatch {
            date,
            rows: vec![FeatureRow::default(); points.len()],
            missing_sources: Vec::new(),
            swath_files: 0,
            swath_samples: 0,
        };

        for source in self.grid_sources {
            if !self.match_grid(source, date, points, &mut result.rows) {
                result.missing_sources.push(source.feature);
            }
        }

        self.match_swath(date, points, &mut result);

        log::debug!(
            "{}: matched {} point(s), missing sources {:?}",
            date,
            points.len(),
            result.missing_sources
        );
        result
    }

    /// Returns false when the day's grid could not be used at all
    fn match_grid(
        &self,
        source: &GridSourceConfig,
        date: NaiveDate,
        points: &[ObservationPoint],
        rows: &mut [FeatureRow],
    ) -> bool {
        let handle = match GridHandle::open(source, date, self.backend) {
            Ok(Some(handle)) => handle,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("Could not open {} grid for {}: {}", source.variable, date, e);
                return false;
            }
        };

        for (row, point) in rows.iter_mut().zip(points) {
            row.set(source.feature, handle.lookup(point.latitude, point.longitude));
        }
        true
    }

    fn match_swath(&self, date: NaiveDate, points: &[ObservationPoint], result: &mut DayMatch) {
        let feature = self.swath_source.feature;

        let files = match files_for_day(self.swath_source, date) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Could not list swath files for {}: {}", date, e);
                Vec::new()
            }
        };

        let (index, stats) = SwathPointIndex::build(&files, self.swath_source, self.backend);
        result.swath_files = stats.files_used;
        result.swath_samples = index.len();

        if index.is_empty() {
            result.missing_sources.push(feature);
            return;
        }

        let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.latitude, p.longitude)).collect();
        for (row, nearest) in result.rows.iter_mut().zip(index.query_nearest(&coords)) {
            row.set(feature, nearest.map(|n| n.value));
        }
    }
}
