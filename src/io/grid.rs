use crate::config::GridSourceConfig;
use crate::io::raster::{GridAxes, GridReader, RasterBackend};
use crate::types::MatchResult;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Index of the axis entry nearest to `target`.
///
/// The axis must be monotonic (either direction). Targets beyond the ends snap
/// to the edge entry. An equidistant tie goes to the larger coordinate on an
/// ascending axis and to the earlier entry on a descending one.
pub fn nearest_index(axis: &[f64], target: f64) -> Option<usize> {
    if axis.is_empty() || !target.is_finite() {
        return None;
    }
    if axis.len() == 1 {
        return Some(0);
    }

    let ascending = axis[axis.len() - 1] >= axis[0];
    // First index whose coordinate is at or past the target in axis order
    let upper = if ascending {
        axis.partition_point(|&v| v < target)
    } else {
        axis.partition_point(|&v| v > target)
    };

    if upper == 0 {
        return Some(0);
    }
    if upper == axis.len() {
        return Some(axis.len() - 1);
    }

    let lower = upper - 1;
    let to_lower = (target - axis[lower]).abs();
    let to_upper = (axis[upper] - target).abs();
    let keep_lower = if ascending { to_lower < to_upper } else { to_lower <= to_upper };
    Some(if keep_lower { lower } else { upper })
}

/// Axis-wise nearest cell: latitude and longitude are resolved independently
pub fn nearest_cell(axes: &GridAxes, lat: f64, lon: f64) -> Option<(usize, usize)> {
    Some((nearest_index(&axes.latitudes, lat)?, nearest_index(&axes.longitudes, lon)?))
}

/// One day's open grid for a single variable.
///
/// The underlying file stays open for the lifetime of the handle and is closed
/// when the handle is dropped.
pub struct GridHandle {
    date: NaiveDate,
    variable: String,
    path: PathBuf,
    reader: Box<dyn GridReader>,
}

impl GridHandle {
    /// Resolve the day's file for `source` and open it.
    ///
    /// Returns `Ok(None)` when no file exists for that day; callers treat the
    /// variable as unavailable rather than failing.
    pub fn open(
        source: &GridSourceConfig,
        date: NaiveDate,
        backend: &dyn RasterBackend,
    ) -> MatchResult<Option<GridHandle>> {
        let path = source.path_for(date);
        if !path.exists() {
            log::debug!("No {} grid for {}: {}", source.variable, date, path.display());
            return Ok(None);
        }

        let reader = backend.open_grid(&path, &source.variable)?;
        Ok(Some(GridHandle {
            date,
            variable: source.variable.clone(),
            path,
            reader,
        }))
    }

    /// Value of the nearest cell, or `None` for fill cells and failed lookups
    pub fn lookup(&self, lat: f64, lon: f64) -> Option<f64> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            log::debug!("{} lookup out of domain at ({}, {})", self.variable, lat, lon);
            return None;
        }

        let (row, col) = nearest_cell(self.reader.axes(), lat, lon)?;
        match self.reader.read_cell(row, col) {
            Ok(value) => value,
            Err(e) => {
                log::debug!(
                    "{} lookup failed at ({}, {}) on {}: {}",
                    self.variable,
                    lat,
                    lon,
                    self.date,
                    e
                );
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}
