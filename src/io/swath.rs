use crate::config::{date_tag, SwathSourceConfig};
use crate::io::raster::SwathArrays;
use crate::types::{MatchError, MatchResult};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Valid (lat, lon, value) samples from one swath file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwathSamples {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Vec<f64>,
    /// Number of samples in the file before filtering
    pub total: usize,
}

impl SwathSamples {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only triples where coordinates and value are all present
    pub fn from_arrays(arrays: &SwathArrays, normalize_longitude: bool) -> Self {
        let total = arrays.values.len();
        let mut samples = SwathSamples {
            total,
            ..Default::default()
        };

        for i in 0..total {
            let (Some(lat), Some(lon), Some(value)) =
                (arrays.latitudes[i], arrays.longitudes[i], arrays.values[i])
            else {
                continue;
            };
            let lon = if normalize_longitude { wrap_longitude(lon) } else { lon };
            samples.latitudes.push(lat);
            samples.longitudes.push(lon);
            samples.values.push(value);
        }

        samples
    }
}

/// Map a longitude into [-180, 180)
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Every swath file in the source root whose basename contains the day's `YYYYMMDD`.
///
/// The date may appear anywhere in the name. Results are sorted so repeated runs
/// build identical point clouds.
pub fn files_for_day(source: &SwathSourceConfig, date: NaiveDate) -> MatchResult<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&source.root.to_string_lossy());
    let pattern = Path::new(&root).join(format!("*.{}", source.extension));
    let pattern = pattern.to_string_lossy();
    let tag = date_tag(date);

    let entries = glob::glob(&pattern)
        .map_err(|e| MatchError::Config(format!("bad swath pattern {}: {}", pattern, e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Bad path from glob: {:?}", e);
                None
            }
        })
        .filter(|path| file_name_contains(path, &tag))
        .collect();
    files.sort();

    log::debug!("Found {} swath file(s) for {}", files.len(), tag);
    Ok(files)
}

fn file_name_contains(path: &Path, tag: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.contains(tag))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_triples_dropped() {
        let arrays = SwathArrays {
            variable: "ssha_karin".to_string(),
            latitudes: vec![Some(10.0), Some(10.1), None, Some(10.3)],
            longitudes: vec![Some(320.0), Some(-40.0), Some(-40.0), Some(-40.0)],
            values: vec![Some(0.5), None, Some(0.7), Some(0.8)],
        };

        let samples = SwathSamples::from_arrays(&arrays, true);
        assert_eq!(samples.total, 4);
        assert_eq!(samples.len(), 2);
        assert_relative_eq!(samples.longitudes[0], -40.0);
        assert_relative_eq!(samples.values[1], 0.8);

        let raw = SwathSamples::from_arrays(&arrays, false);
        assert_relative_eq!(raw.longitudes[0], 320.0);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_relative_eq!(wrap_longitude(0.0), 0.0);
        assert_relative_eq!(wrap_longitude(190.0), -170.0);
        assert_relative_eq!(wrap_longitude(359.5), -0.5);
        assert_relative_eq!(wrap_longitude(-40.0), -40.0);
        assert_relative_eq!(wrap_longitude(180.0), -180.0);
    }

    #[test]
    fn test_files_for_day_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        let names = [
            "SWOT_L2_LR_SSH_Expert_001_007_20140412T170840_20140412T180007_DG10_01.nc",
            "SWOT_L2_LR_SSH_Expert_001_002_20140412T010101_20140412T020202_DG10_01.nc",
            "SWOT_L2_LR_SSH_Expert_001_009_20140413T000000_20140413T010000_DG10_01.nc",
            "notes_20140412.txt",
        ];
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let source = SwathSourceConfig::swot(dir.path());
        let date = NaiveDate::from_ymd_opt(2014, 4, 12).unwrap();
        let files = files_for_day(&source, date).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].to_string_lossy().contains("_002_"));
        assert!(files[1].to_string_lossy().contains("_007_"));

        let empty = files_for_day(&source, NaiveDate::from_ymd_opt(2014, 4, 14).unwrap()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_files_for_day_with_glob_characters_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("SSH [2014]*");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("swot_20140412.nc"), b"").unwrap();

        let source = SwathSourceConfig::swot(&root);
        let files = files_for_day(&source, NaiveDate::from_ymd_opt(2014, 4, 12).unwrap()).unwrap();
        assert_eq!(files, vec![root.join("swot_20140412.nc")]);
    }
}
