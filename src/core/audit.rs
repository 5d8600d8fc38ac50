//! Data-quality audits over raw source directories

use crate::config::SwathSourceConfig;
use crate::io::raster::{RasterBackend, SwathRead};
use crate::io::swath::SwathSamples;
use crate::types::{MatchError, MatchResult};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Calendar coverage of a directory of daily files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGapReport {
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
    pub days_present: usize,
    pub missing: Vec<NaiveDate>,
}

fn date_pattern() -> MatchResult<Regex> {
    Regex::new(r"\d+").map_err(|e| MatchError::Config(e.to_string()))
}

/// First run of exactly eight digits in `name` that is a valid `YYYYMMDD` date
pub fn date_in_file_name(pattern: &Regex, name: &str) -> Option<NaiveDate> {
    pattern
        .find_iter(name)
        .filter(|m| m.as_str().len() == 8)
        .find_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
}

/// Every date between the earliest and latest file in `dir` that has no file
pub fn missing_dates<P: AsRef<Path>>(dir: P) -> MatchResult<DateGapReport> {
    let pattern = date_pattern()?;
    let mut dates = BTreeSet::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(date) = entry.file_name().to_str().and_then(|n| date_in_file_name(&pattern, n)) {
            dates.insert(date);
        }
    }

    let (first, last) = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            log::warn!("No dated files found in {}", dir.as_ref().display());
            return Ok(DateGapReport {
                first: None,
                last: None,
                days_present: 0,
                missing: Vec::new(),
            });
        }
    };

    let missing: Vec<NaiveDate> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| !dates.contains(d))
        .collect();

    log::info!(
        "{}: {} day(s) from {} to {}, {} missing",
        dir.as_ref().display(),
        dates.len(),
        first,
        last,
        missing.len()
    );
    Ok(DateGapReport {
        first: Some(first),
        last: Some(last),
        days_present: dates.len(),
        missing,
    })
}

/// Per-file outcome of the swath validity scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SwathVerdict {
    Valid,
    /// Variable present but every sample is missing
    Empty,
    VariableNotFound,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwathFileAudit {
    pub path: PathBuf,
    pub verdict: SwathVerdict,
    pub total: usize,
    pub valid: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwathValidityReport {
    pub files: Vec<SwathFileAudit>,
    pub total_samples: usize,
    pub valid_samples: usize,
}

impl SwathValidityReport {
    pub fn valid_percentage(&self) -> Option<f64> {
        if self.total_samples == 0 {
            None
        } else {
            Some(self.valid_samples as f64 / self.total_samples as f64 * 100.0)
        }
    }

    pub fn files_with(&self, verdict: &SwathVerdict) -> Vec<&Path> {
        self.files
            .iter()
            .filter(|f| &f.verdict == verdict)
            .map(|f| f.path.as_path())
            .collect()
    }
}

/// Count valid swath samples in every file
pub fn swath_validity(
    files: &[PathBuf],
    source: &SwathSourceConfig,
    backend: &dyn RasterBackend,
) -> SwathValidityReport {
    let mut report = SwathValidityReport::default();

    for path in files {
        let audit = match backend.read_swath(path, source) {
            Ok(SwathRead::Arrays(arrays)) => {
                let samples = SwathSamples::from_arrays(&arrays, source.normalize_longitude);
                report.total_samples += samples.total;
                report.valid_samples += samples.len();
                SwathFileAudit {
                    path: path.clone(),
                    verdict: if samples.is_empty() { SwathVerdict::Empty } else { SwathVerdict::Valid },
                    total: samples.total,
                    valid: samples.len(),
                }
            }
            Ok(SwathRead::VariableNotFound) => SwathFileAudit {
                path: path.clone(),
                verdict: SwathVerdict::VariableNotFound,
                total: 0,
                valid: 0,
            },
            Err(e) => SwathFileAudit {
                path: path.clone(),
                verdict: SwathVerdict::Unreadable(e.to_string()),
                total: 0,
                valid: 0,
            },
        };
        log::debug!("{}: {:?} ({} of {})", path.display(), audit.verdict, audit.valid, audit.total);
        report.files.push(audit);
    }

    report
}

/// All swath files in the source root, sorted
pub fn list_swath_files(source: &SwathSourceConfig) -> MatchResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&source.root)? {
        let path = entry?.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&source.extension))
            .unwrap_or(false);
        if path.is_file() && matches_ext {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
