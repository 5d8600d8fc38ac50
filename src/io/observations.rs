//! Tracking observation CSV reader

use crate::types::{MatchError, MatchResult, ObservationPoint, PRESENCE};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::StringRecord;
use std::path::{Path, PathBuf};

const TIMESTAMP_ALIASES: [&str; 2] = ["date", "timestamp"];
const LATITUDE_ALIASES: [&str; 2] = ["lat", "latitude"];
const LONGITUDE_ALIASES: [&str; 2] = ["lon", "longitude"];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Presence points read from one or more observation files
#[derive(Debug, Clone, Default)]
pub struct ObservationLoad {
    pub points: Vec<ObservationPoint>,
    pub rows_read: usize,
    pub malformed: usize,
}

/// Column positions of the canonical fields
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    timestamp: usize,
    latitude: usize,
    longitude: usize,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self, Vec<&'static str>> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };

        let timestamp = find(&TIMESTAMP_ALIASES[..]);
        let latitude = find(&LATITUDE_ALIASES[..]);
        let longitude = find(&LONGITUDE_ALIASES[..]);

        match (timestamp, latitude, longitude) {
            (Some(timestamp), Some(latitude), Some(longitude)) => Ok(Self {
                timestamp,
                latitude,
                longitude,
            }),
            _ => {
                let mut missing = Vec::new();
                if timestamp.is_none() {
                    missing.push("date");
                }
                if latitude.is_none() {
                    missing.push("lat");
                }
                if longitude.is_none() {
                    missing.push("lon");
                }
                Err(missing)
            }
        }
    }
}

/// Parse the timestamp layouts seen in tracking exports. Naive values are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

fn parse_coordinate(record: &StringRecord, index: usize, name: &str, limit: f64) -> MatchResult<f64> {
    let text = record
        .get(index)
        .ok_or_else(|| MatchError::MalformedRecord(format!("missing {} field", name)))?;
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| MatchError::MalformedRecord(format!("unparseable {}: {:?}", name, text)))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(MatchError::MalformedRecord(format!("{} out of range: {}", name, value)));
    }
    Ok(value)
}

fn parse_record(record: &StringRecord, columns: &ColumnMap) -> MatchResult<ObservationPoint> {
    let raw_time = record
        .get(columns.timestamp)
        .ok_or_else(|| MatchError::MalformedRecord("missing date field".to_string()))?;
    let timestamp = parse_timestamp(raw_time)
        .ok_or_else(|| MatchError::MalformedRecord(format!("unparseable date: {:?}", raw_time)))?;

    let latitude = parse_coordinate(record, columns.latitude, "lat", 90.0)?;
    let longitude = parse_coordinate(record, columns.longitude, "lon", 180.0)?;

    Ok(ObservationPoint::new(timestamp, latitude, longitude, PRESENCE))
}

fn read_file(path: &Path, load: &mut ObservationLoad) -> MatchResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::resolve(&headers).map_err(|missing| {
        MatchError::Schema(format!(
            "{} is missing required column(s): {}",
            path.display(),
            missing.join(", ")
        ))
    })?;

    let before = load.points.len();
    for (line, record) in reader.records().enumerate() {
        load.rows_read += 1;
        let parsed = record.map_err(MatchError::from).and_then(|r| parse_record(&r, &columns));
        match parsed {
            Ok(point) => load.points.push(point),
            Err(e) => {
                log::debug!("Skipping {} row {}: {}", path.display(), line + 2, e);
                load.malformed += 1;
            }
        }
    }

    log::info!(
        "Loaded {} observation(s) from {}",
        load.points.len() - before,
        path.display()
    );
    Ok(())
}

/// Read and concatenate observation files in order.
///
/// Missing required columns abort with a schema error; bad rows are skipped
/// and counted.
pub fn read_observations(paths: &[PathBuf]) -> MatchResult<ObservationLoad> {
    let mut load = ObservationLoad::default();
    for path in paths {
        read_file(path, &mut load)?;
    }

    if load.malformed > 0 {
        log::warn!("Skipped {} malformed observation row(s)", load.malformed);
    }
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2014, 4, 12, 17, 8, 40).unwrap();
        assert_eq!(parse_timestamp("2014-04-12 17:08:40"), Some(expected));
        assert_eq!(parse_timestamp("2014-04-12T17:08:40"), Some(expected));
        assert_eq!(parse_timestamp("2014-04-12T17:08:40Z"), Some(expected));
        assert_eq!(parse_timestamp("04/12/2014 17:08:40"), Some(expected));

        let with_fraction = parse_timestamp("2014-04-12 17:08:40.250").unwrap();
        assert_eq!(with_fraction.second(), 40);

        let date_only = parse_timestamp("2014-04-12").unwrap();
        assert_eq!(date_only.day(), 12);
        assert_eq!(date_only.hour(), 0);

        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_read_observations_renames_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        std::fs::write(
            &path,
            "id,date,lat,lon\n\
             1,2014-04-12 10:00:00,10.0,-40.0\n\
             2,not a date,10.0,-40.0\n\
             3,2014-04-13 10:00:00,95.0,-40.0\n\
             4,2014-04-14 10:00:00,11.5,-41.5\n",
        )
        .unwrap();

        let load = read_observations(&[path]).unwrap();
        assert_eq!(load.rows_read, 4);
        assert_eq!(load.malformed, 2);
        assert_eq!(load.points.len(), 2);
        assert_eq!(load.points[1].latitude, 11.5);
        assert!(load.points.iter().all(|p| p.label == PRESENCE));
    }

    #[test]
    fn test_canonical_headers_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        std::fs::write(&path, " Timestamp , Latitude , Longitude \n2014-04-12,1.0,2.0\n").unwrap();

        let load = read_observations(&[path]).unwrap();
        assert_eq!(load.points.len(), 1);
    }

    #[test]
    fn test_missing_columns_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        std::fs::write(&path, "date,latitude\n2014-04-12,1.0\n").unwrap();

        match read_observations(&[path]) {
            Err(MatchError::Schema(message)) => assert!(message.contains("lon")),
            other => panic!("expected schema error, got {:?}", other.map(|l| l.points.len())),
        }
    }
}
