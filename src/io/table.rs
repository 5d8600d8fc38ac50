//! Training table CSV writer and reader

use crate::io::observations::parse_timestamp;
use crate::types::{
    Feature, FeatureRow, MatchError, MatchResult, ObservationPoint, TrainingRow, TrainingTable,
};
use std::path::Path;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output column order
pub const COLUMNS: [&str; 9] = [
    "timestamp",
    "latitude",
    "longitude",
    "presence",
    "date",
    "chlor_a",
    "carbon_phyto",
    "sst",
    "ssha_karin",
];

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Parse an optional numeric cell; blank and NaN spellings are missing
pub fn parse_optional(text: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") || text.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let value: f64 = text.parse()?;
    Ok(if value.is_finite() { Some(value) } else { None })
}

/// Write the table with missing values as empty fields
pub fn write_training_table<P: AsRef<Path>>(table: &TrainingTable, path: P) -> MatchResult<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(COLUMNS)?;

    for row in &table.rows {
        let point = &row.point;
        let mut record = vec![
            point.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            point.latitude.to_string(),
            point.longitude.to_string(),
            point.label.to_string(),
            point.date().format("%Y-%m-%d").to_string(),
        ];
        record.extend(Feature::ALL.iter().map(|f| format_value(row.features.get(*f))));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    log::info!("Wrote {} row(s) to {}", table.len(), path.as_ref().display());
    Ok(())
}

/// Read a table written by [`write_training_table`].
///
/// Rows with an unreadable timestamp, coordinate or label are skipped.
pub fn read_training_table<P: AsRef<Path>>(path: P) -> MatchResult<TrainingTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let required: Vec<&str> = ["timestamp", "latitude", "longitude", "presence"]
        .into_iter()
        .chain(Feature::ALL.iter().map(|f| f.name()))
        .collect();

    let mut indices = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for name in required {
        match position(name) {
            Some(i) => indices.push(i),
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(MatchError::Schema(format!(
            "{} is missing column(s): {}",
            path.as_ref().display(),
            missing.join(", ")
        )));
    }

    let mut table = TrainingTable::default();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(indices[i]).unwrap_or("");

        let timestamp = parse_timestamp(field(0));
        let latitude = field(1).parse::<f64>().ok();
        let longitude = field(2).parse::<f64>().ok();
        let label = field(3).parse::<f64>().ok().filter(|l| *l == 0.0 || *l == 1.0);

        let (Some(timestamp), Some(latitude), Some(longitude), Some(label)) =
            (timestamp, latitude, longitude, label)
        else {
            skipped += 1;
            continue;
        };

        let mut features = FeatureRow::default();
        for (k, feature) in Feature::ALL.iter().enumerate() {
            features.set(*feature, parse_optional(field(4 + k)).unwrap_or(None));
        }

        table.rows.push(TrainingRow {
            point: ObservationPoint::new(timestamp, latitude, longitude, label as u8),
            features,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {} unreadable row(s) in {}", skipped, path.as_ref().display());
    }
    log::info!("Read {} row(s) from {}", table.len(), path.as_ref().display());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BACKGROUND, PRESENCE};
    use chrono::{TimeZone, Utc};

    fn sample_table() -> TrainingTable {
        let ts = Utc.with_ymd_and_hms(2014, 4, 12, 10, 30, 0).unwrap();
        TrainingTable {
            rows: vec![
                TrainingRow {
                    point: ObservationPoint::new(ts, 10.0, -40.0, PRESENCE),
                    features: FeatureRow {
                        chlor_a: Some(0.35),
                        carbon_phyto: Some(33.7),
                        sst: Some(21.3),
                        ssha_karin: None,
                    },
                },
                TrainingRow {
                    point: ObservationPoint::new(ts, 11.25, -41.5, BACKGROUND),
                    features: FeatureRow::default(),
                },
            ],
        }
    }

    #[test]
    fn test_written_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.csv");
        write_training_table(&sample_table(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,latitude,longitude,presence,date,chlor_a,carbon_phyto,sst,ssha_karin"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2014-04-12 10:30:00,10,-40,1,2014-04-12,0.35,33.7,21.3,"
        );
        assert_eq!(lines.next().unwrap(), "2014-04-12 10:30:00,11.25,-41.5,0,2014-04-12,,,,");
    }

    #[test]
    fn test_read_back_keeps_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.csv");
        let table = sample_table();
        write_training_table(&table, &path).unwrap();

        let loaded = read_training_table(&path).unwrap();
        assert_eq!(loaded.rows, table.rows);
    }

    #[test]
    fn test_parse_optional() {
        assert_eq!(parse_optional(""), Ok(None));
        assert_eq!(parse_optional("NaN"), Ok(None));
        assert_eq!(parse_optional(" 2.5 "), Ok(Some(2.5)));
        assert!(parse_optional("abc").is_err());
    }

    #[test]
    fn test_read_requires_feature_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.csv");
        std::fs::write(&path, "timestamp,latitude,longitude,presence\n").unwrap();
        assert!(matches!(read_training_table(&path), Err(MatchError::Schema(_))));
    }
}
