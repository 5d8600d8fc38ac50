mod common;

use chrono::NaiveDate;
use sharkline::config::GridSourceConfig;
use sharkline::core::audit::list_swath_files;
use sharkline::core::{missing_dates, swath_validity};
use sharkline::{AssemblyConfig, Feature, GdalBackend, GridHandle};
use std::path::PathBuf;

/// Directory laid out like a real download (chlorophyll/, SST/, SSH/, ...)
fn data_dir() -> Option<PathBuf> {
    common::init_logging();
    let dir = PathBuf::from(std::env::var("SHARKLINE_TEST_DATA").ok()?);
    if dir.is_dir() {
        Some(dir)
    } else {
        None
    }
}

#[test]
fn test_real_modis_grid_lookup() {
    let Some(dir) = data_dir() else {
        println!("SHARKLINE_TEST_DATA not set, skipping test");
        return;
    };

    let source = GridSourceConfig::modis(Feature::Sst, dir.join("SST"), "L3m.DAY.SST");
    let date = NaiveDate::from_ymd_opt(2014, 4, 12).unwrap();
    if !source.path_for(date).exists() {
        println!("{} not found, skipping test", source.path_for(date).display());
        return;
    }

    let handle = GridHandle::open(&source, date, &GdalBackend)
        .expect("Failed to open SST grid")
        .expect("SST grid exists");

    // Open Atlantic, daytime SST is plausible or masked by cloud
    match handle.lookup(10.0, -40.0) {
        Some(sst) => {
            println!("SST at (10, -40): {}", sst);
            assert!((-2.0..=40.0).contains(&sst));
        }
        None => println!("SST at (10, -40) is masked"),
    }
    assert_eq!(handle.lookup(95.0, -40.0), None);
}

#[test]
fn test_real_swath_validity() {
    let Some(dir) = data_dir() else {
        println!("SHARKLINE_TEST_DATA not set, skipping test");
        return;
    };

    let config = AssemblyConfig::with_base_dir(&dir);
    let files = match list_swath_files(&config.swath_source) {
        Ok(files) if !files.is_empty() => files,
        _ => {
            println!("No swath files found, skipping test");
            return;
        }
    };

    let report = swath_validity(&files, &config.swath_source, &GdalBackend);
    assert_eq!(report.files.len(), files.len());
    assert!(report.valid_samples <= report.total_samples);
    if let Some(pct) = report.valid_percentage() {
        println!("{:.2}% of swath samples valid", pct);
    }
}

#[test]
fn test_real_date_gaps() {
    let Some(dir) = data_dir() else {
        println!("SHARKLINE_TEST_DATA not set, skipping test");
        return;
    };

    let chlorophyll = dir.join("chlorophyll");
    if !chlorophyll.is_dir() {
        println!("No chlorophyll directory, skipping test");
        return;
    }

    let report = missing_dates(&chlorophyll).expect("Failed to scan chlorophyll directory");
    println!("{} day(s) present, {} missing", report.days_present, report.missing.len());
    if let (Some(first), Some(last)) = (report.first, report.last) {
        let span = (last - first).num_days() as usize + 1;
        assert_eq!(span, report.days_present + report.missing.len());
    }
}
