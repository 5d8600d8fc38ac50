#![allow(dead_code)]

use sharkline::config::SwathSourceConfig;
use sharkline::io::{
    resolve_swath_variable, GridAxes, GridReader, RasterBackend, SwathArrays, SwathRead,
};
use sharkline::{AssemblyConfig, MatchError, MatchResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const FILL: f64 = -999.0;

/// In-memory grid, row-major over (latitudes, longitudes)
#[derive(Clone)]
pub struct MemoryGrid {
    pub axes: GridAxes,
    pub values: Vec<f64>,
}

impl GridReader for MemoryGrid {
    fn axes(&self) -> &GridAxes {
        &self.axes
    }

    fn read_cell(&self, row: usize, col: usize) -> MatchResult<Option<f64>> {
        let width = self.axes.longitudes.len();
        let raw = self.values.get(row * width + col).copied().ok_or_else(|| MatchError::Raster {
            path: PathBuf::new(),
            message: format!("cell ({}, {}) out of bounds", row, col),
        })?;
        Ok(if raw == FILL { None } else { Some(raw) })
    }
}

/// Serves registered grids and swaths by path; anything else is unreadable
#[derive(Default)]
pub struct FakeBackend {
    grids: HashMap<PathBuf, MemoryGrid>,
    swaths: HashMap<PathBuf, SwathFile>,
}

/// Coordinates plus every value variable stored in one swath file
#[derive(Clone, Default)]
pub struct SwathFile {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub variables: Vec<(String, Vec<f64>)>,
}

impl FakeBackend {
    /// Register a grid and create an empty placeholder file at `path`
    pub fn add_grid(&mut self, path: &Path, grid: MemoryGrid) {
        touch(path);
        self.grids.insert(path.to_path_buf(), grid);
    }

    /// Register `ssha_karin` samples and create an empty placeholder file at `path`
    pub fn add_swath(&mut self, path: &Path, samples: &[(f64, f64, f64)]) {
        self.add_swath_file(
            path,
            SwathFile {
                latitudes: samples.iter().map(|s| s.0).collect(),
                longitudes: samples.iter().map(|s| s.1).collect(),
                variables: vec![("ssha_karin".to_string(), samples.iter().map(|s| s.2).collect())],
            },
        );
    }

    pub fn add_swath_file(&mut self, path: &Path, file: SwathFile) {
        touch(path);
        self.swaths.insert(path.to_path_buf(), file);
    }
}

impl RasterBackend for FakeBackend {
    fn open_grid(&self, path: &Path, _variable: &str) -> MatchResult<Box<dyn GridReader>> {
        match self.grids.get(path) {
            Some(grid) => Ok(Box::new(grid.clone())),
            None => Err(MatchError::Raster {
                path: path.to_path_buf(),
                message: "not a grid".to_string(),
            }),
        }
    }

    fn read_swath(&self, path: &Path, source: &SwathSourceConfig) -> MatchResult<SwathRead> {
        let Some(file) = self.swaths.get(path) else {
            return Ok(SwathRead::VariableNotFound);
        };

        let names: Vec<String> = file.variables.iter().map(|(name, _)| name.clone()).collect();
        let Some(variable) = resolve_swath_variable(&names, &source.variable_candidates) else {
            return Ok(SwathRead::VariableNotFound);
        };
        let values = file
            .variables
            .iter()
            .find(|(name, _)| name == variable)
            .map(|(_, values)| values.iter().map(|&v| if v == FILL { None } else { Some(v) }).collect())
            .unwrap_or_default();

        Ok(SwathRead::Arrays(SwathArrays {
            variable: variable.to_string(),
            latitudes: file.latitudes.iter().map(|&v| Some(v)).collect(),
            longitudes: file.longitudes.iter().map(|&v| Some(v)).collect(),
            values,
        }))
    }
}

/// Route library logs to the test harness; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directory");
    }
    std::fs::write(path, b"").expect("Failed to create placeholder file");
}

/// 3x3 one-degree grid centred on (10, -40), `centre` in the middle, fill in the corner
pub fn block_grid(centre: f64) -> MemoryGrid {
    MemoryGrid {
        axes: GridAxes {
            latitudes: vec![11.0, 10.0, 9.0],
            longitudes: vec![-41.0, -40.0, -39.0],
        },
        values: vec![1.0, 2.0, 3.0, 4.0, centre, 6.0, 7.0, 8.0, FILL],
    }
}

/// Config rooted at `base` with a fixed seed and a 2014-04-12..2014-04-20 window
pub fn test_config(base: &Path) -> AssemblyConfig {
    init_logging();
    let mut config = AssemblyConfig::with_base_dir(base);
    config.start_date = chrono::NaiveDate::from_ymd_opt(2014, 4, 12).expect("valid date");
    config.end_date = chrono::NaiveDate::from_ymd_opt(2014, 4, 20).expect("valid date");
    config.seed = Some(7);
    config
}
