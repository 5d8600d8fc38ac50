//! Raster backend seam. Grid and swath readers go through [`RasterBackend`] so the
//! matching logic never touches GDAL directly.

use crate::config::SwathSourceConfig;
use crate::types::{MatchError, MatchResult};
use gdal::cpl::CslStringList;
use gdal::raster::{Group, MDArray};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use std::path::{Path, PathBuf};

/// Cell-centre coordinates of a rectilinear lat/lon grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    /// One entry per row, ascending or descending
    pub latitudes: Vec<f64>,
    /// One entry per column, ascending or descending
    pub longitudes: Vec<f64>,
}

impl GridAxes {
    /// Build the axes from a north-up GDAL geotransform
    pub fn from_geo_transform(gt: &[f64; 6], width: usize, height: usize) -> Option<Self> {
        if gt[2] != 0.0 || gt[4] != 0.0 || gt[1] == 0.0 || gt[5] == 0.0 {
            return None;
        }
        let longitudes = (0..width).map(|j| gt[0] + (j as f64 + 0.5) * gt[1]).collect();
        let latitudes = (0..height).map(|i| gt[3] + (i as f64 + 0.5) * gt[5]).collect();
        Some(Self { latitudes, longitudes })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }
}

/// An open single-variable grid
pub trait GridReader {
    fn axes(&self) -> &GridAxes;

    /// Unpacked value at (row, col); `None` when the cell holds the fill value
    fn read_cell(&self, row: usize, col: usize) -> MatchResult<Option<f64>>;
}

/// Flattened swath arrays for one file, fill values already mapped to `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwathArrays {
    pub variable: String,
    pub latitudes: Vec<Option<f64>>,
    pub longitudes: Vec<Option<f64>>,
    pub values: Vec<Option<f64>>,
}

/// Outcome of reading one swath file
#[derive(Debug, Clone, PartialEq)]
pub enum SwathRead {
    Arrays(SwathArrays),
    /// None of the candidate variables exist in the file
    VariableNotFound,
}

/// Source of grid and swath data
pub trait RasterBackend: Send + Sync {
    fn open_grid(&self, path: &Path, variable: &str) -> MatchResult<Box<dyn GridReader>>;

    fn read_swath(&self, path: &Path, source: &SwathSourceConfig) -> MatchResult<SwathRead>;
}

/// Apply fill-value masking, then scale and offset
pub fn unpack(raw: f64, nodata: Option<f64>, scale: f64, offset: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    if let Some(fill) = nodata {
        if raw == fill {
            return None;
        }
    }
    Some(raw * scale + offset)
}

/// First candidate, in priority order, among the variable names a file holds
pub fn resolve_swath_variable<'a>(names: &[String], candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .find(|candidate| names.iter().any(|n| n == *candidate))
        .map(|c| c.as_str())
}

/// GDAL dataset name for one variable of a multi-variable container
pub fn subdataset_name(path: &Path, variable: &str) -> String {
    let is_netcdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "nc" | "nc4" | "cdf"))
        .unwrap_or(false);

    if is_netcdf {
        format!("NETCDF:\"{}\":{}", path.display(), variable)
    } else {
        path.display().to_string()
    }
}

/// Backend reading netCDF/GeoTIFF through GDAL
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalBackend;

struct GdalGrid {
    dataset: Dataset,
    path: PathBuf,
    axes: GridAxes,
    nodata: Option<f64>,
    scale: f64,
    offset: f64,
}

impl GridReader for GdalGrid {
    fn axes(&self) -> &GridAxes {
        &self.axes
    }

    fn read_cell(&self, row: usize, col: usize) -> MatchResult<Option<f64>> {
        let band = self.dataset.rasterband(1)?;
        let buffer = band.read_as::<f64>((col as isize, row as isize), (1, 1), (1, 1), None)?;
        let raw = buffer.data.first().copied().ok_or_else(|| MatchError::Raster {
            path: self.path.clone(),
            message: format!("empty read at row {} col {}", row, col),
        })?;
        Ok(unpack(raw, self.nodata, self.scale, self.offset))
    }
}

impl Drop for GdalGrid {
    fn drop(&mut self) {
        log::debug!("Closing grid: {}", self.path.display());
    }
}

impl GdalBackend {
    /// Open a container in multidimensional mode, where 1-D and 2-D variables are both visible
    fn open_multidim(path: &Path) -> MatchResult<Dataset> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER,
            ..Default::default()
        };
        Ok(Dataset::open_ex(path, options)?)
    }

    /// Every element of one variable, flattened in storage order and unpacked
    fn read_md_values(group: &Group, name: &str) -> MatchResult<Vec<Option<f64>>> {
        let array = group.open_md_array(name, CslStringList::new())?;
        let count: Vec<usize> = array.dimensions()?.iter().map(|d| d.size()).collect();
        let start = vec![0u64; count.len()];
        let raw = array.read_as::<f64>(start, count)?;

        let nodata = array.no_data_value_as_double();
        let scale = Self::md_attribute(&array, "scale_factor").unwrap_or(1.0);
        let offset = Self::md_attribute(&array, "add_offset").unwrap_or(0.0);
        Ok(raw.into_iter().map(|v| unpack(v, nodata, scale, offset)).collect())
    }

    fn md_attribute(array: &MDArray, name: &str) -> Option<f64> {
        array.attribute(name).ok().map(|a| a.read_as_f64())
    }
}

impl RasterBackend for GdalBackend {
    fn open_grid(&self, path: &Path, variable: &str) -> MatchResult<Box<dyn GridReader>> {
        let name = subdataset_name(path, variable);
        log::debug!("Opening grid: {}", name);

        let dataset = Dataset::open(name.as_str())?;
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset.geo_transform()?;

        let axes = GridAxes::from_geo_transform(&geo_transform, width, height).ok_or_else(|| {
            MatchError::Raster {
                path: path.to_path_buf(),
                message: format!("not a rectilinear lat/lon grid: {:?}", geo_transform),
            }
        })?;

        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();
        let scale = band.scale().unwrap_or(1.0);
        let offset = band.offset().unwrap_or(0.0);
        drop(band);

        log::debug!("Grid size: {}x{}, fill value: {:?}", width, height, nodata);

        Ok(Box::new(GdalGrid {
            dataset,
            path: path.to_path_buf(),
            axes,
            nodata,
            scale,
            offset,
        }))
    }

    fn read_swath(&self, path: &Path, source: &SwathSourceConfig) -> MatchResult<SwathRead> {
        let dataset = Self::open_multidim(path)?;
        let root = dataset.root_group()?;
        let names = root.array_names(CslStringList::new());

        let Some(variable) = resolve_swath_variable(&names, &source.variable_candidates) else {
            log::debug!(
                "{}: none of {:?} among {:?}",
                path.display(),
                source.variable_candidates,
                names
            );
            return Ok(SwathRead::VariableNotFound);
        };
        let variable = variable.to_string();

        let latitudes = Self::read_md_values(&root, &source.latitude_variable)?;
        let longitudes = Self::read_md_values(&root, &source.longitude_variable)?;
        let values = Self::read_md_values(&root, &variable)?;

        if latitudes.len() != values.len() || longitudes.len() != values.len() {
            return Err(MatchError::Raster {
                path: path.to_path_buf(),
                message: format!(
                    "coordinate/value size mismatch: lat {}, lon {}, {} {}",
                    latitudes.len(),
                    longitudes.len(),
                    variable,
                    values.len()
                ),
            });
        }

        Ok(SwathRead::Arrays(SwathArrays {
            variable,
            latitudes,
            longitudes,
            values,
        }))
    }
}
