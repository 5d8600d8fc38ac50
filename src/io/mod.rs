//! I/O modules for observations, daily rasters, swaths and the training table

pub mod raster;
pub mod grid;
pub mod swath;
pub mod observations;
pub mod table;

pub use raster::{
    resolve_swath_variable, GdalBackend, GridAxes, GridReader, RasterBackend, SwathArrays, SwathRead,
};
pub use grid::GridHandle;
pub use swath::SwathSamples;
pub use observations::{read_observations, ObservationLoad};
pub use table::{read_training_table, write_training_table};
