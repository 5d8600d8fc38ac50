//! sharkline: spatio-temporal matching of animal tracks against daily ocean rasters
//!
//! Presence observations and sampled background points are matched, day by day,
//! against regular-grid products (chlorophyll, phytoplankton carbon, SST) and
//! irregular altimetry swaths to build a labelled habitat training table. A
//! bagged decision-tree classifier is trained and evaluated on that table.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AssemblyReport, Feature, FeatureRow, MatchError, MatchResult, ObservationPoint, TrainingRow,
    TrainingTable,
};
pub use config::{AssemblyConfig, GridSourceConfig, SwathSourceConfig};
pub use io::{GdalBackend, GridHandle, RasterBackend};
pub use crate::core::{DailyMatcher, DatasetAssembler, HabitatModel, SwathPointIndex, TrainerParams};

#[cfg(feature = "python")]
mod python {
    use crate::core::{validate_feature_values, DatasetAssembler, HabitatModel};
    use crate::io::{read_training_table, write_training_table, GdalBackend};
    use crate::types::{Feature, MatchError};
    use crate::AssemblyConfig;
    use ndarray::{Array1, Array2};
    use numpy::{IntoPyArray, PyArray1, PyArray2};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    fn to_py_err(e: MatchError) -> PyErr {
        match e {
            MatchError::InvalidInput(_) | MatchError::Schema(_) | MatchError::Config(_) => {
                PyValueError::new_err(format!("{}", e))
            }
            _ => PyRuntimeError::new_err(format!("{}", e)),
        }
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(assemble_training_table, m)?)?;
        m.add_function(wrap_pyfunction!(feature_matrix, m)?)?;
        m.add_class::<PyHabitatModel>()?;
        Ok(())
    }

    /// Assemble from a JSON config, write the CSV, return the quality report
    #[pyfunction]
    fn assemble_training_table(py: Python<'_>, config_path: String, output_csv: String) -> PyResult<PyObject> {
        let config = AssemblyConfig::from_json_file(&config_path).map_err(to_py_err)?;
        let backend = GdalBackend;
        let assembly = DatasetAssembler::new(&config, &backend).assemble().map_err(to_py_err)?;
        write_training_table(&assembly.table, &output_csv).map_err(to_py_err)?;

        let report = &assembly.report;
        let dict = PyDict::new(py);
        dict.set_item("rows", assembly.table.len())?;
        dict.set_item("rows_loaded", report.rows_loaded)?;
        dict.set_item("malformed_dropped", report.malformed_dropped)?;
        dict.set_item("outside_date_range", report.outside_date_range)?;
        dict.set_item("presence_points", report.presence_points)?;
        dict.set_item("background_points", report.background_points)?;
        dict.set_item("days_processed", report.days_processed)?;
        dict.set_item("rows_with_missing", report.rows_with_missing)?;
        for feature in Feature::ALL {
            let missing = report.missing_by_feature.get(&feature).copied().unwrap_or(0);
            dict.set_item(format!("missing_{}", feature.name()), missing)?;
        }
        Ok(dict.to_object(py))
    }

    /// Feature matrix (NaN for missing) and presence labels of a training CSV
    #[pyfunction]
    fn feature_matrix(py: Python<'_>, csv_path: String) -> PyResult<(&PyArray2<f64>, &PyArray1<u8>)> {
        let table = read_training_table(&csv_path).map_err(to_py_err)?;

        let mut features = Array2::<f64>::from_elem((table.len(), Feature::ALL.len()), f64::NAN);
        let mut labels = Array1::<u8>::zeros(table.len());
        for (i, row) in table.rows.iter().enumerate() {
            for feature in Feature::ALL {
                if let Some(value) = row.features.get(feature) {
                    features[[i, feature.index()]] = value;
                }
            }
            labels[i] = row.point.label;
        }

        Ok((features.into_pyarray(py), labels.into_pyarray(py)))
    }

    /// Python wrapper for HabitatModel
    #[pyclass(name = "HabitatModel")]
    struct PyHabitatModel {
        inner: HabitatModel,
    }

    #[pymethods]
    impl PyHabitatModel {
        #[staticmethod]
        fn load(path: String) -> PyResult<Self> {
            let inner = HabitatModel::load(&path).map_err(to_py_err)?;
            Ok(PyHabitatModel { inner })
        }

        /// Returns (prediction, probability)
        fn predict(&self, chlor_a: f64, carbon_phyto: f64, sst: f64, ssha_karin: f64) -> PyResult<(u8, f64)> {
            let row = validate_feature_values([chlor_a, carbon_phyto, sst, ssha_karin])
                .map_err(to_py_err)?;
            let prediction = self.inner.predict(&row);
            Ok((prediction.label, prediction.probability))
        }

        #[getter]
        fn threshold(&self) -> f64 {
            self.inner.threshold()
        }

        fn __repr__(&self) -> String {
            format!("HabitatModel(threshold={})", self.inner.threshold())
        }
    }
}
