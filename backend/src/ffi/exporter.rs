//! PyO3 wrapper for the model compiler
//!
//! Models, configs and documents cross the boundary as JSON strings.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::compiler::{ExportError, ModelCompiler};
use crate::config::ExportConfig;
use crate::models::FittedModel;

fn parse_config(config_json: Option<&str>) -> PyResult<ExportConfig> {
    match config_json {
        Some(json) => ExportConfig::from_json(json)
            .map_err(|e| PyErr::new::<PyValueError, _>(format!("Invalid export config: {}", e))),
        None => Ok(ExportConfig::default()),
    }
}

fn parse_model(model_json: &str) -> PyResult<FittedModel> {
    serde_json::from_str(model_json)
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("Invalid fitted model: {}", e)))
}

fn export_error(err: ExportError) -> PyErr {
    match err {
        ExportError::Validation(_) => PyErr::new::<PyRuntimeError, _>(err.to_string()),
        _ => PyErr::new::<PyValueError, _>(err.to_string()),
    }
}

/// Python wrapper for `ModelCompiler`
///
/// # Example (from Python)
///
/// ```python
/// from pfa_export._core import Exporter
///
/// exporter = Exporter('{"pred_type": "class", "validation": "error"}')
/// document = exporter.export(model_json)
/// ```
#[pyclass(name = "Exporter")]
pub struct PyExporter {
    inner: ModelCompiler,
}

#[pymethods]
impl PyExporter {
    /// Create an exporter from an optional JSON config
    ///
    /// # Errors
    ///
    /// Raises ValueError if the config does not parse or is invalid
    #[new]
    #[pyo3(signature = (config_json=None))]
    fn new(config_json: Option<&str>) -> PyResult<Self> {
        Ok(PyExporter {
            inner: ModelCompiler::new(parse_config(config_json)?),
        })
    }

    /// Export a fitted model, returning the PFA document as JSON
    ///
    /// # Errors
    ///
    /// Raises ValueError for unusable models, RuntimeError when validation
    /// fails in error mode
    fn export(&self, model_json: &str) -> PyResult<String> {
        let model = parse_model(model_json)?;
        let outcome = self.inner.export(&model).map_err(export_error)?;
        Ok(outcome.document.to_pfa().to_string())
    }

    /// Fingerprint of the document a model would export to
    fn fingerprint(&self, model_json: &str) -> PyResult<String> {
        let model = parse_model(model_json)?;
        let outcome = self.inner.export(&model).map_err(export_error)?;
        Ok(outcome.document.fingerprint())
    }
}

/// One-shot export: fitted model JSON in, PFA document JSON out
#[pyfunction]
#[pyo3(signature = (model_json, config_json=None))]
pub fn compile_model_json(model_json: &str, config_json: Option<&str>) -> PyResult<String> {
    let compiler = ModelCompiler::new(parse_config(config_json)?);
    let model = parse_model(model_json)?;
    let outcome = compiler.export(&model).map_err(export_error)?;
    Ok(outcome.document.to_pfa().to_string())
}
