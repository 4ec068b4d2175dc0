//! PFA Export Core - Rust Engine
//!
//! Compiles fitted statistical models and host scoring expressions into
//! portable PFA scoring documents.
//!
//! # Architecture
//!
//! - **schema**: Avro-style type descriptors
//! - **expr**: Action-graph nodes, operator library, host expression translator
//! - **models**: Fitted model payloads and parameter extraction
//! - **decision**: Prediction type and cutoff policy
//! - **compiler**: Linear and tree-ensemble compilers, export driver
//! - **document**: Assembly, type checking, PFA encoding
//! - **validation**: Validation gateway, engines and reference interpreter
//! - **config**: Export options
//!
//! # Critical Invariants
//!
//! 1. Documents only exist after a successful assembly
//! 2. Identical inputs produce byte-identical documents
//! 3. Validation never modifies a document

// Module declarations
pub mod compiler;
pub mod config;
pub mod decision;
pub mod document;
pub mod expr;
pub mod models;
pub mod schema;
pub mod validation;

// Re-exports for convenience
pub use compiler::{
    compile_action, export_model, Buildable, CompileError, ExportError, ExportOutcome,
    ModelCompiler,
};
pub use config::{ConfigError, ExportConfig};
pub use decision::{decide, CutoffSpec, DecisionError, Outcome, PredictionType};
pub use document::{assemble, AssemblyError, Cell, Document, DocumentParts};
pub use expr::{translate, ExprNode, TranslateError, Translator};
pub use models::{Extractable, ExtractionError, FittedModel, ParameterRecord};
pub use schema::{SchemaError, TypeDescriptor};
pub use validation::{
    CommandEngine, GatewayError, ReferenceEngine, ValidationEngine, ValidationGateway,
    ValidationMode, ValidationReport, ValidationStatus,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn pfa_export_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::exporter::PyExporter>()?;
    m.add_function(wrap_pyfunction!(ffi::exporter::compile_model_json, m)?)?;
    Ok(())
}
