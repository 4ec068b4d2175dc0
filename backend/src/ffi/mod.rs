//! Python bindings
//!
//! - exporter.rs: `Exporter` class and `compile_model_json`

pub mod exporter;
