//! Export configuration
//!
//! Every option of an export lives here with a documented default; the
//! compiler reads nothing else.

use crate::decision::{CutoffSpec, PredictionType};
use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    LoadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_input_record_name() -> String {
    "Input".to_string()
}

/// Options for one export
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::config::ExportConfig;
/// use pfa_export_core_rs::decision::PredictionType;
///
/// let config = ExportConfig::from_json(r#"{"pred_type": "class"}"#).unwrap();
/// assert_eq!(config.pred_type, PredictionType::Class);
/// assert_eq!(config.input_record_name, "Input");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Document name; defaults to the model class
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub pred_type: PredictionType,

    /// Per-class cutoffs for class predictions
    #[serde(default)]
    pub cutoffs: Option<CutoffSpec>,

    #[serde(default)]
    pub validation: ValidationMode,

    /// Engine budget in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub validation_timeout_ms: u64,

    /// Name of the derived input record type
    #[serde(default = "default_input_record_name")]
    pub input_record_name: String,

    /// Copied into the document's metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            name: None,
            pred_type: PredictionType::default(),
            cutoffs: None,
            validation: ValidationMode::default(),
            validation_timeout_ms: default_timeout_ms(),
            input_record_name: default_input_record_name(),
            metadata: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ExportConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn with_pred_type(mut self, pred_type: PredictionType) -> Self {
        self.pred_type = pred_type;
        self
    }

    pub fn with_cutoffs(mut self, cutoffs: CutoffSpec) -> Self {
        self.cutoffs = Some(cutoffs);
        self
    }

    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.validation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "validation_timeout_ms must be positive".to_string(),
            ));
        }
        if self.input_record_name.is_empty() {
            return Err(ConfigError::Invalid(
                "input_record_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
