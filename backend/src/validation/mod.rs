//! Post-assembly validation
//!
//! The gateway hands an assembled document to a validation engine and
//! interprets the verdict according to the configured mode. Validation is
//! read-only: the document is never modified, and in `Off` mode the engine
//! is never called.
//!
//! - engine.rs: `ValidationEngine` trait, in-process and external engines
//! - interpreter.rs: document evaluator used by the reference engine

pub mod engine;
pub mod interpreter;

pub use engine::{CommandEngine, EngineDiagnostic, ReferenceEngine, ValidationEngine};
pub use interpreter::{evaluate_document, evaluate_expression, run_document, Datum, EvalError};

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Default engine budget
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// How validation failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Engine is not consulted
    #[default]
    Off,
    /// Failures are logged and reported alongside the document
    Warn,
    /// Failures abort the export
    Error,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Off => f.write_str("off"),
            ValidationMode::Warn => f.write_str("warn"),
            ValidationMode::Error => f.write_str("error"),
        }
    }
}

/// Fatal validation outcome (error mode only)
#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("Validation by {engine} engine failed: {diagnostic}")]
    ValidationFailed {
        engine: String,
        diagnostic: EngineDiagnostic,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Skipped,
    Passed,
    /// Warn-mode failure; the document is still usable
    Failed(EngineDiagnostic),
}

/// What the gateway did with a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub mode: ValidationMode,
    /// Engine consulted, if any
    pub engine: Option<String>,
    pub status: ValidationStatus,
}

impl ValidationReport {
    pub fn is_passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    pub fn diagnostic(&self) -> Option<&EngineDiagnostic> {
        match &self.status {
            ValidationStatus::Failed(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Mode-aware front end to a validation engine
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::validation::{ReferenceEngine, ValidationGateway, ValidationMode};
/// use std::sync::Arc;
///
/// let gateway = ValidationGateway::new(ValidationMode::Warn, Arc::new(ReferenceEngine));
/// assert_eq!(gateway.mode(), ValidationMode::Warn);
/// ```
#[derive(Clone)]
pub struct ValidationGateway {
    mode: ValidationMode,
    timeout: Duration,
    engine: Arc<dyn ValidationEngine>,
}

impl fmt::Debug for ValidationGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationGateway")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl ValidationGateway {
    pub fn new(mode: ValidationMode, engine: Arc<dyn ValidationEngine>) -> Self {
        Self {
            mode,
            timeout: DEFAULT_TIMEOUT,
            engine,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate an assembled document
    ///
    /// # Returns
    ///
    /// * `Ok(report)` - skipped (`Off`), passed, or failed in `Warn` mode
    /// * `Err(ValidationFailed)` - failed in `Error` mode
    pub fn validate(&self, document: &Document) -> Result<ValidationReport, GatewayError> {
        if self.mode == ValidationMode::Off {
            return Ok(ValidationReport {
                mode: self.mode,
                engine: None,
                status: ValidationStatus::Skipped,
            });
        }

        let engine = self.engine.name().to_string();
        let verdict = self.run_engine(document);
        tracing::debug!(engine = %engine, mode = %self.mode, passed = verdict.is_ok(), "validation finished");

        let status = match verdict {
            Ok(()) => ValidationStatus::Passed,
            Err(diagnostic) if self.mode == ValidationMode::Error => {
                return Err(GatewayError::ValidationFailed { engine, diagnostic });
            }
            Err(diagnostic) => {
                tracing::warn!(
                    engine = %engine,
                    document = %document.name(),
                    %diagnostic,
                    "document failed validation"
                );
                ValidationStatus::Failed(diagnostic)
            }
        };

        Ok(ValidationReport {
            mode: self.mode,
            engine: Some(engine),
            status,
        })
    }

    /// Run the engine on a worker thread, bounded by the timeout
    fn run_engine(&self, document: &Document) -> Result<(), EngineDiagnostic> {
        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        let snapshot = document.clone();
        let timeout = self.timeout;

        thread::Builder::new()
            .name("pfa-validation".to_string())
            .spawn(move || {
                // The receiver is gone once the caller stopped waiting
                let _ = tx.send(engine.check(&snapshot, timeout));
            })
            .map_err(|e| EngineDiagnostic::Unavailable(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(verdict) => verdict,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(EngineDiagnostic::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineDiagnostic::Unavailable(
                "engine stopped without a verdict".to_string(),
            )),
        }
    }
}
