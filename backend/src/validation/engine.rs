// Validation engines
//
// An engine receives an assembled document and answers pass or fail with a
// diagnostic. ReferenceEngine checks in-process; CommandEngine hands the
// encoded document to an external validator program.

use crate::document::{infer_action, AssemblyError, Document};
use crate::schema::{PrimitiveKind, TypeDescriptor};
use crate::validation::interpreter::run_document;
use serde_json::{Map, Value as JsonValue};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between exit checks of an external validator
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Numeric values fed to the document during smoke evaluation
const SAMPLE_POINTS: [f64; 3] = [0.0, 1.0, -1.5];

/// Why an engine rejected (or could not check) a document
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineDiagnostic {
    #[error("unbound reference '{symbol}'")]
    UnboundReference { symbol: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("unsupported operator '{op}'")]
    UnsupportedOperator { op: String },

    #[error("evaluation failed on sample input {sample}: {message}")]
    Runtime { sample: usize, message: String },

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("no verdict within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Checks an assembled document
pub trait ValidationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Pass, or the reason the document fails
    ///
    /// `timeout` is the caller's budget; engines owning external resources
    /// release them when it runs out.
    fn check(&self, document: &Document, timeout: Duration) -> Result<(), EngineDiagnostic>;
}

// ============================================================================
// REFERENCE ENGINE
// ============================================================================

/// In-process engine: independent type re-check plus smoke evaluation
///
/// The document is re-typed from scratch, then evaluated on synthesized
/// inputs (every numeric field set to each of a few sample points). Each
/// result must be a member of the declared output type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        ReferenceEngine
    }
}

impl ValidationEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn check(&self, document: &Document, _timeout: Duration) -> Result<(), EngineDiagnostic> {
        let terminal = infer_action(document.input(), document.cells(), document.action())
            .map_err(diagnose)?;
        if !document.output().matches_structurally(&terminal) {
            return Err(EngineDiagnostic::TypeMismatch {
                message: format!(
                    "action produces {}, output declares {}",
                    terminal,
                    document.output()
                ),
            });
        }

        for (sample, point) in SAMPLE_POINTS.iter().enumerate() {
            let input = sample_value(document.input(), *point);
            let result = run_document(document, &input).map_err(|e| EngineDiagnostic::Runtime {
                sample,
                message: e.to_string(),
            })?;
            if !result.conforms(document.output()) {
                return Err(EngineDiagnostic::TypeMismatch {
                    message: format!(
                        "sample input {} produced {}, not a {}",
                        sample,
                        result.to_json(),
                        document.output()
                    ),
                });
            }
        }
        Ok(())
    }
}

fn diagnose(err: AssemblyError) -> EngineDiagnostic {
    match err {
        AssemblyError::UnresolvedReference { symbol } => EngineDiagnostic::UnboundReference { symbol },
        AssemblyError::UnknownOperator { op } => EngineDiagnostic::UnsupportedOperator { op },
        other => EngineDiagnostic::TypeMismatch {
            message: other.to_string(),
        },
    }
}

/// A value of type `ty` built around one numeric sample point
fn sample_value(ty: &TypeDescriptor, point: f64) -> JsonValue {
    match ty {
        TypeDescriptor::Primitive(kind) => match kind {
            PrimitiveKind::Null => JsonValue::Null,
            PrimitiveKind::Boolean => JsonValue::Bool(point > 0.0),
            PrimitiveKind::Int | PrimitiveKind::Long => JsonValue::from(point.round() as i64),
            PrimitiveKind::Float | PrimitiveKind::Double => JsonValue::from(point),
            PrimitiveKind::String => JsonValue::String(String::new()),
        },
        TypeDescriptor::Record { fields, .. } => JsonValue::Object(
            fields
                .iter()
                .map(|f| (f.name.clone(), sample_value(&f.ty, point)))
                .collect::<Map<_, _>>(),
        ),
        TypeDescriptor::Enum { symbols, .. } => symbols
            .first()
            .map_or(JsonValue::Null, |s| JsonValue::String(s.clone())),
        TypeDescriptor::Array(_) => JsonValue::Array(Vec::new()),
        TypeDescriptor::Map(_) => JsonValue::Object(Map::new()),
        TypeDescriptor::Union(alternatives) => alternatives
            .iter()
            .find(|a| a.primitive_kind() != Some(PrimitiveKind::Null))
            .map_or(JsonValue::Null, |a| sample_value(a, point)),
    }
}

// ============================================================================
// COMMAND ENGINE
// ============================================================================

/// External validator process
///
/// The encoded PFA document is written to the program's stdin. Exit status
/// zero passes the document; any other status rejects it with the program's
/// stderr (or stdout when stderr is empty) as the diagnostic. A program that
/// outlives the timeout is killed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new<S: Into<String>>(program: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ValidationEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn check(&self, document: &Document, timeout: Duration) -> Result<(), EngineDiagnostic> {
        let payload = document.to_pfa().to_string();
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineDiagnostic::Unavailable(format!("{}: {}", self.program, e)))?;

        // Pipes are drained on their own threads so a chatty validator
        // cannot block on a full pipe
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A validator may exit before reading everything
                let _ = stdin.write_all(payload.as_bytes());
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(program = %self.program, "validator killed after timeout");
                    return Err(EngineDiagnostic::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(EngineDiagnostic::Unavailable(e.to_string())),
            }
        };

        let _ = writer.join();
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        let message = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("validator exited with {}", status));
        Err(EngineDiagnostic::Rejected(message))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut text);
        }
        text
    })
}
