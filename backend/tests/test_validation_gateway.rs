// Validation gateway - Integration Tests
//
// Modes, timeouts, and the external command engine. Engines here are test
// doubles or `sh` one-liners, so the tests need a POSIX shell.

use pfa_export_core_rs::compiler::{ExportError, ModelCompiler};
use pfa_export_core_rs::config::ExportConfig;
use pfa_export_core_rs::document::{assemble, Document};
use pfa_export_core_rs::expr::ExprNode;
use pfa_export_core_rs::models::FittedModel;
use pfa_export_core_rs::schema::TypeDescriptor;
use pfa_export_core_rs::validation::{
    CommandEngine, EngineDiagnostic, GatewayError, ReferenceEngine, ValidationEngine,
    ValidationGateway, ValidationMode, ValidationStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn document() -> Document {
    assemble(
        "doc",
        TypeDescriptor::record("Input", [("x", TypeDescriptor::double())]),
        TypeDescriptor::double(),
        vec![ExprNode::call("m.exp", vec![ExprNode::reference("x")])],
        vec![],
    )
    .unwrap()
}

fn lm() -> FittedModel {
    serde_json::from_value(json!({
        "class": "lm",
        "coefficients": {"names": ["(Intercept)", "x"], "values": [1.0, 2.0]}
    }))
    .unwrap()
}

struct SlowEngine(Duration);

impl ValidationEngine for SlowEngine {
    fn name(&self) -> &str {
        "slow"
    }

    fn check(&self, _document: &Document, _timeout: Duration) -> Result<(), EngineDiagnostic> {
        thread::sleep(self.0);
        Ok(())
    }
}

struct RejectingEngine;

impl ValidationEngine for RejectingEngine {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn check(&self, _document: &Document, _timeout: Duration) -> Result<(), EngineDiagnostic> {
        Err(EngineDiagnostic::Rejected("not today".to_string()))
    }
}

fn sh(script: &str) -> Arc<CommandEngine> {
    Arc::new(CommandEngine::new("sh", ["-c", script]))
}

// ============================================================================
// Reference engine
// ============================================================================

#[test]
fn test_reference_engine_passes_exported_model() {
    let config = ExportConfig::default().with_validation(ValidationMode::Error);
    let outcome = ModelCompiler::new(config).export(&lm()).unwrap();
    assert!(outcome.validation.is_passed());
    assert_eq!(outcome.validation.engine.as_deref(), Some("reference"));
}

#[test]
fn test_reference_engine_accepts_assembled_document() {
    let gateway = ValidationGateway::new(ValidationMode::Error, Arc::new(ReferenceEngine));
    let report = gateway.validate(&document()).unwrap();
    assert_eq!(report.status, ValidationStatus::Passed);
}

#[test]
fn test_off_mode_skips() {
    let outcome = ModelCompiler::with_engine(ExportConfig::default(), Arc::new(RejectingEngine))
        .export(&lm())
        .unwrap();
    assert_eq!(outcome.validation.status, ValidationStatus::Skipped);
    assert_eq!(outcome.validation.engine, None);
}

// ============================================================================
// Modes
// ============================================================================

#[test]
fn test_warn_mode_keeps_document() {
    let config = ExportConfig::default().with_validation(ValidationMode::Warn);
    let outcome = ModelCompiler::with_engine(config, Arc::new(RejectingEngine))
        .export(&lm())
        .unwrap();
    assert_eq!(
        outcome.validation.diagnostic(),
        Some(&EngineDiagnostic::Rejected("not today".to_string()))
    );
    assert_eq!(outcome.document.name(), "lm");
}

#[test]
fn test_error_mode_fails_export() {
    let config = ExportConfig::default().with_validation(ValidationMode::Error);
    let err = ModelCompiler::with_engine(config, Arc::new(RejectingEngine))
        .export(&lm())
        .unwrap_err();
    assert!(matches!(
        err,
        ExportError::Validation(GatewayError::ValidationFailed { ref engine, .. }) if engine == "rejecting"
    ));
}

#[test]
fn test_slow_engine_times_out() {
    let gateway = ValidationGateway::new(
        ValidationMode::Warn,
        Arc::new(SlowEngine(Duration::from_secs(2))),
    )
    .with_timeout(Duration::from_millis(50));
    let report = gateway.validate(&document()).unwrap();
    assert_eq!(
        report.diagnostic(),
        Some(&EngineDiagnostic::Timeout { timeout_ms: 50 })
    );
}

#[test]
fn test_config_timeout_reaches_gateway() {
    let config = ExportConfig::from_json(r#"{"validation": "error", "validation_timeout_ms": 40}"#)
        .unwrap();
    let err = ModelCompiler::with_engine(config, Arc::new(SlowEngine(Duration::from_secs(2))))
        .export(&lm())
        .unwrap_err();
    assert!(matches!(
        err,
        ExportError::Validation(GatewayError::ValidationFailed {
            diagnostic: EngineDiagnostic::Timeout { timeout_ms: 40 },
            ..
        })
    ));
}

// ============================================================================
// Command engine
// ============================================================================

#[test]
fn test_command_engine_exit_zero_passes() {
    let gateway = ValidationGateway::new(ValidationMode::Error, sh("cat >/dev/null; exit 0"));
    assert!(gateway.validate(&document()).unwrap().is_passed());
}

#[test]
fn test_command_engine_receives_document() {
    // Passes only if the document name arrives on stdin
    let gateway = ValidationGateway::new(ValidationMode::Error, sh("grep -q '\"name\":\"doc\"'"));
    assert!(gateway.validate(&document()).unwrap().is_passed());
}

#[test]
fn test_command_engine_stderr_is_diagnostic() {
    let gateway = ValidationGateway::new(
        ValidationMode::Warn,
        sh("cat >/dev/null; echo 'unknown function m.exp' >&2; exit 3"),
    );
    let report = gateway.validate(&document()).unwrap();
    assert_eq!(
        report.diagnostic(),
        Some(&EngineDiagnostic::Rejected("unknown function m.exp".to_string()))
    );
}

#[test]
fn test_command_engine_timeout() {
    let gateway = ValidationGateway::new(ValidationMode::Warn, sh("sleep 5"))
        .with_timeout(Duration::from_millis(100));
    let report = gateway.validate(&document()).unwrap();
    assert_eq!(
        report.diagnostic(),
        Some(&EngineDiagnostic::Timeout { timeout_ms: 100 })
    );
}

#[test]
fn test_missing_program_is_unavailable() {
    let engine = Arc::new(CommandEngine::new("/nonexistent/pfa-validator", Vec::<String>::new()));
    let gateway = ValidationGateway::new(ValidationMode::Warn, engine);
    let report = gateway.validate(&document()).unwrap();
    assert!(matches!(report.diagnostic(), Some(EngineDiagnostic::Unavailable(_))));
}
