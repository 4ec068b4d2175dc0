// Linear model export - Integration Tests
//
// Fitted lm / glm / glmnet payloads go through the full export pipeline and
// the produced documents are scored with the reference interpreter.

use pfa_export_core_rs::compiler::{CompileError, ExportError, ModelCompiler};
use pfa_export_core_rs::config::ExportConfig;
use pfa_export_core_rs::decision::{CutoffSpec, DecisionError, PredictionType};
use pfa_export_core_rs::models::FittedModel;
use pfa_export_core_rs::schema::TypeDescriptor;
use pfa_export_core_rs::validation::{evaluate_document, ValidationMode};
use serde_json::{json, Value as JsonValue};

fn model(json: JsonValue) -> FittedModel {
    serde_json::from_value(json).unwrap()
}

fn export(model: &FittedModel, config: ExportConfig) -> Result<pfa_export_core_rs::Document, ExportError> {
    let config = config.with_validation(ValidationMode::Error);
    ModelCompiler::new(config).export(model).map(|o| o.document)
}

fn logistic(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

fn binomial_glm() -> FittedModel {
    model(json!({
        "class": "glm",
        "family": "binomial",
        "coefficients": {
            "names": ["(Intercept)", "X1", "X2"],
            "values": [2.33, -1.94, 0.39]
        }
    }))
}

// ============================================================================
// Binomial glm
// ============================================================================

#[test]
fn test_binomial_class_prediction() {
    let config = ExportConfig::default().with_pred_type(PredictionType::Class);
    let doc = export(&binomial_glm(), config).unwrap();

    assert_eq!(doc.output(), &TypeDescriptor::string());
    // η = 0.39 → p ≈ 0.596
    let out = evaluate_document(&doc, &json!({"X1": 1.0, "X2": 0.0})).unwrap();
    assert_eq!(out, json!("1"));
    // η = -1.55 → p ≈ 0.175
    let out = evaluate_document(&doc, &json!({"X1": 2.0, "X2": 0.0})).unwrap();
    assert_eq!(out, json!("0"));
}

#[test]
fn test_binomial_probability_matches_logistic() {
    let config = ExportConfig::default().with_pred_type(PredictionType::Probability);
    let doc = export(&binomial_glm(), config).unwrap();

    let (x1, x2) = (0.7, -1.2);
    let out = evaluate_document(&doc, &json!({"X1": x1, "X2": x2})).unwrap();
    let expected = logistic(-1.94 * x1 + 0.39 * x2 + 2.33);
    let p1 = out["1"].as_f64().unwrap();
    let p0 = out["0"].as_f64().unwrap();
    assert!((p1 - expected).abs() < 1e-12);
    assert!((p0 + p1 - 1.0).abs() < 1e-12);
}

#[test]
fn test_binomial_levels_become_labels() {
    let fit = model(json!({
        "class": "glm",
        "family": "binomial",
        "link": "probit",
        "levels": ["healthy", "sick"],
        "coefficients": {"names": ["(Intercept)", "age"], "values": [-3.0, 0.05]}
    }));
    let config = ExportConfig::default().with_pred_type(PredictionType::Class);
    let doc = export(&fit, config).unwrap();

    assert_eq!(evaluate_document(&doc, &json!({"age": 20.0})).unwrap(), json!("healthy"));
    assert_eq!(evaluate_document(&doc, &json!({"age": 90.0})).unwrap(), json!("sick"));
}

#[test]
fn test_cutoffs_shift_binary_decision() {
    // p ≈ 0.596: wins unweighted, loses once "1" needs three times the score
    let cutoffs = CutoffSpec::new([("0", 0.25), ("1", 0.75)]);
    let config = ExportConfig::default()
        .with_pred_type(PredictionType::Class)
        .with_cutoffs(cutoffs);
    let doc = export(&binomial_glm(), config).unwrap();
    let out = evaluate_document(&doc, &json!({"X1": 1.0, "X2": 0.0})).unwrap();
    assert_eq!(out, json!("0"));
}

#[test]
fn test_binomial_identity_link_unsupported() {
    let fit = model(json!({
        "class": "glm",
        "family": "binomial",
        "link": "identity",
        "coefficients": {"names": ["(Intercept)", "x"], "values": [0.1, 0.2]}
    }));
    let err = export(&fit, ExportConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ExportError::Compile(CompileError::UnsupportedModelVariant { .. })
    ));
}

// ============================================================================
// Regression families
// ============================================================================

#[test]
fn test_lm_response() {
    let fit = model(json!({
        "class": "lm",
        "coefficients": {"names": ["(Intercept)", "x", "z"], "values": [0.5, 2.0, -1.0]}
    }));
    let doc = export(&fit, ExportConfig::default()).unwrap();
    let out = evaluate_document(&doc, &json!({"x": 3.0, "z": 1.5})).unwrap();
    assert_eq!(out, json!(5.0));
    assert_eq!(doc.metadata()["model.family"], "gaussian");
}

#[test]
fn test_dotted_and_interaction_terms_become_valid_fields() {
    let fit = model(json!({
        "class": "lm",
        "coefficients": {
            "names": ["(Intercept)", "Sepal.Length", "x1:x2"],
            "values": [1.0, 2.0, 0.5]
        }
    }));
    let doc = export(&fit, ExportConfig::default()).unwrap();

    let pfa = doc.to_pfa();
    assert_eq!(
        pfa["input"]["fields"],
        json!([
            {"name": "Sepal_Length", "type": "double", "doc": "Sepal.Length"},
            {"name": "x1_x2", "type": "double", "doc": "x1:x2"}
        ])
    );
    let action = pfa["action"].to_string();
    assert!(action.contains("input.Sepal_Length"));
    assert!(!action.contains("Sepal.Length"));

    let out = evaluate_document(&doc, &json!({"Sepal_Length": 1.5, "x1_x2": 2.0})).unwrap();
    assert_eq!(out, json!(5.0));
}

#[test]
fn test_poisson_glm_exponentiates() {
    let fit = model(json!({
        "class": "glm",
        "family": "poisson",
        "coefficients": {"names": ["(Intercept)", "x"], "values": [0.0, 1.0]}
    }));
    let doc = export(&fit, ExportConfig::default()).unwrap();
    let out = evaluate_document(&doc, &json!({"x": 2.0})).unwrap();
    assert!((out.as_f64().unwrap() - 2f64.exp()).abs() < 1e-12);
}

#[test]
fn test_class_prediction_on_regression_rejected() {
    let fit = model(json!({
        "class": "lm",
        "coefficients": {"names": ["(Intercept)", "x"], "values": [0.5, 2.0]}
    }));
    let config = ExportConfig::default().with_pred_type(PredictionType::Class);
    let err = export(&fit, config).unwrap_err();
    assert!(matches!(
        err,
        ExportError::Compile(CompileError::Decision(
            DecisionError::IncompatiblePredictionType { .. }
        ))
    ));
}

#[test]
fn test_unestimated_coefficient_rejected() {
    let fit = model(json!({
        "class": "lm",
        "coefficients": {"names": ["(Intercept)", "x", "x2"], "values": [0.5, 2.0, null]}
    }));
    let err = export(&fit, ExportConfig::default()).unwrap_err();
    assert!(matches!(err, ExportError::Extraction(_)));
}

// ============================================================================
// glmnet
// ============================================================================

#[test]
fn test_glmnet_uses_last_lambda_and_drops_zero_terms() {
    let fit = model(json!({
        "class": "glmnet",
        "family": "gaussian",
        "regressors": ["a", "b", "c"],
        "lambda": [1.0, 0.1],
        "a0": [[5.0, 0.5]],
        "beta": [[[0.0, 0.0, 0.0], [1.0, 0.0, 2.0]]]
    }));
    let doc = export(&fit, ExportConfig::default()).unwrap();

    match doc.input() {
        TypeDescriptor::Record { fields, .. } => {
            let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["a", "c"]);
        }
        other => panic!("expected record input, got {}", other),
    }
    let out = evaluate_document(&doc, &json!({"a": 1.0, "c": 2.0})).unwrap();
    assert_eq!(out, json!(5.5));
}

#[test]
fn test_glmnet_unknown_lambda_rejected() {
    let fit = model(json!({
        "class": "glmnet",
        "family": "gaussian",
        "regressors": ["a"],
        "lambda": [1.0, 0.1],
        "a0": [[5.0, 0.5]],
        "beta": [[[0.0], [1.0]]],
        "selected_lambda": 0.3
    }));
    assert!(matches!(
        export(&fit, ExportConfig::default()),
        Err(ExportError::Extraction(_))
    ));
}

#[test]
fn test_glmnet_multinomial_softmax() {
    let fit = model(json!({
        "class": "glmnet",
        "family": "multinomial",
        "regressors": ["x"],
        "lambda": [0.01],
        "a0": [[0.0], [0.0], [0.0]],
        "beta": [[[1.0]], [[0.0]], [[-1.0]]],
        "classnames": ["setosa", "versicolor", "virginica"]
    }));

    let config = ExportConfig::default().with_pred_type(PredictionType::Probability);
    let doc = export(&fit, config).unwrap();
    let out = evaluate_document(&doc, &json!({"x": 2.0})).unwrap();
    let total: f64 = ["setosa", "versicolor", "virginica"]
        .iter()
        .map(|k| out[*k].as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-12);
    assert!(out["setosa"].as_f64().unwrap() > out["virginica"].as_f64().unwrap());

    let config = ExportConfig::default().with_pred_type(PredictionType::Class);
    let doc = export(&fit, config).unwrap();
    assert_eq!(evaluate_document(&doc, &json!({"x": -2.0})).unwrap(), json!("virginica"));
}
