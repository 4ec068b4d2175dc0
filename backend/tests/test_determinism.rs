// Determinism - Integration Tests
//
// Identical inputs must produce byte-identical documents, and every
// document produced by the compilers must be closed (no free references).

use pfa_export_core_rs::compiler::ModelCompiler;
use pfa_export_core_rs::config::ExportConfig;
use pfa_export_core_rs::decision::PredictionType;
use pfa_export_core_rs::models::{FittedModel, GlmFit, NamedVector};
use pfa_export_core_rs::validation::{evaluate_document, ValidationMode};
use proptest::prelude::*;
use serde_json::{json, Map, Value as JsonValue};

fn forest() -> FittedModel {
    serde_json::from_value(json!({
        "class": "randomForest",
        "type": "classification",
        "xnames": ["a", "b"],
        "classes": ["no", "yes"],
        "forest": [
            [
                {"left daughter": 2, "right daughter": 3, "split var": 1, "split point": 0.5, "status": 1},
                {"left daughter": 0, "right daughter": 0, "split point": 0.0, "status": -1, "prediction": "no"},
                {"left daughter": 4, "right daughter": 5, "split var": 2, "split point": 1.0, "status": 1},
                {"left daughter": 0, "right daughter": 0, "split point": 0.0, "status": -1, "prediction": "yes"},
                {"left daughter": 0, "right daughter": 0, "split point": 0.0, "status": -1, "prediction": "no"}
            ]
        ]
    }))
    .unwrap()
}

#[test]
fn test_repeated_exports_are_identical() {
    let config = ExportConfig::default()
        .with_pred_type(PredictionType::Class)
        .with_validation(ValidationMode::Error);
    let compiler = ModelCompiler::new(config);

    let first = compiler.export(&forest()).unwrap().document;
    let second = compiler.export(&forest()).unwrap().document;
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.to_pfa().to_string(), second.to_pfa().to_string());
}

#[test]
fn test_fingerprint_tracks_content() {
    let compiler = ModelCompiler::new(ExportConfig::default().with_pred_type(PredictionType::Class));
    let class = compiler.export(&forest()).unwrap().document;
    let compiler =
        ModelCompiler::new(ExportConfig::default().with_pred_type(PredictionType::Probability));
    let probability = compiler.export(&forest()).unwrap().document;
    assert_ne!(class.fingerprint(), probability.fingerprint());
}

#[test]
fn test_fingerprint_is_sha256_hex() {
    let doc = ModelCompiler::new(ExportConfig::default())
        .export(&forest())
        .unwrap()
        .document;
    let fingerprint = doc.fingerprint();
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_compiled_actions_are_closed() {
    let doc = ModelCompiler::new(ExportConfig::default())
        .export(&forest())
        .unwrap()
        .document;
    for statement in doc.action() {
        for symbol in statement.free_symbols() {
            assert!(doc.input().field(&symbol).is_some(), "free symbol {}", symbol);
        }
    }
}

proptest! {
    /// Any finite logistic model exports, validates, and scores like the formula
    #[test]
    fn prop_logistic_export_scores_like_formula(
        weights in prop::collection::vec(-3.0f64..3.0, 1..5),
        intercept in -2.0f64..2.0,
        point in prop::collection::vec(-2.0f64..2.0, 5),
    ) {
        let names: Vec<String> = (0..weights.len()).map(|i| format!("x{}", i)).collect();
        let mut pairs = vec![("(Intercept)".to_string(), intercept)];
        pairs.extend(names.iter().cloned().zip(weights.iter().copied()));
        let fit = FittedModel::Glm(GlmFit {
            coefficients: NamedVector::from_pairs(pairs),
            family: "binomial".to_string(),
            link: None,
            levels: None,
        });

        let config = ExportConfig::default()
            .with_pred_type(PredictionType::Probability)
            .with_validation(ValidationMode::Error);
        let doc = ModelCompiler::new(config).export(&fit).unwrap().document;

        let mut input = Map::new();
        let mut eta = 0.0;
        for (i, name) in names.iter().enumerate() {
            input.insert(name.clone(), json!(point[i]));
            eta += weights[i] * point[i];
        }
        eta += intercept;
        let expected = 1.0 / (1.0 + (-eta).exp());

        let out = evaluate_document(&doc, &JsonValue::Object(input)).unwrap();
        let p = out["1"].as_f64().unwrap();
        prop_assert!((p - expected).abs() < 1e-9);
    }
}
