// Host expression translation - Integration Tests
//
// Host source in, document expression out. Translation is structural: no
// constant folding, no evaluation, unsupported constructs rejected by name.

use pfa_export_core_rs::compiler::{ExportError, ModelCompiler};
use pfa_export_core_rs::config::ExportConfig;
use pfa_export_core_rs::document::{assemble, Cell};
use pfa_export_core_rs::expr::{translate, ExprNode, TranslateError, Translator};
use pfa_export_core_rs::schema::TypeDescriptor;
use pfa_export_core_rs::validation::{evaluate_document, ValidationMode};
use serde_json::{json, Value as JsonValue};

fn input() -> TypeDescriptor {
    TypeDescriptor::record(
        "Input",
        [("x", TypeDescriptor::double()), ("y", TypeDescriptor::double())],
    )
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_constants_are_never_folded() {
    let expr = translate("2 + 2", Vec::<String>::new()).unwrap();
    assert_eq!(
        expr,
        ExprNode::call("+", vec![ExprNode::double(2.0), ExprNode::double(2.0)])
    );
}

#[test]
fn test_only_suffixed_numerals_are_integers() {
    let expr = translate("n <- 3L; n * 2", Vec::<String>::new()).unwrap();
    match expr {
        ExprNode::Block(statements) => match &statements[0] {
            ExprNode::Let { bindings, .. } => assert_eq!(bindings[0].1, ExprNode::int(3)),
            other => panic!("expected let, got {:?}", other),
        },
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn test_unary_plus_translates_to_operand() {
    let expr = translate("+x - y", ["x", "y"]).unwrap();
    assert_eq!(
        expr,
        ExprNode::call("-", vec![ExprNode::reference("x"), ExprNode::reference("y")])
    );
}

#[test]
fn test_comparison_and_logic_map_to_library_names() {
    let expr = translate("x > 1 & y <= 2", ["x", "y"]).unwrap();
    assert_eq!(expr.op(), Some("&&"));
    match expr {
        ExprNode::Call { args, .. } => {
            assert_eq!(args[0].op(), Some(">"));
            assert_eq!(args[1].op(), Some("<="));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_host_functions_map_to_library() {
    let expr = translate("exp(x) + log(y)", ["x", "y"]).unwrap();
    match expr {
        ExprNode::Call { args, .. } => {
            assert_eq!(args[0].op(), Some("m.exp"));
            assert_eq!(args[1].op(), Some("m.ln"));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_assignment_scopes_following_statements() {
    let expr = translate("z <- x * 2; z + y", ["x", "y"]).unwrap();
    let free = expr.free_symbols();
    assert_eq!(free, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn test_schema_scope_includes_cells() {
    let translator = Translator::for_schema(&input(), &["offset".to_string()]);
    assert!(translator.translate_source("x + offset").is_ok());
    assert!(matches!(
        translator.translate_source("x + w"),
        Err(TranslateError::UnboundSymbol { ref symbol }) if symbol == "w"
    ));
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_loops_rejected() {
    let err = translate("while (x > 0) { x <- x - 1 }", ["x"]).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
}

#[test]
fn test_function_definition_rejected() {
    let err = translate("f <- function(a) a + 1", Vec::<String>::new()).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
}

#[test]
fn test_wrong_arity_rejected() {
    let err = translate("exp(x, y)", ["x", "y"]).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
}

// ============================================================================
// Translated expressions run
// ============================================================================

#[test]
fn test_translated_conditional_evaluates() {
    let action = translate("if (x > y) x - y else y - x", ["x", "y"]).unwrap();
    let doc = assemble("absdiff", input(), TypeDescriptor::double(), vec![action], vec![]).unwrap();

    let out = evaluate_document(&doc, &json!({"x": 1.0, "y": 4.5})).unwrap();
    assert_eq!(out, json!(3.5));
}

#[test]
fn test_translated_logistic_evaluates() {
    let action = translate("e <- exp(x)\ne / (1 + e)", ["x", "y"]).unwrap();
    let doc = assemble("logistic", input(), TypeDescriptor::double(), vec![action], vec![]).unwrap();

    let out = evaluate_document(&doc, &json!({"x": 0.0, "y": 0.0})).unwrap();
    assert_eq!(out, json!(0.5));
}

// ============================================================================
// Expression export
// ============================================================================

fn compiler() -> ModelCompiler {
    let config = ExportConfig::default()
        .with_name("scaled")
        .with_validation(ValidationMode::Error);
    ModelCompiler::new(config)
}

#[test]
fn test_export_expression_with_cell() {
    let cells = vec![Cell::new("offset", TypeDescriptor::double(), json!(0.5))];
    let outcome = compiler()
        .export_expression("x * 2 + offset", input(), TypeDescriptor::double(), cells)
        .unwrap();

    assert!(outcome.validation.is_passed());
    assert_eq!(outcome.document.name(), "scaled");
    let out = evaluate_document(&outcome.document, &json!({"x": 1.25, "y": 0.0})).unwrap();
    assert_eq!(out, json!(3.0));
}

#[test]
fn test_negative_power_of_numeral_is_fractional() {
    let outcome = compiler()
        .export_expression("2 ^ -1", input(), TypeDescriptor::double(), vec![])
        .unwrap();
    let out = evaluate_document(&outcome.document, &json!({"x": 0.0, "y": 0.0})).unwrap();
    assert_eq!(out, json!(0.5));
}

#[test]
fn test_large_numeral_product_stays_double() {
    let outcome = compiler()
        .export_expression("100000 * 100000", input(), TypeDescriptor::double(), vec![])
        .unwrap();
    assert_eq!(
        outcome.document.to_pfa()["action"][0],
        json!({"*": [{"double": 100000.0}, {"double": 100000.0}]})
    );
    let out = evaluate_document(&outcome.document, &json!({"x": 0.0, "y": 0.0})).unwrap();
    assert_eq!(out, json!(1e10));
}

/// Every name declared by a `let` anywhere in a PFA fragment
fn let_names(value: &JsonValue, names: &mut Vec<String>) {
    match value {
        JsonValue::Object(obj) => {
            for (key, inner) in obj {
                if key == "let" {
                    if let Some(bindings) = inner.as_object() {
                        names.extend(bindings.keys().cloned());
                    }
                }
                let_names(inner, names);
            }
        }
        JsonValue::Array(items) => items.iter().for_each(|item| let_names(item, names)),
        _ => {}
    }
}

#[test]
fn test_reassignment_exports_distinct_locals() {
    let outcome = compiler()
        .export_expression("y <- x * 2\ny <- y + 1\ny", input(), TypeDescriptor::double(), vec![])
        .unwrap();

    let mut names = Vec::new();
    let_names(&outcome.document.to_pfa(), &mut names);
    assert_eq!(names, vec!["y", "y_1"]);

    let out = evaluate_document(&outcome.document, &json!({"x": 1.25, "y": 0.0})).unwrap();
    assert_eq!(out, json!(3.5));
}

#[test]
fn test_export_expression_unbound_symbol() {
    let err = compiler()
        .export_expression("x + w", input(), TypeDescriptor::double(), vec![])
        .unwrap_err();
    assert!(matches!(err, ExportError::Translate(TranslateError::UnboundSymbol { .. })));
}

#[test]
fn test_export_expression_output_mismatch() {
    let err = compiler()
        .export_expression("x > y", input(), TypeDescriptor::double(), vec![])
        .unwrap_err();
    assert!(matches!(err, ExportError::Assembly(_)));
}
