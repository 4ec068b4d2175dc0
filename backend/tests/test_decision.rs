// Classification decision policy - Integration Tests
//
// Decision expressions are evaluated with the reference interpreter so the
// tests check the selected label, not just the expression shape.

use pfa_export_core_rs::decision::{decide, CutoffSpec, DecisionError, Outcome, PredictionType};
use pfa_export_core_rs::expr::ExprNode;
use pfa_export_core_rs::validation::{evaluate_expression, Datum};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn outcome(scores: &[(&str, f64)]) -> Outcome {
    Outcome::Classes(
        scores
            .iter()
            .map(|(label, score)| (label.to_string(), ExprNode::double(*score)))
            .collect(),
    )
}

fn winner(scores: &[(&str, f64)], cutoffs: Option<&CutoffSpec>) -> String {
    let expr = decide(outcome(scores), PredictionType::Class, cutoffs).unwrap();
    match evaluate_expression(&expr, &BTreeMap::new()).unwrap() {
        Datum::String(label) => label,
        other => panic!("expected a label, got {:?}", other),
    }
}

// ============================================================================
// Label selection
// ============================================================================

#[test]
fn test_cutoffs_reweight_scores() {
    // ratios 3.0, 1.5, 0.57
    let cutoffs = CutoffSpec::new([("A", 0.1), ("B", 0.2), ("C", 0.7)]);
    let scores = [("A", 0.3), ("B", 0.3), ("C", 0.4)];
    assert_eq!(winner(&scores, Some(&cutoffs)), "A");
    assert_eq!(winner(&scores, None), "C");
}

#[test]
fn test_tie_goes_to_first_declared_class() {
    assert_eq!(winner(&[("no", 0.5), ("yes", 0.5)], None), "no");
    assert_eq!(winner(&[("yes", 0.5), ("no", 0.5)], None), "yes");
}

#[test]
fn test_probability_map_keeps_every_class() {
    let expr = decide(
        outcome(&[("A", 0.2), ("B", 0.8)]),
        PredictionType::Probability,
        None,
    )
    .unwrap();
    match evaluate_expression(&expr, &BTreeMap::new()).unwrap() {
        Datum::Map(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries["B"], Datum::Double(0.8));
        }
        other => panic!("expected a map, got {:?}", other),
    }
}

#[test]
fn test_response_on_classifier_is_probability_map() {
    let response = decide(outcome(&[("A", 0.2), ("B", 0.8)]), PredictionType::Response, None);
    let probability = decide(outcome(&[("A", 0.2), ("B", 0.8)]), PredictionType::Probability, None);
    assert_eq!(response, probability);
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_missing_cutoff_rejected() {
    let cutoffs = CutoffSpec::new([("A", 0.5)]);
    let err = decide(outcome(&[("A", 0.5), ("B", 0.5)]), PredictionType::Class, Some(&cutoffs))
        .unwrap_err();
    assert_eq!(
        err,
        DecisionError::MissingCutoff {
            label: "B".to_string()
        }
    );
}

#[test]
fn test_non_positive_cutoff_rejected() {
    let cutoffs = CutoffSpec::new([("A", 0.5), ("B", 0.0)]);
    let err = decide(outcome(&[("A", 0.5), ("B", 0.5)]), PredictionType::Class, Some(&cutoffs))
        .unwrap_err();
    assert!(matches!(err, DecisionError::NonPositiveCutoff { ref label, .. } if label == "B"));
}

#[test]
fn test_class_prediction_on_regression_rejected() {
    let err = decide(
        Outcome::Regression(ExprNode::double(1.0)),
        PredictionType::Class,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, DecisionError::IncompatiblePredictionType { .. }));
}

#[test]
fn test_duplicate_labels_rejected() {
    let err = decide(outcome(&[("A", 0.5), ("A", 0.5)]), PredictionType::Class, None).unwrap_err();
    assert!(matches!(err, DecisionError::DuplicateLabel { .. }));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Scaling every cutoff by the same power of two never changes the label
    #[test]
    fn prop_uniform_cutoff_scaling_keeps_winner(
        scores in prop::collection::vec(0.01f64..1.0, 3),
        cutoffs in prop::collection::vec(0.05f64..1.0, 3),
        exponent in -4i32..4,
    ) {
        let labels = ["A", "B", "C"];
        let pairs: Vec<(&str, f64)> = labels.iter().copied().zip(scores.iter().copied()).collect();
        let base = CutoffSpec::new(labels.iter().copied().zip(cutoffs.iter().copied()));
        let scaled = base.scaled(2f64.powi(exponent));

        prop_assert_eq!(winner(&pairs, Some(&base)), winner(&pairs, Some(&scaled)));
    }

    /// Without cutoffs the winner is the first maximal score
    #[test]
    fn prop_unweighted_winner_is_first_max(
        scores in prop::collection::vec(0.0f64..1.0, 4),
    ) {
        let labels = ["A", "B", "C", "D"];
        let pairs: Vec<(&str, f64)> = labels.iter().copied().zip(scores.iter().copied()).collect();
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        prop_assert_eq!(winner(&pairs, None), labels[best].to_string());
    }
}
