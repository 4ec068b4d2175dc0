//! Classification decision policy
//!
//! The one place where the prediction type of an export is turned into the
//! terminal expression of the action graph. Compilers hand over either a
//! regression expression or an ordered list of per-class score expressions;
//! `decide` picks the raw value, the probability map, or the winning label.

use crate::expr::ExprNode;
use crate::schema::TypeDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while building the decision expression
#[derive(Debug, Error, PartialEq)]
pub enum DecisionError {
    #[error("No cutoff given for class '{label}'")]
    MissingCutoff { label: String },

    #[error("Cutoff for class '{label}' must be strictly positive, got {value}")]
    NonPositiveCutoff { label: String, value: f64 },

    #[error("Cutoff given for '{label}', which is not a class of this model")]
    UnknownCutoffLabel { label: String },

    #[error("Prediction type '{pred_type}' is not available for {task} models")]
    IncompatiblePredictionType { pred_type: PredictionType, task: String },

    #[error("Classification outcome has no classes")]
    NoClasses,

    #[error("Class label '{label}' appears more than once")]
    DuplicateLabel { label: String },
}

// ============================================================================
// PREDICTION TYPE / CUTOFFS
// ============================================================================

/// What the exported document returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionType {
    /// Regression value; for classifiers, same as `Probability`
    #[default]
    Response,
    /// Map of class label to score
    Probability,
    /// Winning class label
    Class,
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionType::Response => f.write_str("response"),
            PredictionType::Probability => f.write_str("probability"),
            PredictionType::Class => f.write_str("class"),
        }
    }
}

/// Per-class cutoffs; the winner maximizes `score / cutoff`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CutoffSpec(BTreeMap<String, f64>);

impl CutoffSpec {
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self(pairs.into_iter().map(|(l, c)| (l.into(), c)).collect())
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every cutoff multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|(l, c)| (l.clone(), c * factor)).collect())
    }

    fn check_positive(&self) -> Result<(), DecisionError> {
        match self.0.iter().find(|(_, c)| !(**c > 0.0 && c.is_finite())) {
            Some((label, value)) => Err(DecisionError::NonPositiveCutoff {
                label: label.clone(),
                value: *value,
            }),
            None => Ok(()),
        }
    }

    /// Cutoffs must cover exactly `labels`
    fn check_labels(&self, labels: &[&str]) -> Result<(), DecisionError> {
        for label in labels {
            if self.get(label).is_none() {
                return Err(DecisionError::MissingCutoff {
                    label: label.to_string(),
                });
            }
        }
        self.check_positive()?;
        match self.0.keys().find(|k| !labels.contains(&k.as_str())) {
            Some(label) => Err(DecisionError::UnknownCutoffLabel {
                label: label.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

/// Model output handed to `decide`
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A single double-valued expression
    Regression(ExprNode),
    /// Score expression per class, in declared class order
    Classes(Vec<(String, ExprNode)>),
}

/// Output type of the expression `decide` builds for this combination
pub fn output_type(classification: bool, pred_type: PredictionType) -> TypeDescriptor {
    match (classification, pred_type) {
        (false, _) => TypeDescriptor::double(),
        (true, PredictionType::Class) => TypeDescriptor::string(),
        (true, _) => TypeDescriptor::map(TypeDescriptor::double()),
    }
}

/// Build the terminal expression for an outcome
///
/// # Arguments
///
/// * `outcome` - Regression expression or ordered class scores
/// * `pred_type` - Requested prediction type
/// * `cutoffs` - Optional per-class cutoffs; only `Class` uses them
///
/// # Returns
///
/// The expression producing the prediction. For `Class`, the label at the
/// first maximum of `score` (or `score / cutoff`), so ties go to the
/// earliest declared class.
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::decision::{decide, Outcome, PredictionType};
/// use pfa_export_core_rs::expr::ExprNode;
///
/// let outcome = Outcome::Classes(vec![
///     ("A".to_string(), ExprNode::double(0.4)),
///     ("B".to_string(), ExprNode::double(0.4)),
/// ]);
/// let expr = decide(outcome, PredictionType::Class, None).unwrap();
/// assert_eq!(expr.op(), Some("a.get"));
/// ```
pub fn decide(
    outcome: Outcome,
    pred_type: PredictionType,
    cutoffs: Option<&CutoffSpec>,
) -> Result<ExprNode, DecisionError> {
    let classes = match outcome {
        Outcome::Regression(expr) => {
            if pred_type != PredictionType::Response {
                return Err(DecisionError::IncompatiblePredictionType {
                    pred_type,
                    task: "regression".to_string(),
                });
            }
            if let Some(cutoffs) = cutoffs {
                cutoffs.check_positive()?;
            }
            return Ok(expr);
        }
        Outcome::Classes(classes) => classes,
    };

    if classes.is_empty() {
        return Err(DecisionError::NoClasses);
    }
    let labels: Vec<&str> = classes.iter().map(|(l, _)| l.as_str()).collect();
    for (i, label) in labels.iter().enumerate() {
        if labels[..i].contains(label) {
            return Err(DecisionError::DuplicateLabel {
                label: label.to_string(),
            });
        }
    }
    if let Some(cutoffs) = cutoffs {
        cutoffs.check_labels(&labels)?;
    }

    tracing::debug!(
        classes = classes.len(),
        %pred_type,
        weighted = cutoffs.is_some(),
        "building class decision"
    );

    match pred_type {
        PredictionType::Response | PredictionType::Probability => {
            Ok(ExprNode::new_map(classes, TypeDescriptor::double()))
        }
        PredictionType::Class => {
            let label_values: Vec<JsonValue> = labels
                .iter()
                .map(|l| JsonValue::String(l.to_string()))
                .collect();
            let label_array = ExprNode::Literal {
                value: JsonValue::Array(label_values),
                ty: TypeDescriptor::array(TypeDescriptor::string()),
            };

            let weighted: Vec<ExprNode> = classes
                .into_iter()
                .map(|(label, score)| match cutoffs.and_then(|c| c.get(&label)) {
                    Some(cutoff) => ExprNode::call("/", vec![score, ExprNode::double(cutoff)]),
                    None => score,
                })
                .collect();
            let scores = ExprNode::new_array(weighted, TypeDescriptor::double());

            Ok(ExprNode::call(
                "a.get",
                vec![label_array, ExprNode::call("a.argmax", vec![scores])],
            ))
        }
    }
}
