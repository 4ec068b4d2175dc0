// Linear family compiler
//
// η = Σ weight · regressor + intercept, built as nested binary `+` calls in
// regressor order with the intercept last, then mapped through the inverse
// link. Binomial models score `[1 - p, p]`; multinomial models apply
// softmax over one η per class.

use crate::compiler::{fresh_name, CompileError};
use crate::decision::{decide, CutoffSpec, Outcome, PredictionType};
use crate::expr::ExprNode;
use crate::models::{Family, LinearPredictor, Link, ParameterRecord, Task};
use crate::schema::TypeDescriptor;

/// Build the action for a linear record
pub fn compile_linear(
    record: &ParameterRecord,
    pred_type: PredictionType,
    cutoffs: Option<&CutoffSpec>,
) -> Result<Vec<ExprNode>, CompileError> {
    check_variant(record)?;

    let expr = match record.family {
        Family::Binomial => {
            let predictor = single_predictor(record)?;
            let p = fresh_name("p", &record.regressors);
            let mean = inverse_link(&record.link, linear_predictor(predictor, true));
            let decided = decide(
                binary_outcome(&p, &record.class_labels)?,
                pred_type,
                cutoffs,
            )?;
            ExprNode::let_in(vec![(p, mean)], decided)
        }

        Family::Multinomial => {
            if record.predictors.len() != record.class_labels.len() {
                return Err(CompileError::InconsistentRecord(format!(
                    "{} predictors for {} classes",
                    record.predictors.len(),
                    record.class_labels.len()
                )));
            }
            let eta = fresh_name("eta", &record.regressors);
            let probs = fresh_name("probs", &record.regressors);
            let etas = record
                .predictors
                .iter()
                .map(|p| linear_predictor(p, true))
                .collect();
            let classes = record
                .class_labels
                .iter()
                .enumerate()
                .map(|(k, label)| {
                    (
                        label.clone(),
                        ExprNode::call("a.get", vec![ExprNode::reference(&probs), index(k)]),
                    )
                })
                .collect();
            let decided = decide(Outcome::Classes(classes), pred_type, cutoffs)?;
            ExprNode::let_in(
                vec![
                    (eta.clone(), ExprNode::new_array(etas, TypeDescriptor::double())),
                    (
                        probs,
                        ExprNode::call("m.link.softmax", vec![ExprNode::reference(eta)]),
                    ),
                ],
                decided,
            )
        }

        // Cox models score relative risk and have no intercept
        Family::Cox => {
            let predictor = single_predictor(record)?;
            let risk = inverse_link(&record.link, linear_predictor(predictor, false));
            decide(Outcome::Regression(risk), pred_type, cutoffs)?
        }

        _ => {
            let predictor = single_predictor(record)?;
            let mean = inverse_link(&record.link, linear_predictor(predictor, true));
            decide(Outcome::Regression(mean), pred_type, cutoffs)?
        }
    };

    Ok(vec![expr])
}

/// Two-class scores `[1 - p, p]` over a bound probability
pub(crate) fn binary_outcome(p: &str, labels: &[String]) -> Result<Outcome, CompileError> {
    match labels {
        [negative, positive] => Ok(Outcome::Classes(vec![
            (
                negative.clone(),
                ExprNode::call("-", vec![ExprNode::double(1.0), ExprNode::reference(p)]),
            ),
            (positive.clone(), ExprNode::reference(p)),
        ])),
        other => Err(CompileError::InconsistentRecord(format!(
            "binary model with {} class labels",
            other.len()
        ))),
    }
}

/// `intercept + Σ weight · regressor` as nested `+` calls
///
/// Without terms the intercept literal stands alone.
pub fn linear_predictor(predictor: &LinearPredictor, with_intercept: bool) -> ExprNode {
    let mut terms = predictor.coefficients.iter().map(|(name, weight)| {
        ExprNode::call(
            "*",
            vec![ExprNode::double(*weight), ExprNode::reference(name)],
        )
    });

    let sum = match terms.next() {
        Some(first) => terms.fold(first, |acc, term| ExprNode::call("+", vec![acc, term])),
        None => return ExprNode::double(if with_intercept { predictor.intercept } else { 0.0 }),
    };
    if with_intercept {
        ExprNode::call("+", vec![sum, ExprNode::double(predictor.intercept)])
    } else {
        sum
    }
}

/// Map η onto the response scale
pub fn inverse_link(link: &Link, eta: ExprNode) -> ExprNode {
    match link {
        Link::Identity | Link::Other(_) => eta,
        Link::Logit => ExprNode::call("m.link.logit", vec![eta]),
        Link::Probit => ExprNode::call("m.link.probit", vec![eta]),
        Link::Cloglog => ExprNode::call("m.link.cloglog", vec![eta]),
        Link::Cauchit => ExprNode::call("m.link.cauchit", vec![eta]),
        Link::Log => ExprNode::call("m.exp", vec![eta]),
        Link::Inverse => ExprNode::call("/", vec![ExprNode::double(1.0), eta]),
        Link::Sqrt => ExprNode::call("**", vec![eta, ExprNode::double(2.0)]),
    }
}

fn index(k: usize) -> ExprNode {
    match i32::try_from(k) {
        Ok(k) => ExprNode::int(k),
        Err(_) => ExprNode::long(k as i64),
    }
}

fn single_predictor(record: &ParameterRecord) -> Result<&LinearPredictor, CompileError> {
    match record.predictors.as_slice() {
        [predictor] => Ok(predictor),
        other => Err(CompileError::InconsistentRecord(format!(
            "expected one linear predictor, found {}",
            other.len()
        ))),
    }
}

/// Family, link and task combinations with a document form
fn check_variant(record: &ParameterRecord) -> Result<(), CompileError> {
    let supported = match (&record.family, record.task) {
        (Family::Gaussian | Family::Poisson | Family::Gamma | Family::InverseGaussian, Task::Regression) => {
            matches!(
                record.link,
                Link::Identity | Link::Log | Link::Inverse | Link::Sqrt
            )
        }
        (Family::Binomial, Task::Classification) => matches!(
            record.link,
            Link::Logit | Link::Probit | Link::Cloglog | Link::Cauchit | Link::Log
        ),
        (Family::Multinomial, Task::Classification) => record.link == Link::Logit,
        (Family::Cox, Task::Regression) => record.link == Link::Log,
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(CompileError::unsupported(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn predictor(pairs: &[(&str, f64)], intercept: f64) -> LinearPredictor {
        LinearPredictor {
            coefficients: pairs.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            intercept,
        }
    }

    #[test]
    fn test_linear_predictor_shape() {
        let eta = linear_predictor(&predictor(&[("X1", -1.94), ("X2", 0.39)], 2.33), true);
        let expected = ExprNode::call(
            "+",
            vec![
                ExprNode::call(
                    "+",
                    vec![
                        ExprNode::call("*", vec![ExprNode::double(-1.94), ExprNode::reference("X1")]),
                        ExprNode::call("*", vec![ExprNode::double(0.39), ExprNode::reference("X2")]),
                    ],
                ),
                ExprNode::double(2.33),
            ],
        );
        assert_eq!(eta, expected);
    }

    #[test]
    fn test_intercept_only() {
        assert_eq!(
            linear_predictor(&predictor(&[], 4.0), true),
            ExprNode::double(4.0)
        );
    }

    #[test]
    fn test_sqrt_link_squares() {
        let mu = inverse_link(&Link::Sqrt, ExprNode::reference("eta"));
        assert_eq!(mu.op(), Some("**"));
    }

    #[test]
    fn test_binomial_identity_link_unsupported() {
        let record = ParameterRecord {
            family: Family::Binomial,
            link: Link::Identity,
            task: Task::Classification,
            regressors: vec!["x".to_string()],
            predictors: vec![predictor(&[("x", 1.0)], 0.0)],
            ensemble: None,
            class_labels: vec!["0".to_string(), "1".to_string()],
            source_names: BTreeMap::new(),
        };
        assert!(matches!(
            compile_linear(&record, PredictionType::Response, None),
            Err(CompileError::UnsupportedModelVariant { .. })
        ));
    }

    #[test]
    fn test_probability_name_avoids_regressors() {
        let record = ParameterRecord {
            family: Family::Binomial,
            link: Link::Logit,
            task: Task::Classification,
            regressors: vec!["p".to_string()],
            predictors: vec![predictor(&[("p", 1.0)], 0.0)],
            ensemble: None,
            class_labels: vec!["0".to_string(), "1".to_string()],
            source_names: BTreeMap::new(),
        };
        let action = compile_linear(&record, PredictionType::Class, None).unwrap();
        match &action[0] {
            ExprNode::Let { bindings, .. } => assert_ne!(bindings[0].0, "p"),
            other => panic!("expected let, got {:?}", other),
        }
    }
}
