// Tree ensemble compiler
//
// Every tree becomes nested If nodes with literal leaves, bound to its own
// Let symbol. The aggregation then reads the bound trees: `a.mean` for
// regression forests, vote fractions via `a.count` for classification
// forests, `initial + scale · a.sum` (then the link) for boosted trees.

use crate::compiler::linear::binary_outcome;
use crate::compiler::{fresh_name, CompileError};
use crate::decision::{decide, CutoffSpec, Outcome, PredictionType};
use crate::expr::ExprNode;
use crate::models::{Aggregation, Family, LeafValue, Link, ParameterRecord, Task, Tree, TreeNode};
use crate::schema::TypeDescriptor;

/// Build the action for a tree ensemble record
pub fn compile_ensemble(
    record: &ParameterRecord,
    pred_type: PredictionType,
    cutoffs: Option<&CutoffSpec>,
) -> Result<Vec<ExprNode>, CompileError> {
    let ensemble = record
        .ensemble
        .as_ref()
        .ok_or_else(|| CompileError::InconsistentRecord("record has no trees".to_string()))?;
    check_variant(record, &ensemble.aggregation)?;
    if ensemble.trees.is_empty() {
        return Err(CompileError::InconsistentRecord("ensemble has no trees".to_string()));
    }

    let leaf_kind = match ensemble.aggregation {
        Aggregation::MajorityVote => LeafKind::Class,
        _ => LeafKind::Number,
    };

    let mut bindings = Vec::with_capacity(ensemble.trees.len() + 1);
    let mut taken = record.regressors.clone();
    for (i, tree) in ensemble.trees.iter().enumerate() {
        let name = fresh_name(&format!("tree_{}", i), &taken);
        taken.push(name.clone());
        bindings.push((name, tree_expr(tree, i, leaf_kind)?));
    }
    let tree_refs: Vec<ExprNode> = bindings
        .iter()
        .map(|(name, _)| ExprNode::reference(name))
        .collect();
    let count = tree_refs.len();

    let body = match ensemble.aggregation {
        Aggregation::Mean => {
            let mean = ExprNode::call(
                "a.mean",
                vec![ExprNode::new_array(tree_refs, TypeDescriptor::double())],
            );
            decide(Outcome::Regression(mean), pred_type, cutoffs)?
        }

        Aggregation::MajorityVote => {
            let votes = fresh_name("votes", &taken);
            bindings.push((
                votes.clone(),
                ExprNode::new_array(tree_refs, TypeDescriptor::string()),
            ));
            let classes = record
                .class_labels
                .iter()
                .map(|label| {
                    let count_votes = ExprNode::call(
                        "a.count",
                        vec![ExprNode::reference(&votes), ExprNode::string(label.clone())],
                    );
                    let fraction =
                        ExprNode::call("/", vec![count_votes, ExprNode::double(count as f64)]);
                    (label.clone(), fraction)
                })
                .collect();
            decide(Outcome::Classes(classes), pred_type, cutoffs)?
        }

        Aggregation::Sum { initial, scale } => {
            let total = ExprNode::call(
                "+",
                vec![
                    ExprNode::double(initial),
                    ExprNode::call(
                        "*",
                        vec![
                            ExprNode::double(scale),
                            ExprNode::call(
                                "a.sum",
                                vec![ExprNode::new_array(tree_refs, TypeDescriptor::double())],
                            ),
                        ],
                    ),
                ],
            );
            match record.link {
                Link::Logit => {
                    let p = fresh_name("p", &taken);
                    bindings.push((p.clone(), ExprNode::call("m.link.logit", vec![total])));
                    decide(binary_outcome(&p, &record.class_labels)?, pred_type, cutoffs)?
                }
                Link::Log => decide(
                    Outcome::Regression(ExprNode::call("m.exp", vec![total])),
                    pred_type,
                    cutoffs,
                )?,
                _ => decide(Outcome::Regression(total), pred_type, cutoffs)?,
            }
        }
    };

    Ok(vec![ExprNode::let_in(bindings, body)])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafKind {
    Number,
    Class,
}

/// Nested If expression for one tree
///
/// Children must come after their parent, which also rules out cycles.
fn tree_expr(tree: &Tree, index: usize, leaves: LeafKind) -> Result<ExprNode, CompileError> {
    node_expr(tree, index, 0, leaves)
}

fn node_expr(tree: &Tree, index: usize, at: usize, leaves: LeafKind) -> Result<ExprNode, CompileError> {
    let malformed = |reason: String| CompileError::MalformedTree {
        tree: index,
        reason,
    };
    match tree.nodes.get(at) {
        None => Err(malformed(format!("node {} does not exist", at))),
        Some(TreeNode::Leaf(LeafValue::Number(v))) if leaves == LeafKind::Number => {
            Ok(ExprNode::double(*v))
        }
        Some(TreeNode::Leaf(LeafValue::Class(label))) if leaves == LeafKind::Class => {
            Ok(ExprNode::string(label.clone()))
        }
        Some(TreeNode::Leaf(_)) => Err(malformed(format!("leaf {} has the wrong kind", at))),
        Some(TreeNode::Split {
            feature,
            comparator,
            threshold,
            left,
            right,
        }) => {
            if *left <= at || *right <= at {
                return Err(malformed(format!("node {} points backwards", at)));
            }
            let cond = ExprNode::call(
                comparator.op(),
                vec![ExprNode::reference(feature), ExprNode::double(*threshold)],
            );
            Ok(ExprNode::if_else(
                cond,
                node_expr(tree, index, *left, leaves)?,
                node_expr(tree, index, *right, leaves)?,
            ))
        }
    }
}

fn check_variant(record: &ParameterRecord, aggregation: &Aggregation) -> Result<(), CompileError> {
    let supported = match (aggregation, &record.family, &record.link, record.task) {
        (Aggregation::Mean, _, Link::Identity, Task::Regression) => true,
        (Aggregation::MajorityVote, _, _, Task::Classification) => !record.class_labels.is_empty(),
        (Aggregation::Sum { .. }, Family::Gaussian, Link::Identity, Task::Regression)
        | (Aggregation::Sum { .. }, Family::Poisson, Link::Log, Task::Regression)
        | (Aggregation::Sum { .. }, Family::Binomial, Link::Logit, Task::Classification) => true,
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
    use crate::models::{Ensemble, SplitComparator};
    use std::collections::BTreeMap;

    fn stump(feature: &str, threshold: f64, left: LeafValue, right: LeafValue) -> Tree {
        Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: feature.to_string(),
                    comparator: SplitComparator::LessOrEqual,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf(left),
                TreeNode::Leaf(right),
            ],
        }
    }

    #[test]
    fn test_stump_becomes_if() {
        let tree = stump("x", 0.5, LeafValue::Number(1.0), LeafValue::Number(2.0));
        let expr = tree_expr(&tree, 0, LeafKind::Number).unwrap();
        assert_eq!(
            expr,
            ExprNode::if_else(
                ExprNode::call("<=", vec![ExprNode::reference("x"), ExprNode::double(0.5)]),
                ExprNode::double(1.0),
                ExprNode::double(2.0),
            )
        );
    }

    #[test]
    fn test_backward_child_rejected() {
        let mut tree = stump("x", 0.5, LeafValue::Number(1.0), LeafValue::Number(2.0));
        tree.nodes[0] = TreeNode::Split {
            feature: "x".to_string(),
            comparator: SplitComparator::LessOrEqual,
            threshold: 0.5,
            left: 0,
            right: 2,
        };
        assert!(matches!(
            tree_expr(&tree, 3, LeafKind::Number),
            Err(CompileError::MalformedTree { tree: 3, .. })
        ));
    }

    #[test]
    fn test_vote_fractions_per_class() {
        let record = ParameterRecord {
            family: Family::Multinomial,
            link: Link::Identity,
            task: Task::Classification,
            regressors: vec!["x".to_string()],
            predictors: vec![],
            ensemble: Some(Ensemble {
                trees: vec![stump(
                    "x",
                    0.5,
                    LeafValue::Class("a".to_string()),
                    LeafValue::Class("b".to_string()),
                )],
                aggregation: Aggregation::MajorityVote,
            }),
            class_labels: vec!["a".to_string(), "b".to_string()],
            source_names: BTreeMap::new(),
        };
        let action = compile_ensemble(&record, PredictionType::Probability, None).unwrap();
        let ExprNode::Let { bindings, body } = &action[0] else {
            panic!("expected let");
        };
        assert_eq!(bindings.len(), 2);
        assert!(matches!(body.as_ref(), ExprNode::NewMap { entries, .. } if entries.len() == 2));
    }
}
