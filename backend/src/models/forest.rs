// Tree ensemble fits
//
// randomForest trees arrive in getTree() form: 1-based rows, status -1 on
// terminal nodes, left child taken when `x <= split point`.
// gbm trees arrive in pretty.gbm.tree() form: 0-based rows, split variable
// -1 on terminal nodes, left child taken when `x < split point`. Terminal
// predictions of gbm trees already carry the shrinkage factor.

use crate::models::params::{
    Aggregation, Ensemble, Family, LeafValue, Link, ParameterRecord, SplitComparator, Task, Tree,
    TreeNode,
};
use crate::models::{Extractable, ExtractionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// RANDOM FOREST
// ============================================================================

/// Split variable as written by getTree: an index (labelVar = FALSE) or a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitVar {
    Index(usize),
    Name(String),
}

/// Node prediction: a class index, a class label, or a regression value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Number(f64),
    Label(String),
}

/// One getTree() row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestNode {
    #[serde(alias = "left daughter")]
    pub left_daughter: usize,
    #[serde(alias = "right daughter")]
    pub right_daughter: usize,
    #[serde(alias = "split var", default)]
    pub split_var: Option<SplitVar>,
    #[serde(alias = "split point", default)]
    pub split_point: f64,
    pub status: i32,
    #[serde(default)]
    pub prediction: Option<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestFit {
    /// "regression" or "classification"
    #[serde(rename = "type")]
    pub kind: String,
    pub xnames: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub forest: Vec<Vec<ForestNode>>,
}

impl RandomForestFit {
    fn task(&self) -> Result<Task, ExtractionError> {
        match self.kind.as_str() {
            "regression" => Ok(Task::Regression),
            "classification" if self.classes.len() >= 2 => Ok(Task::Classification),
            "classification" => Err(forest_error("classification forest needs at least two classes")),
            other => Err(forest_error(format!("unsupported forest type '{}'", other))),
        }
    }

    fn feature(&self, var: Option<&SplitVar>, row: usize) -> Result<String, ExtractionError> {
        match var {
            Some(SplitVar::Index(i)) if *i >= 1 && *i <= self.xnames.len() => {
                Ok(self.xnames[*i - 1].clone())
            }
            Some(SplitVar::Name(name)) if self.xnames.contains(name) => Ok(name.clone()),
            other => Err(forest_error(format!(
                "row {} splits on unknown variable {:?}",
                row, other
            ))),
        }
    }

    fn leaf(&self, task: Task, prediction: Option<&Prediction>, row: usize) -> Result<LeafValue, ExtractionError> {
        match (task, prediction) {
            (Task::Regression, Some(Prediction::Number(v))) if v.is_finite() => Ok(LeafValue::Number(*v)),
            (Task::Classification, Some(Prediction::Label(label))) if self.classes.contains(label) => {
                Ok(LeafValue::Class(label.clone()))
            }
            (Task::Classification, Some(Prediction::Number(k)))
                if k.fract() == 0.0 && *k >= 1.0 && (*k as usize) <= self.classes.len() =>
            {
                Ok(LeafValue::Class(self.classes[*k as usize - 1].clone()))
            }
            (_, other) => Err(forest_error(format!(
                "row {} has an invalid terminal prediction {:?}",
                row, other
            ))),
        }
    }

    fn tree(&self, task: Task, index: usize, rows: &[ForestNode]) -> Result<Tree, ExtractionError> {
        let mut nodes = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let number = i + 1;
            if row.status == -1 {
                nodes.push(TreeNode::Leaf(self.leaf(task, row.prediction.as_ref(), number)?));
                continue;
            }
            let children_valid = [row.left_daughter, row.right_daughter]
                .iter()
                .all(|c| *c > number && *c <= rows.len());
            if !children_valid || !row.split_point.is_finite() {
                return Err(forest_error(format!(
                    "tree {} row {} has invalid children or split point",
                    index + 1,
                    number
                )));
            }
            nodes.push(TreeNode::Split {
                feature: self.feature(row.split_var.as_ref(), number)?,
                comparator: SplitComparator::LessOrEqual,
                threshold: row.split_point,
                left: row.left_daughter - 1,
                right: row.right_daughter - 1,
            });
        }
        finish_tree(nodes, index, |reason: String| forest_error(reason))
    }
}

fn forest_error(reason: impl Into<String>) -> ExtractionError {
    ExtractionError::IncompatibleModel {
        family: "randomForest".to_string(),
        reason: reason.into(),
    }
}

impl Extractable for RandomForestFit {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        let task = self.task()?;
        if self.forest.is_empty() {
            return Err(forest_error("forest has no trees"));
        }
        let trees = self
            .forest
            .iter()
            .enumerate()
            .map(|(i, rows)| self.tree(task, i, rows))
            .collect::<Result<Vec<_>, _>>()?;

        let (family, aggregation, class_labels) = match task {
            Task::Regression => (Family::Gaussian, Aggregation::Mean, Vec::new()),
            Task::Classification => (
                Family::Multinomial,
                Aggregation::MajorityVote,
                self.classes.clone(),
            ),
        };

        Ok(ParameterRecord {
            family,
            link: Link::Identity,
            task,
            regressors: split_features(&trees),
            predictors: Vec::new(),
            ensemble: Some(Ensemble { trees, aggregation }),
            class_labels,
            source_names: BTreeMap::new(),
        }
        .with_field_names())
    }
}

// ============================================================================
// GBM
// ============================================================================

/// One pretty.gbm.tree() row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedNode {
    #[serde(alias = "SplitVar")]
    pub split_var: i64,
    #[serde(alias = "SplitCodePred")]
    pub split_code_pred: f64,
    #[serde(alias = "LeftNode")]
    pub left_node: i64,
    #[serde(alias = "RightNode")]
    pub right_node: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmFit {
    pub distribution: String,
    #[serde(rename = "initF", alias = "init_f")]
    pub init_f: f64,
    pub shrinkage: f64,
    pub var_names: Vec<String>,
    pub trees: Vec<Vec<BoostedNode>>,
    /// Response levels of a bernoulli fit
    #[serde(default)]
    pub classes: Vec<String>,
}

fn gbm_error(reason: impl Into<String>) -> ExtractionError {
    ExtractionError::IncompatibleModel {
        family: "gbm".to_string(),
        reason: reason.into(),
    }
}

impl GbmFit {
    fn tree(&self, index: usize, rows: &[BoostedNode]) -> Result<Tree, ExtractionError> {
        let mut nodes = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if !row.split_code_pred.is_finite() {
                return Err(gbm_error(format!("tree {} row {} is not finite", index, i)));
            }
            if row.split_var < 0 {
                nodes.push(TreeNode::Leaf(LeafValue::Number(row.split_code_pred)));
                continue;
            }
            let child = |c: i64| usize::try_from(c).ok().filter(|c| *c > i && *c < rows.len());
            let feature = usize::try_from(row.split_var)
                .ok()
                .and_then(|v| self.var_names.get(v));
            match (child(row.left_node), child(row.right_node), feature) {
                (Some(left), Some(right), Some(feature)) => nodes.push(TreeNode::Split {
                    feature: feature.clone(),
                    comparator: SplitComparator::LessThan,
                    threshold: row.split_code_pred,
                    left,
                    right,
                }),
                _ => {
                    return Err(gbm_error(format!(
                        "tree {} row {} has invalid children or split variable",
                        index, i
                    )))
                }
            }
        }
        finish_tree(nodes, index, |reason: String| gbm_error(reason))
    }
}

impl Extractable for GbmFit {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        if !self.init_f.is_finite() {
            return Err(gbm_error("initial value is not finite"));
        }
        if self.trees.is_empty() {
            return Err(gbm_error("ensemble has no trees"));
        }

        let (family, link, task, class_labels) = match self.distribution.as_str() {
            "gaussian" => (Family::Gaussian, Link::Identity, Task::Regression, Vec::new()),
            "poisson" => (Family::Poisson, Link::Log, Task::Regression, Vec::new()),
            "bernoulli" => {
                let labels = match self.classes.len() {
                    0 => vec!["0".to_string(), "1".to_string()],
                    2 => self.classes.clone(),
                    n => return Err(gbm_error(format!("bernoulli fit with {} classes", n))),
                };
                (Family::Binomial, Link::Logit, Task::Classification, labels)
            }
            other => (
                Family::Other(other.to_string()),
                Link::Identity,
                Task::Regression,
                Vec::new(),
            ),
        };

        let trees = self
            .trees
            .iter()
            .enumerate()
            .map(|(i, rows)| self.tree(i, rows))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParameterRecord {
            family,
            link,
            task,
            regressors: split_features(&trees),
            predictors: Vec::new(),
            ensemble: Some(Ensemble {
                trees,
                aggregation: Aggregation::Sum {
                    initial: self.init_f,
                    scale: 1.0,
                },
            }),
            class_labels,
            source_names: BTreeMap::new(),
        }
        .with_field_names())
    }
}

// ============================================================================
// SHARED
// ============================================================================

/// Reject empty and split-free trees
fn finish_tree(
    nodes: Vec<TreeNode>,
    index: usize,
    error: fn(String) -> ExtractionError,
) -> Result<Tree, ExtractionError> {
    let tree = Tree { nodes };
    if tree.split_count() == 0 {
        return Err(error(format!("tree {} has no splits", index)));
    }
    Ok(tree)
}

/// Features used by any split, in first-use order
fn split_features(trees: &[Tree]) -> Vec<String> {
    let mut features: Vec<String> = Vec::new();
    for tree in trees {
        for node in &tree.nodes {
            if let TreeNode::Split { feature, .. } = node {
                if !features.contains(feature) {
                    features.push(feature.clone());
                }
            }
        }
    }
    features
}
