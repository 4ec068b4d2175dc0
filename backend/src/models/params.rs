//! Normalized model parameters
//!
//! Every family extractor produces a `ParameterRecord`: the family-agnostic
//! description of a fitted model that the compilers consume. Records are
//! built fresh for each compile call and never mutated afterwards.

use crate::schema::{avro_name, is_avro_name, Field, TypeDescriptor};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// FAMILY / LINK / TASK
// ============================================================================

/// Response distribution family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Family {
    Gaussian,
    Binomial,
    Poisson,
    Gamma,
    InverseGaussian,
    Multinomial,
    Cox,
    /// A family name the extractors recognize but no compiler supports
    Other(String),
}

impl Family {
    /// Parse an R-style family name
    ///
    /// Quasi families share the mean model of their base family.
    pub fn parse(name: &str) -> Self {
        match name {
            "gaussian" => Family::Gaussian,
            "binomial" | "quasibinomial" => Family::Binomial,
            "poisson" | "quasipoisson" => Family::Poisson,
            "Gamma" | "gamma" => Family::Gamma,
            "inverse.gaussian" => Family::InverseGaussian,
            "multinomial" => Family::Multinomial,
            "cox" => Family::Cox,
            other => Family::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Family::Gaussian => "gaussian",
            Family::Binomial => "binomial",
            Family::Poisson => "poisson",
            Family::Gamma => "Gamma",
            Family::InverseGaussian => "inverse.gaussian",
            Family::Multinomial => "multinomial",
            Family::Cox => "cox",
            Family::Other(name) => name,
        }
    }

    /// Canonical link used when a fit does not name one
    pub fn canonical_link(&self) -> Link {
        match self {
            Family::Gaussian => Link::Identity,
            Family::Binomial | Family::Multinomial => Link::Logit,
            Family::Poisson | Family::Cox => Link::Log,
            Family::Gamma => Link::Inverse,
            Family::InverseGaussian => Link::Other("1/mu^2".to_string()),
            Family::Other(_) => Link::Identity,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Link function (the model is linear on the link scale)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    Identity,
    Logit,
    Probit,
    Cloglog,
    Cauchit,
    Log,
    Inverse,
    Sqrt,
    Other(String),
}

impl Link {
    pub fn parse(name: &str) -> Self {
        match name {
            "identity" => Link::Identity,
            "logit" => Link::Logit,
            "probit" => Link::Probit,
            "cloglog" => Link::Cloglog,
            "cauchit" => Link::Cauchit,
            "log" => Link::Log,
            "inverse" => Link::Inverse,
            "sqrt" => Link::Sqrt,
            other => Link::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Link::Identity => "identity",
            Link::Logit => "logit",
            Link::Probit => "probit",
            Link::Cloglog => "cloglog",
            Link::Cauchit => "cauchit",
            Link::Log => "log",
            Link::Inverse => "inverse",
            Link::Sqrt => "sqrt",
            Link::Other(name) => name,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Regression,
    Classification,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Regression => f.write_str("regression"),
            Task::Classification => f.write_str("classification"),
        }
    }
}

// ============================================================================
// LINEAR STRUCTURE
// ============================================================================

/// One linear predictor: `intercept + Σ weight · regressor`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPredictor {
    /// Regressor name → weight, in declaration order
    pub coefficients: Vec<(String, f64)>,
    pub intercept: f64,
}

// ============================================================================
// TREE STRUCTURE
// ============================================================================

/// Split comparison; the left child is taken when the comparison holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitComparator {
    LessThan,
    LessOrEqual,
}

impl SplitComparator {
    pub fn op(&self) -> &'static str {
        match self {
            SplitComparator::LessThan => "<",
            SplitComparator::LessOrEqual => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Number(f64),
    Class(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Split {
        feature: String,
        comparator: SplitComparator,
        threshold: f64,
        /// Index of the left child in `Tree::nodes`
        left: usize,
        right: usize,
    },
    Leaf(LeafValue),
}

/// Flat node list, root at index 0, children always after their parent
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn split_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Split { .. }))
            .count()
    }
}

/// How tree outputs combine into one prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Regression forests
    Mean,
    /// Classification forests; per-class vote fractions
    MajorityVote,
    /// Boosted ensembles: `initial + scale · Σ tree`, on the link scale
    Sum { initial: f64, scale: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    pub trees: Vec<Tree>,
    pub aggregation: Aggregation,
}

// ============================================================================
// PARAMETER RECORD
// ============================================================================

/// Family-agnostic description of a fitted model
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub family: Family,
    pub link: Link,
    pub task: Task,

    /// Every input the model reads, in first-use order
    pub regressors: Vec<String>,

    /// One predictor for single-response models, one per class for
    /// multinomial models; empty for tree ensembles
    pub predictors: Vec<LinearPredictor>,

    pub ensemble: Option<Ensemble>,

    /// Declared class order (classification only); ties resolve to the
    /// earliest label
    pub class_labels: Vec<String>,

    /// Original spelling of every renamed regressor, keyed by field name
    pub source_names: BTreeMap<String, String>,
}

impl ParameterRecord {
    /// Rename regressors to valid input field names
    ///
    /// `Sepal.Length` becomes `Sepal_Length`, `x1:x2` becomes `x1_x2`.
    /// Names that are already valid are kept, and a rename that would clash
    /// with another regressor gets a numeric suffix. Predictors and tree
    /// splits are rewritten to match.
    pub fn with_field_names(mut self) -> Self {
        let mut taken: Vec<String> = self
            .regressors
            .iter()
            .filter(|r| is_avro_name(r))
            .cloned()
            .collect();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for raw in &self.regressors {
            if is_avro_name(raw) {
                continue;
            }
            let base = avro_name(raw);
            let mut field = base.clone();
            let mut n = 1;
            while taken.contains(&field) {
                field = format!("{}_{}", base, n);
                n += 1;
            }
            taken.push(field.clone());
            renames.insert(raw.clone(), field);
        }
        if renames.is_empty() {
            return self;
        }

        let rename = |name: &mut String| {
            if let Some(field) = renames.get(name.as_str()) {
                *name = field.clone();
            }
        };
        for regressor in &mut self.regressors {
            rename(regressor);
        }
        for predictor in &mut self.predictors {
            for (name, _) in &mut predictor.coefficients {
                rename(name);
            }
        }
        if let Some(ensemble) = &mut self.ensemble {
            for tree in &mut ensemble.trees {
                for node in &mut tree.nodes {
                    if let TreeNode::Split { feature, .. } = node {
                        rename(feature);
                    }
                }
            }
        }
        for (raw, field) in renames {
            self.source_names.insert(field, raw);
        }
        self
    }

    /// Input record schema: one double field per regressor
    ///
    /// Renamed fields carry their original spelling as `doc`.
    pub fn input_schema(&self, record_name: &str) -> TypeDescriptor {
        let fields = self
            .regressors
            .iter()
            .map(|r| {
                let field = Field::new(r.clone(), TypeDescriptor::double());
                match self.source_names.get(r) {
                    Some(original) => field.with_doc(original.clone()),
                    None => field,
                }
            })
            .collect();
        TypeDescriptor::record_of(record_name, fields)
    }

    pub fn is_classification(&self) -> bool {
        self.task == Task::Classification
    }

    /// Coefficient of `regressor` in the first predictor
    pub fn coefficient(&self, regressor: &str) -> Option<f64> {
        self.predictors
            .first()?
            .coefficients
            .iter()
            .find(|(name, _)| name == regressor)
            .map(|(_, w)| *w)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.predictors.first().map(|p| p.intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parse_round_trip() {
        for name in ["gaussian", "binomial", "poisson", "Gamma", "multinomial", "cox"] {
            assert_eq!(Family::parse(name).name(), name);
        }
        assert_eq!(Family::parse("quasipoisson"), Family::Poisson);
        assert_eq!(
            Family::parse("tweedie"),
            Family::Other("tweedie".to_string())
        );
    }

    fn gaussian(regressors: &[&str]) -> ParameterRecord {
        ParameterRecord {
            family: Family::Gaussian,
            link: Link::Identity,
            task: Task::Regression,
            regressors: regressors.iter().map(|r| r.to_string()).collect(),
            predictors: vec![LinearPredictor {
                coefficients: regressors.iter().map(|r| (r.to_string(), 1.0)).collect(),
                intercept: 0.0,
            }],
            ensemble: None,
            class_labels: vec![],
            source_names: BTreeMap::new(),
        }
    }

    #[test]
    fn test_input_schema_one_double_per_regressor() {
        let schema = gaussian(&["X1", "X2"]).with_field_names().input_schema("Input");
        assert_eq!(schema.field("X2"), Some(&TypeDescriptor::double()));
        assert!(schema.check().is_ok());
    }

    #[test]
    fn test_field_names_rewrite_predictors() {
        let record = gaussian(&["Sepal.Length", "x1:x2", "x1_x2"]).with_field_names();
        assert_eq!(record.regressors, vec!["Sepal_Length", "x1_x2_1", "x1_x2"]);
        assert_eq!(record.coefficient("Sepal_Length"), Some(1.0));
        assert_eq!(record.source_names["x1_x2_1"], "x1:x2");
        assert!(!record.source_names.contains_key("x1_x2"));

        let schema = record.input_schema("Input");
        assert!(schema.check().is_ok());
        assert_eq!(
            schema.to_json()["fields"][0],
            serde_json::json!({"name": "Sepal_Length", "type": "double", "doc": "Sepal.Length"})
        );
    }
}
