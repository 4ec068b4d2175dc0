//! Fitted models and parameter extraction
//!
//! A `FittedModel` is the serialized form of a model fitted by a statistical
//! package, tagged by its class name. Extraction turns it into a
//! `ParameterRecord`; the compilers never look at fitted objects directly.

pub mod forest;
pub mod linear;
pub mod params;

pub use forest::{BoostedNode, ForestNode, GbmFit, Prediction, RandomForestFit, SplitVar};
pub use linear::{GlmFit, GlmnetFit, LmFit, NamedVector, INTERCEPT};
pub use params::{
    Aggregation, Ensemble, Family, LeafValue, LinearPredictor, Link, ParameterRecord,
    SplitComparator, Task, Tree, TreeNode,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while extracting parameters from a fitted model
#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("Incompatible {family} model: {reason}")]
    IncompatibleModel { family: String, reason: String },
}

impl ExtractionError {
    pub(crate) fn incompatible(family: &Family, reason: impl Into<String>) -> Self {
        ExtractionError::IncompatibleModel {
            family: family.to_string(),
            reason: reason.into(),
        }
    }
}

/// A fitted model whose parameters can be read into a `ParameterRecord`
pub trait Extractable {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError>;
}

/// Any supported fitted model, tagged by class
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::models::{Extractable, FittedModel};
///
/// let model: FittedModel = serde_json::from_str(r#"{
///     "class": "lm",
///     "coefficients": {"names": ["(Intercept)", "x"], "values": [1.0, 2.0]}
/// }"#).unwrap();
/// let record = model.extract().unwrap();
/// assert_eq!(record.regressors, vec!["x"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum FittedModel {
    #[serde(rename = "lm")]
    Lm(LmFit),
    #[serde(rename = "glm")]
    Glm(GlmFit),
    #[serde(rename = "glmnet")]
    Glmnet(GlmnetFit),
    #[serde(rename = "randomForest")]
    RandomForest(RandomForestFit),
    #[serde(rename = "gbm")]
    Gbm(GbmFit),
}

impl FittedModel {
    pub fn class_name(&self) -> &'static str {
        match self {
            FittedModel::Lm(_) => "lm",
            FittedModel::Glm(_) => "glm",
            FittedModel::Glmnet(_) => "glmnet",
            FittedModel::RandomForest(_) => "randomForest",
            FittedModel::Gbm(_) => "gbm",
        }
    }
}

impl Extractable for FittedModel {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        match self {
            FittedModel::Lm(fit) => fit.extract(),
            FittedModel::Glm(fit) => fit.extract(),
            FittedModel::Glmnet(fit) => fit.extract(),
            FittedModel::RandomForest(fit) => fit.extract(),
            FittedModel::Gbm(fit) => fit.extract(),
        }
    }
}
