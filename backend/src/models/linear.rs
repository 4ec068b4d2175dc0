// Linear model fits
//
// Serialized forms of lm, glm and glmnet fits, and their extraction into
// ParameterRecord. A missing coefficient (NA in the source fit, null here)
// is a rank-deficient fit and cannot be exported.

use crate::models::params::{Family, LinearPredictor, Link, ParameterRecord, Task};
use crate::models::{Extractable, ExtractionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coefficient name used for the intercept term
pub const INTERCEPT: &str = "(Intercept)";

/// Default class labels for two-class fits that do not name their levels
const BINARY_LABELS: [&str; 2] = ["0", "1"];

/// Tolerance for matching a requested lambda against the fitted path
const LAMBDA_TOLERANCE: f64 = 1e-9;

// ============================================================================
// NAMED VECTOR
// ============================================================================

/// Named numeric vector; `None` marks a coefficient that was not estimated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVector {
    pub names: Vec<String>,
    pub values: Vec<Option<f64>>,
}

impl NamedVector {
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Self {
        let (names, values) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), Some(value)))
            .unzip();
        Self { names, values }
    }

    /// Split into (intercept, regressor weights)
    ///
    /// An absent intercept term means the model was fitted without one.
    fn split_intercept(&self, family: &Family) -> Result<(f64, Vec<(String, f64)>), ExtractionError> {
        if self.names.len() != self.values.len() {
            return Err(ExtractionError::incompatible(
                family,
                format!(
                    "{} coefficient names for {} values",
                    self.names.len(),
                    self.values.len()
                ),
            ));
        }

        let mut intercept = 0.0;
        let mut weights: Vec<(String, f64)> = Vec::with_capacity(self.names.len());
        for (name, value) in self.names.iter().zip(&self.values) {
            let value = finite(family, name, *value)?;
            if name == INTERCEPT {
                intercept = value;
            } else if weights.iter().any(|(seen, _)| seen == name) {
                return Err(ExtractionError::incompatible(
                    family,
                    format!("coefficient '{}' appears twice", name),
                ));
            } else {
                weights.push((name.clone(), value));
            }
        }
        Ok((intercept, weights))
    }
}

fn finite(family: &Family, name: &str, value: Option<f64>) -> Result<f64, ExtractionError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ExtractionError::incompatible(
            family,
            format!("coefficient '{}' is {}", name, v),
        )),
        None => Err(ExtractionError::incompatible(
            family,
            format!("coefficient '{}' was not estimated (aliased term)", name),
        )),
    }
}

// ============================================================================
// LM
// ============================================================================

/// Ordinary least squares fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmFit {
    pub coefficients: NamedVector,
}

impl Extractable for LmFit {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        let family = Family::Gaussian;
        let (intercept, coefficients) = self.coefficients.split_intercept(&family)?;
        Ok(ParameterRecord {
            family,
            link: Link::Identity,
            task: Task::Regression,
            regressors: coefficients.iter().map(|(n, _)| n.clone()).collect(),
            predictors: vec![LinearPredictor {
                coefficients,
                intercept,
            }],
            ensemble: None,
            class_labels: Vec::new(),
            source_names: BTreeMap::new(),
        }
        .with_field_names())
    }
}

// ============================================================================
// GLM
// ============================================================================

/// Generalized linear model fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmFit {
    pub coefficients: NamedVector,
    pub family: String,
    /// Defaults to the family's canonical link
    #[serde(default)]
    pub link: Option<String>,
    /// Response levels of a binomial fit; the second is the modeled event
    #[serde(default)]
    pub levels: Option<Vec<String>>,
}

impl Extractable for GlmFit {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        let family = Family::parse(&self.family);
        let link = match &self.link {
            Some(name) => Link::parse(name),
            None => family.canonical_link(),
        };
        let (intercept, coefficients) = self.coefficients.split_intercept(&family)?;

        let (task, class_labels) = match family {
            Family::Binomial => (Task::Classification, binary_labels(&family, self.levels.as_deref())?),
            Family::Multinomial | Family::Cox => {
                return Err(ExtractionError::incompatible(
                    &family,
                    "glm fits cannot carry this family",
                ))
            }
            _ => (Task::Regression, Vec::new()),
        };

        Ok(ParameterRecord {
            family,
            link,
            task,
            regressors: coefficients.iter().map(|(n, _)| n.clone()).collect(),
            predictors: vec![LinearPredictor {
                coefficients,
                intercept,
            }],
            ensemble: None,
            class_labels,
            source_names: BTreeMap::new(),
        }
        .with_field_names())
    }
}

fn binary_labels(family: &Family, levels: Option<&[String]>) -> Result<Vec<String>, ExtractionError> {
    match levels {
        None => Ok(BINARY_LABELS.iter().map(|l| l.to_string()).collect()),
        Some(levels) if levels.len() == 2 && levels[0] != levels[1] => Ok(levels.to_vec()),
        Some(levels) => Err(ExtractionError::incompatible(
            family,
            format!("expected two distinct response levels, found {:?}", levels),
        )),
    }
}

// ============================================================================
// GLMNET
// ============================================================================

/// Penalized regression fit over a lambda path
///
/// `beta[class][lambda_index][regressor]` and `a0[class][lambda_index]`;
/// single-response families carry exactly one class block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmnetFit {
    pub family: String,
    pub regressors: Vec<String>,
    pub lambda: Vec<f64>,
    /// Empty for Cox fits, which have no intercept
    #[serde(default)]
    pub a0: Vec<Vec<f64>>,
    pub beta: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub classnames: Vec<String>,
    /// Lambda to export; defaults to the last (least penalized) on the path
    #[serde(default)]
    pub selected_lambda: Option<f64>,
}

impl GlmnetFit {
    /// Index of the exported lambda on the path
    pub fn lambda_index(&self) -> Result<usize, ExtractionError> {
        let family = Family::parse(&self.family);
        if self.lambda.is_empty() {
            return Err(ExtractionError::incompatible(
                &family,
                "regularization path is empty",
            ));
        }
        match self.selected_lambda {
            None => Ok(self.lambda.len() - 1),
            Some(wanted) => self
                .lambda
                .iter()
                .position(|l| (l - wanted).abs() <= LAMBDA_TOLERANCE * wanted.abs().max(1.0))
                .ok_or_else(|| {
                    ExtractionError::incompatible(
                        &family,
                        format!("lambda {} is not on the fitted path", wanted),
                    )
                }),
        }
    }

    fn predictor(
        &self,
        family: &Family,
        class: usize,
        at: usize,
    ) -> Result<LinearPredictor, ExtractionError> {
        let path = self
            .beta
            .get(class)
            .and_then(|block| block.get(at))
            .ok_or_else(|| ExtractionError::incompatible(family, "coefficient path is truncated"))?;
        if path.len() != self.regressors.len() {
            return Err(ExtractionError::incompatible(
                family,
                format!(
                    "{} coefficients for {} regressors",
                    path.len(),
                    self.regressors.len()
                ),
            ));
        }

        let intercept = if *family == Family::Cox {
            0.0
        } else {
            let a0 = self
                .a0
                .get(class)
                .and_then(|block| block.get(at))
                .copied()
                .ok_or_else(|| ExtractionError::incompatible(family, "intercept path is truncated"))?;
            finite(family, INTERCEPT, Some(a0))?
        };

        // Penalized-out regressors drop out of the predictor
        let mut coefficients = Vec::new();
        for (name, weight) in self.regressors.iter().zip(path) {
            let weight = finite(family, name, Some(*weight))?;
            if weight != 0.0 {
                coefficients.push((name.clone(), weight));
            }
        }
        Ok(LinearPredictor {
            coefficients,
            intercept,
        })
    }
}

impl Extractable for GlmnetFit {
    fn extract(&self) -> Result<ParameterRecord, ExtractionError> {
        let family = Family::parse(&self.family);
        let at = self.lambda_index()?;

        let (task, class_labels, blocks) = match family {
            Family::Gaussian | Family::Poisson | Family::Cox => (Task::Regression, Vec::new(), 1),
            Family::Binomial => {
                let levels = if self.classnames.is_empty() {
                    None
                } else {
                    Some(self.classnames.as_slice())
                };
                (Task::Classification, binary_labels(&family, levels)?, 1)
            }
            Family::Multinomial => {
                if self.classnames.len() < 2 {
                    return Err(ExtractionError::incompatible(
                        &family,
                        "multinomial fit needs at least two class names",
                    ));
                }
                let mut seen: Vec<&String> = Vec::new();
                for name in &self.classnames {
                    if seen.contains(&name) {
                        return Err(ExtractionError::incompatible(
                            &family,
                            format!("class '{}' appears twice", name),
                        ));
                    }
                    seen.push(name);
                }
                let count = self.classnames.len();
                (Task::Classification, self.classnames.clone(), count)
            }
            _ => {
                return Err(ExtractionError::incompatible(
                    &family,
                    "not a glmnet family",
                ))
            }
        };

        if self.beta.len() != blocks {
            return Err(ExtractionError::incompatible(
                &family,
                format!("expected {} coefficient block(s), found {}", blocks, self.beta.len()),
            ));
        }

        let predictors = (0..blocks)
            .map(|class| self.predictor(&family, class, at))
            .collect::<Result<Vec<_>, _>>()?;

        // Regressors in declaration order, only those some class still uses
        let regressors = self
            .regressors
            .iter()
            .filter(|r| {
                predictors
                    .iter()
                    .any(|p| p.coefficients.iter().any(|(name, _)| name == *r))
            })
            .cloned()
            .collect();

        Ok(ParameterRecord {
            link: family.canonical_link(),
            family,
            task,
            regressors,
            predictors,
            ensemble: None,
            class_labels,
            source_names: BTreeMap::new(),
        }
        .with_field_names())
    }
}
