//! Model compiler
//!
//! Turns a `ParameterRecord` into an action graph and drives a full export:
//! extract, build, assemble, validate. Each family builds its action through
//! `Buildable`; `ModelCompiler` composes extraction and building with the
//! configured decision policy and validation gateway.
//!
//! - linear.rs: lm, glm and glmnet families
//! - ensemble.rs: random forests and boosted trees

pub mod ensemble;
pub mod linear;

pub use ensemble::compile_ensemble;
pub use linear::{compile_linear, inverse_link, linear_predictor};

use crate::config::{ConfigError, ExportConfig};
use crate::decision::{self, CutoffSpec, DecisionError, PredictionType};
use crate::document::{AssemblyError, Cell, Document, DocumentParts};
use crate::expr::{ExprNode, TranslateError, Translator};
use crate::models::{
    Extractable, ExtractionError, FittedModel, GbmFit, GlmFit, GlmnetFit, LmFit, ParameterRecord,
    RandomForestFit,
};
use crate::schema::TypeDescriptor;
use crate::validation::{
    GatewayError, ReferenceEngine, ValidationEngine, ValidationGateway, ValidationReport,
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building an action graph
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("Unsupported model variant: family {family}, link {link}, task {task}")]
    UnsupportedModelVariant {
        family: String,
        link: String,
        task: String,
    },

    #[error("Malformed tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },

    #[error("Inconsistent parameter record: {0}")]
    InconsistentRecord(String),

    #[error("Decision failed: {0}")]
    Decision(#[from] DecisionError),
}

impl CompileError {
    pub(crate) fn unsupported(record: &ParameterRecord) -> Self {
        CompileError::UnsupportedModelVariant {
            family: record.family.to_string(),
            link: record.link.to_string(),
            task: record.task.to_string(),
        }
    }
}

/// Any failure of an export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("{0}")]
    Validation(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<DecisionError> for ExportError {
    fn from(err: DecisionError) -> Self {
        ExportError::Compile(CompileError::Decision(err))
    }
}

// ============================================================================
// BUILDING
// ============================================================================

/// Symbol `base` (or `base_1`, `base_2`, ...) not already in `taken`
pub fn fresh_name(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    (1..)
        .map(|k| format!("{}_{}", base, k))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Build the action graph for any record
///
/// Records carrying an ensemble compile as tree ensembles, all others as
/// linear models.
pub fn compile_action(
    record: &ParameterRecord,
    pred_type: PredictionType,
    cutoffs: Option<&CutoffSpec>,
) -> Result<Vec<ExprNode>, CompileError> {
    if record.ensemble.is_some() {
        compile_ensemble(record, pred_type, cutoffs)
    } else {
        compile_linear(record, pred_type, cutoffs)
    }
}

/// A fitted model that knows how to build its action graph
pub trait Buildable {
    fn build_action(
        &self,
        record: &ParameterRecord,
        pred_type: PredictionType,
        cutoffs: Option<&CutoffSpec>,
    ) -> Result<Vec<ExprNode>, CompileError>;
}

macro_rules! buildable_with {
    ($compile:path => $($fit:ty),+) => {
        $(
            impl Buildable for $fit {
                fn build_action(
                    &self,
                    record: &ParameterRecord,
                    pred_type: PredictionType,
                    cutoffs: Option<&CutoffSpec>,
                ) -> Result<Vec<ExprNode>, CompileError> {
                    $compile(record, pred_type, cutoffs)
                }
            }
        )+
    };
}

buildable_with!(compile_linear => LmFit, GlmFit, GlmnetFit);
buildable_with!(compile_ensemble => RandomForestFit, GbmFit);

impl Buildable for FittedModel {
    fn build_action(
        &self,
        record: &ParameterRecord,
        pred_type: PredictionType,
        cutoffs: Option<&CutoffSpec>,
    ) -> Result<Vec<ExprNode>, CompileError> {
        match self {
            FittedModel::Lm(fit) => fit.build_action(record, pred_type, cutoffs),
            FittedModel::Glm(fit) => fit.build_action(record, pred_type, cutoffs),
            FittedModel::Glmnet(fit) => fit.build_action(record, pred_type, cutoffs),
            FittedModel::RandomForest(fit) => fit.build_action(record, pred_type, cutoffs),
            FittedModel::Gbm(fit) => fit.build_action(record, pred_type, cutoffs),
        }
    }
}

// ============================================================================
// EXPORT PIPELINE
// ============================================================================

/// A produced document and what validation said about it
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub document: Document,
    pub validation: ValidationReport,
}

/// Export driver: extract → build → assemble → validate
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::compiler::ModelCompiler;
/// use pfa_export_core_rs::config::ExportConfig;
/// use pfa_export_core_rs::models::FittedModel;
///
/// let model: FittedModel = serde_json::from_str(r#"{
///     "class": "lm",
///     "coefficients": {"names": ["(Intercept)", "x"], "values": [1.0, 2.0]}
/// }"#).unwrap();
/// let outcome = ModelCompiler::new(ExportConfig::default()).export(&model).unwrap();
/// assert_eq!(outcome.document.name(), "lm");
/// ```
#[derive(Debug, Clone)]
pub struct ModelCompiler {
    config: ExportConfig,
    gateway: ValidationGateway,
}

impl ModelCompiler {
    /// Compiler validating with the in-process reference engine
    pub fn new(config: ExportConfig) -> Self {
        Self::with_engine(config, Arc::new(ReferenceEngine))
    }

    pub fn with_engine(config: ExportConfig, engine: Arc<dyn ValidationEngine>) -> Self {
        let gateway = ValidationGateway::new(config.validation, engine)
            .with_timeout(config.validation_timeout());
        Self { config, gateway }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export a fitted model as a scoring document
    pub fn export(&self, model: &FittedModel) -> Result<ExportOutcome, ExportError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "export",
            model = model.class_name(),
            request_id = %request_id
        );
        let _guard = span.enter();

        let record = model.extract()?;
        tracing::debug!(
            family = %record.family,
            link = %record.link,
            regressors = record.regressors.len(),
            "parameters extracted"
        );

        let pred_type = self.config.pred_type;
        let action = model.build_action(&record, pred_type, self.config.cutoffs.as_ref())?;
        tracing::debug!(nodes = action.iter().map(ExprNode::size).sum::<usize>(), "action built");

        let input = record.input_schema(&self.config.input_record_name);
        let output = decision::output_type(record.is_classification(), pred_type);

        let mut metadata = self.config.metadata.clone();
        metadata.insert("model.class".to_string(), model.class_name().to_string());
        metadata.insert("model.family".to_string(), record.family.to_string());
        metadata.insert("model.link".to_string(), record.link.to_string());
        metadata.insert("pred_type".to_string(), pred_type.to_string());

        let name = self
            .config
            .name
            .clone()
            .unwrap_or_else(|| model.class_name().to_string());
        let document = DocumentParts::new(name, input, output, action)
            .with_metadata(metadata)
            .assemble()?;

        self.finish(document)
    }

    /// Export a host scoring expression over an explicit input record
    ///
    /// The expression may reference the record's fields and the cells.
    pub fn export_expression(
        &self,
        source: &str,
        input: TypeDescriptor,
        output: TypeDescriptor,
        cells: Vec<Cell>,
    ) -> Result<ExportOutcome, ExportError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("export_expression", request_id = %request_id);
        let _guard = span.enter();

        let cell_names: Vec<String> = cells.iter().map(|c| c.name.clone()).collect();
        let action = Translator::for_schema(&input, &cell_names).translate_source(source)?;
        tracing::debug!(nodes = action.size(), "expression translated");

        let name = self
            .config
            .name
            .clone()
            .unwrap_or_else(|| "expression".to_string());
        let document = DocumentParts::new(name, input, output, vec![action])
            .with_cells(cells)
            .with_metadata(self.config.metadata.clone())
            .assemble()?;

        self.finish(document)
    }

    fn finish(&self, document: Document) -> Result<ExportOutcome, ExportError> {
        let validation = self.gateway.validate(&document)?;
        tracing::info!(
            document = %document.name(),
            fingerprint = %document.fingerprint(),
            validation = ?validation.status,
            "export complete"
        );
        Ok(ExportOutcome {
            document,
            validation,
        })
    }
}

/// Export with the default reference engine
pub fn export_model(model: &FittedModel, config: &ExportConfig) -> Result<ExportOutcome, ExportError> {
    ModelCompiler::new(config.clone()).export(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_name_skips_taken() {
        let taken = vec!["p".to_string(), "p_1".to_string()];
        assert_eq!(fresh_name("p", &taken), "p_2");
        assert_eq!(fresh_name("q", &taken), "q");
    }

    #[test]
    fn test_decision_error_wraps_as_compile_error() {
        let err: ExportError = DecisionError::NoClasses.into();
        assert!(matches!(
            err,
            ExportError::Compile(CompileError::Decision(DecisionError::NoClasses))
        ));
    }
}
