//! Scoring documents
//!
//! A `Document` is the assembled, portable scoring artifact: input and
//! output schemas, an action graph, named cells and free-form metadata.
//! The only way to obtain one is through assembly, which checks that every
//! reference resolves, every operator call is well typed, and the action's
//! final type matches the declared output. Documents are immutable.
//!
//! - typing.rs: scope resolution and type inference
//! - pfa.rs: PFA JSON encoding and fingerprinting

pub mod pfa;
pub mod typing;

pub use pfa::encode_document;
pub use typing::{infer_action, Binding, Scope};

use crate::schema::{SchemaError, TypeDescriptor};
use crate::expr::ExprNode;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while assembling a document
#[derive(Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("Type mismatch in {context}: expected {expected}, found {found}")]
    SchemaMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Unresolved reference '{symbol}'")]
    UnresolvedReference { symbol: String },

    #[error("Cell '{name}' declared more than once")]
    DuplicateCell { name: String },

    #[error("Cell '{name}' initial value does not conform to {ty}")]
    InvalidCell { name: String, ty: String },

    #[error("Unknown operator '{op}'")]
    UnknownOperator { op: String },

    #[error("Operator '{op}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        op: String,
        expected: String,
        found: usize,
    },

    #[error("Local '{name}' is already declared in this scope")]
    DuplicateBinding { name: String },

    #[error("Invalid local name '{name}'")]
    InvalidBinding { name: String },

    #[error("Action is empty")]
    EmptyAction,

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Named, typed persistent value available to the action
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub ty: TypeDescriptor,
    pub init: JsonValue,
}

impl Cell {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor, init: JsonValue) -> Self {
        Self {
            name: name.into(),
            ty,
            init,
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// An assembled scoring document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    name: String,
    input: TypeDescriptor,
    output: TypeDescriptor,
    action: Vec<ExprNode>,
    cells: Vec<Cell>,
    metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &TypeDescriptor {
        &self.input
    }

    pub fn output(&self) -> &TypeDescriptor {
        &self.output
    }

    pub fn action(&self) -> &[ExprNode] {
        &self.action
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.name == name)
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// PFA JSON encoding of this document
    pub fn to_pfa(&self) -> JsonValue {
        encode_document(self)
    }

    /// SHA-256 of the canonical encoding, hex encoded
    ///
    /// Identical documents always produce identical fingerprints.
    pub fn fingerprint(&self) -> String {
        pfa::fingerprint(&self.to_pfa())
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Everything a document is assembled from
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentParts {
    pub name: String,
    pub input: TypeDescriptor,
    pub output: TypeDescriptor,
    pub action: Vec<ExprNode>,
    pub cells: Vec<Cell>,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentParts {
    pub fn new(
        name: impl Into<String>,
        input: TypeDescriptor,
        output: TypeDescriptor,
        action: Vec<ExprNode>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            action,
            cells: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the parts and produce an immutable document
    ///
    /// # Errors
    ///
    /// * `SchemaMismatch` - input is not a record, a call argument or the
    ///   final expression does not have the required type
    /// * `UnresolvedReference` - a Ref names no binding, input field or cell
    /// * `DuplicateCell` / `InvalidCell` - bad cell declarations
    /// * `UnknownOperator` / `ArityMismatch` - bad operator calls
    pub fn assemble(self) -> Result<Document, AssemblyError> {
        if !matches!(self.input, TypeDescriptor::Record { .. }) {
            return Err(AssemblyError::SchemaMismatch {
                context: "document input".to_string(),
                expected: "record".to_string(),
                found: self.input.to_string(),
            });
        }
        self.input.check()?;
        self.output.check()?;

        for (i, cell) in self.cells.iter().enumerate() {
            if self.cells[..i].iter().any(|c| c.name == cell.name) {
                return Err(AssemblyError::DuplicateCell {
                    name: cell.name.clone(),
                });
            }
            cell.ty.check()?;
            if !cell.ty.conforms(&cell.init) {
                return Err(AssemblyError::InvalidCell {
                    name: cell.name.clone(),
                    ty: cell.ty.to_string(),
                });
            }
        }

        let terminal = infer_action(&self.input, &self.cells, &self.action)?;
        if !self.output.matches_structurally(&terminal) {
            return Err(AssemblyError::SchemaMismatch {
                context: "document output".to_string(),
                expected: self.output.to_string(),
                found: terminal.to_string(),
            });
        }

        tracing::debug!(
            name = %self.name,
            statements = self.action.len(),
            cells = self.cells.len(),
            "document assembled"
        );

        Ok(Document {
            name: self.name,
            input: self.input,
            output: self.output,
            action: self.action,
            cells: self.cells,
            metadata: self.metadata,
        })
    }
}

/// Assemble a document from its parts
pub fn assemble(
    name: impl Into<String>,
    input: TypeDescriptor,
    output: TypeDescriptor,
    action: Vec<ExprNode>,
    cells: Vec<Cell>,
) -> Result<Document, AssemblyError> {
    DocumentParts::new(name, input, output, action)
        .with_cells(cells)
        .assemble()
}
