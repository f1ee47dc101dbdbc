//! Failure taxonomy shared by every pipeline stage.
//!
//! Extraction, merge and transformation errors are fatal to a run. Write
//! errors are collected per artifact by [`crate::load`] and only become fatal
//! when the destination directory itself cannot be prepared.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{extract::Category, join::JoinSide};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Directory not found: {path:?}")]
    SourceNotFound { path: PathBuf },

    #[error("No spreadsheet files found in {path:?}")]
    SourceEmpty { path: PathBuf },

    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Column '{column}' required by the {category} rules is missing")]
    MissingColumn { category: Category, column: String },

    #[error("Column '{column}' appears more than once after header normalization")]
    DuplicateColumn { column: String },

    #[error("Key '{key}' not found in {side} dataset")]
    JoinKeyMissing { key: String, side: JoinSide },

    #[error("Left and right join keys must contain the same number of columns ({left} vs {right})")]
    JoinKeyArity { left: usize, right: usize },

    #[error("Join key list cannot be empty")]
    EmptyJoinKeys,

    #[error("Merge step '{step}' produced no rows")]
    EmptyMerge { step: String },

    #[error("Transformation failed: {0}")]
    Transform(String),

    #[error("Merged row {row} has no invoice identifier")]
    MissingInvoiceId { row: usize },

    #[error("Invoice {invoice}: header field '{field}' differs across its rows")]
    HeaderConflict { invoice: String, field: String },

    #[error("Failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize document '{reference}'")]
    Serialize {
        reference: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EtlError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        EtlError::Read {
            path: path.into(),
            source: source.into(),
        }
    }
}
