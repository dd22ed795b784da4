//! Registry errors.

use thiserror::Error;
use zero_core::DomainError;

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The document was empty, not a JSON object, or unparseable.
    #[error("invalid station document: {0}")]
    InvalidDocument(String),

    /// A name, short name or alias is already held by another station.
    #[error("name '{name}' is already used by station '{holder}'")]
    NameCollision {
        /// The contested name
        name: String,
        /// Station currently answering to it
        holder: String,
    },

    /// A batch payload was not a JSON array.
    #[error("station batch is not a JSON array")]
    NotAnArray,

    /// One entry of a batch failed; nothing was applied.
    #[error("batch entry {index} rejected: {reason}")]
    BatchRejected {
        index: usize,
        reason: Box<RegistryError>,
    },
}

impl From<DomainError> for RegistryError {
    fn from(err: DomainError) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

impl RegistryError {
    pub(crate) fn in_batch(self, index: usize) -> Self {
        Self::BatchRejected {
            index,
            reason: Box::new(self),
        }
    }
}
