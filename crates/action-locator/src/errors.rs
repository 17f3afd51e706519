//! Error types for the selector engine

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// Node id does not belong to the tree
    #[error("Unknown node: {0}")]
    UnknownNode(usize),

    /// Element tag is empty or not a valid identifier
    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    /// DOM snapshot could not be decoded
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl LocatorError {
    /// Snapshot errors come from live pages and may succeed on a later dump.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::InvalidSnapshot(_))
    }
}
