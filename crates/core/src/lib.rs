//! Shared primitives for the Searchlight hybrid search crates.

#![forbid(unsafe_code)]

/// Entity and field kind enums plus the extracted-field record.
pub mod field;
/// Content hashing for differential index updates.
pub mod hash;

use thiserror::Error;
use uuid::Uuid;

pub use field::{EntityType, ExtractedField, FieldKind, UiType};
pub use hash::content_hash;

/// Result type used across Searchlight crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// A query failed pre-compilation validation.
    #[error(transparent)]
    Query(#[from] QueryValidationError),

    /// Pagination cursor could not be decoded or resolved.
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),

    /// A follow-up page referenced query state that no longer exists.
    #[error("query state '{0}' not found; restart from the first page")]
    QueryStateNotFound(Uuid),

    /// The embedder returned a different number of vectors than requested.
    #[error("embedding count mismatch: sent {requested}, received {received}")]
    EmbeddingCountMismatch {
        /// Number of texts sent to the embedder.
        requested: usize,
        /// Number of vectors received back.
        received: usize,
    },

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons a query is rejected before compilation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryValidationError {
    /// Filter path is empty or whitespace-only.
    #[error("filter path cannot be empty; provide a valid path like 'subscription.product.name'")]
    EmptyFilterPath,

    /// Filter path does not exist in the index schema.
    #[error("path '{path}' does not exist in the index")]
    PathNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Filter operator does not apply to the field's stored kind.
    #[error(
        "operator '{operator}' is not compatible with field type '{field_kind}' for path '{path}'; valid operators for '{field_kind}': [{valid_operators}]"
    )]
    IncompatibleFilterType {
        /// The rejected operator.
        operator: String,
        /// The stored kind of the filtered field.
        field_kind: String,
        /// The filtered path.
        path: String,
        /// Comma-separated operators valid for the field kind.
        valid_operators: String,
    },

    /// Filter path does not carry the entity-type prefix of the search.
    #[error(
        "filter path '{path}' must start with '{expected_prefix}' for {entity_type} searches, or use '*' for wildcard paths"
    )]
    InvalidEntityPrefix {
        /// The offending path.
        path: String,
        /// Required prefix, e.g. `subscription.`.
        expected_prefix: String,
        /// Entity type being searched.
        entity_type: String,
    },

    /// An ltree pattern failed the database-side syntax check.
    #[error("ltree pattern '{pattern}' has invalid syntax; use valid lquery syntax")]
    InvalidLtreePattern {
        /// The rejected pattern.
        pattern: String,
    },
}
