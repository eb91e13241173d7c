//! # Error Types
//!
//! Domain-specific error types for shelf-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shelf-core errors (this file)                                         │
//! │  ├── CoreError        - Catalog shape errors                           │
//! │  └── ValidationError  - Barcode / tag input failures                   │
//! │                                                                         │
//! │  shelf-db errors (separate crate)                                      │
//! │  └── DbError          - Identity store failures                        │
//! │                                                                         │
//! │  shelf-sync errors (separate crate)                                    │
//! │  └── SyncError        - Transient / invariant / config taxonomy        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → SyncJob failed state  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while shaping catalog data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A listed entity came back without the id the remote system assigns.
    ///
    /// ## When This Occurs
    /// - A group or product row in a list response has no id
    /// - An unsaved value was handed to the tree builder
    #[error("{entity} '{name}' has no id")]
    MissingId { entity: &'static str, name: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for the correlation key and tag values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value contains characters the other catalog cannot store.
    #[error("{field} '{value}' contains invalid characters")]
    InvalidCharacters { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
