//! # Sync Error Types
//!
//! Error types for catalog access and reconciliation.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncError                                       │
//! │                                                                         │
//! │  Configuration   InvalidConfig, InvalidUrl, ConfigLoadFailed           │
//! │                  → is_config_error()                                    │
//! │                                                                         │
//! │  Transient       Http, HttpStatus, Timeout, InvalidResponse, GraphQl   │
//! │                  → is_transient(); surfaced unchanged, never retried   │
//! │                    by the engine                                        │
//! │                                                                         │
//! │  Invariant       BarcodeOwnedElsewhere, VariantPageOverflow            │
//! │                  → is_invariant_violation(); aborts the pass           │
//! │                                                                         │
//! │  Write rejected  UserErrors (storefront field-level errors)            │
//! │                                                                         │
//! │  Job             AlreadyRunning, TaskFailed                            │
//! │                                                                         │
//! │  Quota pressure is NOT an error: RateLimiter::acquire() just waits.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use shelf_core::CoreError;
use shelf_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// One field-level error returned by a storefront mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub field: Vec<String>,
    pub message: String,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field.join("."), self.message)
        }
    }
}

fn join_all<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport / Protocol Errors
    // =========================================================================
    /// Request could not be sent or the connection broke.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Remote answered with a non-success status.
    #[error("{catalog} responded with HTTP {status}: {body}")]
    HttpStatus {
        catalog: &'static str,
        status: u16,
        body: String,
    },

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// GraphQL top-level errors.
    #[error("GraphQL errors: {}", join_all(.0))]
    GraphQl(Vec<String>),

    // =========================================================================
    // Write Errors
    // =========================================================================
    /// The storefront rejected a mutation with field-level errors.
    #[error("Storefront rejected the write: {}", join_all(.0))]
    UserErrors(Vec<UserError>),

    // =========================================================================
    // Invariant Violations
    // =========================================================================
    /// A barcode is already linked to another storefront product.
    #[error("Barcode {barcode} belongs to aggregate {owner_id}, not {expected_owner_id}")]
    BarcodeOwnedElsewhere {
        barcode: String,
        owner_id: String,
        expected_owner_id: String,
    },

    /// A storefront product has more variants than one page holds.
    #[error("Storefront product {product_id} has more variants than fit on one page")]
    VariantPageOverflow { product_id: String },

    // =========================================================================
    // Storage / Domain Errors
    // =========================================================================
    /// Identity store failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Catalog data could not be shaped.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CoreError),

    // =========================================================================
    // Job Errors
    // =========================================================================
    /// A synchronization job is already running.
    #[error("A synchronization is already running")]
    AlreadyRunning,

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            SyncError::InvalidConfig(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::TaskFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true for network and protocol failures of either catalog.
    ///
    /// The engine never retries these; a caller may re-run the whole job.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Http(_)
            | SyncError::Timeout(_)
            | SyncError::InvalidResponse(_)
            | SyncError::GraphQl(_) => true,
            SyncError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true for consistency failures that abort a reconciliation pass.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            SyncError::BarcodeOwnedElsewhere { .. } | SyncError::VariantPageOverflow { .. } => true,
            SyncError::Database(db) => {
                db.is_unique_violation() || matches!(db, DbError::ConstraintViolation(_))
            }
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = SyncError::BarcodeOwnedElsewhere {
            barcode: "B1".into(),
            owner_id: "a".into(),
            expected_owner_id: "b".into(),
        };
        assert!(err.is_invariant_violation());
        assert!(!err.is_transient());

        let err = SyncError::HttpStatus {
            catalog: "pos",
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());

        let err = SyncError::HttpStatus {
            catalog: "pos",
            status: 401,
            body: String::new(),
        };
        assert!(!err.is_transient());

        let err: SyncError = DbError::duplicate("variant_links.barcode", "B1").into();
        assert!(err.is_invariant_violation());

        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
    }

    #[test]
    fn test_user_errors_message() {
        let err = SyncError::UserErrors(vec![
            UserError {
                field: vec!["input".into(), "title".into()],
                message: "can't be blank".into(),
            },
            UserError {
                field: Vec::new(),
                message: "Product is locked".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Storefront rejected the write: input.title: can't be blank; Product is locked"
        );
    }
}
