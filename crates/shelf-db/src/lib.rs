//! # shelf-db: Identity Store for Shelf Sync
//!
//! Persists which storefront product every barcode belongs to. SQLite via
//! sqlx, with migrations embedded in the binary.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  shelf-sync ReconciliationEngine                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ★ shelf-db (THIS CRATE) ★                                             │
//! │     Database ──► IdentityRepository ──► IdentityTx                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL) or in-memory database for tests                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - The identity repository and its transaction scope
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shelf_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("shelf-sync.db")).await?;
//!
//! let mut tx = db.identity().begin().await?;
//! let aggregate = tx.upsert_aggregate("gid://shopify/Product/1", &[]).await?;
//! tx.upsert_link(&aggregate.get().id, "4006381333931", true).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::identity::{IdentityRepository, IdentityTx, Upsert};
