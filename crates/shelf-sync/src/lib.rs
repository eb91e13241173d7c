//! # shelf-sync: Catalog Synchronization for Shelf Sync
//!
//! Keeps the POS catalog and the storefront catalog matched on barcodes,
//! recording the match in the identity store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Pipeline                                  │
//! │                                                                         │
//! │  ┌───────────────────┐                  ┌──────────────────────────┐   │
//! │  │ PosCatalogClient  │                  │ StorefrontCatalogClient  │   │
//! │  │ REST, offset pages│                  │ GraphQL, cursor pages    │   │
//! │  └─────────┬─────────┘                  └────────────┬─────────────┘   │
//! │            │  RateLimiter (one per client)           │                  │
//! │            └───────────────┬─────────────────────────┘                  │
//! │                            ▼                                            │
//! │                   ┌──────────────────┐                                  │
//! │                   │ CatalogSnapshot  │  both loads run concurrently    │
//! │                   └────────┬─────────┘                                  │
//! │                            ▼                                            │
//! │  ┌──────────┐     ┌──────────────────────┐     ┌──────────────────┐    │
//! │  │ SyncJob  │ ──► │ ReconciliationEngine │ ──► │ shelf-db         │    │
//! │  │ (watch)  │     │ per-item transactions│     │ IdentityRepository│   │
//! │  └──────────┘     └──────────────────────┘     └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Configuration (endpoints, credentials, quota, drift)
//! - [`error`] - Sync error types
//! - [`rate_limit`] - Sliding-window rate limiter
//! - [`paging`] - Lazy offset and cursor paging streams
//! - [`client`] - The `CatalogClient` trait and both catalog clients
//! - [`snapshot`] - Both catalogs, materialised once
//! - [`engine`] - The reconciliation pass and its report
//! - [`job`] - Background job with observable state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shelf_sync::{PosCatalogClient, RateLimiter, StorefrontCatalogClient, SyncConfig, SyncJob};
//!
//! let config = SyncConfig::load(None)?;
//! let policy = config.rate_limit.policy();
//! let pos = PosCatalogClient::new(&config.pos, Arc::new(RateLimiter::new("pos", policy)))?;
//! let storefront = StorefrontCatalogClient::new(
//!     &config.storefront,
//!     Arc::new(RateLimiter::new("storefront", policy)),
//! )?;
//!
//! let job = SyncJob::new(Arc::new(pos), Arc::new(storefront), database.identity());
//! let report = job.start()?.wait().await?;
//! println!("{}", report);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod paging;
pub mod rate_limit;
pub mod snapshot;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{CatalogClient, PosCatalogClient, StorefrontCatalogClient};
pub use config::{
    DatabaseSettings, PosSettings, RateLimitSettings, ReconcileSettings, StorefrontSettings,
    SyncConfig, VariantOverflow,
};
pub use engine::{
    CatalogSide, ReconciliationContext, ReconciliationEngine, ReconciliationReport, UnsyncedItem,
};
pub use error::{SyncError, SyncResult, UserError};
pub use job::{JobState, SyncJob, SyncJobHandle};
pub use paging::{cursor_pages, offset_pages, CursorPage};
pub use rate_limit::{RateLimitPolicy, RateLimiter, SlidingWindow};
pub use snapshot::CatalogSnapshot;
