//! # shelf-core: Pure Catalog Logic for Shelf Sync
//!
//! Domain types shared by every other crate in the workspace. Nothing in
//! here touches the network, the database or the file system.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shelf Sync Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/shelf-cli                               │   │
//! │  │              "synchronize" ──► exit code + message             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    shelf-sync                                   │   │
//! │  │    RateLimiter, paging, POS/storefront clients, snapshot,      │   │
//! │  │    ReconciliationEngine, SyncJob                               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shelf-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  catalog  │  │ validation│  │   error   │  │   │
//! │  │   │ PosGroup  │  │CatalogNode│  │  barcode  │  │ CoreError │  │   │
//! │  │   │Storefront │  │CatalogTree│  │   tags    │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    shelf-db (Identity Store)                    │   │
//! │  │              SQLite aggregates + variant links                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Wire-level rows of both catalogs and the identity records
//! - [`catalog`] - The [`CatalogNode`] capability and the POS catalog tree
//! - [`validation`] - Barcode normalisation, tag sanitising, sync problems
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shelf_core::{CatalogNode, CatalogTree, GroupKind, PosGroup, PosProduct, PosProductWithVariations};
//!
//! let groups = vec![PosGroup::with_id(1, "Yarn", None, GroupKind::Standard)];
//! let products = vec![PosProductWithVariations::single(
//!     PosProduct::with_id(10, "Merino", 1).barcode("4006381333931"),
//! )];
//!
//! let tree = CatalogTree::build(groups, products).unwrap();
//! let item = tree.find_item_by_barcode("4006381333931").unwrap();
//! assert!(item.is_sync_eligible());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{CatalogGroup, CatalogItem, CatalogNode, CatalogTree, GroupedItem, SingleItem};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;
pub use validation::SyncProblem;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Separator between group names in a human-readable group path.
pub const PATH_SEPARATOR: char = '/';
