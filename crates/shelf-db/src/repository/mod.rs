//! # Repository Module
//!
//! Repository implementations for the identity store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ReconciliationEngine                                                   │
//! │       │  db.identity().begin()                                          │
//! │       ▼                                                                 │
//! │  IdentityTx  ── one transaction per catalog item ──► commit / rollback │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sync_aggregates · sync_aggregate_tags · variant_links                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`identity::IdentityRepository`] - Aggregates and variant links

pub mod identity;
