//! # Reconciliation Engine
//!
//! Walks a [`CatalogSnapshot`] against the identity store and records which
//! barcodes belong to which storefront product.
//!
//! ## Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Phase 1 - storefront products (one transaction each)                  │
//! │    skip: no id · truncated variants · no barcodes   → report.unsynced  │
//! │    upsert aggregate by external id (tags on creation only)             │
//! │    upsert link per barcode                                             │
//! │      owned by another aggregate ──► BarcodeOwnedElsewhere, rollback    │
//! │      deleted but back on the product ──► restore                       │
//! │    active link gone from the product                                   │
//! │      seen on the product before ──► warning, deleted if drift is on    │
//! │      POS-only link, gone from POS too ──► deleted if drift is on       │
//! │                                                                         │
//! │  Phase 2 - POS items (one transaction each)                            │
//! │    warning-level sync problems ──► report.warnings                     │
//! │    drift detection only:                                               │
//! │    distinct barcodes → links → single active owner                     │
//! │      owner without storefront product ──► mark its links deleted       │
//! │      owner link gone from POS and storefront ──► mark deleted          │
//! │      item barcode without link ──► create link under the owner         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing item rolls back its own transaction and aborts the pass. Items
//! committed before it stay committed; every write is an upsert, so a rerun
//! picks up where the failed pass stopped.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use shelf_core::{CatalogItem, CatalogNode, StorefrontProduct};
use shelf_db::{DbError, IdentityRepository, IdentityTx, Upsert};

use crate::error::{SyncError, SyncResult};
use crate::snapshot::CatalogSnapshot;

// =============================================================================
// Context
// =============================================================================

/// Everything one reconciliation pass reads and writes.
///
/// Built fresh per invocation; nothing here outlives the pass.
#[derive(Debug, Clone)]
pub struct ReconciliationContext {
    snapshot: Arc<CatalogSnapshot>,
    identity: IdentityRepository,
    drift_detection: bool,
}

impl ReconciliationContext {
    /// Drift detection is on by default.
    pub fn new(snapshot: Arc<CatalogSnapshot>, identity: IdentityRepository) -> Self {
        ReconciliationContext {
            snapshot,
            identity,
            drift_detection: true,
        }
    }

    pub fn with_drift_detection(mut self, enabled: bool) -> Self {
        self.drift_detection = enabled;
        self
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn identity(&self) -> &IdentityRepository {
        &self.identity
    }

    pub fn drift_detection(&self) -> bool {
        self.drift_detection
    }
}

// =============================================================================
// Report
// =============================================================================

/// Which catalog an unsynced item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSide {
    Pos,
    Storefront,
}

impl fmt::Display for CatalogSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSide::Pos => write!(f, "pos"),
            CatalogSide::Storefront => write!(f, "storefront"),
        }
    }
}

/// An item left out of matching, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsyncedItem {
    pub catalog: CatalogSide,
    pub id: String,
    pub name: String,
    pub reason: String,
}

/// Outcome of one successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub aggregates_created: usize,
    pub links_created: usize,
    pub links_restored: usize,
    pub links_marked_deleted: usize,
    pub unsynced: Vec<UnsyncedItem>,
    pub warnings: Vec<String>,
}

impl ReconciliationReport {
    /// Number of identity rows written.
    pub fn changes(&self) -> usize {
        self.aggregates_created + self.links_created + self.links_restored + self.links_marked_deleted
    }

    fn skip(&mut self, catalog: CatalogSide, id: &str, name: &str, reason: &str) {
        warn!(catalog = %catalog, id = %id, name = %name, reason = %reason, "Item not synced");
        self.unsynced.push(UnsyncedItem {
            catalog,
            id: id.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    fn warn(&mut self, message: String) {
        warn!(%message, "Catalog data problem");
        self.warnings.push(message);
    }

    fn absorb(&mut self, item: ItemChanges) {
        self.aggregates_created += item.aggregates_created;
        self.links_created += item.links_created;
        self.links_restored += item.links_restored;
        self.links_marked_deleted += item.links_marked_deleted;
        self.warnings.extend(item.warnings);
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} aggregates created, {} links created, {} restored, {} marked deleted, {} unsynced, {} warnings",
            self.aggregates_created,
            self.links_created,
            self.links_restored,
            self.links_marked_deleted,
            self.unsynced.len(),
            self.warnings.len()
        )
    }
}

/// Changes made inside one item transaction; merged only after commit.
#[derive(Debug, Default)]
struct ItemChanges {
    aggregates_created: usize,
    links_created: usize,
    links_restored: usize,
    links_marked_deleted: usize,
    warnings: Vec<String>,
}

impl ItemChanges {
    fn is_empty(&self) -> bool {
        self.aggregates_created + self.links_created + self.links_restored + self.links_marked_deleted == 0
    }

    fn drift(&mut self, message: String) {
        warn!(%message, "Catalog drift");
        self.warnings.push(message);
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Runs reconciliation passes.
pub struct ReconciliationEngine<'a> {
    ctx: &'a ReconciliationContext,
    /// Normalised barcodes of every POS item.
    pos_barcodes: HashSet<String>,
    /// Storefront product id to its normalised barcodes.
    storefront_barcodes: HashMap<&'a str, HashSet<String>>,
}

impl<'a> ReconciliationEngine<'a> {
    /// Runs one full pass over `ctx`.
    #[instrument(skip_all, fields(drift_detection = ctx.drift_detection))]
    pub async fn run(ctx: &'a ReconciliationContext) -> SyncResult<ReconciliationReport> {
        let engine = Self::new(ctx);
        let mut report = ReconciliationReport::default();

        info!(
            storefront_products = ctx.snapshot.storefront_products().len(),
            pos_barcodes = engine.pos_barcodes.len(),
            "Reconciliation started"
        );

        for product in ctx.snapshot.storefront_products() {
            engine.reconcile_storefront_product(product, &mut report).await?;
        }

        for item in ctx.snapshot.pos_items() {
            engine.reconcile_pos_item(item, &mut report).await?;
        }

        info!(%report, "Reconciliation finished");
        Ok(report)
    }

    fn new(ctx: &'a ReconciliationContext) -> Self {
        let pos_barcodes = ctx
            .snapshot
            .pos_items()
            .into_iter()
            .flat_map(|item| item.barcodes())
            .collect();

        let storefront_barcodes = ctx
            .snapshot
            .storefront_products()
            .iter()
            .filter_map(|p| p.id.as_deref().map(|id| (id, p.barcodes().into_iter().collect())))
            .collect();

        ReconciliationEngine {
            ctx,
            pos_barcodes,
            storefront_barcodes,
        }
    }

    // =========================================================================
    // Phase 1: storefront products
    // =========================================================================

    async fn reconcile_storefront_product(
        &self,
        product: &StorefrontProduct,
        report: &mut ReconciliationReport,
    ) -> SyncResult<()> {
        let Some(external_id) = product.id.as_deref() else {
            report.skip(CatalogSide::Storefront, "", &product.title, "product has no storefront id");
            return Ok(());
        };
        if product.variants_truncated {
            report.skip(
                CatalogSide::Storefront,
                external_id,
                &product.title,
                "variant list spans more than one page",
            );
            return Ok(());
        }

        for variant in &product.variants {
            if variant.normalized_barcode().is_none() {
                report.skip(
                    CatalogSide::Storefront,
                    variant.id.as_deref().unwrap_or(external_id),
                    &format!("{} / {}", product.title, variant.title),
                    "variant has no barcode",
                );
            }
        }

        let barcodes = product.barcodes();
        if barcodes.is_empty() {
            report.skip(CatalogSide::Storefront, external_id, &product.title, "product has no barcodes");
            return Ok(());
        }

        let mut tx = self.ctx.identity.begin().await?;
        match self.link_storefront_product(&mut tx, external_id, product, &barcodes).await {
            Ok(changes) => {
                tx.commit().await?;
                debug!(external_id, changes = ?changes, "Storefront product reconciled");
                report.absorb(changes);
                Ok(())
            }
            Err(err) => {
                rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn link_storefront_product(
        &self,
        tx: &mut IdentityTx,
        external_id: &str,
        product: &StorefrontProduct,
        barcodes: &[String],
    ) -> SyncResult<ItemChanges> {
        let mut changes = ItemChanges::default();

        let aggregate = match tx.upsert_aggregate(external_id, &product.identity_tags()).await? {
            Upsert::Created(record) => {
                info!(external_id, aggregate_id = %record.id, "Created aggregate");
                changes.aggregates_created += 1;
                record
            }
            Upsert::Existing(record) => record,
        };

        for barcode in barcodes {
            match tx.upsert_link(&aggregate.id, barcode, true).await? {
                Upsert::Created(_) => {
                    debug!(barcode = %barcode, external_id, "Linked barcode");
                    changes.links_created += 1;
                }
                Upsert::Existing(link) if link.owner_id != aggregate.id => {
                    return Err(SyncError::BarcodeOwnedElsewhere {
                        barcode: barcode.clone(),
                        owner_id: link.owner_id,
                        expected_owner_id: aggregate.id,
                    });
                }
                Upsert::Existing(link) => {
                    if link.deleted {
                        tx.set_link_deleted(&link.id, false).await?;
                        info!(barcode = %barcode, external_id, "Restored variant link");
                        changes.links_restored += 1;
                    }
                    if !link.on_storefront {
                        tx.mark_on_storefront(&link.id).await?;
                    }
                }
            }
        }

        for link in tx.links_of(&aggregate.id).await? {
            if link.deleted || barcodes.contains(&link.barcode) {
                continue;
            }
            if link.on_storefront {
                let message = format!(
                    "barcode {} is no longer part of storefront product {}",
                    link.barcode, external_id
                );
                if self.ctx.drift_detection {
                    tx.set_link_deleted(&link.id, true).await?;
                    changes.links_marked_deleted += 1;
                }
                changes.drift(message);
            } else if self.ctx.drift_detection && !self.pos_barcodes.contains(&link.barcode) {
                // Linked from a POS variation that is gone as well.
                tx.set_link_deleted(&link.id, true).await?;
                changes.links_marked_deleted += 1;
                changes.drift(format!("barcode {} disappeared from both catalogs", link.barcode));
            }
        }

        if !changes.is_empty() {
            tx.touch_aggregate(&aggregate.id).await?;
        }
        Ok(changes)
    }

    // =========================================================================
    // Phase 2: POS items
    // =========================================================================

    async fn reconcile_pos_item(&self, item: &CatalogItem, report: &mut ReconciliationReport) -> SyncResult<()> {
        let problems = item.sync_problems();
        if let Some(problem) = problems.iter().find(|p| p.is_error()) {
            report.skip(CatalogSide::Pos, &item.node_id(), item.name(), problem.message());
            return Ok(());
        }
        for problem in &problems {
            report.warn(format!("POS item {} ({}): {}", item.name(), item.node_id(), problem.message()));
        }
        if !self.ctx.drift_detection {
            return Ok(());
        }

        let mut tx = self.ctx.identity.begin().await?;
        match self.check_pos_item(&mut tx, item).await {
            Ok(changes) => {
                tx.commit().await?;
                report.absorb(changes);
                Ok(())
            }
            Err(err) => {
                rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn check_pos_item(&self, tx: &mut IdentityTx, item: &CatalogItem) -> SyncResult<ItemChanges> {
        let mut changes = ItemChanges::default();
        let barcodes: BTreeSet<String> = item.barcodes().into_iter().collect();

        let mut owners = BTreeSet::new();
        let mut unlinked = Vec::new();
        for barcode in &barcodes {
            match tx.find_link_by_barcode(barcode).await? {
                Some(link) if !link.deleted => {
                    owners.insert(link.owner_id);
                }
                Some(_) => {}
                None => unlinked.push(barcode),
            }
        }

        let owner_id = match owners.len() {
            0 => return Ok(changes),
            1 => owners.into_iter().next().unwrap_or_default(),
            _ => {
                changes.drift(format!(
                    "POS item {} ({}) is linked to {} storefront products",
                    item.name(),
                    item.node_id(),
                    owners.len()
                ));
                return Ok(changes);
            }
        };

        let aggregate = tx
            .find_aggregate(&owner_id)
            .await?
            .ok_or_else(|| DbError::not_found("Aggregate", &owner_id))?;
        let storefront = aggregate
            .external_id
            .as_deref()
            .and_then(|id| self.storefront_barcodes.get(id));

        let Some(storefront) = storefront else {
            for link in tx.links_of(&owner_id).await? {
                if link.deleted {
                    continue;
                }
                tx.set_link_deleted(&link.id, true).await?;
                changes.links_marked_deleted += 1;
                changes.drift(format!(
                    "barcode {} belongs to an aggregate without storefront product ({})",
                    link.barcode,
                    aggregate.external_id.as_deref().unwrap_or("never linked")
                ));
            }
            return Ok(changes);
        };

        for link in tx.links_of(&owner_id).await? {
            if link.deleted || barcodes.contains(&link.barcode) || self.pos_barcodes.contains(&link.barcode) {
                continue;
            }
            if storefront.contains(&link.barcode) {
                changes.drift(format!(
                    "barcode {} of storefront product {} has no POS variation",
                    link.barcode,
                    aggregate.external_id.as_deref().unwrap_or_default()
                ));
                continue;
            }
            tx.set_link_deleted(&link.id, true).await?;
            changes.links_marked_deleted += 1;
            changes.drift(format!("barcode {} disappeared from both catalogs", link.barcode));
        }

        for barcode in unlinked {
            tx.insert_link(&owner_id, barcode, false).await?;
            info!(barcode = %barcode, item = %item.name(), "Linked new POS variation to its storefront product");
            changes.links_created += 1;
        }

        if !changes.is_empty() {
            tx.touch_aggregate(&owner_id).await?;
        }
        Ok(changes)
    }
}

async fn rollback(tx: IdentityTx) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "Rollback failed");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
