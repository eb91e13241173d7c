//! # Catalog Snapshot
//!
//! Both catalogs, fully materialised once per sync invocation.
//!
//! ```text
//!            CatalogSnapshot::load(pos, storefront)
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼ tokio::spawn              ▼ tokio::spawn
//!   POS groups + products       storefront products
//!   (offset pages, joined)      (cursor pages)
//!          │                           │
//!          └─────────── join ──────────┘
//!                        │
//!                        ▼
//!     CatalogTree + Vec<StorefrontProduct>   (immutable from here on)
//! ```
//!
//! A snapshot never refreshes; load a new one to see upstream changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use tracing::{info, instrument};

use shelf_core::{
    CatalogGroup, CatalogItem, CatalogTree, PosGroup, PosProductWithVariations, StorefrontProduct,
};

use crate::client::{PosCatalogClient, StorefrontCatalogClient};
use crate::error::{SyncError, SyncResult};

/// Immutable view over both catalogs.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    tree: CatalogTree,
    storefront: Vec<StorefrontProduct>,
    loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Loads both catalogs concurrently and waits for both.
    ///
    /// Fails with the first error either catalog produced.
    #[instrument(skip_all)]
    pub async fn load(
        pos: Arc<PosCatalogClient>,
        storefront: Arc<StorefrontCatalogClient>,
    ) -> SyncResult<Self> {
        let pos_task = tokio::spawn(async move {
            let groups: Vec<PosGroup> = pos.list_groups().try_collect().await?;
            let products = pos.list_products_with_variations().await?;
            Ok::<_, SyncError>((groups, products))
        });
        let storefront_task = tokio::spawn(async move {
            storefront
                .list_products()
                .try_collect::<Vec<StorefrontProduct>>()
                .await
        });

        let (pos_result, storefront_result) = tokio::join!(pos_task, storefront_task);
        let (groups, products) = pos_result??;
        let storefront = storefront_result??;

        Self::from_parts(groups, products, storefront)
    }

    /// Builds a snapshot from already fetched catalog data.
    pub fn from_parts(
        groups: Vec<PosGroup>,
        products: Vec<PosProductWithVariations>,
        storefront: Vec<StorefrontProduct>,
    ) -> SyncResult<Self> {
        let tree = CatalogTree::build(groups, products)?;

        info!(
            pos_items = tree.all_items().len(),
            pos_groups = tree.all_groups().len(),
            storefront_products = storefront.len(),
            "Catalog snapshot ready"
        );

        Ok(CatalogSnapshot {
            tree,
            storefront,
            loaded_at: Utc::now(),
        })
    }

    pub fn tree(&self) -> &CatalogTree {
        &self.tree
    }

    pub fn storefront_products(&self) -> &[StorefrontProduct] {
        &self.storefront
    }

    pub fn find_storefront_product(&self, id: &str) -> Option<&StorefrontProduct> {
        self.storefront.iter().find(|p| p.id.as_deref() == Some(id))
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn root_groups(&self) -> &[CatalogGroup] {
        self.tree.root_groups()
    }

    pub fn children_of(&self, group_id: i64) -> &[CatalogGroup] {
        self.tree.children_of(group_id)
    }

    pub fn items_of(&self, group_id: i64) -> &[CatalogItem] {
        self.tree.items_of(group_id)
    }

    pub fn by_path(&self, path: &str) -> Option<&CatalogGroup> {
        self.tree.by_path(path)
    }

    /// POS items, depth first.
    pub fn pos_items(&self) -> Vec<&CatalogItem> {
        self.tree.all_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::serve;
    use crate::config::{PosSettings, StorefrontSettings};
    use crate::rate_limit::{RateLimitPolicy, RateLimiter};
    use axum::extract::Query;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use shelf_core::{CatalogNode, GroupKind, PosProduct, StorefrontVariant};
    use std::collections::HashMap;

    async fn fake_catalogs() -> String {
        async fn groups(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
            Json(match q.get("page").map(String::as_str) {
                Some("1") => json!([
                    { "productgroup_id": 1, "productgroup_name": "Yarn", "productgroup_type_id": 7 },
                    { "productgroup_id": 2, "productgroup_name": "Wool", "productgroup_parent": 1,
                      "productgroup_type_id": 7 },
                ]),
                _ => json!([]),
            })
        }
        async fn products(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
            Json(match q.get("page").map(String::as_str) {
                Some("1") => json!([
                    { "product_id": 20, "product_name": "Needles", "product_barcode": "N1",
                      "productgroup_id": 2 },
                ]),
                _ => json!([]),
            })
        }
        async fn graphql() -> Json<Value> {
            Json(json!({ "data": { "products": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": [{
                    "id": "S1", "title": "Needles", "vendor": "Acme", "productType": "Tools",
                    "tags": [],
                    "variants": { "pageInfo": { "hasNextPage": false },
                                  "nodes": [{ "id": "V1", "title": "Default", "barcode": "N1" }] },
                }],
            } } }))
        }

        let router = Router::new()
            .route("/v1/productgroups", get(groups))
            .route("/v1/products", get(products))
            .route("/graphql", post(graphql));
        serve(router).await
    }

    #[tokio::test]
    async fn test_load_fetches_both_catalogs() {
        let url = fake_catalogs().await;
        let pos = PosCatalogClient::new(
            &PosSettings {
                base_url: format!("{}/v1", url),
                ..PosSettings::default()
            },
            Arc::new(RateLimiter::new("pos", RateLimitPolicy::default())),
        )
        .unwrap();
        let storefront = StorefrontCatalogClient::new(
            &StorefrontSettings {
                graphql_url: format!("{}/graphql", url),
                ..StorefrontSettings::default()
            },
            Arc::new(RateLimiter::new("storefront", RateLimitPolicy::default())),
        )
        .unwrap();

        let snapshot = CatalogSnapshot::load(Arc::new(pos), Arc::new(storefront)).await.unwrap();

        assert_eq!(snapshot.root_groups().len(), 1);
        let wool = snapshot.by_path("Yarn/Wool").unwrap();
        assert_eq!(snapshot.items_of(wool.id)[0].name(), "Needles");
        assert_eq!(snapshot.children_of(1).len(), 1);
        assert_eq!(snapshot.find_storefront_product("S1").unwrap().barcodes(), vec!["N1"]);
    }

    #[tokio::test]
    async fn test_load_surfaces_catalog_failure() {
        let url = fake_catalogs().await;
        let pos = PosCatalogClient::new(
            &PosSettings {
                base_url: format!("{}/missing", url),
                ..PosSettings::default()
            },
            Arc::new(RateLimiter::new("pos", RateLimitPolicy::default())),
        )
        .unwrap();
        let storefront = StorefrontCatalogClient::new(
            &StorefrontSettings {
                graphql_url: format!("{}/graphql", url),
                ..StorefrontSettings::default()
            },
            Arc::new(RateLimiter::new("storefront", RateLimitPolicy::default())),
        )
        .unwrap();

        let err = CatalogSnapshot::load(Arc::new(pos), Arc::new(storefront)).await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_from_parts() {
        let snapshot = CatalogSnapshot::from_parts(
            vec![PosGroup::with_id(1, "Tools", None, GroupKind::Standard)],
            vec![PosProductWithVariations::single(
                PosProduct::with_id(5, "Scissors", 1).barcode("X1"),
            )],
            vec![StorefrontProduct::new("Scissors", "Acme", "Tools")
                .id("S9")
                .variant(StorefrontVariant::new("Default", Some("X1")))],
        )
        .unwrap();

        assert_eq!(snapshot.pos_items().len(), 1);
        assert!(snapshot.find_storefront_product("S9").is_some());
        assert!(snapshot.find_storefront_product("S1").is_none());
        assert!(snapshot.tree().find_item_by_barcode("X1").is_some());
    }
}
