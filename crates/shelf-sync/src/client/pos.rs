//! # POS Catalog Client
//!
//! REST client for the point-of-sale catalog: product groups and products,
//! both listed with 1-based `page` numbers until an empty page comes back.
//!
//! ```text
//!   GET  {base}/productgroups?page=n
//!   GET  {base}/products?page=n&includeProductGroup=true
//!   POST {base}/productgroups          PUT {base}/productgroups/{id}
//!   POST {base}/products               PUT {base}/products/{id}
//! ```
//!
//! Product rows come back flat. Variation rows point at their base product
//! through `product_base_id`; [`PosCatalogClient::list_products_with_variations`]
//! joins them client-side once the listing is drained.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use shelf_core::{GroupKind, PosGroup, PosProduct, PosProductWithVariations, PATH_SEPARATOR};

use super::{build_http_client, check_status, CatalogClient, Credentials};
use crate::config::PosSettings;
use crate::error::{SyncError, SyncResult};
use crate::paging::offset_pages;
use crate::rate_limit::RateLimiter;

const CATALOG: &str = "pos";
const GROUPS: &str = "productgroups";
const PRODUCTS: &str = "products";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GroupRow {
    productgroup_id: i64,
    productgroup_name: String,
    #[serde(default)]
    productgroup_description: Option<String>,
    #[serde(default)]
    productgroup_parent: Option<i64>,
    #[serde(default)]
    productgroup_type_id: Option<i64>,
}

impl From<GroupRow> for PosGroup {
    fn from(row: GroupRow) -> Self {
        PosGroup {
            id: Some(row.productgroup_id),
            name: row.productgroup_name,
            description: row.productgroup_description.filter(|d| !d.is_empty()),
            // The POS reports roots with parent 0.
            parent: row.productgroup_parent.filter(|p| *p != 0),
            kind: GroupKind::from_type_id(row.productgroup_type_id),
        }
    }
}

#[derive(Debug, Serialize)]
struct GroupBody<'a> {
    productgroup_name: &'a str,
    productgroup_description: &'a str,
    productgroup_parent: Option<i64>,
    productgroup_type_id: i64,
}

impl<'a> From<&'a PosGroup> for GroupBody<'a> {
    fn from(group: &'a PosGroup) -> Self {
        GroupBody {
            productgroup_name: &group.name,
            productgroup_description: group.description.as_deref().unwrap_or_default(),
            productgroup_parent: group.parent,
            productgroup_type_id: group.kind.type_id(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupRef {
    productgroup_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaseRef {
    product_id: i64,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    product_id: i64,
    product_name: String,
    #[serde(default)]
    product_description: Option<String>,
    #[serde(default)]
    product_itemnumber: Option<String>,
    #[serde(default)]
    product_barcode: Option<String>,
    #[serde(default = "zero_price", deserialize_with = "decimal_string")]
    product_price: String,
    /// Present when listed with `includeProductGroup=true`.
    #[serde(default)]
    productgroup: Option<GroupRef>,
    #[serde(default)]
    productgroup_id: Option<i64>,
    #[serde(default)]
    product_base_id: Option<i64>,
}

impl From<ProductRow> for PosProduct {
    fn from(row: ProductRow) -> Self {
        PosProduct {
            id: Some(row.product_id),
            name: row.product_name,
            description: row.product_description.filter(|d| !d.is_empty()),
            item_number: row.product_itemnumber.filter(|n| !n.is_empty()),
            barcode: row.product_barcode,
            price: row.product_price,
            group_id: row.productgroup.map(|g| g.productgroup_id).or(row.productgroup_id),
            base_id: row.product_base_id.filter(|b| *b != 0),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProductBody<'a> {
    product_name: &'a str,
    product_description: &'a str,
    product_itemnumber: Option<&'a str>,
    product_barcode: Option<&'a str>,
    product_price: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    productgroup: Option<GroupRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_base: Option<BaseRef>,
}

impl<'a> From<&'a PosProduct> for ProductBody<'a> {
    fn from(product: &'a PosProduct) -> Self {
        ProductBody {
            product_name: &product.name,
            product_description: product.description.as_deref().unwrap_or_default(),
            product_itemnumber: product.item_number.as_deref(),
            product_barcode: product.barcode.as_deref(),
            product_price: &product.price,
            productgroup: product.group_id.map(|id| GroupRef { productgroup_id: id }),
            product_base: product.base_id.map(|id| BaseRef { product_id: id }),
        }
    }
}

fn zero_price() -> String {
    "0.00".to_string()
}

/// Prices arrive as JSON strings or numbers depending on the endpoint.
fn decimal_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(zero_price()),
        other => Err(D::Error::custom(format!("expected a decimal, got {}", other))),
    }
}

// =============================================================================
// Client
// =============================================================================

/// Rate-limited client for the POS REST API.
#[derive(Debug, Clone)]
pub struct PosCatalogClient {
    http: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl PosCatalogClient {
    pub fn new(settings: &PosSettings, limiter: Arc<RateLimiter>) -> SyncResult<Self> {
        let http = build_http_client(&Credentials::Bearer(settings.api_key.clone()), settings.timeout())?;
        Ok(PosCatalogClient {
            http,
            base_url: directory_url(&settings.base_url)?,
            limiter,
        })
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        page: u32,
        with_group: bool,
    ) -> SyncResult<Vec<T>> {
        let mut url = self.endpoint(resource)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            if with_group {
                query.append_pair("includeProductGroup", "true");
            }
        }

        self.limiter.acquire().await;
        let response = self.http.get(url).send().await?;
        let rows: Vec<T> = check_status(CATALOG, response).await?.json().await?;

        debug!(resource, page, rows = rows.len(), "Fetched POS page");
        Ok(rows)
    }

    /// Creates (POST) or updates (PUT by id) one resource.
    async fn write<B: Serialize, T: DeserializeOwned>(
        &self,
        resource: &'static str,
        id: Option<i64>,
        body: &B,
    ) -> SyncResult<T> {
        let request = match id {
            Some(id) => self.http.put(self.endpoint(&format!("{}/{}", resource, id))?),
            None => self.http.post(self.endpoint(resource)?),
        };

        self.limiter.acquire().await;
        let response = request.json(body).send().await?;
        Ok(check_status(CATALOG, response).await?.json().await?)
    }

    // =========================================================================
    // Product Groups
    // =========================================================================

    /// Lazily streams all product groups.
    pub fn list_groups(&self) -> BoxStream<'_, SyncResult<PosGroup>> {
        offset_pages(move |page| async move {
            let rows: Vec<GroupRow> = self.fetch_page(GROUPS, page, false).await?;
            Ok(rows.into_iter().map(PosGroup::from).collect::<Vec<_>>())
        })
        .boxed()
    }

    /// Creates or updates a group; returns it as stored.
    pub async fn save_group(&self, group: PosGroup) -> SyncResult<PosGroup> {
        let row: GroupRow = self.write(GROUPS, group.id, &GroupBody::from(&group)).await?;
        Ok(row.into())
    }

    /// All groups keyed by their slash-joined path of names.
    pub async fn groups_by_path(&self) -> SyncResult<HashMap<String, PosGroup>> {
        let groups: Vec<PosGroup> = self.list_groups().try_collect().await?;
        Ok(index_by_path(groups))
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Lazily streams all product rows, variations included.
    pub fn list_products(&self) -> BoxStream<'_, SyncResult<PosProduct>> {
        offset_pages(move |page| async move {
            let rows: Vec<ProductRow> = self.fetch_page(PRODUCTS, page, true).await?;
            Ok(rows.into_iter().map(PosProduct::from).collect::<Vec<_>>())
        })
        .boxed()
    }

    /// Drains the product listing and joins variation rows onto their base.
    pub async fn list_products_with_variations(&self) -> SyncResult<Vec<PosProductWithVariations>> {
        let products: Vec<PosProduct> = self.list_products().try_collect().await?;
        Ok(join_variations(products))
    }

    /// Creates or updates a product; returns it as stored.
    pub async fn save_product(&self, product: PosProduct) -> SyncResult<PosProduct> {
        let row: ProductRow = self.write(PRODUCTS, product.id, &ProductBody::from(&product)).await?;
        Ok(row.into())
    }
}

#[async_trait]
impl CatalogClient for PosCatalogClient {
    type Item = PosProduct;

    fn list_all(&self) -> BoxStream<'_, SyncResult<PosProduct>> {
        self.list_products()
    }

    async fn save(&self, item: PosProduct) -> SyncResult<PosProduct> {
        self.save_product(item).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parses a base URL so that relative joins append to its path.
fn directory_url(raw: &str) -> SyncResult<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    if url.cannot_be_a_base() {
        return Err(SyncError::InvalidUrl(format!("not a base URL: {}", raw)));
    }
    Ok(url)
}

fn join_variations(products: Vec<PosProduct>) -> Vec<PosProductWithVariations> {
    let (roots, rows): (Vec<_>, Vec<_>) = products.into_iter().partition(|p| !p.is_variation());

    let mut by_base: HashMap<i64, Vec<PosProduct>> = HashMap::new();
    for row in rows {
        if let Some(base) = row.base_id {
            by_base.entry(base).or_default().push(row);
        }
    }

    let joined: Vec<PosProductWithVariations> = roots
        .into_iter()
        .map(|root| {
            let variations = root.id.and_then(|id| by_base.remove(&id)).unwrap_or_default();
            PosProductWithVariations::new(root, variations)
        })
        .collect();

    for (base, orphans) in &by_base {
        warn!(base_id = base, count = orphans.len(), "Variation rows reference an unknown base product");
    }
    joined
}

fn index_by_path(groups: Vec<PosGroup>) -> HashMap<String, PosGroup> {
    let by_id: HashMap<i64, &PosGroup> = groups
        .iter()
        .filter_map(|g| g.id.map(|id| (id, g)))
        .collect();

    let separator = PATH_SEPARATOR.to_string();
    let mut paths = Vec::with_capacity(groups.len());
    for group in &groups {
        let mut names = vec![group.name.as_str()];
        let mut parent = group.parent;
        // Bounded walk so a parent cycle cannot loop forever.
        while let Some(parent_id) = parent {
            if names.len() > by_id.len() {
                warn!(group = %group.name, "Product group parent chain has a cycle");
                break;
            }
            match by_id.get(&parent_id) {
                Some(p) => {
                    names.push(p.name.as_str());
                    parent = p.parent;
                }
                None => break,
            }
        }
        names.reverse();
        paths.push(names.join(separator.as_str()));
    }

    paths.into_iter().zip(groups).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::serve;
    use crate::rate_limit::RateLimitPolicy;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn client_for(base_url: String) -> PosCatalogClient {
        let settings = PosSettings {
            base_url,
            api_key: "pos-key".into(),
            timeout_secs: 5,
        };
        PosCatalogClient::new(&settings, Arc::new(RateLimiter::new("pos", RateLimitPolicy::default()))).unwrap()
    }

    async fn list_products(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer pos-key") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(query.get("includeProductGroup").map(String::as_str), Some("true"));
        let page = query.get("page").cloned().unwrap_or_default();
        log.lock().unwrap().push(format!("products page={}", page));

        Ok(Json(match page.as_str() {
            "1" => json!([
                { "product_id": 10, "product_name": "Cotton", "product_price": "4.50",
                  "productgroup": { "productgroup_id": 1 } },
                { "product_id": 11, "product_name": "Cotton red", "product_barcode": "C1",
                  "product_price": 4.5, "productgroup_id": 1, "product_base_id": 10 },
            ]),
            "2" => json!([
                { "product_id": 12, "product_name": "Cotton blue", "product_barcode": "C2",
                  "productgroup_id": 1, "product_base_id": 10 },
                { "product_id": 20, "product_name": "Needles", "product_barcode": "N1",
                  "productgroup_id": 2, "product_base_id": 0 },
            ]),
            _ => json!([]),
        }))
    }

    async fn list_groups(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
        Json(match query.get("page").map(String::as_str) {
            Some("1") => json!([
                { "productgroup_id": 1, "productgroup_name": "Yarn", "productgroup_parent": 0,
                  "productgroup_type_id": 7 },
                { "productgroup_id": 2, "productgroup_name": "Wool", "productgroup_parent": 1,
                  "productgroup_type_id": 7, "productgroup_description": "" },
                { "productgroup_id": 3, "productgroup_name": "Merino", "productgroup_parent": 2,
                  "productgroup_type_id": 3 },
            ]),
            _ => json!([]),
        })
    }

    async fn create_product(State(log): State<Log>, Json(body): Json<Value>) -> Json<Value> {
        log.lock().unwrap().push("POST products".into());
        assert!(body.get("product_base").is_none());
        Json(json!({
            "product_id": 99,
            "product_name": body["product_name"],
            "product_barcode": body["product_barcode"],
            "product_price": body["product_price"],
            "productgroup": body["productgroup"],
        }))
    }

    async fn update_product(
        State(log): State<Log>,
        Path(id): Path<i64>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        log.lock().unwrap().push(format!("PUT products/{}", id));
        Json(json!({
            "product_id": id,
            "product_name": body["product_name"],
            "product_price": body["product_price"],
            "productgroup_id": body["productgroup"]["productgroup_id"],
            "product_base_id": body["product_base"]["product_id"],
        }))
    }

    async fn fake_pos() -> (String, Log) {
        let log: Log = Arc::default();
        let router = Router::new()
            .route("/v1/products", get(list_products).post(create_product))
            .route("/v1/products/{id}", put(update_product))
            .route("/v1/productgroups", get(list_groups))
            .with_state(log.clone());
        (format!("{}/v1", serve(router).await), log)
    }

    #[tokio::test]
    async fn test_list_products_with_variations() {
        let (url, log) = fake_pos().await;
        let client = client_for(url);

        let products = client.list_products_with_variations().await.unwrap();

        assert_eq!(products.len(), 2);
        let cotton = &products[0];
        assert_eq!(cotton.product.name, "Cotton");
        assert_eq!(cotton.product.group_id, Some(1));
        let variation_ids: Vec<_> = cotton.variations.iter().filter_map(|v| v.id).collect();
        assert_eq!(variation_ids, vec![11, 12]);
        assert_eq!(cotton.variations[0].price, "4.5");

        // base id 0 means "no base"
        assert_eq!(products[1].product.id, Some(20));
        assert!(products[1].variations.is_empty());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["products page=1", "products page=2", "products page=3"]
        );
    }

    #[tokio::test]
    async fn test_list_groups_and_paths() {
        let (url, _) = fake_pos().await;
        let client = client_for(url);

        let groups: Vec<PosGroup> = client.list_groups().try_collect().await.unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups[0].is_root());
        assert_eq!(groups[1].description, None);
        assert_eq!(groups[2].kind, GroupKind::VariationHolder);

        let by_path = client.groups_by_path().await.unwrap();
        assert_eq!(by_path["Yarn/Wool/Merino"].id, Some(3));
        assert_eq!(by_path["Yarn"].id, Some(1));
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let (url, log) = fake_pos().await;
        let client = client_for(url);

        let created = client
            .save(PosProduct::new("Scissors", 2).barcode("S1"))
            .await
            .unwrap();
        assert_eq!(created.id, Some(99));
        assert_eq!(created.group_id, Some(2));
        assert_eq!(created.barcode.as_deref(), Some("S1"));

        let variation = PosProduct::with_id(12, "Cotton blue", 1).variation_of(10);
        let updated = client.save(variation).await.unwrap();
        assert_eq!(updated.base_id, Some(10));

        assert_eq!(*log.lock().unwrap(), vec!["POST products", "PUT products/12"]);
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_status() {
        let (url, _) = fake_pos().await;
        let settings = PosSettings {
            base_url: url,
            api_key: "wrong".into(),
            timeout_secs: 5,
        };
        let client = PosCatalogClient::new(&settings, Arc::new(RateLimiter::new("pos", RateLimitPolicy::default()))).unwrap();

        let err = client.list_products_with_variations().await.unwrap_err();
        assert!(matches!(err, SyncError::HttpStatus { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_directory_url_keeps_version_segment() {
        let url = directory_url("https://api.example.com/v1").unwrap();
        assert_eq!(url.join("products").unwrap().as_str(), "https://api.example.com/v1/products");
    }
}
