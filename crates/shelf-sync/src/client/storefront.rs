//! # Storefront Catalog Client
//!
//! GraphQL client for the storefront catalog. One query per page, each
//! product arriving with its variants already nested.
//!
//! ```text
//!   products(first: N, after: $cursor)
//!     ├── pageInfo { hasNextPage endCursor }      ─► cursor_pages
//!     └── nodes
//!          └── variants(first: N)
//!                ├── pageInfo { hasNextPage }      ─► overflow guard
//!                └── nodes { id title sku barcode price }
//! ```
//!
//! Variants are never paged separately. A product whose variant connection
//! reports another page is handled by the [`VariantOverflow`] policy.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use shelf_core::{StorefrontProduct, StorefrontVariant};

use super::{build_http_client, check_status, CatalogClient, Credentials};
use crate::config::{StorefrontSettings, VariantOverflow};
use crate::error::{SyncError, SyncResult, UserError};
use crate::paging::{cursor_pages, CursorPage};
use crate::rate_limit::RateLimiter;

const CATALOG: &str = "storefront";
const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";

/// Prefix of ids assigned to products "created" in read-only mode.
pub const SYNTHETIC_ID_PREFIX: &str = "uid://";

const PRODUCTS_QUERY: &str = r#"
query Products($first: Int!, $after: String, $variants: Int!) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id title vendor productType tags
      variants(first: $variants) {
        pageInfo { hasNextPage }
        nodes { id title sku barcode price }
      }
    }
  }
}"#;

const PRODUCT_CREATE: &str = r#"
mutation ProductCreate($input: ProductInput!) {
  productCreate(input: $input) {
    product { id }
    userErrors { field message }
  }
}"#;

const PRODUCT_UPDATE: &str = r#"
mutation ProductUpdate($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id }
    userErrors { field message }
  }
}"#;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQlErrorNode>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorNode {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductsData {
    products: Connection<ProductNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNode {
    id: String,
    title: String,
    #[serde(default)]
    vendor: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    tags: Vec<String>,
    variants: Connection<VariantNode>,
}

#[derive(Debug, Deserialize)]
struct VariantNode {
    id: String,
    title: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    barcode: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

impl From<VariantNode> for StorefrontVariant {
    fn from(node: VariantNode) -> Self {
        StorefrontVariant {
            id: Some(node.id),
            title: node.title,
            sku: node.sku.filter(|s| !s.is_empty()),
            barcode: node.barcode,
            price: node.price.unwrap_or_else(|| "0.00".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    title: &'a str,
    vendor: &'a str,
    product_type: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
struct MutationData {
    #[serde(alias = "productCreate", alias = "productUpdate")]
    payload: MutationPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    #[serde(default)]
    product: Option<ProductId>,
    #[serde(default)]
    user_errors: Vec<UserErrorNode>,
}

#[derive(Debug, Deserialize)]
struct ProductId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserErrorNode {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

impl From<UserErrorNode> for UserError {
    fn from(node: UserErrorNode) -> Self {
        UserError {
            field: node.field.unwrap_or_default(),
            message: node.message,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Rate-limited client for the storefront GraphQL API.
#[derive(Debug, Clone)]
pub struct StorefrontCatalogClient {
    http: Client,
    endpoint: Url,
    page_size: u32,
    read_only: bool,
    overflow: VariantOverflow,
    limiter: Arc<RateLimiter>,
}

impl StorefrontCatalogClient {
    pub fn new(settings: &StorefrontSettings, limiter: Arc<RateLimiter>) -> SyncResult<Self> {
        let credentials = Credentials::Header(ACCESS_TOKEN_HEADER, settings.access_token.clone());
        Ok(StorefrontCatalogClient {
            http: build_http_client(&credentials, settings.timeout())?,
            endpoint: Url::parse(&settings.graphql_url)?,
            page_size: settings.page_size,
            read_only: settings.read_only,
            overflow: settings.variant_overflow,
            limiter,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Sends one GraphQL operation and unwraps its `data`.
    async fn execute<V: Serialize, D: DeserializeOwned>(&self, query: &str, variables: V) -> SyncResult<D> {
        let request = GraphQlRequest { query, variables };

        self.limiter.acquire().await;
        let response = self.http.post(self.endpoint.clone()).json(&request).send().await?;
        let body: GraphQlResponse<D> = check_status(CATALOG, response).await?.json().await?;

        if !body.errors.is_empty() {
            return Err(SyncError::GraphQl(body.errors.into_iter().map(|e| e.message).collect()));
        }
        body.data
            .ok_or_else(|| SyncError::InvalidResponse("GraphQL response without data".into()))
    }

    async fn fetch_products_page(&self, cursor: Option<String>) -> SyncResult<CursorPage<StorefrontProduct>> {
        let variables = json!({
            "first": self.page_size,
            "after": cursor,
            "variants": self.page_size,
        });
        let data: ProductsData = self.execute(PRODUCTS_QUERY, variables).await?;
        let connection = data.products;

        let mut items = Vec::with_capacity(connection.nodes.len());
        for node in connection.nodes {
            items.push(self.product_from_node(node)?);
        }

        debug!(
            products = items.len(),
            has_next_page = connection.page_info.has_next_page,
            "Fetched storefront page"
        );
        Ok(CursorPage {
            items,
            has_next_page: connection.page_info.has_next_page,
            end_cursor: connection.page_info.end_cursor,
        })
    }

    fn product_from_node(&self, node: ProductNode) -> SyncResult<StorefrontProduct> {
        let truncated = node.variants.page_info.has_next_page;
        if truncated {
            match self.overflow {
                VariantOverflow::Fail => {
                    return Err(SyncError::VariantPageOverflow { product_id: node.id });
                }
                VariantOverflow::Skip => {
                    warn!(product_id = %node.id, "Variant list spans several pages, keeping product truncated");
                }
            }
        }

        Ok(StorefrontProduct {
            id: Some(node.id),
            title: node.title,
            vendor: node.vendor,
            product_type: node.product_type,
            tags: node.tags,
            variants: node.variants.nodes.into_iter().map(StorefrontVariant::from).collect(),
            variants_truncated: truncated,
        })
    }

    /// Lazily streams every storefront product, one cursor page at a time.
    pub fn list_products(&self) -> BoxStream<'_, SyncResult<StorefrontProduct>> {
        cursor_pages(move |cursor| self.fetch_products_page(cursor)).boxed()
    }

    /// Creates or updates the product-level fields; variants are returned unchanged.
    pub async fn save_product(&self, mut product: StorefrontProduct) -> SyncResult<StorefrontProduct> {
        if self.read_only {
            if product.id.is_none() {
                product.id = Some(format!("{}{}", SYNTHETIC_ID_PREFIX, Uuid::new_v4()));
            }
            info!(product_id = ?product.id, title = %product.title, "Read-only mode, storefront write skipped");
            return Ok(product);
        }

        let input = ProductInput {
            id: product.id.as_deref(),
            title: &product.title,
            vendor: &product.vendor,
            product_type: &product.product_type,
            tags: &product.tags,
        };
        let mutation = if input.id.is_some() { PRODUCT_UPDATE } else { PRODUCT_CREATE };
        let data: MutationData = self.execute(mutation, json!({ "input": input })).await?;

        let payload = data.payload;
        if !payload.user_errors.is_empty() {
            return Err(SyncError::UserErrors(
                payload.user_errors.into_iter().map(UserError::from).collect(),
            ));
        }
        let saved = payload
            .product
            .ok_or_else(|| SyncError::InvalidResponse("mutation returned no product".into()))?;

        debug!(product_id = %saved.id, "Saved storefront product");
        product.id = Some(saved.id);
        Ok(product)
    }
}

#[async_trait]
impl CatalogClient for StorefrontCatalogClient {
    type Item = StorefrontProduct;

    fn list_all(&self) -> BoxStream<'_, SyncResult<StorefrontProduct>> {
        self.list_products()
    }

    async fn save(&self, item: StorefrontProduct) -> SyncResult<StorefrontProduct> {
        self.save_product(item).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::serve;
    use crate::rate_limit::RateLimitPolicy;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use futures_util::TryStreamExt;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        overflowing_variants: bool,
        reject_writes: bool,
        broken_query: bool,
        cursors: Mutex<Vec<Value>>,
        mutations: Mutex<Vec<String>>,
    }

    fn product_node(id: &str, barcodes: &[&str], more_variants: bool) -> Value {
        let variants: Vec<Value> = barcodes
            .iter()
            .enumerate()
            .map(|(i, b)| json!({ "id": format!("{}-v{}", id, i), "title": b, "barcode": b, "price": "9.90" }))
            .collect();
        json!({
            "id": id, "title": format!("Product {}", id), "vendor": "Acme", "productType": "Yarn",
            "tags": ["Acme", "wool"],
            "variants": { "pageInfo": { "hasNextPage": more_variants }, "nodes": variants },
        })
    }

    async fn graphql(State(store): State<Arc<FakeStore>>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(
            headers.get(ACCESS_TOKEN_HEADER).and_then(|v| v.to_str().ok()),
            Some("shop-token")
        );
        let query = body["query"].as_str().unwrap_or_default();

        if store.broken_query {
            return Json(json!({ "data": null, "errors": [{ "message": "Throttled" }] }));
        }

        if query.contains("productCreate") || query.contains("productUpdate") {
            let kind = if query.contains("productCreate") { "productCreate" } else { "productUpdate" };
            store.mutations.lock().unwrap().push(kind.to_string());
            if store.reject_writes {
                return Json(json!({ "data": { kind: {
                    "product": null,
                    "userErrors": [{ "field": ["input", "title"], "message": "can't be blank" }],
                } } }));
            }
            let id = body["variables"]["input"]["id"].as_str().unwrap_or("gid://Product/77").to_string();
            return Json(json!({ "data": { kind: { "product": { "id": id }, "userErrors": [] } } }));
        }

        assert_eq!(body["variables"]["first"], json!(100));
        let after = body["variables"]["after"].clone();
        store.cursors.lock().unwrap().push(after.clone());

        Json(match after.as_str() {
            None => json!({ "data": { "products": {
                "pageInfo": { "hasNextPage": true, "endCursor": "c1" },
                "nodes": [product_node("S1", &["B1", "B2"], false)],
            } } }),
            Some(_) => json!({ "data": { "products": {
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "nodes": [product_node("S2", &["B3"], store.overflowing_variants)],
            } } }),
        })
    }

    async fn client_for(store: FakeStore, overflow: VariantOverflow) -> (StorefrontCatalogClient, Arc<FakeStore>) {
        let store = Arc::new(store);
        let router = Router::new().route("/graphql", post(graphql)).with_state(store.clone());
        let url = serve(router).await;

        let settings = StorefrontSettings {
            graphql_url: format!("{}/graphql", url),
            access_token: "shop-token".into(),
            variant_overflow: overflow,
            ..StorefrontSettings::default()
        };
        let limiter = Arc::new(RateLimiter::new("storefront", RateLimitPolicy::default()));
        (StorefrontCatalogClient::new(&settings, limiter).unwrap(), store)
    }

    #[tokio::test]
    async fn test_lists_products_across_cursor_pages() {
        let (client, store) = client_for(FakeStore::default(), VariantOverflow::Fail).await;

        let products: Vec<StorefrontProduct> = client.list_all().try_collect().await.unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].id.as_deref(), Some("S1"));
        assert_eq!(products[0].barcodes(), vec!["B1", "B2"]);
        assert_eq!(products[0].identity_tags(), vec!["wool"]);
        assert_eq!(products[1].variants[0].price, "9.90");
        assert!(!products[1].variants_truncated);

        assert_eq!(*store.cursors.lock().unwrap(), vec![Value::Null, json!("c1")]);
    }

    #[tokio::test]
    async fn test_variant_overflow_fails_by_default() {
        let store = FakeStore {
            overflowing_variants: true,
            ..FakeStore::default()
        };
        let (client, _) = client_for(store, VariantOverflow::Fail).await;

        let err = client.list_all().try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(&err, SyncError::VariantPageOverflow { product_id } if product_id == "S2"));
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_variant_overflow_skip_flags_product() {
        let store = FakeStore {
            overflowing_variants: true,
            ..FakeStore::default()
        };
        let (client, _) = client_for(store, VariantOverflow::Skip).await;

        let products: Vec<StorefrontProduct> = client.list_all().try_collect().await.unwrap();
        assert!(!products[0].variants_truncated);
        assert!(products[1].variants_truncated);
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let (client, store) = client_for(FakeStore::default(), VariantOverflow::Fail).await;

        let created = client.save(StorefrontProduct::new("Merino", "Acme", "Yarn")).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("gid://Product/77"));

        let updated = client.save(created.tag("wool")).await.unwrap();
        assert_eq!(updated.id.as_deref(), Some("gid://Product/77"));

        assert_eq!(*store.mutations.lock().unwrap(), vec!["productCreate", "productUpdate"]);
    }

    #[tokio::test]
    async fn test_user_errors_reject_the_write() {
        let store = FakeStore {
            reject_writes: true,
            ..FakeStore::default()
        };
        let (client, _) = client_for(store, VariantOverflow::Fail).await;

        let err = client.save(StorefrontProduct::new("", "Acme", "Yarn")).await.unwrap_err();
        match err {
            SyncError::UserErrors(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, vec!["input", "title"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_top_level_errors() {
        let store = FakeStore {
            broken_query: true,
            ..FakeStore::default()
        };
        let (client, _) = client_for(store, VariantOverflow::Fail).await;

        let err = client.list_all().try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(&err, SyncError::GraphQl(messages) if messages == &vec!["Throttled".to_string()]));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_read_only_never_sends() {
        let settings = StorefrontSettings {
            // Nothing listens here; a sent request would fail.
            graphql_url: "http://127.0.0.1:9/graphql".into(),
            read_only: true,
            ..StorefrontSettings::default()
        };
        let limiter = Arc::new(RateLimiter::new("storefront", RateLimitPolicy::default()));
        let client = StorefrontCatalogClient::new(&settings, limiter).unwrap();

        let created = client.save(StorefrontProduct::new("Merino", "Acme", "Yarn")).await.unwrap();
        assert!(created.id.unwrap().starts_with(SYNTHETIC_ID_PREFIX));

        let existing = StorefrontProduct::new("Merino", "Acme", "Yarn").id("gid://Product/5");
        let saved = client.save(existing).await.unwrap();
        assert_eq!(saved.id.as_deref(), Some("gid://Product/5"));
    }
}
