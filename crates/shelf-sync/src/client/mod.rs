//! # Catalog Clients
//!
//! One client per external catalog. Each binds authentication, base
//! endpoint and its own [`RateLimiter`](crate::rate_limit::RateLimiter) to the protocol's list/save calls.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  CatalogClient::list_all()                                            │
//! │       │                                                               │
//! │       ▼                                                               │
//! │  offset_pages / cursor_pages ──► fetch(page) ──► limiter.acquire()   │
//! │                                                   │                   │
//! │                                                   ▼                   │
//! │                                           reqwest ──► wire DTO        │
//! │                                                   │                   │
//! │                                                   ▼                   │
//! │                                           shelf-core domain type     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`pos::PosCatalogClient`] - REST, offset paged
//! - [`storefront::StorefrontCatalogClient`] - GraphQL, cursor paged

pub mod pos;
pub mod storefront;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};

use crate::error::{SyncError, SyncResult};

pub use pos::PosCatalogClient;
pub use storefront::StorefrontCatalogClient;

/// Uniform list/save surface over one external catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    type Item: Send;

    /// Lazily streams every item of the catalog, page by page.
    fn list_all(&self) -> BoxStream<'_, SyncResult<Self::Item>>;

    /// Creates the item when it has no external id, updates it otherwise.
    /// Returns the item as the catalog now stores it.
    async fn save(&self, item: Self::Item) -> SyncResult<Self::Item>;
}

/// How a client authenticates every request.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// A custom header carrying the raw token.
    Header(&'static str, String),
}

/// Builds the shared HTTP client with credentials bound as default headers.
pub(crate) fn build_http_client(credentials: &Credentials, timeout: Duration) -> SyncResult<Client> {
    let mut headers = HeaderMap::new();

    let (name, value) = match credentials {
        Credentials::Bearer(token) => (AUTHORIZATION, format!("Bearer {}", token)),
        Credentials::Header(name, token) => {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                SyncError::InvalidConfig(format!("Invalid credentials header name {:?}: {}", name, e))
            })?;
            (name, token.clone())
        }
    };
    let mut value = HeaderValue::from_str(&value)
        .map_err(|e| SyncError::InvalidConfig(format!("Invalid credentials header: {}", e)))?;
    value.set_sensitive(true);
    headers.insert(name, value);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Turns a non-success status into `SyncError::HttpStatus` with the body.
pub(crate) async fn check_status(catalog: &'static str, response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::HttpStatus {
        catalog,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process fake servers for client tests.

    use axum::Router;
    use tokio::net::TcpListener;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    #[tokio::test]
    async fn test_check_status_keeps_body() {
        let router = Router::new().route(
            "/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
        );
        let url = testing::serve(router).await;

        let client = build_http_client(&Credentials::Bearer("t".into()), Duration::from_secs(5)).unwrap();
        let response = client.get(&url).send().await.unwrap();
        let err = check_status("pos", response).await.unwrap_err();

        match &err {
            SyncError::HttpStatus { catalog, status, body } => {
                assert_eq!(*catalog, "pos");
                assert_eq!(*status, 503);
                assert_eq!(body, "try later");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_custom_header_name_is_normalised() {
        let router = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                headers
                    .get("x-shop-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("missing")
                    .to_string()
            }),
        );
        let url = testing::serve(router).await;

        let credentials = Credentials::Header("X-Shop-Token", "secret".into());
        let client = build_http_client(&credentials, Duration::from_secs(5)).unwrap();
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "secret");
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        let credentials = Credentials::Header("bad header", "secret".into());
        let err = build_http_client(&credentials, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let result = build_http_client(&Credentials::Bearer("bad\ntoken".into()), Duration::from_secs(1));
        assert!(result.unwrap_err().is_config_error());
    }
}
