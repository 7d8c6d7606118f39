//! PokeAPI client backed by the response cache
//!
//! Every request goes through [`PokeApiClient::fetch_raw`], which consults the
//! [`ResponseCache`] before touching the network and stores raw response bodies
//! before they are decoded.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::{LocationAreaDetail, LocationAreaPage, Pokemon};
use crate::cache::ResponseCache;

/// Base URL for the public PokeAPI
pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// Number of location areas requested per page
const PAGE_SIZE: u32 = 20;

/// Errors that can occur when fetching from PokeAPI
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for fetching location and Pokemon data
#[derive(Debug, Clone)]
pub struct PokeApiClient {
    http: Client,
    cache: ResponseCache,
    base_url: String,
}

impl PokeApiClient {
    /// Creates a client with a default HTTP client
    ///
    /// # Arguments
    /// * `cache` - Shared response cache consulted before every request
    /// * `base_url` - API root, e.g. [`DEFAULT_BASE_URL`] or a mock server URI
    pub fn new(cache: ResponseCache, base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), cache, base_url)
    }

    /// Creates a client with a custom HTTP client
    pub fn with_client(http: Client, cache: ResponseCache, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            cache,
            base_url,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// URL of the first location-area page
    pub fn first_page_url(&self) -> String {
        format!(
            "{}/location-area?offset=0&limit={}",
            self.base_url, PAGE_SIZE
        )
    }

    /// Returns the raw body for `url`, hitting the network only on a cache miss
    ///
    /// On success the body is stored in the cache before it is returned. Failed
    /// requests and non-success statuses leave the cache untouched.
    pub async fn fetch_raw(&self, url: &str) -> Result<Arc<[u8]>, ApiError> {
        if let Some(body) = self.cache.get(url) {
            debug!(url, "cache hit");
            return Ok(body);
        }
        debug!(url, "cache miss");

        let response = self.http.get(url).send().await.map_err(|err| {
            warn!(url, error = %err, "request failed");
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "unexpected response status");
            return Err(ApiError::Status {
                status,
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let body: Arc<[u8]> = Arc::from(&bytes[..]);
        self.cache.add(url, Arc::clone(&body));
        Ok(body)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let body = self.fetch_raw(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetches a page of location areas
    ///
    /// # Arguments
    /// * `page_url` - A `next`/`previous` URL from an earlier page, or `None` for the first page
    pub async fn location_areas(
        &self,
        page_url: Option<&str>,
    ) -> Result<LocationAreaPage, ApiError> {
        match page_url {
            Some(url) => self.fetch_json(url).await,
            None => self.fetch_json(&self.first_page_url()).await,
        }
    }

    /// Fetches a single location area with its encounters
    pub async fn location_area(&self, name: &str) -> Result<LocationAreaDetail, ApiError> {
        let url = format!("{}/location-area/{}", self.base_url, name);
        self.fetch_json(&url).await
    }

    /// Fetches a Pokemon by name
    pub async fn pokemon(&self, name: &str) -> Result<Pokemon, ApiError> {
        let url = format!("{}/pokemon/{}", self.base_url, name);
        self.fetch_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_cache() -> ResponseCache {
        ResponseCache::new(Duration::from_secs(300)).expect("valid interval")
    }

    fn page_body(next: Option<&str>, previous: Option<&str>) -> serde_json::Value {
        json!({
            "count": 3,
            "next": next,
            "previous": previous,
            "results": [{"name": "canalave-city-area", "url": "x"}]
        })
    }

    #[tokio::test]
    async fn test_fetch_raw_deduplicates_identical_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/pidgey"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\":\"pidgey\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PokeApiClient::new(test_cache(), server.uri());
        let url = format!("{}/pokemon/pidgey", server.uri());

        let first = client.fetch_raw(&url).await.expect("first fetch");
        let second = client.fetch_raw(&url).await.expect("second fetch");

        assert_eq!(&first[..], b"{\"name\":\"pidgey\"}");
        assert_eq!(first, second);
        assert!(client.cache().get(&url).is_some());
    }

    #[tokio::test]
    async fn test_location_areas_uses_first_page_when_no_cursor() {
        let server = MockServer::start().await;
        let next = format!("{}/location-area?offset=20&limit=20", server.uri());
        Mock::given(method("GET"))
            .and(path("/location-area"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(Some(&next), None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = PokeApiClient::new(test_cache(), server.uri());
        let page = client.location_areas(None).await.expect("page");

        assert_eq!(page.next.as_deref(), Some(next.as_str()));
        assert!(page.previous.is_none());
        assert_eq!(page.results[0].name, "canalave-city-area");
    }

    #[tokio::test]
    async fn test_error_status_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/missingno"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .expect(2)
            .mount(&server)
            .await;

        let client = PokeApiClient::new(test_cache(), server.uri());

        for _ in 0..2 {
            let err = client.pokemon("missingno").await.unwrap_err();
            assert!(matches!(
                err,
                ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND
            ));
        }
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_cache_untouched() {
        let client = PokeApiClient::new(test_cache(), "http://127.0.0.1:1");

        let err = client.location_area("anywhere").await.unwrap_err();

        assert!(matches!(err, ApiError::Request(_)));
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_raw_body_is_cached_before_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/location-area/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PokeApiClient::new(test_cache(), server.uri());

        let err = client.location_area("broken").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let url = format!("{}/location-area/broken", server.uri());
        assert_eq!(client.cache().get(&url).as_deref(), Some(&b"not json"[..]));
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_is_trimmed() {
        let client = PokeApiClient::new(test_cache(), "https://example.test/api/v2/");
        assert_eq!(
            client.first_page_url(),
            "https://example.test/api/v2/location-area?offset=0&limit=20"
        );
    }
}
