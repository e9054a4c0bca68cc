//! HTTP client for the GNX backend
//!
//! This module provides a client for the comic generation REST API: comic
//! listing and metadata, section contents, generated image URLs and
//! text-to-speech audio.
//!
//! # Example
//!
//! ```no_run
//! use gnxapi::GnxClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GnxClient::new().await?;
//!
//!     let comic = client.get_comic("1").await?;
//!     println!("{} ({} sections)", comic.title, comic.sections.len());
//!
//!     // Images are generated asynchronously: None means "not ready yet"
//!     match client.get_image_url("42").await? {
//!         Some(url) => println!("Image: {}", url),
//!         None => println!("Image still generating"),
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::models::{ApiResponse, ComicDetail, ComicList, ComicStatus, ImageUrl, SectionDetail};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Default GNX API base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "GNX/0.1.0 (gnxapi)";

/// Default page size used by [`GnxClient::list_comics`]
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// GNX HTTP client
///
/// The client is stateless and does not cache responses. Retrying and
/// polling are the caller's business (see the reader crate).
#[derive(Debug, Clone)]
pub struct GnxClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl GnxClient {
    /// Create a new client with default settings
    pub async fn new() -> Result<Self> {
        Self::builder().build().await
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client from the `api` section of the gnxconfig configuration
    #[cfg(feature = "gnxconfig")]
    pub async fn from_config(config: &gnxconfig::Config) -> Result<Self> {
        use crate::config_ext::GnxApiConfigExt;

        Self::builder()
            .base_url(config.get_api_base_url()?)
            .timeout(Duration::from_secs(config.get_api_request_timeout_secs()?))
            .user_agent(config.get_api_user_agent()?)
            .build()
            .await
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?)
    }

    /// Fetch a JSON envelope and unwrap its payload.
    ///
    /// Non-2xx statuses and envelopes whose `code` is not 200 are reported
    /// as [`Error::Api`], carrying the envelope message when there is one.
    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url.clone()).timeout(self.timeout).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let envelope: ApiResponse<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(Error::api_error(status.as_u16(), status_reason(status)));
            }
            Err(e) => return Err(e.into()),
        };

        if !status.is_success() || !envelope.is_success() {
            let code = if status.is_success() {
                envelope.code
            } else {
                status.as_u16()
            };
            let message = if envelope.message.is_empty() {
                status_reason(status)
            } else {
                envelope.message
            };
            return Err(Error::api_error(code, message));
        }

        envelope
            .data
            .ok_or_else(|| Error::EmptyResponse(url.path().to_string()))
    }

    // ========================================================================
    // Comics
    // ========================================================================

    /// List comics, newest first, optionally filtered by status
    ///
    /// `page` is 1-based.
    pub async fn list_comics(
        &self,
        page: u32,
        limit: u32,
        status: Option<ComicStatus>,
    ) -> Result<ComicList> {
        let mut url = self.endpoint("comics/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.max(1).to_string());
            query.append_pair("limit", &limit.max(1).to_string());
            if let Some(status) = status {
                query.append_pair("status", status.as_str());
            }
        }

        let list: ComicList = self.get_data(url).await?;
        tracing::debug!("Listed {} of {} comics", list.comics.len(), list.total);
        Ok(list)
    }

    /// Get a comic with its roles and section summaries
    pub async fn get_comic(&self, comic_id: &str) -> Result<ComicDetail> {
        let url = self.endpoint(&format!("comics/{}/", comic_id))?;
        let comic: ComicDetail = self.get_data(url).await?;

        tracing::debug!(
            "Received comic {}: {} ({} sections)",
            comic.id,
            comic.title,
            comic.sections.len()
        );

        Ok(comic)
    }

    // ========================================================================
    // Sections
    // ========================================================================

    /// Get a section with its pages and narrated details
    pub async fn get_section(&self, comic_id: &str, section_id: &str) -> Result<SectionDetail> {
        let url = self.endpoint(&format!("comics/{}/sections/{}/", comic_id, section_id))?;
        let section: SectionDetail = self.get_data(url).await?;

        tracing::debug!(
            "Received section {} of comic {}: {} pages",
            section.id,
            comic_id,
            section.pages.len()
        );

        Ok(section)
    }

    // ========================================================================
    // Generated media
    // ========================================================================

    /// Resolve the public URL of a generated image
    ///
    /// # Returns
    ///
    /// - `Ok(Some(url))` once the image has been generated
    /// - `Ok(None)` while it is not ready (non-200 status or code, empty url)
    /// - `Err(_)` on transport failure
    pub async fn get_image_url(&self, image_id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&format!("images/{}/url", image_id))?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        if response.status() != StatusCode::OK {
            tracing::debug!("Image {} not ready (HTTP {})", image_id, response.status());
            return Ok(None);
        }

        let body = response.bytes().await?;
        let envelope: ApiResponse<ImageUrl> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("Image {} answered with an unreadable body: {}", image_id, e);
                return Ok(None);
            }
        };

        if !envelope.is_success() {
            tracing::debug!("Image {} not ready (code {})", image_id, envelope.code);
            return Ok(None);
        }

        Ok(envelope
            .data
            .map(|d| d.url)
            .filter(|url| !url.trim().is_empty()))
    }

    /// Fetch the synthesized speech for one page detail
    ///
    /// The body is returned untouched (usually MP3).
    pub async fn get_tts_audio(&self, detail_id: &str) -> Result<Bytes> {
        let url = self.endpoint(&format!("tts/{}", detail_id))?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::api_error(
                status.as_u16(),
                format!("TTS for detail {} failed: {}", detail_id, status_reason(status)),
            ));
        }

        let audio = response.bytes().await?;
        tracing::debug!("Received {} bytes of audio for detail {}", audio.len(), detail_id);
        Ok(audio)
    }
}

fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Builder for [`GnxClient`]
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL (for example `http://localhost:8080/api`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    pub async fn build(self) -> Result<GnxClient> {
        // Rejects malformed base URLs up front instead of on the first call
        Url::parse(&self.base_url)?;

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()?;

        Ok(GnxClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> GnxClient {
        GnxClient::builder()
            .base_url(format!("{}/api", server.uri()))
            .build()
            .await
            .unwrap()
    }

    // ========================================================================
    // Unit Tests (no network)
    // ========================================================================

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            builder.timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_base_url() {
        let result = GnxClient::builder().base_url("not a url").build().await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_endpoint_joining() {
        let client = GnxClient::builder()
            .base_url("http://example.test/api/")
            .build()
            .await
            .unwrap();
        assert_eq!(client.base_url(), "http://example.test/api");
        assert_eq!(
            client.endpoint("comics/7/").unwrap().as_str(),
            "http://example.test/api/comics/7/"
        );
    }

    // ========================================================================
    // Mocked HTTP Tests
    // ========================================================================

    #[tokio::test]
    async fn test_get_comic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comics/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "OK",
                "data": {
                    "id": 1,
                    "title": "星之旅",
                    "status": "completed",
                    "sections": [{"id": 10, "title": "启程", "index": 1, "status": "completed"}]
                }
            })))
            .mount(&server)
            .await;

        let comic = client_for(&server).await.get_comic("1").await.unwrap();
        assert_eq!(comic.id, "1");
        assert_eq!(comic.title, "星之旅");
        assert_eq!(comic.sections[0].id, "10");
    }

    #[tokio::test]
    async fn test_get_comic_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comics/9/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": 404,
                "message": "Comic not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_comic("9").await.unwrap_err();
        match err {
            Error::Api { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "Comic not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_comics_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comics/"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "5"))
            .and(query_param("status", "completed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "OK",
                "data": {"comics": [{"id": "3", "title": "T"}], "total": 6, "page": 2, "limit": 5}
            })))
            .mount(&server)
            .await;

        let list = client_for(&server)
            .await
            .list_comics(2, 5, Some(ComicStatus::Completed))
            .await
            .unwrap();
        assert_eq!(list.total, 6);
        assert_eq!(list.comics.len(), 1);
    }

    #[tokio::test]
    async fn test_get_section_empty_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comics/1/sections/2/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 200, "message": "OK"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .get_section("1", "2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_image_url_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images/42/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "OK",
                "data": {"url": "https://cdn.test/42.png"}
            })))
            .mount(&server)
            .await;

        let url = client_for(&server).await.get_image_url("42").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn.test/42.png"));
    }

    #[tokio::test]
    async fn test_image_url_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/images/1/url"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": 404,
                "message": "Image not ready"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/images/2/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "OK",
                "data": {"url": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/images/3/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 202,
                "message": "Generating"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.get_image_url("1").await.unwrap(), None);
        assert_eq!(client.get_image_url("2").await.unwrap(), None);
        assert_eq!(client.get_image_url("3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_image_url_transport_failure() {
        // Nothing listens on the discard port
        let client = GnxClient::builder()
            .base_url("http://127.0.0.1:9/api")
            .timeout(Duration::from_secs(2))
            .build()
            .await
            .unwrap();
        assert_err!(client.get_image_url("1").await);
    }

    #[tokio::test]
    async fn test_tts_audio() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tts/70"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0xFFu8, 0xFB, 0x90, 0x00]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tts/71"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let audio = client.get_tts_audio("70").await.unwrap();
        assert_eq!(audio.as_ref(), &[0xFF, 0xFB, 0x90, 0x00]);

        let err = client.get_tts_audio("71").await.unwrap_err();
        assert!(matches!(err, Error::Api { code: 500, .. }));
    }

    // ========================================================================
    // Integration Tests (real backend)
    //
    // Run with: cargo test -p gnxapi -- --ignored
    // ========================================================================

    #[tokio::test]
    #[ignore = "Integration test - needs a GNX backend on localhost:8080"]
    async fn test_list_comics_live() {
        let client = GnxClient::new().await.unwrap();
        let list = client
            .list_comics(1, DEFAULT_PAGE_LIMIT, None)
            .await
            .unwrap();
        println!("Found {} comics", list.total);
    }
}
