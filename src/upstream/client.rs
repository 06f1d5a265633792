use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::cache::{identity, CacheError, IdentityError, ResourceCache};
use crate::config::AppConfig;
use crate::images::{CachedImage, ImageError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Upstream returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Invalid upstream JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Reads through the resource cache: cache first, upstream on a miss.
///
/// No cache lock is held while a request is in flight. Two callers missing
/// the same key may both download it; the loser's insert is rejected and it
/// reads back the winner's copy.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    cache: Arc<ResourceCache>,
    image_ttl: Duration,
    body_ttl: Duration,
    public_base_url: String,
}

impl UpstreamClient {
    pub fn new(config: &AppConfig, cache: Arc<ResourceCache>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            cache,
            image_ttl: config.image_ttl(),
            body_ttl: config.body_ttl(),
            public_base_url: config.public_base_url.clone(),
        })
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// JSON document at `url`. The raw body is cached under the URL itself,
    /// and only once it parses.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        if let Ok(body) = self.cache.get_body(url) {
            match serde_json::from_slice(&body) {
                Ok(json) => {
                    debug!("Body cache hit: {}", url);
                    return Ok(json);
                }
                Err(e) => warn!("Ignoring unusable cached body for {}: {}", url, e),
            }
        }

        let body = self.download(url).await?;
        let json = serde_json::from_slice(&body)?;

        match self.cache.put_body(url, body, self.body_ttl) {
            Ok(()) => {}
            Err(CacheError::AlreadyPresent { .. }) => debug!("Body for {} cached concurrently", url),
            Err(e) => return Err(e.into()),
        }

        Ok(json)
    }

    /// Makes sure the thumbnail at `url` is cached and returns its identity.
    pub async fn cache_thumbnail(&self, url: &str) -> Result<String, FetchError> {
        let id = identity(url)?;

        if self.cache.get_image(&id).is_ok() {
            debug!("Thumbnail cache hit: {}", id);
            return Ok(id);
        }

        let data = self.download(url).await?;
        let image = tokio::task::spawn_blocking(move || CachedImage::decode(&data))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;

        match self.cache.put_image(&id, image, self.image_ttl) {
            Ok(()) => info!("Saved thumbnail {} from {}", id, url),
            Err(CacheError::AlreadyPresent { .. }) => debug!("Thumbnail {} cached concurrently", id),
            Err(e) => return Err(e.into()),
        }

        Ok(id)
    }

    /// Stable link under which the origin server serves a cached thumbnail.
    pub fn local_url(&self, id: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), id)
    }

    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        info!("Fetching upstream: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json, image/*;q=0.9, */*;q=0.8")
            .header("Connection", "keep-alive")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream request failed with status {}: {}", status, url);
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{sample_image, ImageFamily};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        let config = AppConfig {
            public_base_url: "https://cache.example/".to_string(),
            upstream_base_url: server.uri(),
            ..AppConfig::default()
        };
        UpstreamClient::new(&config, Arc::new(ResourceCache::new())).unwrap()
    }

    #[tokio::test]
    async fn thumbnails_are_fetched_once() {
        let server = MockServer::start().await;
        let png = sample_image(ImageFamily::Png).encode().unwrap();
        Mock::given(method("GET"))
            .and(path("/img/2024/3/17/77/thumb.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = format!("{}/img/2024/3/17/77/thumb.png", server.uri());

        assert_eq!(client.cache_thumbnail(&url).await.unwrap(), "77");
        assert_eq!(client.cache_thumbnail(&url).await.unwrap(), "77");
        assert_eq!(client.cache().get_image("77").unwrap().family(), ImageFamily::Png);
        assert_eq!(client.local_url("77"), "https://cache.example/77");
    }

    #[tokio::test]
    async fn bodies_are_cached_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/json/search/images"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"images":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = format!("{}/api/v1/json/search/images?q=pony", server.uri());

        let first = client.fetch_json(&url).await.unwrap();
        let second = client.fetch_json(&url).await.unwrap();
        assert_eq!(first, second);
        assert!(client.cache().has_body(&url));
    }

    #[tokio::test]
    async fn unparseable_bodies_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/json/search/images"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/json/search/images"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"images":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = format!("{}/api/v1/json/search/images?q=pony", server.uri());

        let first = client.fetch_json(&url).await;
        assert!(matches!(first, Err(FetchError::Json(_))));
        assert!(!client.cache().has_body(&url));

        let second = client.fetch_json(&url).await.unwrap();
        assert_eq!(second["images"], serde_json::json!([]));
        assert!(client.cache().has_body(&url));
    }

    #[tokio::test]
    async fn failures_leave_the_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/2024/3/17/78/thumb.png"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/2024/3/17/79/thumb.png"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let unavailable = client
            .cache_thumbnail(&format!("{}/img/2024/3/17/78/thumb.png", server.uri()))
            .await;
        assert!(matches!(unavailable, Err(FetchError::Status { status: 503, .. })));

        let corrupt = client
            .cache_thumbnail(&format!("{}/img/2024/3/17/79/thumb.png", server.uri()))
            .await;
        assert!(matches!(corrupt, Err(FetchError::Image(ImageError::Decode(_)))));

        assert_eq!(client.cache().entry_count(), 0);
    }
}
