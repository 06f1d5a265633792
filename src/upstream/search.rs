use futures::future::join_all;
use log::{debug, info, warn};
use reqwest::Url;
use serde_json::Value;

use crate::cache::post_identity;
use crate::config::AppConfig;
use crate::models::{InlineQuery, QueryShape, SearchHit, SearchResponse};
use crate::upstream::{FetchError, UpstreamClient};

// Sizes above which the upstream's smaller renditions are used instead.
const THUMB_SMALL_ABOVE: u64 = 3000;
const MEDIUM_VIEW_ABOVE: u64 = 2000;

pub struct SearchService {
    upstream: UpstreamClient,
    base_url: String,
    default_query: String,
    filter_id: Option<u64>,
}

impl SearchService {
    pub fn new(config: &AppConfig, upstream: UpstreamClient) -> Self {
        Self {
            upstream,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            default_query: config.default_query.clone(),
            filter_id: config.filter_id,
        }
    }

    /// Whether the upstream answer for `query` is already cached.
    pub fn is_cached(&self, query: &InlineQuery) -> bool {
        self.request_url(query)
            .map(|url| self.upstream.cache().has_body(&url))
            .unwrap_or(false)
    }

    /// Upstream API URL answering `query`. Its body is cached under this URL.
    pub fn request_url(&self, query: &InlineQuery) -> Result<String, FetchError> {
        let text = match query.shape() {
            QueryShape::Link => return self.post_url(query.text.trim()),
            QueryShape::Default => self.default_query.as_str(),
            QueryShape::Search => query.text.trim(),
        };

        let endpoint = format!("{}/api/v1/json/search/images", self.base_url);
        let mut params = vec![("q", text.to_string()), ("page", query.page().to_string())];
        if let Some(filter_id) = self.filter_id {
            params.push(("filter_id", filter_id.to_string()));
        }

        Url::parse_with_params(&endpoint, &params)
            .map(String::from)
            .map_err(|e| FetchError::InvalidUrl {
                url: endpoint,
                reason: e.to_string(),
            })
    }

    pub async fn run(&self, query: &InlineQuery) -> Result<SearchResponse, FetchError> {
        let url = self.request_url(query)?;
        let origin = Url::parse(&url).map_err(|e| FetchError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let json = self.upstream.fetch_json(&url).await?;

        let shape = query.shape();
        let posts: Vec<&Value> = match shape {
            QueryShape::Link => json.get("image").into_iter().collect(),
            _ => json
                .get("images")
                .and_then(Value::as_array)
                .map(|images| images.iter().collect())
                .unwrap_or_default(),
        };

        let posts: Vec<Post> = posts
            .into_iter()
            .filter_map(|post| Post::from_json(post, &origin))
            .filter(|post| !post.is_video())
            .collect();

        let thumbs = join_all(posts.iter().map(|post| self.local_thumb(post))).await;

        let hits: Vec<SearchHit> = posts
            .into_iter()
            .zip(thumbs)
            .map(|(post, thumb_url)| SearchHit {
                id: post.id,
                thumb_url,
                view_url: post.view_url,
                source_url: post.source_url,
                mime_type: post.mime_type,
            })
            .collect();

        info!("Answered {:?} query '{}' with {} hits", shape, query.text, hits.len());

        let next_offset = match shape {
            QueryShape::Link => None,
            _ if hits.is_empty() => None,
            _ => Some((query.page() + 1).to_string()),
        };

        Ok(SearchResponse { hits, next_offset })
    }

    async fn local_thumb(&self, post: &Post) -> String {
        match self.upstream.cache_thumbnail(&post.thumb_url).await {
            Ok(id) => self.upstream.local_url(&id),
            Err(e) => {
                warn!("Serving upstream thumbnail for post {}: {}", post.id, e);
                post.thumb_url.clone()
            }
        }
    }

    fn post_url(&self, link: &str) -> Result<String, FetchError> {
        let id = post_identity(link)?;
        let link = Url::parse(link).map_err(|e| FetchError::InvalidUrl {
            url: link.to_string(),
            reason: e.to_string(),
        })?;

        let host = link.host_str().unwrap_or_default();
        let url = match link.port() {
            Some(port) => format!("{}://{}:{}/api/v1/json/images/{}", link.scheme(), host, port, id),
            None => format!("{}://{}/api/v1/json/images/{}", link.scheme(), host, id),
        };
        debug!("Resolved post link {} to {}", link, url);
        Ok(url)
    }
}

/// The fields of an upstream post the answer needs, with links made absolute.
struct Post {
    id: u64,
    thumb_url: String,
    view_url: String,
    source_url: Option<String>,
    mime_type: Option<String>,
}

impl Post {
    fn from_json(post: &Value, origin: &Url) -> Option<Self> {
        let id = post.get("id")?.as_u64()?;
        let width = post.get("width").and_then(Value::as_u64).unwrap_or(0);
        let height = post.get("height").and_then(Value::as_u64).unwrap_or(0);
        let representations = post.get("representations")?;

        let rendition = |name: &str| {
            representations
                .get(name)
                .and_then(Value::as_str)
                .and_then(|link| origin.join(link).ok())
                .map(String::from)
        };

        let thumb_url = if width > THUMB_SMALL_ABOVE || height > THUMB_SMALL_ABOVE {
            rendition("thumb_small")
        } else {
            rendition("thumb")
        }?;

        let view_url = if width > MEDIUM_VIEW_ABOVE || height > MEDIUM_VIEW_ABOVE {
            rendition("medium")
        } else {
            rendition("full")
        }
        .unwrap_or_else(|| thumb_url.clone());

        let text = |name: &str| {
            post.get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };

        Some(Self {
            id,
            thumb_url,
            view_url,
            source_url: text("source_url"),
            mime_type: text("mime_type"),
        })
    }

    fn is_video(&self) -> bool {
        self.mime_type
            .as_deref()
            .map_or(false, |mime| mime.starts_with("video/"))
    }
}
