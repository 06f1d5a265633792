use reqwest::Url;
use serde::{Deserialize, Serialize};

/// What an inline query is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryShape {
    /// Empty text: the configured default feed.
    Default,
    /// A bare post URL.
    Link,
    /// Free-text tag search.
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineQuery {
    pub requester: String,
    pub text: String,
    #[serde(default)]
    pub offset: String,
}

impl InlineQuery {
    pub fn new(requester: impl Into<String>, text: impl Into<String>, offset: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            text: text.into(),
            offset: offset.into(),
        }
    }

    pub fn shape(&self) -> QueryShape {
        let text = self.text.trim();
        if text.is_empty() {
            return QueryShape::Default;
        }

        match Url::parse(text) {
            Ok(url) if url.has_host() && !url.scheme().is_empty() => QueryShape::Link,
            _ => QueryShape::Search,
        }
    }

    /// Upstream page number; an empty or unparsable offset is the first page.
    pub fn page(&self) -> u32 {
        self.offset
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }

    /// Whether this query asks for a further page of an earlier one.
    pub fn is_continuation(&self) -> bool {
        self.page() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: u64,
    pub thumb_url: String,
    pub view_url: String,
    pub source_url: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub next_offset: Option<String>,
}
