//! Cache keys derived from upstream URLs.
//!
//! Philomena boards (derpibooru, ponerpics, ...) serve every rendition of a
//! post under a dated path that embeds the post id:
//!
//! ```text
//! /img/2024/3/17/3312456/thumb.png
//! /img/view/2024/3/17/3312456.png
//! /img/download/2024/3/17/3312456__safe_artist-colon-foo.png
//! ```
//!
//! The id is what the origin server serves under, so every rendition of the
//! same post shares one identity.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use rocket::http::RawStr;
use thiserror::Error;

lazy_static! {
    static ref IMAGE_PATH: Regex =
        Regex::new(r"^/img/(?:view/|download/)?\d{4}/\d{1,2}/\d{1,2}/(\d+)(?:[/._]|$)").unwrap();
    static ref POST_PATH: Regex = Regex::new(r"^/(?:images/)?(\d+)/?$").unwrap();
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Malformed URL '{url}': {reason}")]
    Malformed { url: String, reason: String },

    #[error("URL '{0}' has no path")]
    EmptyPath(String),

    #[error("Unrecognised upstream path layout: {0}")]
    UnknownLayout(String),
}

/// Returns the post id embedded in an upstream image URL.
pub fn identity(url: &str) -> Result<String, IdentityError> {
    let path = decoded_path(url)?;

    let id = IMAGE_PATH
        .captures(&path)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string());

    id.ok_or(IdentityError::UnknownLayout(path))
}

/// Returns the post id of a direct post link such as
/// `https://derpibooru.org/images/3312456`.
pub fn post_identity(url: &str) -> Result<String, IdentityError> {
    let path = decoded_path(url)?;

    let id = POST_PATH
        .captures(&path)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string());

    id.ok_or(IdentityError::UnknownLayout(path))
}

fn decoded_path(url: &str) -> Result<String, IdentityError> {
    let parsed = Url::parse(url).map_err(|e| IdentityError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Err(IdentityError::EmptyPath(url.to_string()));
    }

    RawStr::new(path)
        .percent_decode()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| IdentityError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
}
