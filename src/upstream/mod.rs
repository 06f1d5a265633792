mod client;
mod search;

pub use client::{FetchError, UpstreamClient};
pub use search::SearchService;
