pub mod booru;

pub use booru::{InlineQuery, QueryShape, SearchHit, SearchResponse};
