mod error;
pub mod images;
pub mod inline;

pub use error::ApiError;
