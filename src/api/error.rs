use log::{error, warn};
use rocket::http::{ContentType, Status};
use serde_json::json;

use crate::cache::CacheError;
use crate::images::ImageError;
use crate::upstream::FetchError;

#[derive(Debug)]
pub enum ApiError {
    CacheError(CacheError),
    ImageError(ImageError),
    FetchError(FetchError),
}

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        ApiError::CacheError(error)
    }
}

impl From<ImageError> for ApiError {
    fn from(error: ImageError) -> Self {
        ApiError::ImageError(error)
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        ApiError::FetchError(error)
    }
}

fn plain(status: Status, message: String) -> rocket::response::Result<'static> {
    rocket::Response::build()
        .status(status)
        .header(ContentType::Plain)
        .sized_body(None, std::io::Cursor::new(message))
        .ok()
}

fn json_error(status: Status, error: &str, message: String) -> rocket::response::Result<'static> {
    let body = json!({
        "error": error,
        "message": message
    })
    .to_string();

    rocket::Response::build()
        .status(status)
        .header(ContentType::JSON)
        .sized_body(None, std::io::Cursor::new(body))
        .ok()
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        match self {
            ApiError::CacheError(error) => {
                warn!("{} {}: {}", request.method(), request.uri(), error);
                plain(
                    Status::InternalServerError,
                    format!("Error getting image from cache: {}", error),
                )
            }
            ApiError::ImageError(error) => {
                error!("{} {}: {}", request.method(), request.uri(), error);
                plain(
                    Status::InternalServerError,
                    format!("Error encoding image: {}", error),
                )
            }
            ApiError::FetchError(error @ FetchError::Identity(_))
            | ApiError::FetchError(error @ FetchError::InvalidUrl { .. }) => {
                warn!("{} {}: {}", request.method(), request.uri(), error);
                json_error(Status::BadRequest, "Unusable link", error.to_string())
            }
            ApiError::FetchError(error @ FetchError::Network(_))
            | ApiError::FetchError(error @ FetchError::Status { .. }) => {
                error!("{} {}: {}", request.method(), request.uri(), error);
                json_error(Status::BadGateway, "Upstream error", error.to_string())
            }
            ApiError::FetchError(error) => {
                error!("{} {}: {}", request.method(), request.uri(), error);
                json_error(
                    Status::InternalServerError,
                    "Search failed",
                    error.to_string(),
                )
            }
        }
    }
}
