use std::io::Cursor;
use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::request::FromParam;
use rocket::response::{self, Responder, Response};
use rocket::{Request, State};

use crate::api::ApiError;
use crate::cache::ResourceCache;
use crate::images::{ImageError, ImageFamily};

pub struct ImageResponse {
    pub data: Vec<u8>,
    pub family: ImageFamily,
    pub max_age: u64,
}

impl<'r> Responder<'r, 'static> for ImageResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let content_type = match self.family {
            ImageFamily::Png => ContentType::PNG,
            ImageFamily::Jpeg => ContentType::JPEG,
            ImageFamily::Gif => ContentType::GIF,
        };
        let etag = format!("\"{:x}\"", md5::compute(&self.data));
        let cache_control = format!("public, max-age={}", self.max_age);

        if req.headers().get_one("If-None-Match") == Some(etag.as_str()) {
            return Response::build()
                .status(Status::NotModified)
                .header(Header::new("ETag", etag))
                .header(Header::new("Cache-Control", cache_control))
                .ok();
        }

        Response::build()
            .header(content_type)
            .header(Header::new("Cache-Control", cache_control))
            .header(Header::new("ETag", etag))
            .sized_body(None, Cursor::new(self.data))
            .ok()
    }
}

/// Post identity taken verbatim from the path, so `/0007` and `/7` stay
/// distinct keys.
pub struct PostId(String);

impl<'a> FromParam<'a> for PostId {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        if !param.is_empty() && param.bytes().all(|b| b.is_ascii_digit()) {
            Ok(PostId(param.to_string()))
        } else {
            Err(param)
        }
    }
}

/// Serves a cached thumbnail by post identity. Never fetches upstream.
#[get("/<id>")]
pub async fn get_image(id: PostId, cache: &State<Arc<ResourceCache>>) -> Result<ImageResponse, ApiError> {
    let PostId(key) = id;
    let image = cache.get_image(&key)?;
    let max_age = cache
        .image_expires_in(&key)
        .map(|remaining| remaining.as_secs())
        .unwrap_or(0);

    let family = image.family();
    let data = tokio::task::spawn_blocking(move || image.encode())
        .await
        .map_err(|e| ImageError::Encode(e.to_string()))??;

    Ok(ImageResponse {
        data,
        family,
        max_age,
    })
}
