use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;

const JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image decoding error: {0}")]
    Decode(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image encoding error: {0}")]
    Encode(String),
}

/// Encodings thumbnails can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFamily {
    Png,
    Jpeg,
    Gif,
}

impl ImageFamily {
    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageFamily::Png),
            ImageFormat::Jpeg => Some(ImageFamily::Jpeg),
            ImageFormat::Gif => Some(ImageFamily::Gif),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFamily::Png => "image/png",
            ImageFamily::Jpeg => "image/jpeg",
            ImageFamily::Gif => "image/gif",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            ImageFamily::Png => ImageFormat::Png,
            ImageFamily::Jpeg => ImageFormat::Jpeg,
            ImageFamily::Gif => ImageFormat::Gif,
        }
    }
}

/// A decoded thumbnail together with the encoding it was fetched in.
#[derive(Debug, Clone)]
pub struct CachedImage {
    image: DynamicImage,
    family: ImageFamily,
}

impl CachedImage {
    pub fn new(image: DynamicImage, family: ImageFamily) -> Self {
        Self { image, family }
    }

    /// Sniffs the encoding from the magic bytes and decodes with it.
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let format = image::guess_format(data)
            .map_err(|e| ImageError::Decode(format!("Failed to detect format: {}", e)))?;

        let family = ImageFamily::from_format(format)
            .ok_or_else(|| ImageError::UnsupportedFormat(format!("{:?}", format)))?;

        let image = image::load_from_memory_with_format(data, format)
            .map_err(|e| ImageError::Decode(format!("Failed to load image: {}", e)))?;

        Ok(Self { image, family })
    }

    /// Re-encodes the image in its original family.
    pub fn encode(&self) -> Result<Vec<u8>, ImageError> {
        let mut output = Vec::new();

        match self.family {
            ImageFamily::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
                encoder
                    .encode_image(&self.image)
                    .map_err(|e| ImageError::Encode(format!("JPEG encoding failed: {}", e)))?;
            }
            family => {
                self.image
                    .write_to(&mut Cursor::new(&mut output), family.image_format())
                    .map_err(|e| {
                        ImageError::Encode(format!("{:?} encoding failed: {}", family, e))
                    })?;
            }
        }

        Ok(output)
    }

    pub fn family(&self) -> ImageFamily {
        self.family
    }

    pub fn content_type(&self) -> &'static str {
        self.family.content_type()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
