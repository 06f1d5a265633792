mod tools;

pub use tools::{CachedImage, ImageError, ImageFamily};

#[cfg(test)]
pub(crate) use tools::tests::sample as sample_image;
