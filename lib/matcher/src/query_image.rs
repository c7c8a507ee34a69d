//! Decoded query photographs

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// The uploaded photo could not be turned into pixels
#[derive(Error, Debug)]
pub enum MalformedImage {
    #[error("Image payload is empty")]
    Empty,

    #[error("Unreadable image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A decoded photo of a card, ready for OCR and embedding
#[derive(Debug, Clone)]
pub struct QueryImage {
    image: DynamicImage,
}

impl QueryImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedImage> {
        if bytes.is_empty() {
            return Err(MalformedImage::Empty);
        }
        let image = image::load_from_memory(bytes)?;
        Ok(Self { image })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MalformedImage> {
        let image = image::open(path)?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }

    /// Re-encode as an RGB PNG, the format remote collaborators accept
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.image.to_rgb8()).write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

impl From<DynamicImage> for QueryImage {
    fn from(image: DynamicImage) -> Self {
        Self { image }
    }
}
