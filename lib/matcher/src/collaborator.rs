//! Seams to the models the engine does not own
//!
//! OCR and image embedding run elsewhere (a local model, a sidecar service,
//! a test double). The engine only sees these traits.

use crate::query_image::QueryImage;
use crate::text::OcrReading;
use cardex_core::Vector;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding backend unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding backend returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unusable embedding: {0}")]
    Vector(#[from] cardex_core::Error),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR backend unavailable: {0}")]
    Unavailable(String),

    #[error("OCR backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Produces a unit-length image embedding, or fails without a partial vector
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn embed(&self, image: &QueryImage) -> Result<Vector, EmbeddingError>;
}

/// Recognizes printed text spans on a card photo
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &QueryImage) -> Result<OcrReading, OcrError>;
}
