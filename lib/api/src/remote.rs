//! HTTP-backed OCR and embedding collaborators
//!
//! Both sidecars accept a PNG body and answer with JSON:
//! `{"texts": [...]}` for OCR and `{"embedding": [...]}` for the image model.
//! The clients are blocking; call them from `web::block` or a plain thread.

use cardex_core::Vector;
use cardex_matcher::{Embedder, EmbeddingError, OcrError, OcrReading, QueryImage, TextRecognizer};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a sidecar call produced no body to decode
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP client build failed: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Could not encode query image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("POST {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} from {url}")]
    Status { url: String, status: StatusCode },
}

impl From<RemoteError> for OcrError {
    fn from(e: RemoteError) -> Self {
        OcrError::Unavailable(e.to_string())
    }
}

impl From<RemoteError> for EmbeddingError {
    fn from(e: RemoteError) -> Self {
        EmbeddingError::Unavailable(e.to_string())
    }
}

#[derive(Deserialize)]
struct OcrResponse {
    texts: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

fn http_client() -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(RemoteError::Client)
}

fn ensure_success(status: StatusCode, url: &str) -> Result<(), RemoteError> {
    if !status.is_success() {
        return Err(RemoteError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(())
}

/// POST the image as PNG and return the raw response body
fn post_png(client: &Client, url: &str, image: &QueryImage) -> Result<Vec<u8>, RemoteError> {
    let transport = |source| RemoteError::Transport {
        url: url.to_string(),
        source,
    };

    let png = image.to_png()?;
    let resp: Response = client
        .post(url)
        .header(CONTENT_TYPE, "image/png")
        .body(png)
        .send()
        .map_err(transport)?;

    ensure_success(resp.status(), url)?;
    resp.bytes().map(|b| b.to_vec()).map_err(transport)
}

pub struct RemoteOcr {
    client: Client,
    url: String,
}

impl RemoteOcr {
    pub fn new(url: impl Into<String>) -> Result<Self, OcrError> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

impl TextRecognizer for RemoteOcr {
    fn recognize(&self, image: &QueryImage) -> Result<OcrReading, OcrError> {
        let body = post_png(&self.client, &self.url, image)?;
        let reading = decode_ocr(&body)?;
        debug!("OCR returned {} spans", reading.spans.len());
        Ok(reading)
    }
}

pub struct RemoteEmbedder {
    client: Client,
    url: String,
    model_name: String,
    dim: usize,
}

impl RemoteEmbedder {
    pub fn new(url: impl Into<String>, model_name: impl Into<String>, dim: usize) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
            model_name: model_name.into(),
            dim,
        })
    }
}

impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, image: &QueryImage) -> Result<Vector, EmbeddingError> {
        let body = post_png(&self.client, &self.url, image)?;
        decode_embedding(&body, self.dim)
    }
}

pub fn decode_ocr(body: &[u8]) -> Result<OcrReading, OcrError> {
    let resp: OcrResponse =
        serde_json::from_slice(body).map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
    Ok(OcrReading::from_spans(resp.texts))
}

/// Parse and normalize an embedding, rejecting the wrong dimension
pub fn decode_embedding(body: &[u8], dim: usize) -> Result<Vector, EmbeddingError> {
    let resp: EmbeddingResponse =
        serde_json::from_slice(body).map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
    if resp.embedding.len() != dim {
        return Err(cardex_core::Error::InvalidDimension {
            expected: dim,
            actual: resp.embedding.len(),
        }
        .into());
    }
    Ok(Vector::new(resp.embedding).normalized()?)
}
