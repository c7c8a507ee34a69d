use actix_cors::Cors;
use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer};
use bytes::{Bytes, BytesMut};
use cardex_core::CatalogEntry;
use cardex_matcher::{MatchOutcome, QueryImage, ScanError};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Multipart field carrying the photo
pub const CARD_IMAGE_FIELD: &str = "card_image";
pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 100;

#[derive(Deserialize)]
struct SimilarQuery {
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SimilarResult {
    similarity: f32,
    card_id: String,
    filename: String,
    card: Option<CatalogEntry>,
}

#[derive(Serialize)]
struct IndexInfo {
    model: String,
    dim: usize,
    entries: usize,
    image_type: String,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: AppState, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(banner))
        .route("/api/scan", web::post().to(scan_card))
        .route("/api/similar", web::post().to(similar_cards))
        .route("/api/cards/{id}", web::get().to(get_card))
        .route("/api/index", web::get().to(index_info));
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": message.into() }))
}

#[derive(Debug, Error)]
enum UploadError {
    #[error("Invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Image exceeds the {0} byte upload limit")]
    TooLarge(usize),
}

/// Read the `card_image` field; `Ok(None)` when the form has no such field
async fn read_card_image(mut payload: Multipart, limit: usize) -> Result<Option<Bytes>, UploadError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(CARD_IMAGE_FIELD) {
            continue;
        }
        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > limit {
                return Err(UploadError::TooLarge(limit));
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(Some(data.freeze()));
    }
    Ok(None)
}

async fn card_image_or_error(payload: Multipart, limit: usize) -> Result<Bytes, HttpResponse> {
    match read_card_image(payload, limit).await {
        Ok(Some(data)) => Ok(data),
        Ok(None) => Err(error_response(StatusCode::BAD_REQUEST, "No card_image file provided.")),
        Err(e) => {
            warn!("Rejected upload: {}", e);
            Err(error_response(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

async fn banner() -> HttpResponse {
    HttpResponse::Ok().body(format!(
        "Cardex card scanner v{} - POST a photo to /api/scan",
        env!("CARGO_PKG_VERSION")
    ))
}

async fn scan_card(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let data = match card_image_or_error(payload, state.max_upload_bytes).await {
        Ok(data) => data,
        Err(resp) => return resp,
    };

    let scan_id = Uuid::new_v4();
    let span = info_span!("scan", %scan_id);
    let engine = state.engine.clone();

    let result = web::block(move || -> Result<MatchOutcome, ScanError> {
        let _entered = span.enter();
        info!("Received image ({} bytes)", data.len());
        let image = QueryImage::decode(&data)?;
        engine.scan(&image)
    })
    .await;

    match result {
        Ok(Ok(MatchOutcome::Matched(decision))) => HttpResponse::Ok().json(&*decision),
        Ok(Ok(MatchOutcome::NoMatch(reason))) => {
            info!("Scan {} ended without a match: {}", scan_id, reason);
            HttpResponse::NotFound().json(json!({
                "error": "Could not find a matching card.",
                "detail": reason.to_string(),
            }))
        }
        Ok(Err(ScanError::MalformedInput(e))) => {
            warn!("Scan {} rejected: {}", scan_id, e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e)) => {
            error!("Scan {} failed: {}", scan_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Scan {} did not complete: {}", scan_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Scan worker failed")
        }
    }
}

async fn similar_cards(
    state: web::Data<AppState>,
    query: web::Query<SimilarQuery>,
    payload: Multipart,
) -> HttpResponse {
    let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
    let data = match card_image_or_error(payload, state.max_upload_bytes).await {
        Ok(data) => data,
        Err(resp) => return resp,
    };

    let engine = state.engine.clone();
    let result = web::block(move || -> Result<Vec<SimilarResult>, ScanError> {
        let image = QueryImage::decode(&data)?;
        let hits = engine.similar(&image, top_k)?;
        Ok(hits
            .into_iter()
            .map(|hit| SimilarResult {
                card: engine.catalog().get_entry(&hit.card_id).cloned(),
                similarity: hit.similarity,
                card_id: hit.card_id,
                filename: hit.filename,
            })
            .collect())
    })
    .await;

    match result {
        Ok(Ok(results)) => HttpResponse::Ok().json(results),
        Ok(Err(ScanError::MalformedInput(e))) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Ok(Err(e)) => {
            error!("Visual search failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Visual search did not complete: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Search worker failed")
        }
    }
}

async fn get_card(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match state.engine.catalog().get_entry(&id) {
        Some(card) => HttpResponse::Ok().json(card),
        None => error_response(StatusCode::NOT_FOUND, "Card not found"),
    }
}

async fn index_info(state: web::Data<AppState>) -> HttpResponse {
    let index = state.engine.index();
    HttpResponse::Ok().json(IndexInfo {
        model: index.model_name().to_string(),
        dim: index.dim(),
        entries: index.len(),
        image_type: state.image_type.clone(),
    })
}
