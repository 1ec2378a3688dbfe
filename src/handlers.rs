use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::analysis::AnalysisEngine;
use crate::config::Config;
use crate::db_storage::AnalysisStorage;
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::parser::RawDocument;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Parser, calculator and narrative chain.
    pub engine: Arc<AnalysisEngine>,
}

/// Routes under rate limiting. `/health` is mounted separately.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/smes", post(create_sme).get(list_smes))
        .route("/smes/:id", get(get_sme))
        .route("/smes/:id/analyze", post(analyze_financials))
        .route("/smes/:id/latest-analysis", get(latest_analysis))
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the SME Financial Health Assessment API"
    }))
}

/// Health check endpoint.
///
/// Also lists which narrative providers have usable credentials; an empty
/// list means every narrative comes from the rule-based fallback.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "sme-health-api",
            "version": env!("CARGO_PKG_VERSION"),
            "narrative_providers": state.engine.chain().available_providers(),
        })),
    )
}

/// POST /smes
pub async fn create_sme(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SmeCreate>,
) -> Result<Json<Sme>, AppError> {
    input.validate().map_err(AppError::BadRequest)?;

    let storage = AnalysisStorage::new(state.db.clone());
    let sme = storage.create_sme(&input).await?;
    Ok(Json(sme))
}

/// GET /smes?skip=&limit=
pub async fn list_smes(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Sme>>, AppError> {
    let storage = AnalysisStorage::new(state.db.clone());
    Ok(Json(storage.list_smes(&page).await?))
}

async fn load_sme(storage: &AnalysisStorage, id: Uuid) -> Result<Sme, AppError> {
    storage
        .get_sme(id)
        .await?
        .ok_or_else(|| AppError::NotFound("SME not found".to_string()))
}

/// GET /smes/:id
pub async fn get_sme(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Sme>, AppError> {
    let storage = AnalysisStorage::new(state.db.clone());
    Ok(Json(load_sme(&storage, id).await?))
}

/// An uploaded file taken from a multipart body.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::BadRequest(
        "Missing 'file' field in multipart body".to_string(),
    ))
}

/// POST /smes/:id/analyze
///
/// Runs the analysis pipeline on the uploaded statement and stores the
/// records, metrics and insight together.
///
/// Unknown SMEs are 404. Missing files, unsupported extensions and
/// unreadable documents are 400 and are rejected before any narrative
/// provider is contacted.
pub async fn analyze_financials(
    State(state): State<Arc<AppState>>,
    Path(sme_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let storage = AnalysisStorage::new(state.db.clone());
    let sme = load_sme(&storage, sme_id).await?;

    let upload = read_upload(multipart).await?;
    tracing::info!(
        "POST /smes/{}/analyze - file: {} ({} bytes)",
        sme_id,
        upload.file_name,
        upload.bytes.len()
    );

    let document = RawDocument::from_upload(&upload.file_name, &upload.bytes)?;
    let report = state
        .engine
        .analyze_document(document, &sme.industry)
        .await?;

    let statement_id = storage
        .store_analysis(sme_id, &upload.file_name, &report)
        .await
        .context("Failed to persist analysis")?;

    Ok(Json(AnalysisResponse {
        status: "success",
        statement_id,
        data_source: report.data_source,
        narrative_source: report.narrative_source,
        metrics: report.metrics,
        ai_insights: report.insight,
    }))
}

/// GET /smes/:id/latest-analysis
pub async fn latest_analysis(
    State(state): State<Arc<AppState>>,
    Path(sme_id): Path<Uuid>,
) -> Result<Json<LatestAnalysisResponse>, AppError> {
    let storage = AnalysisStorage::new(state.db.clone());

    let response = match storage.latest_analysis(sme_id).await? {
        Some(stored) => LatestAnalysisResponse::from(stored),
        None => LatestAnalysisResponse::no_data(),
    };
    Ok(Json(response))
}
