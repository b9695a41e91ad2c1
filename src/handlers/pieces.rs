use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::common::{created_response, success_response, validate_input};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::pieces::{NewPieceInput, PieceImportRow, UpdatePieceInput},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<PieceImportRow>,
}

async fn list_pieces(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.pieces.list_active().await?))
}

async fn create_piece(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<NewPieceInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    validate_input(&payload)?;
    let piece = state.pieces.create(payload, &user).await?;
    Ok(created_response(piece))
}

async fn search_pieces(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.pieces.search(&params.q).await?))
}

async fn find_by_qr_code(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.pieces.find_by_qr_code(&code).await?))
}

async fn get_piece(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.pieces.get(id).await?))
}

async fn update_piece(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePieceInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    validate_input(&payload)?;
    Ok(success_response(state.pieces.update(id, payload, &user).await?))
}

async fn deactivate_piece(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(state.pieces.deactivate(id, &user).await?))
}

/// Stock spread and usual location of a piece
async fn piece_summary(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.ledger.piece_stock_summary(id).await?))
}

async fn export_pieces(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(state.pieces.export().await?))
}

async fn import_pieces(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    let report = state.pieces.import(payload.rows, &user).await?;
    info!(imported = report.imported, "piece spreadsheet processed");
    Ok(success_response(report))
}

pub fn piece_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pieces).post(create_piece))
        .route("/search", get(search_pieces))
        .route("/export", get(export_pieces))
        .route("/import", post(import_pieces))
        .route("/qr/:code", get(find_by_qr_code))
        .route("/:id", get(get_piece).put(update_piece))
        .route("/:id/deactivate", post(deactivate_piece))
        .route("/:id/summary", get(piece_summary))
}
