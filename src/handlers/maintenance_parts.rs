use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{created_response, success_response, validate_input};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::maintenance_parts::{MaintenancePartInput, PartImportRow, PartSearch},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<PartImportRow>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: String,
}

async fn search_parts(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(criteria): Query<PartSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.maintenance_parts.search(criteria).await?))
}

async fn create_part(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<MaintenancePartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    validate_input(&payload)?;
    Ok(created_response(
        state.maintenance_parts.create(payload, &user).await?,
    ))
}

/// Active entries for the maintenance item autocomplete
async fn suggest_parts(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(params): Query<SuggestParams>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    let limit = state.config.search_result_limit;
    Ok(success_response(
        state.maintenance_parts.suggest(&params.q, limit).await?,
    ))
}

async fn deactivate_part(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(
        state.maintenance_parts.deactivate(id, &user).await?,
    ))
}

async fn export_parts(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.maintenance_parts.export().await?))
}

async fn import_parts(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(
        state.maintenance_parts.import(payload.rows, &user).await?,
    ))
}

pub fn maintenance_part_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_parts).post(create_part))
        .route("/suggest", get(suggest_parts))
        .route("/export", get(export_parts))
        .route("/import", post(import_parts))
        .route("/:id/deactivate", post(deactivate_part))
}
