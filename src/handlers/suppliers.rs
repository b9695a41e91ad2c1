use axum::{
    extract::{Json, Path, State},
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
    services::suppliers::{SupplierImportRow, SupplierInput},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<SupplierImportRow>,
}

async fn list_suppliers(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.suppliers.list_active().await?))
}

async fn create_supplier(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<SupplierInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    validate_input(&payload)?;
    Ok(created_response(state.suppliers.create(payload, &user).await?))
}

/// Supplier with its active piece count
async fn get_supplier(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.suppliers.details(id).await?))
}

async fn update_supplier(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    validate_input(&payload)?;
    Ok(success_response(
        state.suppliers.update(id, payload, &user).await?,
    ))
}

async fn deactivate_supplier(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(state.suppliers.deactivate(id, &user).await?))
}

async fn export_suppliers(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(state.suppliers.export().await?))
}

async fn import_suppliers(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(
        state.suppliers.import(payload.rows, &user).await?,
    ))
}

pub fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route("/import", post(import_suppliers))
        .route("/export", get(export_suppliers))
        .route("/:id", get(get_supplier).put(update_supplier))
        .route("/:id/deactivate", post(deactivate_supplier))
}
