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
    services::vehicles::{VehicleImportRow, VehicleInput, VehicleSearch},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<VehicleImportRow>,
}

async fn search_vehicles(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(criteria): Query<VehicleSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.vehicles.search(criteria).await?))
}

async fn create_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<VehicleInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    validate_input(&payload)?;
    Ok(created_response(state.vehicles.create(payload, &user).await?))
}

async fn get_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.vehicles.get(id).await?))
}

async fn update_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VehicleInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    validate_input(&payload)?;
    Ok(success_response(
        state.vehicles.update(id, payload, &user).await?,
    ))
}

/// Upserts by plate
async fn import_vehicles(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(
        state.vehicles.import(payload.rows, &user).await?,
    ))
}

pub fn vehicle_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_vehicles).post(create_vehicle))
        .route("/import", post(import_vehicles))
        .route("/:id", get(get_vehicle).put(update_vehicle))
}
