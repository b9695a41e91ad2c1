use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response, validate_input};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::maintenances::{MaintenanceSearch, NewMaintenanceInput},
    AppState,
};

async fn search_maintenances(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(criteria): Query<MaintenanceSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.maintenances.search(criteria).await?))
}

async fn record_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<NewMaintenanceInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    validate_input(&payload)?;
    Ok(created_response(
        state.maintenances.record(payload, &user).await?,
    ))
}

/// Maintenance with vehicle, supplier and items
async fn get_maintenance(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageFleet)?;
    Ok(success_response(state.maintenances.get(id).await?))
}

pub fn maintenance_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(search_maintenances).post(record_maintenance))
        .route("/:id", get(get_maintenance))
}
