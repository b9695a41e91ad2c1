use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response, validate_input};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::locations::LocationInput,
    AppState,
};

async fn list_locations(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    Ok(success_response(state.locations.list_active().await?))
}

async fn create_location(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<LocationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    validate_input(&payload)?;
    Ok(created_response(state.locations.create(payload, &user).await?))
}

async fn deactivate_location(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ManageMasterData)?;
    Ok(success_response(state.locations.deactivate(id, &user).await?))
}

pub fn location_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route("/:id/deactivate", post(deactivate_location))
}
