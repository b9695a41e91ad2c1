use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, post},
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::ledger::RecordMovementInput,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct MovementSearch {
    /// Fragment of the piece code, or an exact movement id
    #[serde(alias = "q")]
    pub piece: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<RecordMovementInput>,
}

/// Record one entrada or saida
async fn record_movement(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<RecordMovementInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::RecordMovements)?;
    let movement = state.ledger.record_movement(payload, &user).await?;
    Ok(created_response(movement))
}

/// Record several movements in one transaction
async fn record_batch(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<BatchRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::RecordMovements)?;
    let movements = state.ledger.record_movements(payload.items, &user).await?;
    Ok(created_response(movements))
}

async fn list_movements(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(params): Query<MovementSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::DeleteMovements)?;
    let movements = state.ledger.list_movements(params.piece.as_deref()).await?;
    Ok(success_response(movements))
}

async fn delete_movement(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(movement_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::DeleteMovements)?;
    let removed = state.ledger.delete_movement(movement_id, &user).await?;
    Ok(success_response(removed))
}

pub fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(record_movement).get(list_movements))
        .route("/batch", post(record_batch))
        .route("/:id", delete(delete_movement))
}
