use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::common::success_response;
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    AppState,
};

#[derive(Debug, Serialize)]
struct StockPosition {
    piece_id: Uuid,
    location_id: Uuid,
    quantity: i64,
}

async fn current_stock(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path((piece_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    let quantity = state.ledger.current_stock(piece_id, location_id).await?;
    Ok(success_response(StockPosition {
        piece_id,
        location_id,
        quantity,
    }))
}

async fn stock_by_location(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Path(piece_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::LocatePieces)?;
    let rows = state.ledger.stock_by_location(piece_id).await?;
    Ok(success_response(rows))
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/:piece_id", get(stock_by_location))
        .route("/:piece_id/:location_id", get(current_stock))
}
