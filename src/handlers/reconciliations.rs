use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::post,
    Extension, Router,
};

use super::common::{created_response, success_response, LimitParams};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::ledger::ReconcileInput,
    AppState,
};

/// Align a location with a physical count
async fn reconcile(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Json(payload): Json<ReconcileInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ReconcileStock)?;
    let outcome = state.ledger.reconcile(payload, &user).await?;
    Ok(created_response(outcome))
}

async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ReconcileStock)?;
    let rows = state.ledger.reconciliation_history(params.limit).await?;
    Ok(success_response(rows))
}

pub fn reconciliation_routes() -> Router<AppState> {
    Router::new().route("/", post(reconcile).get(history))
}
