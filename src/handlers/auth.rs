use axum::{
    extract::{Json, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use super::common::{created_response, success_response};
use crate::{
    auth::{Capability, LoggedUser},
    errors::ServiceError,
    services::users::{LoginInput, RegisterInput},
    AppState,
};

#[derive(Debug, Serialize)]
struct Me {
    #[serde(flatten)]
    user: LoggedUser,
    capabilities: Vec<Capability>,
}

/// Registers a user. Open while the user table is empty; afterwards the
/// bearer token of a user allowed to manage users is required.
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let actor = if headers.contains_key(axum::http::header::AUTHORIZATION) {
        Some(state.users.logged_user_from_headers(&headers).await?)
    } else {
        None
    };
    let created = state.users.register(payload, actor.as_ref()).await?;
    Ok(created_response(created))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.users.authenticate(payload).await?;
    Ok(success_response(session))
}

/// The caller and what their role allows.
async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.users.logged_user_from_headers(&headers).await?;
    let capabilities = user.role.capabilities();
    Ok(success_response(Me { user, capabilities }))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}
