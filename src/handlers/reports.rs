use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::common::success_response;
use crate::{
    auth::{Capability, LoggedUser},
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::reports::MovementReportFilter,
    AppState,
};

/// Query string of `GET /reports/movements`. Dates are `YYYY-MM-DD`.
#[derive(Debug, Default, Deserialize)]
pub struct MovementReportQuery {
    pub piece: Option<String>,
    pub location_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

async fn movement_report(
    State(state): State<AppState>,
    Extension(user): Extension<LoggedUser>,
    Query(query): Query<MovementReportQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require(Capability::ViewReports)?;
    let filter = MovementReportFilter {
        piece: query.piece,
        location_id: query.location_id,
        movement_type: query.movement_type,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let report = state
        .reports
        .movement_report(filter, query.page, query.per_page)
        .await?;
    Ok(success_response(report))
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/movements", get(movement_report))
}
