pub mod auth;
pub mod common;
pub mod health;
pub mod locations;
pub mod maintenance_parts;
pub mod maintenances;
pub mod movements;
pub mod pieces;
pub mod reconciliations;
pub mod reports;
pub mod stock;
pub mod suppliers;
pub mod vehicles;

use axum::Router;

use crate::AppState;

/// Every route that needs a signed-in user. The session middleware is
/// applied by the caller.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/movements", movements::movement_routes())
        .nest("/stock", stock::stock_routes())
        .nest("/reconciliations", reconciliations::reconciliation_routes())
        .nest("/pieces", pieces::piece_routes())
        .nest("/locations", locations::location_routes())
        .nest("/suppliers", suppliers::supplier_routes())
        .nest("/reports", reports::report_routes())
        .nest("/vehicles", vehicles::vehicle_routes())
        .nest("/maintenances", maintenances::maintenance_routes())
        .nest(
            "/maintenance-parts",
            maintenance_parts::maintenance_part_routes(),
        )
}
