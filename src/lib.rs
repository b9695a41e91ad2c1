//! Fleet spare-parts stock ledger.
//!
//! Stock of every piece at every location is derived from an append-only log
//! of signed movements. This crate exposes the ledger, the master data around
//! it (pieces, locations, suppliers), a movement report and the fleet records
//! (vehicles, maintenances and their parts catalogue), both as services and
//! as a JSON API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use std::sync::Arc;

use axum::{http::HeaderValue, middleware, Router};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    auth::AuthService,
    config::AppConfig,
    events::EventSender,
    services::{
        ledger::LedgerService, locations::LocationService,
        maintenance_parts::MaintenancePartService, maintenances::MaintenanceService,
        pieces::PieceService, reports::ReportService, suppliers::SupplierService,
        users::UserService, vehicles::VehicleService,
    },
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub auth: Arc<AuthService>,
    pub ledger: LedgerService,
    pub pieces: PieceService,
    pub locations: LocationService,
    pub suppliers: SupplierService,
    pub reports: ReportService,
    pub users: UserService,
    pub vehicles: VehicleService,
    pub maintenances: MaintenanceService,
    pub maintenance_parts: MaintenancePartService,
}

impl AppState {
    /// Wires every service on top of one connection pool and event channel.
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, event_sender: EventSender) -> Self {
        let events = Arc::new(event_sender);
        let auth = Arc::new(AuthService::new(
            config.jwt_secret.clone(),
            config.jwt_expiration_secs,
        ));
        let suppliers = SupplierService::new(db.clone(), events.clone());
        let vehicles = VehicleService::new(db.clone(), events.clone());

        Self {
            ledger: LedgerService::new(
                db.clone(),
                events.clone(),
                config.reconciliation_history_limit,
            ),
            pieces: PieceService::new(
                db.clone(),
                events.clone(),
                suppliers.clone(),
                config.search_result_limit,
            ),
            locations: LocationService::new(db.clone(), events.clone()),
            reports: ReportService::new(db.clone(), config.report_page_size),
            maintenances: MaintenanceService::new(
                db.clone(),
                events.clone(),
                vehicles.clone(),
                suppliers.clone(),
            ),
            maintenance_parts: MaintenancePartService::new(db.clone(), events.clone()),
            users: UserService::new(db.clone(), events, auth.clone()),
            suppliers,
            vehicles,
            auth,
            db,
            config,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        info!("no CORS origins configured, allowing any origin");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Builds the full application router: `/health`, the open `/api/v1/auth`
/// routes and everything else behind the session middleware.
pub fn create_router(state: AppState) -> Router {
    let protected = handlers::protected_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::auth_middleware,
    ));

    let api = Router::new()
        .nest("/auth", handlers::auth::auth_routes())
        .merge(protected);

    Router::new()
        .nest("/health", handlers::health::health_routes())
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}
