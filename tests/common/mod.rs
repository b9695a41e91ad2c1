#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use fleetstock_api::{
    auth::{LoggedUser, Role},
    config::AppConfig,
    create_router, db,
    entities::{location, piece, stock_movement::MovementType},
    events::{self, EventSender},
    services::{
        ledger::RecordMovementInput, locations::LocationInput, pieces::NewPieceInput,
        users::{LoginInput, RegisterInput},
    },
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "segredo123";

/// Application state over a private SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

fn test_config(database_url: String) -> AppConfig {
    let mut cfg = AppConfig::new(
        database_url,
        "test_secret_key_for_testing_purposes_only_32chars".to_string(),
        "test".to_string(),
    );
    cfg.db_acquire_timeout_secs = 30;
    cfg
}

impl TestApp {
    /// In-memory database behind a single connection.
    pub async fn new() -> Self {
        let mut cfg = test_config("sqlite::memory:".to_string());
        // One connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        Self::with_config(cfg, None).await
    }

    /// Database file in a temporary directory, shared by `connections`
    /// pooled connections so transactions really overlap.
    pub async fn with_connection_pool(connections: u32) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("fleetstock.db").display()
        );
        let mut cfg = test_config(url);
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        Self::with_config(cfg, Some(dir)).await
    }

    async fn with_config(cfg: AppConfig, db_dir: Option<TempDir>) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));

        Self {
            router: create_router(state.clone()),
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// An identity for calling services directly. Services trust the caller,
    /// so no user row is needed.
    pub fn actor(&self, role: Role) -> LoggedUser {
        LoggedUser {
            id: Uuid::new_v4(),
            username: format!("{}-tester", role.as_ref().to_lowercase()),
            full_name: format!("Tester {}", role),
            role,
        }
    }

    pub async fn piece(&self, code: &str) -> piece::Model {
        self.state
            .pieces
            .create(
                NewPieceInput {
                    code: code.to_string(),
                    name: format!("Piece {}", code),
                    qr_code: None,
                    supplier_id: None,
                },
                &self.actor(Role::Administrador),
            )
            .await
            .expect("seed piece")
    }

    pub async fn location(&self, code: &str) -> location::Model {
        self.state
            .locations
            .create(
                LocationInput {
                    code: code.to_string(),
                    description: Some(format!("Shelf {}", code)),
                },
                &self.actor(Role::Administrador),
            )
            .await
            .expect("seed location")
    }

    pub fn movement(
        piece_id: Uuid,
        location_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
    ) -> RecordMovementInput {
        RecordMovementInput {
            piece_id,
            location_id,
            quantity,
            movement_type,
            notes: None,
        }
    }

    pub async fn entrada(&self, piece_id: Uuid, location_id: Uuid, quantity: i32) {
        self.state
            .ledger
            .record_movement(
                Self::movement(piece_id, location_id, MovementType::Entrada, quantity),
                &self.actor(Role::Operador),
            )
            .await
            .expect("seed entrada");
    }

    /// Registers the first administrator (open while no user exists).
    pub async fn bootstrap_admin(&self) -> String {
        self.state
            .users
            .register(
                RegisterInput {
                    full_name: "Ana Administradora".into(),
                    username: "admin".into(),
                    password: TEST_PASSWORD.into(),
                    confirm_password: TEST_PASSWORD.into(),
                    role: Role::Administrador,
                },
                None,
            )
            .await
            .expect("bootstrap admin");
        self.login("admin").await
    }

    /// Registers `username` with `role` on behalf of an administrator and
    /// returns a session token for them.
    pub async fn user_token(&self, username: &str, role: Role) -> String {
        self.state
            .users
            .register(
                RegisterInput {
                    full_name: format!("User {}", username),
                    username: username.into(),
                    password: TEST_PASSWORD.into(),
                    confirm_password: TEST_PASSWORD.into(),
                    role,
                },
                Some(&self.actor(Role::Administrador)),
            )
            .await
            .expect("register user");
        self.login(username).await
    }

    pub async fn login(&self, username: &str) -> String {
        self.state
            .users
            .authenticate(LoginInput {
                username: username.into(),
                password: TEST_PASSWORD.into(),
            })
            .await
            .expect("login")
            .token
    }

    /// Sends one request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}
