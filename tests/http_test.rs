mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TEST_PASSWORD};
use fleetstock_api::auth::Role;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(Method::GET, "/api/v1/pieces", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app
        .request(Method::GET, "/api/v1/pieces", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_user_bootstraps_then_registration_closes() {
    let app = TestApp::new().await;
    let register = |username: &str, role: &str| {
        json!({
            "full_name": "Nova Pessoa",
            "username": username,
            "password": TEST_PASSWORD,
            "confirm_password": TEST_PASSWORD,
            "role": role,
        })
    };

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(register("chefe", "Operador")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(register("chefe", "Administrador")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "Administrador");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(register("intruso", "Administrador")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, session) = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "chefe", "password": TEST_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = session["token"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(&token),
            Some(register("chefe", "Operador")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, me) = app
        .request(Method::GET, "/api/v1/auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "chefe");
    assert!(me["capabilities"]
        .as_array()
        .unwrap()
        .contains(&json!("delete_movements")));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    app.bootstrap_admin().await;
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "admin", "password": "errada123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn movement_flow_over_http() {
    let app = TestApp::new().await;
    let admin = app.bootstrap_admin().await;
    let operador = app.user_token("joao", Role::Operador).await;

    let (status, piece) = app
        .request(
            Method::POST,
            "/api/v1/pieces",
            Some(&admin),
            Some(json!({"code": "flt-001", "name": "Filtro de óleo"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(piece["code"], "FLT-001");
    let piece_id = piece["id"].as_str().unwrap().to_string();

    let (status, location) = app
        .request(
            Method::POST,
            "/api/v1/locations",
            Some(&admin),
            Some(json!({"code": "A-01", "description": "Prateleira A"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let location_id = location["id"].as_str().unwrap().to_string();

    let movement = |kind: &str, quantity: i32| {
        json!({
            "piece_id": piece_id,
            "location_id": location_id,
            "quantity": quantity,
            "movement_type": kind,
        })
    };

    let (status, created) = app
        .request(
            Method::POST,
            "/api/v1/movements",
            Some(&operador),
            Some(movement("entrada", 10)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["quantity"], 10);
    assert_eq!(created["created_by"], "joao");

    let (status, refused) = app
        .request(
            Method::POST,
            "/api/v1/movements",
            Some(&operador),
            Some(movement("saida", 11)),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(refused["available"], 10);

    let (status, stock) = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/{}/{}", piece_id, location_id),
            Some(&operador),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["quantity"], 10);

    // Operators may not reconcile or delete.
    let reconcile = json!({
        "piece_id": piece_id,
        "location_id": location_id,
        "physical_count": 7,
        "reason": "inventário mensal",
    });
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/reconciliations",
            Some(&operador),
            Some(reconcile.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let supervisor = app.user_token("maria", Role::Supervisor).await;
    let (status, outcome) = app
        .request(
            Method::POST,
            "/api/v1/reconciliations",
            Some(&supervisor),
            Some(reconcile.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["difference"], -3);
    let correction_id = outcome["movement"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/reconciliations",
            Some(&supervisor),
            Some(reconcile),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let delete_uri = format!("/api/v1/movements/{}", correction_id);
    let (status, _) = app
        .request(Method::DELETE, &delete_uri, Some(&supervisor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .request(Method::DELETE, &delete_uri, Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, summary) = app
        .request(
            Method::GET,
            &format!("/api/v1/pieces/{}/summary", piece_id),
            Some(&operador),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_stock"], 10);
    assert_eq!(summary["primary_location"]["code"], "A-01");

    let (status, report) = app
        .request(
            Method::GET,
            "/api/v1/reports/movements?piece=flt&movement_type=entrada",
            Some(&supervisor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["summary"]["total"], 1);

    let (status, _) = app
        .request(
            Method::GET,
            "/api/v1/reports/movements?page=18446744073709551615",
            Some(&supervisor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::GET,
            "/api/v1/reports/movements",
            Some(&operador),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_master_data_is_a_conflict() {
    let app = TestApp::new().await;
    let admin = app.bootstrap_admin().await;

    let supplier = json!({"name": "Bosch", "contact_info": "vendas@bosch.example"});
    let (status, _) = app
        .request(Method::POST, "/api/v1/suppliers", Some(&admin), Some(supplier.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app
        .request(Method::POST, "/api/v1/suppliers", Some(&admin), Some(supplier))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("Bosch"));

    let (status, found) = app
        .request(Method::GET, "/api/v1/pieces/search?q=x", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found, json!([]));
}

#[tokio::test]
async fn fleet_screens_belong_to_the_board() {
    let app = TestApp::new().await;
    let supervisor = app.user_token("supervisora", Role::Supervisor).await;
    let board = app.user_token("diretor", Role::Diretoria).await;

    let (status, _) = app
        .request(Method::GET, "/api/v1/vehicles", Some(&supervisor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let truck = json!({
        "branch": "Paraná",
        "plate": "abc1d23",
        "chassis": "9BWZZZ377VT004251",
        "brand": "Volvo",
        "model": "FH 540",
        "manufacture_year": 2021,
    });
    let (status, vehicle) = app
        .request(Method::POST, "/api/v1/vehicles", Some(&board), Some(truck))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(vehicle["plate"], "ABC1D23");

    let (status, part) = app
        .request(
            Method::POST,
            "/api/v1/maintenance-parts",
            Some(&board),
            Some(json!({
                "branch": "Paraná",
                "name": "Filtro de óleo",
                "unit_price": "45.90",
                "kind": "Peças",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(part["is_active"], true);

    let (status, suggestions) = app
        .request(
            Method::GET,
            "/api/v1/maintenance-parts/suggest?q=filtro",
            Some(&board),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suggestions.as_array().map(Vec::len), Some(1));

    let (status, recorded) = app
        .request(
            Method::POST,
            "/api/v1/maintenances",
            Some(&board),
            Some(json!({
                "branch": "Paraná",
                "title": "Troca de filtros",
                "maintenance_type": "Preventiva",
                "maintenance_date": "2025-03-10",
                "vehicle_plate": "ABC1D23",
                "items": [
                    {"quantity": 2, "item_name": "Filtro de óleo", "unit_price": "45.90"},
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(recorded["vehicle_plate"], "ABC1D23");
    assert_eq!(recorded["items"].as_array().map(Vec::len), Some(1));

    let id = recorded["id"].as_str().unwrap().to_string();
    let (status, loaded) = app
        .request(
            Method::GET,
            &format!("/api/v1/maintenances/{}", id),
            Some(&board),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["title"], "Troca de filtros");

    let (status, _) = app
        .request(Method::GET, "/api/v1/maintenance-parts", Some(&supervisor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn suppliers_export_as_rows() {
    let app = TestApp::new().await;
    let admin = app.bootstrap_admin().await;
    for name in ["Mann", "Bosch"] {
        let (status, _) = app
            .request(
                Method::POST,
                "/api/v1/suppliers",
                Some(&admin),
                Some(json!({"name": name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, rows) = app
        .request(Method::GET, "/api/v1/suppliers/export", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["name"], "Bosch");
    assert_eq!(rows[1]["name"], "Mann");
    assert_eq!(rows[0]["created_by"], "admin");
}
