mod common;

use assert_matches::assert_matches;
use common::TestApp;
use fleetstock_api::{
    auth::Role,
    entities::stock_movement::MovementType,
    errors::ServiceError,
    services::ledger::{ReconcileInput, RecordMovementInput},
};
use uuid::Uuid;

fn reconcile_input(piece_id: Uuid, location_id: Uuid, physical_count: i64) -> ReconcileInput {
    ReconcileInput {
        piece_id,
        location_id,
        physical_count,
        reason: "contagem manual".into(),
    }
}

#[tokio::test]
async fn entrada_then_saida_then_refused_withdrawal() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;

    // Scenario A
    let entrada = ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Entrada, 10),
            &alice,
        )
        .await
        .unwrap();
    assert_eq!(entrada.quantity, 10);
    assert_eq!(entrada.movement_type, MovementType::Entrada);
    assert_eq!(entrada.created_by, alice.username);
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 10);

    // Scenario B
    let saida = ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Saida, 4),
            &alice,
        )
        .await
        .unwrap();
    assert_eq!(saida.quantity, -4);
    assert_eq!(saida.movement_type, MovementType::Saida);
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 6);

    // Scenario C
    let err = ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Saida, 10),
            &alice,
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            available: 6,
            requested: 10
        }
    );
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 6);
}

#[tokio::test]
async fn reconcile_records_the_difference() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let bob = app.actor(Role::Supervisor);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 10).await;
    ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Saida, 4),
            &bob,
        )
        .await
        .unwrap();

    // Scenario D
    let outcome = ledger
        .reconcile(reconcile_input(p1.id, l1.id, 3), &bob)
        .await
        .unwrap();
    assert_eq!(outcome.previous_stock, 6);
    assert_eq!(outcome.difference, -3);
    assert_eq!(outcome.movement.quantity, -3);
    assert_eq!(outcome.movement.movement_type, MovementType::Saida);
    let notes = outcome.movement.notes.clone().unwrap();
    assert!(notes.starts_with("BATIMENTO: contagem manual."));
    assert!(notes.contains("Estoque anterior: 6, Contagem física: 3"));
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 3);

    // Counting more than the ledger holds records an entrada.
    let outcome = ledger
        .reconcile(reconcile_input(p1.id, l1.id, 8), &bob)
        .await
        .unwrap();
    assert_eq!(outcome.movement.quantity, 5);
    assert_eq!(outcome.movement.movement_type, MovementType::Entrada);
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 8);

    let history = ledger.reconciliation_history(None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].movement.id, outcome.movement.id);
    assert_eq!(history[0].piece_code.as_deref(), Some("FLT-001"));
    assert_eq!(history[0].location_code.as_deref(), Some("A-01"));
}

#[tokio::test]
async fn zero_difference_reconcile_writes_nothing() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let bob = app.actor(Role::Diretoria);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 7).await;

    let err = ledger
        .reconcile(reconcile_input(p1.id, l1.id, 7), &bob)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NoAdjustmentNeeded);
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 7);
    assert!(ledger.reconciliation_history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_rejects_negative_count_and_blank_reason() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let bob = app.actor(Role::Supervisor);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;

    let err = ledger
        .reconcile(reconcile_input(p1.id, l1.id, -1), &bob)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let mut input = reconcile_input(p1.id, l1.id, 4);
    input.reason = "   ".into();
    let err = ledger.reconcile(input, &bob).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 0);
}

#[tokio::test]
async fn withdrawal_of_exact_stock_empties_the_location() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    let l2 = app.location("A-02").await;
    app.entrada(p1.id, l1.id, 5).await;
    app.entrada(p1.id, l2.id, 4).await;

    ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Saida, 5),
            &alice,
        )
        .await
        .unwrap();
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 0);

    let err = ledger
        .record_movement(
            TestApp::movement(p1.id, l2.id, MovementType::Saida, 5),
            &alice,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available: 4, .. });
}

#[tokio::test]
async fn zero_and_negative_quantities_are_rejected() {
    let app = TestApp::new().await;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;

    for quantity in [0, -3] {
        let err = app
            .state
            .ledger
            .record_movement(
                TestApp::movement(p1.id, l1.id, MovementType::Entrada, quantity),
                &alice,
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }
    assert_eq!(app.state.ledger.current_stock(p1.id, l1.id).await.unwrap(), 0);
}

#[tokio::test]
async fn pairs_are_independent() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let p1 = app.piece("FLT-001").await;
    let p2 = app.piece("FLT-002").await;
    let l1 = app.location("A-01").await;
    let l2 = app.location("A-02").await;

    // Scenario E
    app.entrada(p1.id, l1.id, 10).await;
    assert_eq!(ledger.current_stock(p2.id, l2.id).await.unwrap(), 0);
    assert_eq!(ledger.current_stock(p1.id, l2.id).await.unwrap(), 0);
    assert_eq!(ledger.current_stock(p2.id, l1.id).await.unwrap(), 0);

    // Reads are repeatable.
    assert_eq!(
        ledger.current_stock(p1.id, l1.id).await.unwrap(),
        ledger.current_stock(p1.id, l1.id).await.unwrap()
    );
}

#[tokio::test]
async fn deleting_a_movement_restores_previous_stock() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let admin = app.actor(Role::Administrador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 3).await;

    let movement = ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Entrada, 9),
            &admin,
        )
        .await
        .unwrap();
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 12);

    let removed = ledger.delete_movement(movement.id, &admin).await.unwrap();
    assert_eq!(removed.id, movement.id);
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 3);

    let err = ledger.delete_movement(movement.id, &admin).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn batch_checks_running_totals() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 5).await;

    let inserted = ledger
        .record_movements(
            vec![
                TestApp::movement(p1.id, l1.id, MovementType::Saida, 3),
                TestApp::movement(p1.id, l1.id, MovementType::Entrada, 4),
                TestApp::movement(p1.id, l1.id, MovementType::Saida, 6),
            ],
            &alice,
        )
        .await
        .unwrap();
    assert_eq!(
        inserted.iter().map(|m| m.quantity).collect::<Vec<_>>(),
        vec![-3, 4, -6]
    );
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 0);
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let p2 = app.piece("FLT-002").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 5).await;

    // Each item alone fits the ledger, together they overdraw it.
    let err = ledger
        .record_movements(
            vec![
                TestApp::movement(p2.id, l1.id, MovementType::Entrada, 8),
                TestApp::movement(p1.id, l1.id, MovementType::Saida, 4),
                TestApp::movement(p1.id, l1.id, MovementType::Saida, 4),
            ],
            &alice,
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            available: 1,
            requested: 4
        }
    );
    assert_eq!(ledger.current_stock(p1.id, l1.id).await.unwrap(), 5);
    assert_eq!(ledger.current_stock(p2.id, l1.id).await.unwrap(), 0);

    let err = ledger
        .record_movements(
            vec![
                TestApp::movement(p1.id, l1.id, MovementType::Entrada, 1),
                TestApp::movement(p1.id, l1.id, MovementType::Entrada, 0),
            ],
            &alice,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.starts_with("item 2:"));

    let err = ledger.record_movements(Vec::new(), &alice).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn unknown_and_inactive_references_are_rejected() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let admin = app.actor(Role::Administrador);
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    let l2 = app.location("A-02").await;

    let err = ledger
        .record_movement(
            TestApp::movement(Uuid::new_v4(), l1.id, MovementType::Entrada, 1),
            &admin,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = ledger
        .record_movement(
            TestApp::movement(p1.id, Uuid::new_v4(), MovementType::Entrada, 1),
            &admin,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    app.state.locations.deactivate(l2.id, &admin).await.unwrap();
    let err = ledger
        .record_movement(
            TestApp::movement(p1.id, l2.id, MovementType::Entrada, 1),
            &admin,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.state.pieces.deactivate(p1.id, &admin).await.unwrap();
    let err = ledger
        .record_movement(
            TestApp::movement(p1.id, l1.id, MovementType::Entrada, 1),
            &admin,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn queued_withdrawals_stop_at_zero() {
    let app = TestApp::new().await;
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 10).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let ledger = app.state.ledger.clone();
        let actor = app.actor(Role::Operador);
        let input: RecordMovementInput =
            TestApp::movement(p1.id, l1.id, MovementType::Saida, 1);
        tasks.push(tokio::spawn(async move {
            ledger.record_movement(input, &actor).await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_matches!(
                e,
                ServiceError::InsufficientStock { .. } | ServiceError::Conflict(_)
            ),
        }
    }
    assert_eq!(succeeded, 10);
    assert_eq!(app.state.ledger.current_stock(p1.id, l1.id).await.unwrap(), 0);
}

#[tokio::test]
async fn overlapping_withdrawals_never_overdraw() {
    let app = TestApp::with_connection_pool(8).await;
    let p1 = app.piece("FLT-001").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 10).await;

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let ledger = app.state.ledger.clone();
        let actor = app.actor(Role::Operador);
        let input = TestApp::movement(p1.id, l1.id, MovementType::Saida, 1);
        tasks.push(tokio::spawn(async move {
            ledger.record_movement(input, &actor).await
        }));
    }

    let mut succeeded = 0i64;
    for task in tasks {
        match task.await.unwrap() {
            Ok(movement) => {
                assert_eq!(movement.quantity, -1);
                succeeded += 1;
            }
            Err(e) => assert_matches!(
                e,
                ServiceError::InsufficientStock { .. } | ServiceError::Conflict(_)
            ),
        }
    }

    let remaining = app.state.ledger.current_stock(p1.id, l1.id).await.unwrap();
    assert!(remaining >= 0);
    assert!(succeeded <= 10);
    assert_eq!(remaining, 10 - succeeded);
}

#[tokio::test]
async fn stock_by_location_keeps_emptied_locations() {
    let app = TestApp::new().await;
    let ledger = &app.state.ledger;
    let alice = app.actor(Role::Operador);
    let p1 = app.piece("FLT-001").await;
    let b = app.location("B-07").await;
    let a = app.location("A-01").await;
    app.entrada(p1.id, b.id, 4).await;
    app.entrada(p1.id, a.id, 2).await;
    ledger
        .record_movement(
            TestApp::movement(p1.id, a.id, MovementType::Saida, 2),
            &alice,
        )
        .await
        .unwrap();

    let rows = ledger.stock_by_location(p1.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].location_code, "A-01");
    assert_eq!(rows[0].quantity, 0);
    assert_eq!(rows[1].location_code, "B-07");
    assert_eq!(rows[1].quantity, 4);

    let summary = ledger.piece_stock_summary(p1.id).await.unwrap();
    assert_eq!(summary.total_stock, 4);
    assert_eq!(
        summary.primary_location.map(|l| l.code),
        Some("B-07".to_string())
    );
}

#[tokio::test]
async fn assigned_location_wins_over_busiest() {
    let app = TestApp::new().await;
    let admin = app.actor(Role::Administrador);
    let p1 = app.piece("FLT-001").await;
    let a = app.location("A-01").await;
    let c = app.location("C-03").await;
    app.entrada(p1.id, a.id, 9).await;

    app.state
        .pieces
        .update(
            p1.id,
            fleetstock_api::services::pieces::UpdatePieceInput {
                code: p1.code.clone(),
                name: p1.name.clone(),
                supplier_id: None,
                location_id: Some(c.id),
            },
            &admin,
        )
        .await
        .unwrap();

    let summary = app.state.ledger.piece_stock_summary(p1.id).await.unwrap();
    let primary = summary.primary_location.unwrap();
    assert_eq!(primary.code, "C-03");
    assert_eq!(summary.supplier_name, None);

    let fresh = app.piece("FLT-002").await;
    let summary = app.state.ledger.piece_stock_summary(fresh.id).await.unwrap();
    assert!(summary.primary_location.is_none());
    assert_eq!(summary.total_stock, 0);
}

#[tokio::test]
async fn movement_search_filters_by_piece_code_or_id() {
    let app = TestApp::new().await;
    let p1 = app.piece("FLT-001").await;
    let p2 = app.piece("OIL-200").await;
    let l1 = app.location("A-01").await;
    app.entrada(p1.id, l1.id, 1).await;
    app.entrada(p2.id, l1.id, 2).await;
    app.entrada(p2.id, l1.id, 3).await;
    let withdrawal = app
        .state
        .ledger
        .record_movement(
            TestApp::movement(p2.id, l1.id, MovementType::Saida, 4),
            &app.actor(Role::Operador),
        )
        .await
        .unwrap();

    let all = app.state.ledger.list_movements(None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|m| m.movement.is_consistent()));

    let exact = app
        .state
        .ledger
        .list_movements(Some(&format!(" {} ", withdrawal.id)))
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].movement.id, withdrawal.id);
    assert_eq!(exact[0].movement.quantity, -4);

    assert!(app
        .state
        .ledger
        .list_movements(Some(&Uuid::new_v4().to_string()))
        .await
        .unwrap()
        .is_empty());

    let oil = app.state.ledger.list_movements(Some("oil")).await.unwrap();
    assert_eq!(oil.len(), 3);
    assert!(oil.iter().all(|m| m.piece_code.as_deref() == Some("OIL-200")));

    assert!(app
        .state
        .ledger
        .list_movements(Some("zzz"))
        .await
        .unwrap()
        .is_empty());
}
