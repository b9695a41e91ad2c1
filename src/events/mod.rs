use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::MovementType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a committed write. The write already happened, so
    /// a closed channel is only worth a warning.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain facts published after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MovementRecorded {
        movement_id: Uuid,
        piece_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        movement_type: MovementType,
        created_by: String,
        at: DateTime<Utc>,
    },
    MovementsRecorded {
        movement_ids: Vec<Uuid>,
        created_by: String,
    },
    MovementDeleted {
        movement_id: Uuid,
        piece_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        deleted_by: String,
    },
    StockReconciled {
        movement_id: Uuid,
        piece_id: Uuid,
        location_id: Uuid,
        previous_stock: i64,
        physical_count: i64,
        reconciled_by: String,
    },
    PieceRegistered(Uuid),
    PieceDeactivated(Uuid),
    LocationRegistered(Uuid),
    LocationDeactivated(Uuid),
    SupplierRegistered(Uuid),
    SupplierDeactivated(Uuid),
    VehicleRegistered(Uuid),
    MaintenancePartRegistered(Uuid),
    MaintenancePartDeactivated(Uuid),
    MaintenanceRecorded {
        maintenance_id: Uuid,
        vehicle_id: Uuid,
        item_count: usize,
        total_value: Decimal,
        created_by: String,
    },
    UserRegistered {
        user_id: Uuid,
        username: String,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementRecorded {
                movement_id,
                piece_id,
                location_id,
                quantity,
                movement_type,
                created_by,
                ..
            } => {
                counter!("ledger.movements.recorded", 1, "type" => movement_type.to_string());
                info!(
                    %movement_id,
                    %piece_id,
                    %location_id,
                    quantity,
                    created_by = %created_by,
                    "stock movement recorded"
                );
            }
            Event::MovementsRecorded {
                movement_ids,
                created_by,
            } => {
                counter!("ledger.movements.recorded", movement_ids.len() as u64, "type" => "batch");
                info!(
                    count = movement_ids.len(),
                    created_by = %created_by,
                    "stock movement batch recorded"
                );
            }
            Event::MovementDeleted {
                movement_id,
                quantity,
                deleted_by,
                ..
            } => {
                counter!("ledger.movements.deleted", 1);
                warn!(
                    %movement_id,
                    quantity,
                    deleted_by = %deleted_by,
                    "stock movement removed by administrative correction"
                );
            }
            Event::StockReconciled {
                movement_id,
                previous_stock,
                physical_count,
                reconciled_by,
                ..
            } => {
                counter!("ledger.reconciliations", 1);
                info!(
                    %movement_id,
                    previous_stock,
                    physical_count,
                    reconciled_by = %reconciled_by,
                    "stock reconciled against physical count"
                );
            }
            Event::MaintenanceRecorded {
                maintenance_id,
                vehicle_id,
                item_count,
                total_value,
                created_by,
            } => {
                counter!("fleet.maintenances.recorded", 1);
                info!(
                    %maintenance_id,
                    %vehicle_id,
                    item_count,
                    %total_value,
                    created_by = %created_by,
                    "maintenance recorded"
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_once_the_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        drop(rx);

        assert!(sender.send(Event::PieceRegistered(Uuid::new_v4())).await.is_err());
        // Never panics or errors after a committed write.
        sender
            .send_or_log(Event::LocationRegistered(Uuid::new_v4()))
            .await;
    }

    #[tokio::test]
    async fn processor_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let worker = tokio::spawn(process_events(rx));

        sender
            .send(Event::MovementsRecorded {
                movement_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
                created_by: "alice".into(),
            })
            .await
            .unwrap();
        drop(sender);

        worker.await.unwrap();
    }
}
