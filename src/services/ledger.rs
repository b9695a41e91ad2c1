//! The stock ledger.
//!
//! Stock is never stored: the quantity of a piece at a location is the sum of
//! every movement recorded for that pair. Writes check the balance and insert
//! inside one transaction (see [`crate::db::begin_ledger_txn`]), so concurrent
//! withdrawals cannot overdraw a location.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::optional_text;
use crate::{
    auth::LoggedUser,
    db::begin_ledger_txn,
    entities::{
        location, piece,
        stock_movement::{self, MovementType},
        supplier,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Prefix every reconciliation note starts with.
pub const RECONCILIATION_TAG: &str = "BATIMENTO:";

/// Upper bound for the administrative movement search.
const MOVEMENT_SEARCH_LIMIT: u64 = 100;

/// A request to move stock in or out of a location.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecordMovementInput {
    pub piece_id: Uuid,
    pub location_id: Uuid,
    /// Unsigned amount; the direction comes from `movement_type`.
    pub quantity: i32,
    pub movement_type: MovementType,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ReconcileInput {
    pub piece_id: Uuid,
    pub location_id: Uuid,
    pub physical_count: i64,
    #[validate(length(max = 500))]
    pub reason: String,
}

/// Result of a reconciliation: the corrective movement and the numbers it
/// was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub movement: stock_movement::Model,
    pub previous_stock: i64,
    pub physical_count: i64,
    pub difference: i64,
}

/// Quantity of one piece at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStock {
    pub location_id: Uuid,
    pub location_code: String,
    pub location_description: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryLocation {
    pub location_id: Uuid,
    pub code: String,
    pub description: Option<String>,
}

/// Everything the "locate piece" screen shows for one piece.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceStockSummary {
    pub piece: piece::Model,
    pub supplier_name: Option<String>,
    pub stock_by_location: Vec<LocationStock>,
    pub total_stock: i64,
    pub primary_location: Option<PrimaryLocation>,
}

/// A movement joined with the display fields of its piece, location and
/// supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: stock_movement::Model,
    pub piece_code: Option<String>,
    pub piece_name: Option<String>,
    pub supplier_name: Option<String>,
    pub location_code: Option<String>,
    pub location_description: Option<String>,
}

/// Sums signed quantities. Widened to `i64` so long histories cannot overflow.
pub fn sum_quantities<I>(quantities: I) -> i64
where
    I: IntoIterator<Item = i32>,
{
    quantities.into_iter().map(i64::from).sum()
}

/// The location a piece is normally found at when none was assigned: the one
/// holding the most stock, first by code on ties. Empty locations never win.
pub fn busiest_location(rows: &[LocationStock]) -> Option<&LocationStock> {
    let mut best: Option<&LocationStock> = None;
    for row in rows {
        if row.quantity <= 0 {
            continue;
        }
        match best {
            Some(current)
                if row.quantity < current.quantity
                    || (row.quantity == current.quantity
                        && row.location_code >= current.location_code) => {}
            _ => best = Some(row),
        }
    }
    best
}

pub fn reconciliation_note(reason: &str, previous: i64, physical: i64) -> String {
    format!(
        "{} {}. Estoque anterior: {}, Contagem física: {}",
        RECONCILIATION_TAG, reason, previous, physical
    )
}

fn validate_movement(input: &RecordMovementInput) -> Result<(), ServiceError> {
    input.validate()?;
    if input.quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Current stock for a pair, read through whatever connection or
/// transaction the caller holds.
async fn stock_on<C>(conn: &C, piece_id: Uuid, location_id: Uuid) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let quantities: Vec<i32> = stock_movement::Entity::find()
        .select_only()
        .column(stock_movement::Column::Quantity)
        .filter(stock_movement::Column::PieceId.eq(piece_id))
        .filter(stock_movement::Column::LocationId.eq(location_id))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::from_txn)?;
    Ok(sum_quantities(quantities))
}

async fn active_piece<C>(conn: &C, piece_id: Uuid) -> Result<piece::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let piece = piece::Entity::find_by_id(piece_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_txn)?
        .ok_or_else(|| ServiceError::NotFound(format!("piece {} not found", piece_id)))?;
    if !piece.is_active {
        return Err(ServiceError::ValidationError(format!(
            "piece {} is inactive",
            piece.code
        )));
    }
    Ok(piece)
}

async fn active_location<C>(conn: &C, location_id: Uuid) -> Result<location::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let location = location::Entity::find_by_id(location_id)
        .one(conn)
        .await
        .map_err(ServiceError::from_txn)?
        .ok_or_else(|| ServiceError::NotFound(format!("location {} not found", location_id)))?;
    if !location.is_active {
        return Err(ServiceError::ValidationError(format!(
            "location {} is inactive",
            location.code
        )));
    }
    Ok(location)
}

/// Joins movements with their piece, location and supplier display fields.
pub(crate) async fn describe_movements<C>(
    conn: &C,
    movements: Vec<stock_movement::Model>,
) -> Result<Vec<MovementView>, ServiceError>
where
    C: ConnectionTrait,
{
    if movements.is_empty() {
        return Ok(Vec::new());
    }

    let piece_ids: HashSet<Uuid> = movements.iter().map(|m| m.piece_id).collect();
    let location_ids: HashSet<Uuid> = movements.iter().map(|m| m.location_id).collect();

    let pieces: HashMap<Uuid, piece::Model> = piece::Entity::find()
        .filter(piece::Column::Id.is_in(piece_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let supplier_ids: HashSet<Uuid> = pieces.values().filter_map(|p| p.supplier_id).collect();
    let suppliers: HashMap<Uuid, String> = if supplier_ids.is_empty() {
        HashMap::new()
    } else {
        supplier::Entity::find()
            .filter(supplier::Column::Id.is_in(supplier_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect()
    };

    let locations: HashMap<Uuid, location::Model> = location::Entity::find()
        .filter(location::Column::Id.is_in(location_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    Ok(movements
        .into_iter()
        .map(|movement| {
            let piece = pieces.get(&movement.piece_id);
            let location = locations.get(&movement.location_id);
            MovementView {
                piece_code: piece.map(|p| p.code.clone()),
                piece_name: piece.map(|p| p.name.clone()),
                supplier_name: piece
                    .and_then(|p| p.supplier_id)
                    .and_then(|id| suppliers.get(&id).cloned()),
                location_code: location.map(|l| l.code.clone()),
                location_description: location.and_then(|l| l.description.clone()),
                movement,
            }
        })
        .collect())
}

/// Service owning every read and write of stock movements.
#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    history_limit: u64,
}

impl LedgerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        history_limit: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            history_limit,
        }
    }

    /// Records a single `entrada` or `saida`.
    ///
    /// A `saida` larger than the current stock of the pair fails with
    /// [`ServiceError::InsufficientStock`] and writes nothing.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn record_movement(
        &self,
        input: RecordMovementInput,
        actor: &LoggedUser,
    ) -> Result<stock_movement::Model, ServiceError> {
        validate_movement(&input)?;

        let txn = begin_ledger_txn(&self.db).await?;
        let mut pending = HashMap::new();
        let inserted = match self.apply(&txn, &input, actor, None, &mut pending).await {
            Ok(model) => model,
            Err(e) => {
                rollback(txn).await;
                return Err(e);
            }
        };
        txn.commit().await.map_err(ServiceError::from_txn)?;

        info!(
            movement_id = %inserted.id,
            quantity = inserted.quantity,
            "movement recorded"
        );
        self.event_sender
            .send_or_log(Event::MovementRecorded {
                movement_id: inserted.id,
                piece_id: inserted.piece_id,
                location_id: inserted.location_id,
                quantity: inserted.quantity,
                movement_type: inserted.movement_type,
                created_by: inserted.created_by.clone(),
                at: inserted.created_at,
            })
            .await;

        Ok(inserted)
    }

    /// Records several movements at once, all or nothing.
    ///
    /// Each withdrawal is checked against the ledger plus the earlier items of
    /// the same batch for the same pair.
    #[instrument(skip(self, items, actor), fields(actor = %actor.username, items = items.len()))]
    pub async fn record_movements(
        &self,
        items: Vec<RecordMovementInput>,
        actor: &LoggedUser,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one movement is required".to_string(),
            ));
        }
        for (index, item) in items.iter().enumerate() {
            validate_movement(item).map_err(|e| match e {
                ServiceError::ValidationError(msg) => {
                    ServiceError::ValidationError(format!("item {}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }

        let txn = begin_ledger_txn(&self.db).await?;
        let mut pending: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        let mut inserted = Vec::with_capacity(items.len());
        for item in &items {
            match self.apply(&txn, item, actor, None, &mut pending).await {
                Ok(model) => inserted.push(model),
                Err(e) => {
                    rollback(txn).await;
                    return Err(e);
                }
            }
        }
        txn.commit().await.map_err(ServiceError::from_txn)?;

        info!(count = inserted.len(), "movement batch recorded");
        self.event_sender
            .send_or_log(Event::MovementsRecorded {
                movement_ids: inserted.iter().map(|m| m.id).collect(),
                created_by: actor.username.clone(),
            })
            .await;

        Ok(inserted)
    }

    /// Checks and inserts one movement inside `txn`. `pending` carries the
    /// signed quantities already inserted by this transaction per pair.
    async fn apply(
        &self,
        txn: &DatabaseTransaction,
        input: &RecordMovementInput,
        actor: &LoggedUser,
        notes: Option<String>,
        pending: &mut HashMap<(Uuid, Uuid), i64>,
    ) -> Result<stock_movement::Model, ServiceError> {
        active_piece(txn, input.piece_id).await?;
        active_location(txn, input.location_id).await?;

        let key = (input.piece_id, input.location_id);
        if input.movement_type == MovementType::Saida {
            let available = stock_on(txn, input.piece_id, input.location_id).await?
                + pending.get(&key).copied().unwrap_or(0);
            let requested = i64::from(input.quantity);
            if available < requested {
                counter!("ledger.insufficient_stock", 1);
                warn!(
                    piece_id = %input.piece_id,
                    location_id = %input.location_id,
                    available,
                    requested,
                    "withdrawal refused"
                );
                return Err(ServiceError::InsufficientStock {
                    available,
                    requested,
                });
            }
        }

        let quantity = input.movement_type.signed(input.quantity);
        let model = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            piece_id: Set(input.piece_id),
            location_id: Set(input.location_id),
            quantity: Set(quantity),
            movement_type: Set(input.movement_type),
            notes: Set(notes.or_else(|| optional_text(input.notes.clone()))),
            created_by: Set(actor.username.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
        .map_err(|e| {
            error!("Failed to insert stock movement: {}", e);
            ServiceError::from_txn(e)
        })?;

        *pending.entry(key).or_insert(0) += i64::from(quantity);
        Ok(model)
    }

    /// Sum of every movement for the pair; 0 when there are none.
    pub async fn current_stock(
        &self,
        piece_id: Uuid,
        location_id: Uuid,
    ) -> Result<i64, ServiceError> {
        stock_on(&*self.db, piece_id, location_id).await
    }

    /// Stock of a piece at every location it ever touched, including the ones
    /// now at zero, ordered by location code.
    pub async fn stock_by_location(&self, piece_id: Uuid) -> Result<Vec<LocationStock>, ServiceError> {
        let db = &*self.db;
        let rows: Vec<(Uuid, i32)> = stock_movement::Entity::find()
            .select_only()
            .column(stock_movement::Column::LocationId)
            .column(stock_movement::Column::Quantity)
            .filter(stock_movement::Column::PieceId.eq(piece_id))
            .into_tuple()
            .all(db)
            .await?;

        let mut totals: HashMap<Uuid, i64> = HashMap::new();
        for (location_id, quantity) in rows {
            *totals.entry(location_id).or_insert(0) += i64::from(quantity);
        }
        if totals.is_empty() {
            return Ok(Vec::new());
        }

        let locations = location::Entity::find()
            .filter(location::Column::Id.is_in(totals.keys().copied().collect::<Vec<_>>()))
            .all(db)
            .await?;

        // Keyed by (code, id) so equal codes can never collapse two rows.
        let mut ordered: BTreeMap<(String, Uuid), LocationStock> = BTreeMap::new();
        for loc in locations {
            let quantity = totals.get(&loc.id).copied().unwrap_or(0);
            ordered.insert(
                (loc.code.clone(), loc.id),
                LocationStock {
                    location_id: loc.id,
                    location_code: loc.code,
                    location_description: loc.description,
                    quantity,
                },
            );
        }
        Ok(ordered.into_values().collect())
    }

    /// Brings the ledger in line with a physical count by recording the
    /// difference as an `entrada` or `saida`.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn reconcile(
        &self,
        input: ReconcileInput,
        actor: &LoggedUser,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        input.validate()?;
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "a reason is required to reconcile stock".to_string(),
            ));
        }
        if input.physical_count < 0 {
            return Err(ServiceError::ValidationError(
                "physical count cannot be negative".to_string(),
            ));
        }

        let txn = begin_ledger_txn(&self.db).await?;
        let outcome = match self.reconcile_in(&txn, &input, &reason, actor).await {
            Ok(outcome) => outcome,
            Err(e) => {
                rollback(txn).await;
                return Err(e);
            }
        };
        txn.commit().await.map_err(ServiceError::from_txn)?;

        info!(
            movement_id = %outcome.movement.id,
            previous_stock = outcome.previous_stock,
            physical_count = outcome.physical_count,
            "stock reconciled"
        );
        self.event_sender
            .send_or_log(Event::StockReconciled {
                movement_id: outcome.movement.id,
                piece_id: input.piece_id,
                location_id: input.location_id,
                previous_stock: outcome.previous_stock,
                physical_count: outcome.physical_count,
                reconciled_by: actor.username.clone(),
            })
            .await;

        Ok(outcome)
    }

    async fn reconcile_in(
        &self,
        txn: &DatabaseTransaction,
        input: &ReconcileInput,
        reason: &str,
        actor: &LoggedUser,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        active_piece(txn, input.piece_id).await?;
        active_location(txn, input.location_id).await?;

        let previous = stock_on(txn, input.piece_id, input.location_id).await?;
        let difference = input.physical_count - previous;
        let movement_type =
            MovementType::for_quantity(difference).ok_or(ServiceError::NoAdjustmentNeeded)?;
        let magnitude = i32::try_from(difference.unsigned_abs()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "adjustment of {} is too large for a single movement",
                difference
            ))
        })?;

        let request = RecordMovementInput {
            piece_id: input.piece_id,
            location_id: input.location_id,
            quantity: magnitude,
            movement_type,
            notes: None,
        };
        let note = reconciliation_note(reason, previous, input.physical_count);
        let movement = self
            .apply(txn, &request, actor, Some(note), &mut HashMap::new())
            .await?;

        Ok(ReconciliationOutcome {
            movement,
            previous_stock: previous,
            physical_count: input.physical_count,
            difference,
        })
    }

    /// Most recent reconciliations, newest first.
    pub async fn reconciliation_history(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<MovementView>, ServiceError> {
        let db = &*self.db;
        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::Notes.starts_with(RECONCILIATION_TAG))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(limit.unwrap_or(self.history_limit))
            .all(db)
            .await?;
        describe_movements(db, movements).await
    }

    /// Movements for the correction screen, newest first. A term that parses
    /// as a movement id finds that exact row; any other term narrows to pieces
    /// whose code contains it.
    pub async fn list_movements(
        &self,
        term: Option<&str>,
    ) -> Result<Vec<MovementView>, ServiceError> {
        let db = &*self.db;
        let mut query = stock_movement::Entity::find();

        let term = term.map(str::trim).filter(|t| !t.is_empty());
        if let Some(movement_id) = term.and_then(|t| Uuid::parse_str(t).ok()) {
            query = query.filter(stock_movement::Column::Id.eq(movement_id));
        } else if let Some(term) = term {
            let piece_ids: Vec<Uuid> = piece::Entity::find()
                .select_only()
                .column(piece::Column::Id)
                .filter(piece::Column::Code.contains(term.to_uppercase()))
                .into_tuple()
                .all(db)
                .await?;
            if piece_ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(stock_movement::Column::PieceId.is_in(piece_ids));
        }

        let movements = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(MOVEMENT_SEARCH_LIMIT)
            .all(db)
            .await?;
        describe_movements(db, movements).await
    }

    /// Piece details with its stock spread and where it is normally kept.
    pub async fn piece_stock_summary(&self, piece_id: Uuid) -> Result<PieceStockSummary, ServiceError> {
        let db = &*self.db;
        let piece = piece::Entity::find_by_id(piece_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("piece {} not found", piece_id)))?;

        let supplier_name = match piece.supplier_id {
            Some(id) => supplier::Entity::find_by_id(id).one(db).await?.map(|s| s.name),
            None => None,
        };

        let stock_by_location = self.stock_by_location(piece_id).await?;
        let total_stock = stock_by_location.iter().map(|row| row.quantity).sum();

        let assigned = match piece.location_id {
            Some(id) => location::Entity::find_by_id(id).one(db).await?,
            None => None,
        };
        let primary_location = match assigned {
            Some(loc) => Some(PrimaryLocation {
                location_id: loc.id,
                code: loc.code,
                description: loc.description,
            }),
            None => busiest_location(&stock_by_location).map(|row| PrimaryLocation {
                location_id: row.location_id,
                code: row.location_code.clone(),
                description: row.location_description.clone(),
            }),
        };

        Ok(PieceStockSummary {
            piece,
            supplier_name,
            stock_by_location,
            total_stock,
            primary_location,
        })
    }

    /// Administrative correction: removes one movement for good. Stock is
    /// derived, so nothing else needs updating.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn delete_movement(
        &self,
        movement_id: Uuid,
        actor: &LoggedUser,
    ) -> Result<stock_movement::Model, ServiceError> {
        let db = &*self.db;
        let movement = stock_movement::Entity::find_by_id(movement_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("movement {} not found", movement_id))
            })?;

        let result = stock_movement::Entity::delete_by_id(movement_id)
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "movement {} not found",
                movement_id
            )));
        }

        warn!(
            %movement_id,
            quantity = movement.quantity,
            "movement deleted"
        );
        self.event_sender
            .send_or_log(Event::MovementDeleted {
                movement_id,
                piece_id: movement.piece_id,
                location_id: movement.location_id,
                quantity: movement.quantity,
                deleted_by: actor.username.clone(),
            })
            .await;

        Ok(movement)
    }
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        error!("Failed to roll back ledger transaction: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, quantity: i64) -> LocationStock {
        LocationStock {
            location_id: Uuid::new_v4(),
            location_code: code.to_string(),
            location_description: None,
            quantity,
        }
    }

    #[test]
    fn sums_signed_quantities() {
        assert_eq!(sum_quantities(Vec::<i32>::new()), 0);
        assert_eq!(sum_quantities(vec![10, -4]), 6);
        assert_eq!(sum_quantities(vec![i32::MAX, i32::MAX]), 2 * i64::from(i32::MAX));
    }

    #[test]
    fn busiest_location_prefers_largest_positive_stock() {
        let rows = vec![row("A-01", 2), row("B-07", 9), row("C-03", 0)];
        assert_eq!(busiest_location(&rows).unwrap().location_code, "B-07");
    }

    #[test]
    fn busiest_location_breaks_ties_by_code_order() {
        let rows = vec![row("A-01", 5), row("B-07", 5)];
        assert_eq!(busiest_location(&rows).unwrap().location_code, "A-01");
    }

    #[test]
    fn busiest_location_ignores_empty_and_negative_positions() {
        let rows = vec![row("A-01", 0), row("B-07", -2)];
        assert!(busiest_location(&rows).is_none());
    }

    #[test]
    fn reconciliation_note_records_both_counts() {
        assert_eq!(
            reconciliation_note("contagem manual", 6, 3),
            "BATIMENTO: contagem manual. Estoque anterior: 6, Contagem física: 3"
        );
    }

    #[test]
    fn zero_quantity_is_a_validation_error() {
        let input = RecordMovementInput {
            piece_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            quantity: 0,
            movement_type: MovementType::Entrada,
            notes: None,
        };
        assert!(matches!(
            validate_movement(&input),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
