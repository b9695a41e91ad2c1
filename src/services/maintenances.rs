use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{
    like_pattern, optional_text, required,
    suppliers::SupplierService,
    vehicles::{normalize_plate, VehicleService},
};
use crate::{
    auth::LoggedUser,
    entities::{branch::Branch, maintenance, maintenance_item, supplier, vehicle},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceItemInput {
    pub quantity: i32,
    pub item_name: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewMaintenanceInput {
    pub branch: Branch,
    #[validate(length(max = 200))]
    pub title: String,
    #[validate(length(max = 100))]
    pub maintenance_type: String,
    #[validate(length(max = 50))]
    pub status: Option<String>,
    pub maintenance_date: NaiveDate,
    #[validate(length(max = 16))]
    pub vehicle_plate: String,
    #[validate(range(min = 0))]
    pub odometer: Option<i32>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 64))]
    pub nfe: Option<String>,
    #[validate(length(max = 64))]
    pub nfse: Option<String>,
    #[validate(length(max = 64))]
    pub service_order: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<MaintenanceItemInput>,
}

/// Search form of the maintenance screen. Dates are inclusive.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MaintenanceSearch {
    pub title: Option<String>,
    pub vehicle_plate: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceView {
    #[serde(flatten)]
    pub maintenance: maintenance::Model,
    pub vehicle_plate: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceDetails {
    #[serde(flatten)]
    pub view: MaintenanceView,
    pub supplier_name: Option<String>,
    pub items: Vec<maintenance_item::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PricedItem {
    quantity: i32,
    item_name: String,
    unit_price: Decimal,
    total: Decimal,
}

/// Checks every line and prices it. Lines are numbered from 1 in errors.
fn price_items(items: Vec<MaintenanceItemInput>) -> Result<Vec<PricedItem>, ServiceError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let line = index + 1;
            let item_name = item.item_name.trim().to_string();
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "item {}: quantity must be greater than zero",
                    line
                )));
            }
            if item_name.is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "item {}: name is required",
                    line
                )));
            }
            let unit_price = item.unit_price.round_dp(2);
            if unit_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "item {}: unit price must be greater than zero",
                    line
                )));
            }
            Ok(PricedItem {
                quantity: item.quantity,
                item_name,
                total: unit_price * Decimal::from(item.quantity),
                unit_price,
            })
        })
        .collect()
}

fn total_value(items: &[PricedItem]) -> Decimal {
    items.iter().map(|item| item.total).sum()
}

fn view(maintenance: maintenance::Model, vehicle: Option<&vehicle::Model>) -> MaintenanceView {
    MaintenanceView {
        vehicle_plate: vehicle.map(|v| v.plate.clone()),
        vehicle_brand: vehicle.map(|v| v.brand.clone()),
        vehicle_model: vehicle.map(|v| v.model.clone()),
        maintenance,
    }
}

#[derive(Clone)]
pub struct MaintenanceService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    vehicles: VehicleService,
    suppliers: SupplierService,
}

impl MaintenanceService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        vehicles: VehicleService,
        suppliers: SupplierService,
    ) -> Self {
        Self {
            db,
            event_sender,
            vehicles,
            suppliers,
        }
    }

    /// Records a maintenance with its items. The total is always the sum of
    /// the item totals; the header and its items are written together.
    #[instrument(skip(self, input, actor), fields(actor = %actor.username, plate = %input.vehicle_plate))]
    pub async fn record(
        &self,
        input: NewMaintenanceInput,
        actor: &LoggedUser,
    ) -> Result<MaintenanceDetails, ServiceError> {
        input.validate()?;
        let title = input.title.trim().to_string();
        let maintenance_type = input.maintenance_type.trim().to_string();
        let plate = normalize_plate(&input.vehicle_plate);
        required(&title, "title")?;
        required(&maintenance_type, "maintenance type")?;
        required(&plate, "vehicle plate")?;

        let vehicle = self.vehicles.find_by_plate(&plate).await?.ok_or_else(|| {
            ServiceError::ValidationError(format!("vehicle {} is not registered", plate))
        })?;
        let supplier = match input.supplier_id {
            Some(id) => {
                let supplier = self.suppliers.get(id).await?;
                if !supplier.is_active {
                    return Err(ServiceError::ValidationError(format!(
                        "supplier {} is inactive",
                        supplier.name
                    )));
                }
                Some(supplier)
            }
            None => None,
        };
        let items = price_items(input.items)?;
        let total = total_value(&items);

        let txn = self.db.begin().await?;
        let header = maintenance::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch: Set(input.branch),
            title: Set(title),
            maintenance_type: Set(maintenance_type),
            status: Set(optional_text(input.status)),
            maintenance_date: Set(input.maintenance_date),
            vehicle_id: Set(vehicle.id),
            odometer: Set(input.odometer),
            supplier_id: Set(supplier.as_ref().map(|s| s.id)),
            nfe: Set(optional_text(input.nfe)),
            nfse: Set(optional_text(input.nfse)),
            service_order: Set(optional_text(input.service_order)),
            description: Set(optional_text(input.description)),
            total_value: Set(total),
            created_by: Set(actor.username.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            let row = maintenance_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                maintenance_id: Set(header.id),
                quantity: Set(item.quantity),
                item_name: Set(item.item_name),
                unit_price: Set(item.unit_price),
                total: Set(item.total),
            }
            .insert(&txn)
            .await?;
            saved.push(row);
        }
        txn.commit().await?;

        info!(
            maintenance_id = %header.id,
            vehicle_id = %vehicle.id,
            total = %total,
            "maintenance recorded"
        );
        self.event_sender
            .send_or_log(Event::MaintenanceRecorded {
                maintenance_id: header.id,
                vehicle_id: vehicle.id,
                item_count: saved.len(),
                total_value: total,
                created_by: actor.username.clone(),
            })
            .await;

        Ok(MaintenanceDetails {
            view: view(header, Some(&vehicle)),
            supplier_name: supplier.map(|s| s.name),
            items: saved,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<MaintenanceDetails, ServiceError> {
        let db = &*self.db;
        let header = maintenance::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("maintenance {} not found", id)))?;

        let vehicle = vehicle::Entity::find_by_id(header.vehicle_id).one(db).await?;
        let supplier_name = match header.supplier_id {
            Some(supplier_id) => supplier::Entity::find_by_id(supplier_id)
                .one(db)
                .await?
                .map(|s| s.name),
            None => None,
        };
        let items = maintenance_item::Entity::find()
            .filter(maintenance_item::Column::MaintenanceId.eq(id))
            .order_by_asc(maintenance_item::Column::ItemName)
            .all(db)
            .await?;

        Ok(MaintenanceDetails {
            view: view(header, vehicle.as_ref()),
            supplier_name,
            items,
        })
    }

    /// Most recent maintenance date first.
    pub async fn search(
        &self,
        criteria: MaintenanceSearch,
    ) -> Result<Vec<MaintenanceView>, ServiceError> {
        if let (Some(from), Some(to)) = (criteria.date_from, criteria.date_to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }

        let db = &*self.db;
        let mut query = maintenance::Entity::find();

        if let Some(term) = optional_text(criteria.vehicle_plate) {
            let vehicle_ids: Vec<Uuid> = vehicle::Entity::find()
                .select_only()
                .column(vehicle::Column::Id)
                .filter(
                    Expr::expr(Func::lower(Expr::col(vehicle::Column::Plate)))
                        .like(like_pattern(&term).as_str()),
                )
                .into_tuple()
                .all(db)
                .await?;
            if vehicle_ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(maintenance::Column::VehicleId.is_in(vehicle_ids));
        }
        for (column, value) in [
            (maintenance::Column::Title, criteria.title),
            (maintenance::Column::Status, criteria.status),
        ] {
            if let Some(term) = optional_text(value) {
                query = query.filter(
                    Expr::expr(Func::lower(Expr::col(column))).like(like_pattern(&term).as_str()),
                );
            }
        }
        if let Some(from) = criteria.date_from {
            query = query.filter(maintenance::Column::MaintenanceDate.gte(from));
        }
        if let Some(to) = criteria.date_to {
            query = query.filter(maintenance::Column::MaintenanceDate.lte(to));
        }

        let maintenances = query
            .order_by_desc(maintenance::Column::MaintenanceDate)
            .order_by_desc(maintenance::Column::CreatedAt)
            .all(db)
            .await?;

        let vehicle_ids: Vec<Uuid> = maintenances.iter().map(|m| m.vehicle_id).collect();
        let vehicles: HashMap<Uuid, vehicle::Model> = if vehicle_ids.is_empty() {
            HashMap::new()
        } else {
            vehicle::Entity::find()
                .filter(vehicle::Column::Id.is_in(vehicle_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|v| (v.id, v))
                .collect()
        };

        Ok(maintenances
            .into_iter()
            .map(|m| {
                let vehicle = vehicles.get(&m.vehicle_id);
                view(m, vehicle)
            })
            .collect())
    }
}
