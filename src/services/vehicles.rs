use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, optional_text, required, ImportReport};
use crate::{
    auth::LoggedUser,
    entities::{branch::Branch, vehicle},
    errors::ServiceError,
    events::{Event, EventSender},
};

pub const DEFAULT_FLEET: &str = "Frota Padrão";
pub const DEFAULT_GROUP: &str = "Grupo Padrão";
pub const DEFAULT_STATUS: &str = "Ativo";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VehicleInput {
    pub branch: Branch,
    #[validate(length(max = 16))]
    pub plate: String,
    #[validate(length(max = 64))]
    pub chassis: String,
    #[validate(length(max = 100))]
    pub brand: String,
    #[validate(length(max = 100))]
    pub model: String,
    #[validate(length(max = 100))]
    pub fleet: Option<String>,
    #[validate(length(max = 100))]
    pub group: Option<String>,
    #[validate(range(min = 1900, max = 2100))]
    pub manufacture_year: i32,
    #[validate(length(max = 32))]
    pub status: Option<String>,
    #[validate(length(max = 200))]
    pub qr_code: Option<String>,
}

/// Search form of the fleet screen. Every filter is a case-insensitive
/// substring; blank filters are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VehicleSearch {
    pub plate: Option<String>,
    pub chassis: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub fleet: Option<String>,
    pub status: Option<String>,
    pub qr_code: Option<String>,
}

/// One spreadsheet row of the fleet import.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VehicleImportRow {
    pub branch: Option<String>,
    pub plate: Option<String>,
    pub chassis: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub fleet: Option<String>,
    pub group: Option<String>,
    pub manufacture_year: Option<i32>,
    pub status: Option<String>,
    pub qr_code: Option<String>,
}

/// Plates are compared and stored upper-cased.
pub fn normalize_plate(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Trimmed, defaulted column values of a vehicle.
struct VehicleFields {
    branch: Branch,
    plate: String,
    chassis: String,
    brand: String,
    model: String,
    fleet: String,
    group: String,
    manufacture_year: i32,
    status: String,
    qr_code: Option<String>,
}

impl VehicleFields {
    fn from_input(input: VehicleInput) -> Result<Self, ServiceError> {
        input.validate()?;
        let fields = Self {
            branch: input.branch,
            plate: normalize_plate(&input.plate),
            chassis: input.chassis.trim().to_uppercase(),
            brand: input.brand.trim().to_string(),
            model: input.model.trim().to_string(),
            fleet: optional_text(input.fleet).unwrap_or_else(|| DEFAULT_FLEET.to_string()),
            group: optional_text(input.group).unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            manufacture_year: input.manufacture_year,
            status: optional_text(input.status).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            qr_code: optional_text(input.qr_code),
        };
        required(&fields.plate, "plate")?;
        required(&fields.chassis, "chassis")?;
        required(&fields.brand, "brand")?;
        required(&fields.model, "model")?;
        Ok(fields)
    }

    fn apply(self, active: &mut vehicle::ActiveModel) {
        active.branch = Set(self.branch);
        active.plate = Set(self.plate);
        active.chassis = Set(self.chassis);
        active.brand = Set(self.brand);
        active.model = Set(self.model);
        active.fleet = Set(self.fleet);
        active.vehicle_group = Set(self.group);
        active.manufacture_year = Set(self.manufacture_year);
        active.status = Set(self.status);
        active.qr_code = Set(self.qr_code);
    }
}

impl VehicleImportRow {
    fn is_blank(&self) -> bool {
        [&self.branch, &self.plate, &self.chassis, &self.brand, &self.model]
            .iter()
            .all(|cell| cell.as_deref().map_or(true, |v| v.trim().is_empty()))
    }

    fn into_input(self) -> Result<VehicleInput, ServiceError> {
        let branch = match optional_text(self.branch) {
            Some(raw) => Branch::parse(&raw).ok_or_else(|| {
                ServiceError::ValidationError(format!("unknown branch {}", raw))
            })?,
            None => {
                return Err(ServiceError::ValidationError(
                    "branch is required".to_string(),
                ))
            }
        };
        let manufacture_year = self.manufacture_year.ok_or_else(|| {
            ServiceError::ValidationError("manufacture year is required".to_string())
        })?;
        Ok(VehicleInput {
            branch,
            plate: self.plate.unwrap_or_default(),
            chassis: self.chassis.unwrap_or_default(),
            brand: self.brand.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            fleet: self.fleet,
            group: self.group,
            manufacture_year,
            status: self.status,
            qr_code: self.qr_code,
        })
    }
}

#[derive(Clone)]
pub struct VehicleService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl VehicleService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn create(
        &self,
        input: VehicleInput,
        actor: &LoggedUser,
    ) -> Result<vehicle::Model, ServiceError> {
        let fields = VehicleFields::from_input(input)?;
        let created = self.insert(fields, actor).await?;

        info!(vehicle_id = %created.id, plate = %created.plate, "vehicle registered");
        self.event_sender
            .send_or_log(Event::VehicleRegistered(created.id))
            .await;
        Ok(created)
    }

    async fn insert(
        &self,
        fields: VehicleFields,
        actor: &LoggedUser,
    ) -> Result<vehicle::Model, ServiceError> {
        self.ensure_unique(&fields, None).await?;

        let duplicate = format!("vehicle {} already exists", fields.plate);
        let mut active = vehicle::ActiveModel {
            id: Set(Uuid::new_v4()),
            created_by: Set(actor.username.clone()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        };
        fields.apply(&mut active);
        active
            .insert(&*self.db)
            .await
            .map_err(|e| ServiceError::from_write(e, duplicate))
    }

    /// Plate and QR code must not belong to another vehicle.
    async fn ensure_unique(
        &self,
        fields: &VehicleFields,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = vehicle::Entity::find().filter(vehicle::Column::Plate.eq(fields.plate.as_str()));
        if let Some(id) = except {
            query = query.filter(vehicle::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Duplicate(format!(
                "vehicle {} already exists",
                fields.plate
            )));
        }

        if let Some(qr) = &fields.qr_code {
            let mut query = vehicle::Entity::find().filter(vehicle::Column::QrCode.eq(qr.as_str()));
            if let Some(id) = except {
                query = query.filter(vehicle::Column::Id.ne(id));
            }
            if query.one(&*self.db).await?.is_some() {
                return Err(ServiceError::Duplicate(format!(
                    "QR code {} is already assigned to another vehicle",
                    qr
                )));
            }
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<vehicle::Model, ServiceError> {
        vehicle::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("vehicle {} not found", id)))
    }

    pub async fn find_by_plate(&self, plate: &str) -> Result<Option<vehicle::Model>, ServiceError> {
        Ok(vehicle::Entity::find()
            .filter(vehicle::Column::Plate.eq(normalize_plate(plate)))
            .one(&*self.db)
            .await?)
    }

    /// Newest registrations first.
    pub async fn search(&self, criteria: VehicleSearch) -> Result<Vec<vehicle::Model>, ServiceError> {
        let filters = [
            (vehicle::Column::Plate, criteria.plate),
            (vehicle::Column::Chassis, criteria.chassis),
            (vehicle::Column::Brand, criteria.brand),
            (vehicle::Column::Model, criteria.model),
            (vehicle::Column::Fleet, criteria.fleet),
            (vehicle::Column::Status, criteria.status),
            (vehicle::Column::QrCode, criteria.qr_code),
        ];

        let mut query = vehicle::Entity::find();
        for (column, value) in filters {
            if let Some(term) = optional_text(value) {
                query = query.filter(
                    Expr::expr(Func::lower(Expr::col(column))).like(like_pattern(&term).as_str()),
                );
            }
        }

        Ok(query
            .order_by_desc(vehicle::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn update(
        &self,
        id: Uuid,
        input: VehicleInput,
        actor: &LoggedUser,
    ) -> Result<vehicle::Model, ServiceError> {
        let fields = VehicleFields::from_input(input)?;
        let existing = self.get(id).await?;
        self.overwrite(existing, fields).await
    }

    async fn overwrite(
        &self,
        existing: vehicle::Model,
        fields: VehicleFields,
    ) -> Result<vehicle::Model, ServiceError> {
        let id = existing.id;
        self.ensure_unique(&fields, Some(id)).await?;

        let duplicate = format!("vehicle {} already exists", fields.plate);
        let mut active: vehicle::ActiveModel = existing.into();
        fields.apply(&mut active);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(vehicle_id = %id, "vehicle updated");
        Ok(updated)
    }

    /// Imports the fleet spreadsheet. A row whose plate is already registered
    /// overwrites that vehicle, keeping who created it and when.
    #[instrument(skip(self, rows, actor), fields(actor = %actor.username, rows = rows.len()))]
    pub async fn import(
        &self,
        rows: Vec<VehicleImportRow>,
        actor: &LoggedUser,
    ) -> Result<ImportReport, ServiceError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.into_iter().enumerate() {
            if row.is_blank() {
                continue;
            }
            let fields = match row.into_input().and_then(VehicleFields::from_input) {
                Ok(fields) => fields,
                Err(e) => {
                    report.row_error(index, e);
                    continue;
                }
            };

            let outcome = match self.find_by_plate(&fields.plate).await? {
                Some(existing) => self.overwrite(existing, fields).await.map(|_| false),
                None => match self.insert(fields, actor).await {
                    Ok(created) => {
                        self.event_sender
                            .send_or_log(Event::VehicleRegistered(created.id))
                            .await;
                        Ok(true)
                    }
                    Err(e) => Err(e),
                },
            };
            match outcome {
                Ok(true) => report.imported += 1,
                Ok(false) => report.updated += 1,
                Err(e) => report.row_error(index, e),
            }
        }

        info!(
            imported = report.imported,
            updated = report.updated,
            failed = report.errors.len(),
            "vehicle import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> VehicleInput {
        VehicleInput {
            branch: Branch::Parana,
            plate: " abc1d23 ".into(),
            chassis: "9bwzzz377vt004251".into(),
            brand: "Volvo".into(),
            model: "FH 540".into(),
            fleet: None,
            group: Some("  ".into()),
            manufacture_year: 2021,
            status: None,
            qr_code: Some(" ".into()),
        }
    }

    #[test]
    fn fields_are_normalized_and_defaulted() {
        let fields = VehicleFields::from_input(input()).unwrap();
        assert_eq!(fields.plate, "ABC1D23");
        assert_eq!(fields.chassis, "9BWZZZ377VT004251");
        assert_eq!(fields.fleet, DEFAULT_FLEET);
        assert_eq!(fields.group, DEFAULT_GROUP);
        assert_eq!(fields.status, DEFAULT_STATUS);
        assert_eq!(fields.qr_code, None);
    }

    #[test]
    fn blank_plate_and_odd_years_are_rejected() {
        let mut blank = input();
        blank.plate = "   ".into();
        assert!(matches!(
            VehicleFields::from_input(blank),
            Err(ServiceError::ValidationError(_))
        ));

        let mut ancient = input();
        ancient.manufacture_year = 1066;
        assert!(matches!(
            VehicleFields::from_input(ancient),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn import_rows_need_a_known_branch_and_year() {
        let row = VehicleImportRow {
            branch: Some("Bahia".into()),
            plate: Some("ABC1D23".into()),
            manufacture_year: Some(2020),
            ..Default::default()
        };
        assert!(matches!(row.into_input(), Err(ServiceError::ValidationError(m)) if m.contains("Bahia")));

        let row = VehicleImportRow {
            branch: Some("sao paulo".into()),
            plate: Some("ABC1D23".into()),
            ..Default::default()
        };
        assert!(matches!(row.into_input(), Err(ServiceError::ValidationError(m)) if m.contains("year")));

        assert!(VehicleImportRow::default().is_blank());
    }
}
