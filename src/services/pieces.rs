use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::{Condition, Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, optional_text, required, suppliers::SupplierService, ImportReport};
use crate::{
    auth::LoggedUser,
    entities::{location, piece, supplier},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Shortest text the piece search accepts.
pub const MIN_SEARCH_TERM: usize = 2;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewPieceInput {
    #[validate(length(max = 64))]
    pub code: String,
    #[validate(length(max = 200))]
    pub name: String,
    #[validate(length(max = 200))]
    pub qr_code: Option<String>,
    pub supplier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdatePieceInput {
    #[validate(length(max = 64))]
    pub code: String,
    #[validate(length(max = 200))]
    pub name: String,
    pub supplier_id: Option<Uuid>,
    /// Preferred storage location; `None` clears it
    pub location_id: Option<Uuid>,
}

/// One spreadsheet row: code, name and an optional supplier name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PieceImportRow {
    pub code: Option<String>,
    pub name: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PieceExportRow {
    pub code: String,
    pub name: String,
    pub qr_code: Option<String>,
    pub supplier: Option<String>,
}

/// Piece codes are compared and stored upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Clone)]
pub struct PieceService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    suppliers: SupplierService,
    search_limit: u64,
}

impl PieceService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        suppliers: SupplierService,
        search_limit: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            suppliers,
            search_limit,
        }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn create(
        &self,
        input: NewPieceInput,
        actor: &LoggedUser,
    ) -> Result<piece::Model, ServiceError> {
        input.validate()?;
        let code = normalize_code(&input.code);
        let name = input.name.trim().to_string();
        required(&code, "piece code")?;
        required(&name, "piece name")?;
        let qr_code = optional_text(input.qr_code);

        self.ensure_code_free(&code, None).await?;
        if let Some(qr) = &qr_code {
            let taken = piece::Entity::find()
                .filter(piece::Column::QrCode.eq(qr.as_str()))
                .one(&*self.db)
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Duplicate(format!(
                    "QR code {} is already assigned to another piece",
                    qr
                )));
            }
        }
        if let Some(supplier_id) = input.supplier_id {
            self.ensure_active_supplier(supplier_id).await?;
        }

        let created = self
            .insert(code, name, qr_code, input.supplier_id, &actor.username)
            .await?;
        info!(piece_id = %created.id, code = %created.code, "piece registered");
        self.event_sender
            .send_or_log(Event::PieceRegistered(created.id))
            .await;
        Ok(created)
    }

    async fn insert(
        &self,
        code: String,
        name: String,
        qr_code: Option<String>,
        supplier_id: Option<Uuid>,
        created_by: &str,
    ) -> Result<piece::Model, ServiceError> {
        let duplicate = format!("piece {} already exists", code);
        piece::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            name: Set(name),
            qr_code: Set(qr_code),
            supplier_id: Set(supplier_id),
            location_id: Set(None),
            is_active: Set(true),
            created_by: Set(created_by.to_string()),
            created_at: Set(Utc::now()),
            updated_by: Set(None),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, duplicate))
    }

    async fn ensure_code_free(&self, code: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = piece::Entity::find().filter(piece::Column::Code.eq(code));
        if let Some(id) = except {
            query = query
                .filter(piece::Column::Id.ne(id))
                .filter(piece::Column::IsActive.eq(true));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Duplicate(format!(
                "piece {} already exists",
                code
            )));
        }
        Ok(())
    }

    async fn ensure_active_supplier(&self, id: Uuid) -> Result<(), ServiceError> {
        let supplier = self.suppliers.get(id).await?;
        if !supplier.is_active {
            return Err(ServiceError::ValidationError(format!(
                "supplier {} is inactive",
                supplier.name
            )));
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<piece::Model, ServiceError> {
        piece::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("piece {} not found", id)))
    }

    pub async fn list_active(&self) -> Result<Vec<piece::Model>, ServiceError> {
        Ok(piece::Entity::find()
            .filter(piece::Column::IsActive.eq(true))
            .order_by_asc(piece::Column::Code)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_qr_code(&self, qr_code: &str) -> Result<piece::Model, ServiceError> {
        piece::Entity::find()
            .filter(piece::Column::QrCode.eq(qr_code.trim()))
            .filter(piece::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no active piece with QR code {}", qr_code.trim()))
            })
    }

    /// Active pieces whose code or name contains `term`, ignoring case.
    /// Terms shorter than [`MIN_SEARCH_TERM`] match nothing.
    pub async fn search(&self, term: &str) -> Result<Vec<piece::Model>, ServiceError> {
        let term = term.trim();
        if term.chars().count() < MIN_SEARCH_TERM {
            return Ok(Vec::new());
        }
        let pattern = like_pattern(term);

        Ok(piece::Entity::find()
            .filter(piece::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(piece::Column::Code))).like(pattern.as_str()))
                    .add(Expr::expr(Func::lower(Expr::col(piece::Column::Name))).like(pattern.as_str())),
            )
            .order_by_asc(piece::Column::Code)
            .limit(self.search_limit)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdatePieceInput,
        actor: &LoggedUser,
    ) -> Result<piece::Model, ServiceError> {
        input.validate()?;
        let code = normalize_code(&input.code);
        let name = input.name.trim().to_string();
        required(&code, "piece code")?;
        required(&name, "piece name")?;

        let existing = self.get(id).await?;
        self.ensure_code_free(&code, Some(id)).await?;
        if let Some(supplier_id) = input.supplier_id {
            self.ensure_active_supplier(supplier_id).await?;
        }
        if let Some(location_id) = input.location_id {
            let location = location::Entity::find_by_id(location_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("location {} not found", location_id))
                })?;
            if !location.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "location {} is inactive",
                    location.code
                )));
            }
        }

        let duplicate = format!("piece {} already exists", code);
        let mut active: piece::ActiveModel = existing.into();
        active.code = Set(code);
        active.name = Set(name);
        active.supplier_id = Set(input.supplier_id);
        active.location_id = Set(input.location_id);
        active.updated_by = Set(Some(actor.username.clone()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(piece_id = %id, "piece updated");
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn deactivate(
        &self,
        id: Uuid,
        actor: &LoggedUser,
    ) -> Result<piece::Model, ServiceError> {
        let existing = self.get(id).await?;
        let mut active: piece::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_by = Set(Some(actor.username.clone()));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(piece_id = %id, "piece deactivated");
        self.event_sender
            .send_or_log(Event::PieceDeactivated(id))
            .await;
        Ok(updated)
    }

    /// Active pieces with their supplier names, ordered by code.
    pub async fn export(&self) -> Result<Vec<PieceExportRow>, ServiceError> {
        let db = &*self.db;
        let pieces = self.list_active().await?;

        let supplier_ids: Vec<Uuid> = pieces.iter().filter_map(|p| p.supplier_id).collect();
        let suppliers: HashMap<Uuid, String> = if supplier_ids.is_empty() {
            HashMap::new()
        } else {
            supplier::Entity::find()
                .select_only()
                .column(supplier::Column::Id)
                .column(supplier::Column::Name)
                .filter(supplier::Column::Id.is_in(supplier_ids))
                .into_tuple::<(Uuid, String)>()
                .all(db)
                .await?
                .into_iter()
                .collect()
        };

        Ok(pieces
            .into_iter()
            .map(|p| PieceExportRow {
                supplier: p.supplier_id.and_then(|id| suppliers.get(&id).cloned()),
                code: p.code,
                name: p.name,
                qr_code: p.qr_code,
            })
            .collect())
    }

    /// Imports pieces row by row. Rows without code and name are skipped;
    /// every other failure is reported against its spreadsheet line.
    #[instrument(skip(self, rows, actor), fields(actor = %actor.username, rows = rows.len()))]
    pub async fn import(
        &self,
        rows: Vec<PieceImportRow>,
        actor: &LoggedUser,
    ) -> Result<ImportReport, ServiceError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.into_iter().enumerate() {
            let code = optional_text(row.code).map(|c| normalize_code(&c));
            let name = optional_text(row.name);
            let (code, name) = match (code, name) {
                (None, None) => continue,
                (Some(code), Some(name)) => (code, name),
                _ => {
                    report.row_error(index, "piece code and name are required");
                    continue;
                }
            };

            match self
                .import_one(code, name, optional_text(row.supplier), actor)
                .await
            {
                Ok(created) => {
                    report.imported += 1;
                    self.event_sender
                        .send_or_log(Event::PieceRegistered(created.id))
                        .await;
                }
                Err(ServiceError::Duplicate(msg)) => report.row_error(index, msg),
                Err(ServiceError::ValidationError(msg)) => report.row_error(index, msg),
                Err(e) => report.row_error(index, e),
            }
        }

        info!(
            imported = report.imported,
            failed = report.errors.len(),
            "piece import finished"
        );
        Ok(report)
    }

    async fn import_one(
        &self,
        code: String,
        name: String,
        supplier_name: Option<String>,
        actor: &LoggedUser,
    ) -> Result<piece::Model, ServiceError> {
        self.ensure_code_free(&code, None).await?;
        let supplier_id = match supplier_name {
            Some(name) => Some(self.suppliers.find_or_create_by_name(&name, actor).await?.id),
            None => None,
        };
        self.insert(code, name, None, supplier_id, &actor.username)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_upper_cased() {
        assert_eq!(normalize_code("  flt-0042 "), "FLT-0042");
    }

    #[test]
    fn like_pattern_is_lower_cased_substring() {
        assert_eq!(like_pattern("Filtro"), "%filtro%");
    }

    #[test]
    fn import_errors_point_at_spreadsheet_lines() {
        let mut report = ImportReport::default();
        report.row_error(0, "piece code and name are required");
        assert_eq!(report.errors, vec!["row 2: piece code and name are required"]);
    }
}
