use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{optional_text, ImportReport};
use crate::{
    auth::LoggedUser,
    entities::{piece, supplier},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SupplierInput {
    #[validate(length(max = 200))]
    pub name: String,
    #[validate(length(max = 500))]
    pub contact_info: Option<String>,
}

/// One spreadsheet row of the supplier import: name and contact.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupplierImportRow {
    pub name: Option<String>,
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierDetails {
    #[serde(flatten)]
    pub supplier: supplier::Model,
    pub active_piece_count: u64,
}

/// One spreadsheet row of the supplier export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SupplierExportRow {
    pub name: String,
    pub contact_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

fn required_name(input: &SupplierInput) -> Result<String, ServiceError> {
    input.validate()?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(
            "supplier name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl SupplierService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn create(
        &self,
        input: SupplierInput,
        actor: &LoggedUser,
    ) -> Result<supplier::Model, ServiceError> {
        let name = required_name(&input)?;
        self.ensure_name_free(&name, None).await?;

        let created = self
            .insert(name, optional_text(input.contact_info), &actor.username)
            .await?;
        info!(supplier_id = %created.id, name = %created.name, "supplier registered");
        self.event_sender
            .send_or_log(Event::SupplierRegistered(created.id))
            .await;
        Ok(created)
    }

    async fn insert(
        &self,
        name: String,
        contact_info: Option<String>,
        created_by: &str,
    ) -> Result<supplier::Model, ServiceError> {
        let duplicate = format!("supplier {} already exists", name);
        supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            contact_info: Set(contact_info),
            is_active: Set(true),
            created_by: Set(created_by.to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, duplicate))
    }

    /// Name must not belong to any other supplier, active or not.
    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = supplier::Entity::find().filter(supplier::Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(supplier::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Duplicate(format!(
                "supplier {} already exists",
                name
            )));
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("supplier {} not found", id)))
    }

    /// Supplier plus the number of active pieces it provides.
    pub async fn details(&self, id: Uuid) -> Result<SupplierDetails, ServiceError> {
        let supplier = self.get(id).await?;
        let active_piece_count = piece::Entity::find()
            .filter(piece::Column::SupplierId.eq(id))
            .filter(piece::Column::IsActive.eq(true))
            .count(&*self.db)
            .await?;
        Ok(SupplierDetails {
            supplier,
            active_piece_count,
        })
    }

    pub async fn list_active(&self) -> Result<Vec<supplier::Model>, ServiceError> {
        Ok(supplier::Entity::find()
            .filter(supplier::Column::IsActive.eq(true))
            .order_by_asc(supplier::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Active suppliers by name, ready for a spreadsheet.
    pub async fn export(&self) -> Result<Vec<SupplierExportRow>, ServiceError> {
        Ok(self
            .list_active()
            .await?
            .into_iter()
            .map(|s| SupplierExportRow {
                name: s.name,
                contact_info: s.contact_info,
                created_at: s.created_at,
                created_by: s.created_by,
            })
            .collect())
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn update(
        &self,
        id: Uuid,
        input: SupplierInput,
        actor: &LoggedUser,
    ) -> Result<supplier::Model, ServiceError> {
        let name = required_name(&input)?;
        let existing = self.get(id).await?;
        self.ensure_name_free(&name, Some(id)).await?;

        let duplicate = format!("supplier {} already exists", name);
        let mut active: supplier::ActiveModel = existing.into();
        active.name = Set(name);
        active.contact_info = Set(optional_text(input.contact_info));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(supplier_id = %id, "supplier updated");
        Ok(updated)
    }

    /// Soft delete. Refused while any piece still points at the supplier.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn deactivate(
        &self,
        id: Uuid,
        actor: &LoggedUser,
    ) -> Result<supplier::Model, ServiceError> {
        let existing = self.get(id).await?;

        let referenced = piece::Entity::find()
            .filter(piece::Column::SupplierId.eq(id))
            .one(&*self.db)
            .await?
            .is_some();
        if referenced {
            return Err(ServiceError::ValidationError(format!(
                "supplier {} cannot be removed while pieces reference it",
                existing.name
            )));
        }

        let mut active: supplier::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(supplier_id = %id, "supplier deactivated");
        self.event_sender
            .send_or_log(Event::SupplierDeactivated(id))
            .await;
        Ok(updated)
    }

    /// Resolves a supplier by exact name, creating it when missing. An
    /// inactive supplier with that name is reactivated instead, since the name
    /// is unique.
    pub async fn find_or_create_by_name(
        &self,
        name: &str,
        actor: &LoggedUser,
    ) -> Result<supplier::Model, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "supplier name is required".to_string(),
            ));
        }

        if let Some(existing) = supplier::Entity::find()
            .filter(supplier::Column::Name.eq(name))
            .one(&*self.db)
            .await?
        {
            if existing.is_active {
                return Ok(existing);
            }
            let mut active: supplier::ActiveModel = existing.into();
            active.is_active = Set(true);
            active.updated_at = Set(Some(Utc::now()));
            return Ok(active.update(&*self.db).await?);
        }

        let created = self.insert(name.to_string(), None, &actor.username).await?;
        self.event_sender
            .send_or_log(Event::SupplierRegistered(created.id))
            .await;
        Ok(created)
    }

    /// Imports suppliers row by row. Names already registered are counted as
    /// skipped rather than failing the row.
    #[instrument(skip(self, rows, actor), fields(actor = %actor.username, rows = rows.len()))]
    pub async fn import(
        &self,
        rows: Vec<SupplierImportRow>,
        actor: &LoggedUser,
    ) -> Result<ImportReport, ServiceError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.into_iter().enumerate() {
            let contact_info = optional_text(row.contact_info);
            let name = match optional_text(row.name) {
                Some(name) => name,
                None if contact_info.is_none() => continue,
                None => {
                    report.row_error(index, "supplier name is required");
                    continue;
                }
            };

            let exists = supplier::Entity::find()
                .filter(supplier::Column::Name.eq(name.as_str()))
                .one(&*self.db)
                .await?
                .is_some();
            if exists {
                report.skipped += 1;
                continue;
            }

            match self.insert(name, contact_info, &actor.username).await {
                Ok(created) => {
                    report.imported += 1;
                    self.event_sender
                        .send_or_log(Event::SupplierRegistered(created.id))
                        .await;
                }
                Err(ServiceError::Duplicate(_)) => report.skipped += 1,
                Err(e) => report.row_error(index, e),
            }
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.errors.len(),
            "supplier import finished"
        );
        Ok(report)
    }
}
