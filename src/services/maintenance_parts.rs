use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{like_pattern, optional_text, required, ImportReport};
use crate::{
    auth::LoggedUser,
    entities::{
        branch::Branch,
        maintenance_part::{self, PartKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const STATUS_ACTIVE: &str = "ATIVO";
const STATUS_INACTIVE: &str = "INATIVO";

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MaintenancePartInput {
    pub branch: Branch,
    #[validate(length(max = 200))]
    pub name: String,
    pub unit_price: Decimal,
    pub kind: PartKind,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PartSearch {
    pub branch: Option<Branch>,
    /// Fragment of the name, ignoring case
    pub name: Option<String>,
    pub kind: Option<PartKind>,
    pub active: Option<bool>,
}

/// One spreadsheet row: branch, name, unit price, kind, status, description.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PartImportRow {
    pub branch: Option<String>,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub kind: Option<String>,
    /// `ATIVO` or `INATIVO`
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PartExportRow {
    pub branch: Branch,
    pub name: String,
    pub unit_price: Decimal,
    pub kind: PartKind,
    pub status: String,
    pub description: Option<String>,
}

fn status_label(is_active: bool) -> &'static str {
    if is_active {
        STATUS_ACTIVE
    } else {
        STATUS_INACTIVE
    }
}

fn parse_status(raw: &str) -> Option<bool> {
    match raw.trim().to_uppercase().as_str() {
        STATUS_ACTIVE => Some(true),
        STATUS_INACTIVE => Some(false),
        _ => None,
    }
}

fn checked_price(price: Decimal) -> Result<Decimal, ServiceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ServiceError::ValidationError(
            "unit price must not be negative".to_string(),
        ));
    }
    Ok(price.round_dp(2))
}

impl PartImportRow {
    fn is_blank(&self) -> bool {
        optional_text(self.branch.clone()).is_none() && optional_text(self.name.clone()).is_none()
    }

    fn into_input(self) -> Result<MaintenancePartInput, ServiceError> {
        let missing = || {
            ServiceError::ValidationError("branch, name, kind and status are required".to_string())
        };
        let branch_raw = optional_text(self.branch).ok_or_else(missing)?;
        let name = optional_text(self.name).ok_or_else(missing)?;
        let kind_raw = optional_text(self.kind).ok_or_else(missing)?;
        let status_raw = optional_text(self.status).ok_or_else(missing)?;

        let unit_price = self.unit_price.ok_or_else(|| {
            ServiceError::ValidationError("unit price is required".to_string())
        })?;
        let branch = Branch::parse(&branch_raw)
            .ok_or_else(|| ServiceError::ValidationError(format!("unknown branch {}", branch_raw)))?;
        let kind: PartKind = kind_raw
            .parse()
            .map_err(|_| ServiceError::ValidationError(format!("unknown kind {}", kind_raw)))?;
        let is_active = parse_status(&status_raw)
            .ok_or_else(|| ServiceError::ValidationError(format!("unknown status {}", status_raw)))?;

        Ok(MaintenancePartInput {
            branch,
            name,
            unit_price,
            kind,
            is_active,
            description: self.description,
        })
    }
}

#[derive(Clone)]
pub struct MaintenancePartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl MaintenancePartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn create(
        &self,
        input: MaintenancePartInput,
        actor: &LoggedUser,
    ) -> Result<maintenance_part::Model, ServiceError> {
        input.validate()?;
        let name = input.name.trim().to_string();
        required(&name, "part name")?;
        let unit_price = checked_price(input.unit_price)?;

        let exists = maintenance_part::Entity::find()
            .filter(maintenance_part::Column::Branch.eq(input.branch))
            .filter(maintenance_part::Column::Name.eq(name.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if exists {
            return Err(ServiceError::Duplicate(format!(
                "maintenance part {} already exists in {}",
                name,
                input.branch.as_ref()
            )));
        }

        let duplicate = format!("maintenance part {} already exists", name);
        let created = maintenance_part::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch: Set(input.branch),
            name: Set(name),
            unit_price: Set(unit_price),
            kind: Set(input.kind),
            is_active: Set(input.is_active),
            description: Set(optional_text(input.description)),
            created_by: Set(actor.username.clone()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(part_id = %created.id, name = %created.name, "maintenance part registered");
        self.event_sender
            .send_or_log(Event::MaintenancePartRegistered(created.id))
            .await;
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<maintenance_part::Model, ServiceError> {
        maintenance_part::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("maintenance part {} not found", id)))
    }

    /// Catalogue entries matching every given filter, by name.
    pub async fn search(
        &self,
        criteria: PartSearch,
    ) -> Result<Vec<maintenance_part::Model>, ServiceError> {
        let mut query = maintenance_part::Entity::find();
        if let Some(branch) = criteria.branch {
            query = query.filter(maintenance_part::Column::Branch.eq(branch));
        }
        if let Some(term) = optional_text(criteria.name) {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(maintenance_part::Column::Name)))
                    .like(like_pattern(&term).as_str()),
            );
        }
        if let Some(kind) = criteria.kind {
            query = query.filter(maintenance_part::Column::Kind.eq(kind));
        }
        if let Some(active) = criteria.active {
            query = query.filter(maintenance_part::Column::IsActive.eq(active));
        }

        Ok(query
            .order_by_asc(maintenance_part::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Active entries whose name contains `term`, to prefill a maintenance
    /// item with its catalogue price.
    pub async fn suggest(
        &self,
        term: &str,
        limit: u64,
    ) -> Result<Vec<maintenance_part::Model>, ServiceError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(maintenance_part::Entity::find()
            .filter(maintenance_part::Column::IsActive.eq(true))
            .filter(
                Expr::expr(Func::lower(Expr::col(maintenance_part::Column::Name)))
                    .like(like_pattern(term).as_str()),
            )
            .order_by_asc(maintenance_part::Column::Name)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Marks the entry `INATIVO`. Past maintenance items keep their own copy
    /// of name and price.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn deactivate(
        &self,
        id: Uuid,
        actor: &LoggedUser,
    ) -> Result<maintenance_part::Model, ServiceError> {
        let existing = self.get(id).await?;
        let mut active: maintenance_part::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(part_id = %id, "maintenance part deactivated");
        self.event_sender
            .send_or_log(Event::MaintenancePartDeactivated(id))
            .await;
        Ok(updated)
    }

    /// Whole catalogue ordered by branch then name.
    pub async fn export(&self) -> Result<Vec<PartExportRow>, ServiceError> {
        let parts = maintenance_part::Entity::find()
            .order_by_asc(maintenance_part::Column::Branch)
            .order_by_asc(maintenance_part::Column::Name)
            .all(&*self.db)
            .await?;

        Ok(parts
            .into_iter()
            .map(|p| PartExportRow {
                branch: p.branch,
                name: p.name,
                unit_price: p.unit_price,
                kind: p.kind,
                status: status_label(p.is_active).to_string(),
                description: p.description,
            })
            .collect())
    }

    /// Imports catalogue rows one by one. An entry already present for the
    /// same branch and name is skipped.
    #[instrument(skip(self, rows, actor), fields(actor = %actor.username, rows = rows.len()))]
    pub async fn import(
        &self,
        rows: Vec<PartImportRow>,
        actor: &LoggedUser,
    ) -> Result<ImportReport, ServiceError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.into_iter().enumerate() {
            if row.is_blank() {
                continue;
            }
            let input = match row.into_input() {
                Ok(input) => input,
                Err(e) => {
                    report.row_error(index, e);
                    continue;
                }
            };
            match self.create(input, actor).await {
                Ok(_) => report.imported += 1,
                Err(ServiceError::Duplicate(_)) => report.skipped += 1,
                Err(e) => report.row_error(index, e),
            }
        }

        info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.errors.len(),
            "maintenance part import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_labels_round_trip() {
        assert_eq!(parse_status(" ativo "), Some(true));
        assert_eq!(parse_status(status_label(false)), Some(false));
        assert_eq!(parse_status("PAUSADO"), None);
    }

    #[test]
    fn prices_are_rounded_and_never_negative() {
        assert_eq!(checked_price(dec!(12.345)).unwrap(), dec!(12.34));
        assert_eq!(checked_price(dec!(0)).unwrap(), dec!(0));
        assert!(matches!(
            checked_price(dec!(-0.01)),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn import_rows_are_checked_cell_by_cell() {
        let row = |kind: &str, status: &str| PartImportRow {
            branch: Some("Paraná".into()),
            name: Some("Troca de óleo".into()),
            unit_price: Some(dec!(80)),
            kind: Some(kind.into()),
            status: Some(status.into()),
            description: None,
        };

        let input = row("Serviço", "ATIVO").into_input().unwrap();
        assert_eq!(input.branch, Branch::Parana);
        assert_eq!(input.kind, PartKind::Servico);
        assert!(input.is_active);

        assert!(matches!(row("Lavagem", "ATIVO").into_input(), Err(ServiceError::ValidationError(m)) if m.contains("Lavagem")));
        assert!(matches!(row("Peças", "talvez").into_input(), Err(ServiceError::ValidationError(m)) if m.contains("talvez")));

        let mut no_price = row("Peças", "ATIVO");
        no_price.unit_price = None;
        assert!(no_price.into_input().is_err());
        assert!(PartImportRow::default().is_blank());
    }
}
