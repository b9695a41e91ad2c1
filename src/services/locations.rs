use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::optional_text;
use crate::{
    auth::LoggedUser,
    entities::{location, stock_movement},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LocationInput {
    #[validate(length(max = 50))]
    pub code: String,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

/// Location codes are compared and stored upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Clone)]
pub struct LocationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl LocationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn create(
        &self,
        input: LocationInput,
        actor: &LoggedUser,
    ) -> Result<location::Model, ServiceError> {
        input.validate()?;
        let code = normalize_code(&input.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "location code is required".to_string(),
            ));
        }

        let taken = location::Entity::find()
            .filter(location::Column::Code.eq(code.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if taken {
            return Err(ServiceError::Duplicate(format!(
                "location {} already exists",
                code
            )));
        }

        let duplicate = format!("location {} already exists", code);
        let created = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(optional_text(input.description)),
            is_active: Set(true),
            created_by: Set(actor.username.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(location_id = %created.id, code = %created.code, "location registered");
        self.event_sender
            .send_or_log(Event::LocationRegistered(created.id))
            .await;
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<location::Model, ServiceError> {
        location::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("location {} not found", id)))
    }

    pub async fn list_active(&self) -> Result<Vec<location::Model>, ServiceError> {
        Ok(location::Entity::find()
            .filter(location::Column::IsActive.eq(true))
            .order_by_asc(location::Column::Code)
            .all(&*self.db)
            .await?)
    }

    /// Soft delete. A location that ever received a movement keeps its
    /// history and cannot be removed.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn deactivate(
        &self,
        id: Uuid,
        actor: &LoggedUser,
    ) -> Result<location::Model, ServiceError> {
        let existing = self.get(id).await?;

        let has_movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::LocationId.eq(id))
            .one(&*self.db)
            .await?
            .is_some();
        if has_movements {
            return Err(ServiceError::ValidationError(format!(
                "location {} cannot be removed while movements reference it",
                existing.code
            )));
        }

        let mut active: location::ActiveModel = existing.into();
        active.is_active = Set(false);
        let updated = active.update(&*self.db).await?;

        info!(location_id = %id, "location deactivated");
        self.event_sender
            .send_or_log(Event::LocationDeactivated(id))
            .await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_code;

    #[test]
    fn codes_are_trimmed_and_upper_cased() {
        assert_eq!(normalize_code("  a-01 "), "A-01");
        assert_eq!(normalize_code("   "), "");
    }
}
