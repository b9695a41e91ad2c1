use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, AuthService, Capability, LoggedUser, Role},
    entities::user,
    errors::ServiceError,
    events::{Event, EventSender},
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub token_type: String,
    pub user: LoggedUser,
}

fn check_passwords(password: &str, confirm: &str) -> Result<(), ServiceError> {
    if password != confirm {
        return Err(ServiceError::ValidationError(
            "passwords do not match".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth,
        }
    }

    /// Registers a user. While no user exists anyone may register the first
    /// account, which must be an `Administrador`; afterwards the caller needs
    /// the `ManageUsers` capability.
    #[instrument(skip(self, input, actor), fields(username = %input.username))]
    pub async fn register(
        &self,
        input: RegisterInput,
        actor: Option<&LoggedUser>,
    ) -> Result<LoggedUser, ServiceError> {
        if self.count().await? == 0 {
            if input.role != Role::Administrador {
                return Err(ServiceError::ValidationError(
                    "the first user must be an Administrador".to_string(),
                ));
            }
        } else {
            let actor = actor.ok_or_else(|| {
                ServiceError::Unauthorized("sign in to register users".to_string())
            })?;
            actor.require(Capability::ManageUsers)?;
        }

        input.validate()?;
        check_passwords(&input.password, &input.confirm_password)?;
        let username = input.username.trim().to_string();
        let full_name = input.full_name.trim().to_string();

        let taken = user::Entity::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .one(&*self.db)
            .await?
            .is_some();
        if taken {
            return Err(ServiceError::Duplicate(format!(
                "username {} is already taken",
                username
            )));
        }

        let password_hash = hash_password(&input.password)?;
        let duplicate = format!("username {} is already taken", username);
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            full_name: Set(full_name),
            password_hash: Set(password_hash),
            role: Set(input.role.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, duplicate))?;

        info!(user_id = %created.id, role = %created.role, "user registered");
        self.event_sender
            .send_or_log(Event::UserRegistered {
                user_id: created.id,
                username: created.username.clone(),
            })
            .await;
        Ok(LoggedUser::from(&created))
    }

    /// Checks credentials of an active user and opens a session.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn authenticate(&self, input: LoginInput) -> Result<Session, ServiceError> {
        input.validate()?;
        let invalid = || ServiceError::Unauthorized("invalid username or password".to_string());

        let found = user::Entity::find()
            .filter(user::Column::Username.eq(input.username.trim()))
            .filter(user::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        let found = match found {
            Some(found) => found,
            None => {
                warn!("login attempt for unknown or inactive user");
                return Err(invalid());
            }
        };
        if !verify_password(&input.password, &found.password_hash)? {
            warn!("login attempt with wrong password");
            return Err(invalid());
        }

        let user = LoggedUser::from(&found);
        let token = self.auth.generate_token(&user)?;
        info!(user_id = %user.id, "user signed in");
        Ok(Session {
            token,
            token_type: "Bearer".to_string(),
            user,
        })
    }

    pub async fn find_active(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find_by_id(id)
            .filter(user::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?)
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        Ok(user::Entity::find().count(&*self.db).await?)
    }

    /// Resolves the caller of a request from its bearer token. Tokens of
    /// users that were removed or deactivated since sign-in are refused.
    pub async fn logged_user_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<LoggedUser, ServiceError> {
        let id = self.auth.user_id_from_headers(headers)?;
        self.find_active(id)
            .await?
            .map(|model| LoggedUser::from(&model))
            .ok_or_else(|| ServiceError::Unauthorized("user is no longer active".to_string()))
    }
}
