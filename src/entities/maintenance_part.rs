use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::branch::Branch;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[strum(ascii_case_insensitive)]
pub enum PartKind {
    #[sea_orm(string_value = "Manutenção")]
    #[serde(rename = "Manutenção")]
    #[strum(to_string = "Manutenção", serialize = "Manutencao")]
    Manutencao,
    #[sea_orm(string_value = "Peças")]
    #[serde(rename = "Peças")]
    #[strum(to_string = "Peças", serialize = "Pecas")]
    Pecas,
    #[sea_orm(string_value = "Serviço")]
    #[serde(rename = "Serviço")]
    #[strum(to_string = "Serviço", serialize = "Servico")]
    Servico,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "maintenance_parts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch: Branch,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    pub kind: PartKind,
    pub is_active: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
