use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a movement. Always agrees with the sign of `quantity`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    #[sea_orm(string_value = "entrada")]
    Entrada,
    #[sea_orm(string_value = "saida")]
    Saida,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Saida => "saida",
        }
    }

    /// The type a stored quantity implies. Zero is not a valid movement.
    pub fn for_quantity(quantity: i64) -> Option<Self> {
        match quantity.signum() {
            1 => Some(MovementType::Entrada),
            -1 => Some(MovementType::Saida),
            _ => None,
        }
    }

    /// Applies the direction to an unsigned magnitude.
    pub fn signed(&self, magnitude: i32) -> i32 {
        match self {
            MovementType::Entrada => magnitude,
            MovementType::Saida => -magnitude,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub piece_id: Uuid,
    pub location_id: Uuid,
    /// Signed: positive for `entrada`, negative for `saida`.
    pub quantity: i32,
    pub movement_type: MovementType,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    /// Username of the actor that recorded the movement
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::piece::Entity",
        from = "Column::PieceId",
        to = "super::piece::Column::Id"
    )]
    Piece,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::piece::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Piece.def()
    }
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the stored type matches the stored sign.
    pub fn is_consistent(&self) -> bool {
        MovementType::for_quantity(self.quantity as i64) == Some(self.movement_type)
    }
}
