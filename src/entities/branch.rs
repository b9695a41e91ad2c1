use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Regional branch (filial) that owns a vehicle, a catalogue entry or a
/// maintenance record.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(64))")]
#[strum(ascii_case_insensitive)]
pub enum Branch {
    #[sea_orm(string_value = "Mato Grosso do Sul")]
    #[serde(rename = "Mato Grosso do Sul")]
    #[strum(serialize = "Mato Grosso do Sul")]
    MatoGrossoDoSul,
    #[sea_orm(string_value = "Minas Gerais")]
    #[serde(rename = "Minas Gerais")]
    #[strum(serialize = "Minas Gerais")]
    MinasGerais,
    #[sea_orm(string_value = "Paraná")]
    #[serde(rename = "Paraná")]
    #[strum(to_string = "Paraná", serialize = "Parana")]
    Parana,
    #[sea_orm(string_value = "São Paulo")]
    #[serde(rename = "São Paulo")]
    #[strum(to_string = "São Paulo", serialize = "Sao Paulo")]
    SaoPaulo,
}

impl Branch {
    /// Parses a spreadsheet cell.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}
