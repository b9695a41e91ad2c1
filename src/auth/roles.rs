//! Access levels and what each one may do.
//!
//! Roles are stored as free text on the user row. Anything that is not one of
//! the four known names is treated as the least privileged level.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
pub enum Role {
    Operador,
    Supervisor,
    Diretoria,
    Administrador,
}

/// Operations a caller can be allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Register `entrada`/`saida` movements
    RecordMovements,
    /// Read stock positions, search and browse pieces
    LocatePieces,
    /// Reconcile a location against a physical count
    ReconcileStock,
    /// Create, edit, import and deactivate pieces, locations and suppliers
    ManageMasterData,
    ViewReports,
    /// Hard-delete a movement as an administrative correction
    DeleteMovements,
    ManageUsers,
    /// Vehicles, maintenance records and the maintenance parts catalogue
    ManageFleet,
}

impl Role {
    /// Parses a stored role name, defaulting to `Operador`.
    pub fn parse_or_default(raw: &str) -> Self {
        Role::from_str(raw.trim()).unwrap_or(Role::Operador)
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::iter().filter(|c| self.can(*c)).collect()
    }

    pub fn can(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Operador => matches!(capability, RecordMovements | LocatePieces),
            Role::Supervisor => !matches!(capability, DeleteMovements | ManageUsers | ManageFleet),
            Role::Diretoria => !matches!(capability, DeleteMovements | ManageUsers),
            Role::Administrador => true,
        }
    }

    pub fn all() -> Vec<Role> {
        Role::iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_fall_back_to_operador() {
        assert_eq!(Role::parse_or_default("Estagiario"), Role::Operador);
        assert_eq!(Role::parse_or_default(""), Role::Operador);
        assert_eq!(Role::parse_or_default(" Diretoria "), Role::Diretoria);
    }

    #[test]
    fn operador_only_moves_and_locates() {
        assert_eq!(
            Role::Operador.capabilities(),
            vec![Capability::RecordMovements, Capability::LocatePieces]
        );
    }

    #[test]
    fn supervisors_and_board_cannot_delete_movements() {
        for role in [Role::Supervisor, Role::Diretoria] {
            assert!(role.can(Capability::ReconcileStock));
            assert!(role.can(Capability::ManageMasterData));
            assert!(role.can(Capability::ViewReports));
            assert!(!role.can(Capability::DeleteMovements));
        }
    }

    #[test]
    fn fleet_belongs_to_the_board_and_administrators() {
        assert!(!Role::Operador.can(Capability::ManageFleet));
        assert!(!Role::Supervisor.can(Capability::ManageFleet));
        assert!(Role::Diretoria.can(Capability::ManageFleet));
        assert!(Role::Administrador.can(Capability::ManageFleet));
    }

    #[test]
    fn administrador_can_do_everything() {
        assert_eq!(
            Role::Administrador.capabilities().len(),
            Capability::iter().count()
        );
    }

    #[test]
    fn role_names_round_trip_through_strings() {
        for role in Role::all() {
            assert_eq!(Role::parse_or_default(role.as_ref()), role);
        }
    }
}
