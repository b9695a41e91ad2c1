// Stock ledger
pub mod ledger;

// Master data
pub mod locations;
pub mod pieces;
pub mod suppliers;

// Fleet
pub mod maintenance_parts;
pub mod maintenances;
pub mod vehicles;

// Reporting
pub mod reports;

// Identity
pub mod users;

use serde::{Deserialize, Serialize};

/// Outcome of a spreadsheet import. Rows are committed one by one, so a
/// failed row never undoes the ones before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Existing records overwritten by their row
    pub updated: usize,
    /// Rows left out because the record already exists
    pub skipped: usize,
    /// One `row N: message` entry per rejected row
    pub errors: Vec<String>,
}

impl ImportReport {
    /// Spreadsheet line of the `index`-th data row; line 1 is the header.
    pub fn row_error(&mut self, index: usize, message: impl std::fmt::Display) {
        self.errors.push(format!("row {}: {}", index + 2, message));
    }
}

/// Trims a free-text field and turns blanks into `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Case-insensitive substring pattern for `LOWER(column) LIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    format!("%{}%", term.to_lowercase())
}

pub(crate) fn required(value: &str, what: &str) -> Result<(), crate::errors::ServiceError> {
    if value.is_empty() {
        return Err(crate::errors::ServiceError::ValidationError(format!(
            "{} is required",
            what
        )));
    }
    Ok(())
}
