//! Attendance and assessment ledger for one subject sheet.
//!
//! Operations work on an in-memory [`Sheet`]; [`apply_to_sheet`] wraps one in
//! a load, mutate, commit cycle against a [`SheetStore`].

pub mod assessments;
mod error;
pub mod relocate;
pub mod reports;
pub mod roster;
pub mod sessions;
pub mod sheet;
pub mod summary;
pub mod zones;

pub use error::LedgerError;
pub use sheet::Sheet;

use crate::store::SheetStore;
use sheet::{CellStyle, DATE_ROW, EXTERNAL_ID_COL, HEADER_ROW, HOURS_ROW, NAME_COL, ROLL_COL, TITLE_ROW};

/// Result of an operation that ran to completion. `Declined` means the
/// caller did not confirm a destructive step and nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(String),
    Declined(String),
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Declined(_) => "declined",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Applied(m) | Self::Declined(m) => m,
        }
    }
}

/// Load `subject`, run `op` on a copy, and commit the copy only when the
/// operation applied. On any error the copy is dropped and the stored sheet
/// is untouched.
pub fn apply_to_sheet<S, F>(store: &S, subject: &str, op: F) -> Result<Outcome, LedgerError>
where
    S: SheetStore + ?Sized,
    F: FnOnce(&mut Sheet) -> Result<Outcome, LedgerError>,
{
    let before = store.load_sheet(subject)?;
    let mut after = before.clone();
    let outcome = op(&mut after)?;
    match &outcome {
        Outcome::Applied(_) => {
            let changed = store.commit_sheet(subject, &before, &after)?;
            tracing::debug!(subject, changed, "sheet committed");
        }
        Outcome::Declined(message) => {
            tracing::info!(subject, %message, "operation declined; nothing saved");
        }
    }
    Ok(outcome)
}

/// Fixed captions of a new subject sheet.
pub fn format_new_sheet(sheet: &mut Sheet, title: &str) {
    sheet.set(TITLE_ROW, NAME_COL, title.trim().to_uppercase(), CellStyle::Title);
    sheet.set(DATE_ROW, NAME_COL, "DATE :", CellStyle::Bold);
    sheet.set(HOURS_ROW, NAME_COL, "Hours Taken :", CellStyle::Bold);
    sheet.set(HEADER_ROW, ROLL_COL, "ROLL NO.", CellStyle::Header);
    sheet.set(HEADER_ROW, NAME_COL, "NAME", CellStyle::Header);
    sheet.set(HEADER_ROW, EXTERNAL_ID_COL, "ROLL NUMBER", CellStyle::Header);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::roster::{normalize_entries, replace};
    use super::*;
    use crate::config::LayoutConfig;

    /// A formatted sheet holding `n` students named "STUDENT i".
    pub fn roster_sheet(n: usize, cfg: &LayoutConfig) -> Sheet {
        let mut sheet = Sheet::new();
        format_new_sheet(&mut sheet, "maths");
        let names: Vec<String> = (1..=n).map(|i| format!("Student {}", i)).collect();
        let ids: Vec<String> = (1..=n).map(|i| format!("ID{:02}", i)).collect();
        let entries = normalize_entries(&names, &ids, 1000).expect("entries");
        replace(&mut sheet, &entries, cfg).expect("roster");
        sheet
    }
}
