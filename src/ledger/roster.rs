//! Student rows. A student is addressed by roll number, which is also its row
//! position; replacing the roster invalidates any roll held elsewhere.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::sheet::{
    CellStyle, Sheet, EXTERNAL_ID_COL, FIRST_STUDENT_ROW, NAME_COL, ROLL_COL,
};
use super::{relocate, sessions, summary, zones, LedgerError, Outcome};
use crate::config::LayoutConfig;

/// 1-based roll number, validated against a roster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Roll(u32);

impl Roll {
    pub fn new(value: i64, total: usize) -> Result<Self, LedgerError> {
        if value < 1 || value > total as i64 {
            return Err(LedgerError::validation(format!(
                "Invalid roll {}: out of range (1-{}).",
                value, total
            )));
        }
        Ok(Self(value as u32))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn row(self) -> u32 {
        FIRST_STUDENT_ROW + self.0 - 1
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub roll: Roll,
    pub name: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterIndex {
    students: Vec<Student>,
}

impl RosterIndex {
    /// Students are the unbroken run of filled roll cells starting at the
    /// first student row.
    pub fn read(sheet: &Sheet) -> Self {
        let mut students = Vec::new();
        let mut row = FIRST_STUDENT_ROW;
        while !sheet.is_blank(row, ROLL_COL) {
            let roll = Roll(row - FIRST_STUDENT_ROW + 1);
            students.push(Student {
                roll,
                name: sheet.text(row, NAME_COL).unwrap_or_default(),
                external_id: sheet.text(row, EXTERNAL_ID_COL).unwrap_or_default(),
            });
            row += 1;
        }
        Self { students }
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.students.iter().map(|s| s.roll.row())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Student> {
        let wanted = name.trim().to_uppercase();
        self.students
            .iter()
            .find(|s| s.name.to_uppercase() == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub external_id: String,
}

/// Clean up names and ids as typed: blank lines dropped, names upper-cased.
pub fn normalize_entries(
    names: &[String],
    external_ids: &[String],
    max_students: usize,
) -> Result<Vec<RosterEntry>, LedgerError> {
    let names: Vec<String> = names
        .iter()
        .map(|n| n.trim().to_uppercase())
        .filter(|n| !n.is_empty())
        .collect();
    let ids: Vec<String> = external_ids
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    if names.len() != ids.len() {
        return Err(LedgerError::validation(format!(
            "Mismatch: there are {} names but {} roll numbers. The lists must match.",
            names.len(),
            ids.len()
        )));
    }
    if names.len() > max_students {
        return Err(LedgerError::validation(format!(
            "Student count ({}) exceeds maximum ({}).",
            names.len(),
            max_students
        )));
    }

    Ok(names
        .into_iter()
        .zip(ids)
        .map(|(name, external_id)| RosterEntry { name, external_id })
        .collect())
}

/// Overwrite the roster columns with `entries`.
///
/// Rows past the new roster are cleared in every zone. Students added to a
/// sheet that already has sessions are recorded absent for those sessions so
/// every session keeps a status for every student. The summary block is
/// created with spare session capacity if the sheet has none yet, then
/// recomputed.
pub fn replace(
    sheet: &mut Sheet,
    entries: &[RosterEntry],
    layout_cfg: &LayoutConfig,
) -> Result<Outcome, LedgerError> {
    let before = RosterIndex::read(sheet);
    let mut layout = zones::locate(sheet)?;

    let last_row = sheet.last_row().max(FIRST_STUDENT_ROW);
    for row in FIRST_STUDENT_ROW..=last_row {
        for col in [ROLL_COL, NAME_COL, EXTERNAL_ID_COL] {
            sheet.clear(row, col);
        }
    }
    sheet.clear_rows_from(FIRST_STUDENT_ROW + entries.len() as u32);

    for (i, entry) in entries.iter().enumerate() {
        let row = FIRST_STUDENT_ROW + i as u32;
        sheet.set(row, ROLL_COL, (i + 1) as i64, CellStyle::None);
        sheet.set(row, NAME_COL, entry.name.as_str(), CellStyle::None);
        sheet.set(row, EXTERNAL_ID_COL, entry.external_id.as_str(), CellStyle::None);
    }

    let roster = RosterIndex::read(sheet);
    if !layout.is_established() {
        layout = relocate::establish(sheet, layout_cfg)?;
    }
    if roster.len() > before.len() {
        sessions::fill_missing_statuses(sheet, &layout, &roster);
    }
    summary::recompute(sheet, &layout, &roster)?;

    tracing::info!(
        students = roster.len(),
        previous = before.len(),
        "roster replaced"
    );
    Ok(Outcome::Applied(format!(
        "Student list updated with {} students.",
        roster.len()
    )))
}

/// Expand `prefix` + two-digit number for every number of each `a-b` range,
/// skipping exclusions.
pub fn generate_external_ids(
    prefixes: &[String],
    ranges: &[String],
    exclusions: &[String],
) -> Result<Vec<String>, LedgerError> {
    if prefixes.len() != ranges.len() {
        return Err(LedgerError::validation(
            "The number of prefixes must match the number of ranges.",
        ));
    }
    let excluded: HashSet<&str> = exclusions
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();

    let mut out = Vec::new();
    for (prefix, range) in prefixes.iter().zip(ranges) {
        let prefix = prefix.trim();
        let Some((start, end)) = range.trim().split_once('-') else {
            return Err(LedgerError::validation(format!(
                "Invalid range '{}': expected START-END.",
                range.trim()
            )));
        };
        let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
            return Err(LedgerError::validation(format!(
                "Invalid range '{}': bounds must be whole numbers.",
                range.trim()
            )));
        };
        for n in start..=end {
            let id = format!("{}{:02}", prefix, n);
            if !excluded.contains(id.as_str()) {
                out.push(id);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::sheet::HEADER_ROW;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn roll_is_bounded_by_roster_size() {
        assert!(Roll::new(0, 3).is_err());
        assert!(Roll::new(4, 3).is_err());
        let r = Roll::new(3, 3).expect("roll");
        assert_eq!(r.row(), FIRST_STUDENT_ROW + 2);
    }

    #[test]
    fn read_stops_at_first_blank_roll() {
        let mut sheet = Sheet::new();
        sheet.set(HEADER_ROW, ROLL_COL, "ROLL NO.", CellStyle::Header);
        sheet.set(5, ROLL_COL, 1i64, CellStyle::None);
        sheet.set(5, NAME_COL, "ANA", CellStyle::None);
        sheet.set(6, ROLL_COL, 2i64, CellStyle::None);
        sheet.set(8, ROLL_COL, 4i64, CellStyle::None);
        let roster = RosterIndex::read(&sheet);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.find_by_name("ana").map(|s| s.roll.get()), Some(1));
    }

    #[test]
    fn normalize_rejects_mismatched_lists() {
        let err = normalize_entries(&strings(&["a", "b"]), &strings(&["1"]), 10)
            .expect_err("mismatch");
        assert!(matches!(err, LedgerError::Validation(_)));

        let entries = normalize_entries(&strings(&[" ana ", "", "bo"]), &strings(&["x1", "x2"]), 10)
            .expect("entries");
        assert_eq!(entries[0].name, "ANA");
        assert_eq!(entries.len(), 2);

        assert!(normalize_entries(&strings(&["a", "b"]), &strings(&["1", "2"]), 1).is_err());
    }

    #[test]
    fn generated_ids_are_zero_padded_and_skip_exclusions() {
        let ids = generate_external_ids(
            &strings(&["2023507", "2023510"]),
            &strings(&["1-3", "9-10"]),
            &strings(&["202350702"]),
        )
        .expect("ids");
        assert_eq!(ids, strings(&["202350701", "202350703", "202351009", "202351010"]));

        assert!(generate_external_ids(&strings(&["a"]), &strings(&[]), &[]).is_err());
        assert!(generate_external_ids(&strings(&["a"]), &strings(&["x-y"]), &[]).is_err());
    }

    #[test]
    fn replace_establishes_layout_and_trims_stale_rows() {
        let mut sheet = Sheet::new();
        let cfg = LayoutConfig::default();
        let three = normalize_entries(
            &strings(&["a", "b", "c"]),
            &strings(&["1", "2", "3"]),
            10,
        )
        .expect("entries");
        replace(&mut sheet, &three, &cfg).expect("replace");
        let layout = zones::locate(&sheet).expect("layout");
        assert!(layout.is_established());
        assert_eq!(layout.sessions.len(), cfg.spare_session_columns);

        let one = normalize_entries(&strings(&["z"]), &strings(&["9"]), 10).expect("entries");
        replace(&mut sheet, &one, &cfg).expect("replace");
        let roster = RosterIndex::read(&sheet);
        assert_eq!(roster.len(), 1);
        assert_eq!(sheet.last_row(), FIRST_STUDENT_ROW);
    }
}
