//! Session zone: one column per attendance date.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::roster::{Roll, RosterIndex};
use super::sheet::{CellStyle, Sheet, DATE_ROW, HOURS_ROW};
use super::zones::{self, Layout};
use super::{relocate, summary, LedgerError, Outcome};
use crate::config::LayoutConfig;

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const MIN_HOURS: i64 = 1;
pub const MAX_HOURS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionDate(NaiveDate);

impl SessionDate {
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|_| {
                LedgerError::validation(format!(
                    "Invalid date '{}'. Use DD-MM-YYYY.",
                    raw.trim()
                ))
            })
    }
}

impl fmt::Display for SessionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hours(i64);

impl Hours {
    pub fn new(value: i64) -> Result<Self, LedgerError> {
        if !(MIN_HOURS..=MAX_HOURS).contains(&value) {
            return Err(LedgerError::validation(format!(
                "Hours must be {}-{}.",
                MIN_HOURS, MAX_HOURS
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn code(self) -> &'static str {
        match self {
            Self::Present => "P",
            Self::Absent => "A",
        }
    }

    pub fn style(self) -> CellStyle {
        match self {
            Self::Present => CellStyle::Present,
            Self::Absent => CellStyle::Absent,
        }
    }

    fn from_cell(sheet: &Sheet, row: u32, col: u32) -> Option<Self> {
        match sheet.text(row, col)?.to_ascii_uppercase().as_str() {
            "P" => Some(Self::Present),
            "A" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Which students the roll list names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollMode {
    #[default]
    Absentees,
    Presentees,
}

impl RollMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absent" => Some(Self::Absentees),
            "present" => Some(Self::Presentees),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionColumn {
    pub col: u32,
    pub date: String,
    pub hours: i64,
    /// Indexed by roll - 1.
    pub statuses: Vec<Option<Status>>,
}

/// One validated attendance write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEntry {
    pub date: SessionDate,
    pub hours: Hours,
    pub absent: BTreeSet<Roll>,
}

impl AttendanceEntry {
    pub fn from_rolls(
        date: &str,
        hours: i64,
        rolls: &[i64],
        mode: RollMode,
        total: usize,
    ) -> Result<Self, LedgerError> {
        let date = SessionDate::parse(date)?;
        let hours = Hours::new(hours)?;

        let invalid: Vec<i64> = rolls
            .iter()
            .copied()
            .filter(|&r| r < 1 || r > total as i64)
            .collect();
        if !invalid.is_empty() {
            return Err(LedgerError::validation(format!(
                "Invalid Rolls: {:?} out of range (1-{}).",
                invalid, total
            )));
        }
        let listed: BTreeSet<Roll> = rolls
            .iter()
            .map(|&r| Roll::new(r, total))
            .collect::<Result<_, _>>()?;

        let absent = match mode {
            RollMode::Absentees => listed,
            RollMode::Presentees => (1..=total as i64)
                .map(|r| Roll::new(r, total))
                .collect::<Result<BTreeSet<_>, _>>()?
                .difference(&listed)
                .copied()
                .collect(),
        };
        Ok(Self { date, hours, absent })
    }

    pub fn status_of(&self, roll: Roll) -> Status {
        if self.absent.contains(&roll) {
            Status::Absent
        } else {
            Status::Present
        }
    }
}

/// Parse one `DATE:HOURS:ROLLS` line; rolls are comma separated absentees and
/// may be empty.
pub fn parse_bulk_line(line: &str, total: usize) -> Result<AttendanceEntry, LedgerError> {
    let parts: Vec<&str> = line.split(':').map(str::trim).collect();
    let [date, hours, rolls] = parts.as_slice() else {
        return Err(LedgerError::validation(
            "Invalid format. Must be DATE:HOURS:ROLLS.",
        ));
    };
    let hours: i64 = hours
        .parse()
        .map_err(|_| LedgerError::validation("Hours must be a whole number."))?;
    let rolls = rolls
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            r.parse::<i64>()
                .map_err(|_| LedgerError::validation("Invalid roll number format."))
        })
        .collect::<Result<Vec<_>, _>>()?;
    AttendanceEntry::from_rolls(date, hours, &rolls, RollMode::Absentees, total)
}

fn is_date(sheet: &Sheet, col: u32, date: SessionDate) -> bool {
    match sheet.text(DATE_ROW, col) {
        Some(text) => SessionDate::parse(&text).is_ok_and(|d| d == date) || text == date.to_string(),
        None => false,
    }
}

fn first_free_col(sheet: &Sheet, layout: &Layout) -> Option<u32> {
    layout
        .sessions
        .cols()
        .find(|&col| sheet.is_blank(DATE_ROW, col))
}

/// Every dated column of the session zone, in column order.
pub fn read_sessions(
    sheet: &Sheet,
    layout: &Layout,
    roster: &RosterIndex,
) -> Result<Vec<SessionColumn>, LedgerError> {
    let mut out = Vec::new();
    for col in layout.sessions.cols() {
        let Some(date) = sheet.text(DATE_ROW, col) else {
            continue;
        };
        let hours = sheet
            .int(HOURS_ROW, col)
            .filter(|h| (MIN_HOURS..=MAX_HOURS).contains(h))
            .ok_or_else(|| {
                LedgerError::structural(format!(
                    "Session '{}' in column {} has no valid hours.",
                    date, col
                ))
            })?;
        let statuses = roster
            .rows()
            .map(|row| Status::from_cell(sheet, row, col))
            .collect();
        out.push(SessionColumn {
            col,
            date,
            hours,
            statuses,
        });
    }
    Ok(out)
}

pub fn session_dates(sheet: &Sheet) -> Result<Vec<String>, LedgerError> {
    let layout = zones::locate(sheet)?;
    Ok(layout
        .sessions
        .cols()
        .filter_map(|col| sheet.text(DATE_ROW, col))
        .collect())
}

/// Give every rostered student a status in every existing session; students
/// without one are recorded absent.
pub(crate) fn fill_missing_statuses(sheet: &mut Sheet, layout: &Layout, roster: &RosterIndex) {
    let dated: Vec<u32> = layout
        .sessions
        .cols()
        .filter(|&col| !sheet.is_blank(DATE_ROW, col))
        .collect();
    for col in dated {
        for row in roster.rows() {
            if Status::from_cell(sheet, row, col).is_none() {
                sheet.set(row, col, Status::Absent.code(), Status::Absent.style());
            }
        }
    }
}

/// Record one session.
///
/// An existing column for the same date is only rewritten when `overwrite`
/// is set; otherwise the call is declined untouched. New dates take the first
/// column with an empty date cell, growing the session zone when none is left.
pub fn mark_attendance(
    sheet: &mut Sheet,
    entry: &AttendanceEntry,
    overwrite: bool,
    layout_cfg: &LayoutConfig,
) -> Result<Outcome, LedgerError> {
    let roster = RosterIndex::read(sheet);
    if roster.is_empty() {
        return Err(LedgerError::validation("No students in this subject."));
    }
    if let Some(roll) = entry.absent.iter().find(|r| r.get() as usize > roster.len()) {
        return Err(LedgerError::validation(format!(
            "Invalid Rolls: [{}] out of range (1-{}).",
            roll,
            roster.len()
        )));
    }

    let mut layout = zones::locate(sheet)?;
    if !layout.is_established() {
        layout = relocate::establish(sheet, layout_cfg)?;
    }

    let existing = layout
        .sessions
        .cols()
        .find(|&col| is_date(sheet, col, entry.date));
    let col = match existing {
        Some(_) if !overwrite => {
            tracing::info!(date = %entry.date, "session exists; overwrite declined");
            return Ok(Outcome::Declined(format!(
                "An entry for {} already exists. It was not overwritten.",
                entry.date
            )));
        }
        Some(col) => col,
        None => match first_free_col(sheet, &layout) {
            Some(col) => col,
            None => {
                layout = relocate::grow_and_relocate(
                    sheet,
                    &layout,
                    layout_cfg.growth_step(),
                    layout_cfg,
                )?;
                first_free_col(sheet, &layout).ok_or_else(|| {
                    LedgerError::structural("No free session column after relocation.")
                })?
            }
        },
    };

    sheet.set(DATE_ROW, col, entry.date.to_string(), CellStyle::None);
    sheet.set(HOURS_ROW, col, entry.hours.get(), CellStyle::None);
    for student in roster.students() {
        let status = entry.status_of(student.roll);
        sheet.set(student.roll.row(), col, status.code(), status.style());
    }

    summary::recompute(sheet, &layout, &roster)?;
    tracing::info!(
        date = %entry.date,
        hours = entry.hours.get(),
        col,
        absent = entry.absent.len(),
        overwritten = existing.is_some(),
        "attendance marked"
    );
    Ok(Outcome::Applied("Attendance data saved successfully!".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::sheet::FIRST_STUDENT_ROW;
    use crate::ledger::testing::roster_sheet;

    fn entry(date: &str, hours: i64, absent: &[i64], total: usize) -> AttendanceEntry {
        AttendanceEntry::from_rolls(date, hours, absent, RollMode::Absentees, total)
            .expect("entry")
    }

    fn statuses(sheet: &Sheet, col: u32, n: u32) -> Vec<String> {
        (0..n)
            .map(|i| sheet.text(FIRST_STUDENT_ROW + i, col).unwrap_or_default())
            .collect()
    }

    #[test]
    fn hours_outside_one_to_eight_fail_validation() {
        for bad in [0, 9, -1] {
            let err = AttendanceEntry::from_rolls("01-01-2025", bad, &[], RollMode::Absentees, 3)
                .expect_err("hours");
            assert_eq!(err.code(), "validation_failed");
        }
        assert!(Hours::new(1).is_ok());
        assert!(Hours::new(8).is_ok());
    }

    #[test]
    fn malformed_dates_and_rolls_fail_validation() {
        assert!(SessionDate::parse("2025-01-01").is_err());
        assert!(SessionDate::parse("31-02-2025").is_err());
        let err = AttendanceEntry::from_rolls("01-01-2025", 2, &[0, 4], RollMode::Absentees, 3)
            .expect_err("rolls");
        assert!(err.to_string().contains("[0, 4]"));
    }

    #[test]
    fn presentee_mode_inverts_the_list() {
        let e = AttendanceEntry::from_rolls("01-01-2025", 1, &[2], RollMode::Presentees, 3)
            .expect("entry");
        let absent: Vec<u32> = e.absent.iter().map(|r| r.get()).collect();
        assert_eq!(absent, vec![1, 3]);
    }

    #[test]
    fn empty_absent_set_marks_everyone_present() {
        let cfg = LayoutConfig::default();
        let mut sheet = roster_sheet(4, &cfg);
        mark_attendance(&mut sheet, &entry("05-03-2025", 3, &[], 4), false, &cfg)
            .expect("mark");
        let layout = zones::locate(&sheet).expect("layout");
        let col = layout.sessions.start;
        assert_eq!(statuses(&sheet, col, 4), vec!["P"; 4]);
        assert_eq!(
            sheet.cell(FIRST_STUDENT_ROW, col).map(|c| c.style),
            Some(CellStyle::Present)
        );
    }

    #[test]
    fn existing_date_is_declined_without_overwrite() {
        let cfg = LayoutConfig::default();
        let mut sheet = roster_sheet(3, &cfg);
        mark_attendance(&mut sheet, &entry("01-01-2025", 2, &[2], 3), false, &cfg)
            .expect("first");
        let before = sheet.clone();
        let outcome = mark_attendance(&mut sheet, &entry("01-01-2025", 4, &[], 3), false, &cfg)
            .expect("second");
        assert!(matches!(outcome, Outcome::Declined(_)));
        assert_eq!(sheet, before);

        let outcome = mark_attendance(&mut sheet, &entry("1-1-2025", 4, &[], 3), true, &cfg)
            .expect("overwrite");
        assert!(matches!(outcome, Outcome::Applied(_)));
        assert_eq!(session_dates(&sheet).expect("dates"), vec!["01-01-2025"]);
        let col = zones::locate(&sheet).expect("layout").sessions.start;
        assert_eq!(sheet.int(HOURS_ROW, col), Some(4));
        assert_eq!(statuses(&sheet, col, 3), vec!["P"; 3]);
    }

    #[test]
    fn empty_roster_cannot_take_attendance() {
        let cfg = LayoutConfig::default();
        let mut sheet = Sheet::new();
        let e = AttendanceEntry {
            date: SessionDate::parse("01-01-2025").expect("date"),
            hours: Hours::new(1).expect("hours"),
            absent: BTreeSet::new(),
        };
        let err = mark_attendance(&mut sheet, &e, false, &cfg).expect_err("empty");
        assert_eq!(err.code(), "validation_failed");
        assert!(sheet.is_empty());
    }

    #[test]
    fn bulk_lines_parse_or_explain() {
        let e = parse_bulk_line(" 02-01-2025 : 2 : 1, 3 ", 3).expect("line");
        assert_eq!(e.absent.len(), 2);
        let all_present = parse_bulk_line("02-01-2025:2:", 3).expect("line");
        assert!(all_present.absent.is_empty());

        assert!(parse_bulk_line("02-01-2025:2", 3).is_err());
        assert!(parse_bulk_line("02-01-2025:two:1", 3).is_err());
        assert!(parse_bulk_line("02-01-2025:2:x", 3).is_err());
        assert!(parse_bulk_line("02-01-2025:2:7", 3).is_err());
    }

    #[test]
    fn new_students_get_absent_for_past_sessions() {
        let cfg = LayoutConfig::default();
        let mut sheet = roster_sheet(2, &cfg);
        mark_attendance(&mut sheet, &entry("01-01-2025", 2, &[], 2), false, &cfg)
            .expect("mark");
        let layout = zones::locate(&sheet).expect("layout");
        sheet.set(FIRST_STUDENT_ROW + 2, 1, 3i64, CellStyle::None);
        let roster = RosterIndex::read(&sheet);
        fill_missing_statuses(&mut sheet, &layout, &roster);
        assert_eq!(statuses(&sheet, layout.sessions.start, 3), vec!["P", "P", "A"]);
    }
}
