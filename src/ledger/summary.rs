//! Derived attendance statistics. The block is rebuilt in full from the
//! session zone after every write and never edited on its own.

use serde::Serialize;

use super::roster::RosterIndex;
use super::sessions::{read_sessions, SessionColumn, Status};
use super::sheet::{CellStyle, Sheet, DATE_ROW, TITLE_ROW};
use super::zones::{write_summary_headers, Layout, TOTAL_HOURS};
use super::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub total_hours: i64,
    pub hours_present: i64,
    pub hours_absent: i64,
    pub percentage_present: f64,
}

impl SummaryRow {
    pub fn percentage_text(&self) -> String {
        format!("{:.2}", self.percentage_present)
    }
}

/// Per-student totals over `sessions`, for a roster of `students`.
pub fn project(sessions: &[SessionColumn], students: usize) -> Vec<SummaryRow> {
    let total_hours: i64 = sessions.iter().map(|s| s.hours).sum();
    (0..students)
        .map(|i| {
            let hours_present: i64 = sessions
                .iter()
                .filter(|s| s.statuses.get(i).copied().flatten() == Some(Status::Present))
                .map(|s| s.hours)
                .sum();
            let percentage_present = if total_hours == 0 {
                0.0
            } else {
                hours_present as f64 / total_hours as f64 * 100.0
            };
            SummaryRow {
                total_hours,
                hours_present,
                hours_absent: total_hours - hours_present,
                percentage_present,
            }
        })
        .collect()
}

/// Rewrite the summary block for every student from the current sessions.
pub fn recompute(
    sheet: &mut Sheet,
    layout: &Layout,
    roster: &RosterIndex,
) -> Result<Vec<SummaryRow>, LedgerError> {
    let start = layout
        .summary_start()
        .ok_or_else(|| LedgerError::structural("Summary block is missing."))?;
    let sessions = read_sessions(sheet, layout, roster)?;
    let rows = project(&sessions, roster.len());
    let overall: i64 = sessions.iter().map(|s| s.hours).sum();

    write_summary_headers(sheet, start);
    sheet.set(TITLE_ROW, start, TOTAL_HOURS, CellStyle::Bold);
    sheet.set(DATE_ROW, start, overall, CellStyle::Bold);
    for (student, summary) in roster.students().iter().zip(&rows) {
        let row = student.roll.row();
        sheet.set(row, start, summary.total_hours, CellStyle::None);
        sheet.set(row, start + 1, summary.hours_present, CellStyle::None);
        sheet.set(row, start + 2, summary.hours_absent, CellStyle::None);
        sheet.set(row, start + 3, summary.percentage_text(), CellStyle::None);
    }
    Ok(rows)
}

/// Current summary without touching the sheet.
pub fn snapshot(sheet: &Sheet, layout: &Layout) -> Result<Vec<SummaryRow>, LedgerError> {
    let roster = RosterIndex::read(sheet);
    let sessions = read_sessions(sheet, layout, &roster)?;
    Ok(project(&sessions, roster.len()))
}
