//! Boundary resolution. The header rows are the only record of where each
//! zone lives, so every mutating call re-runs [`locate`] instead of caching a
//! layout across writes.

use serde::Serialize;

use super::sheet::{CellStyle, Sheet, FIRST_SESSION_COL, HEADER_ROW};
use super::LedgerError;

pub const TOTAL_HOURS: &str = "TOTAL HOURS";
pub const HOURS_PRESENT: &str = "HOURS PRESENT";
pub const HOURS_ABSENT: &str = "HOURS ABSENT";
pub const PERCENTAGE: &str = "PERCENTAGE";
pub const FINAL_RESULT: &str = "FINAL RESULT";

pub const SUMMARY_HEADERS: [&str; 4] = [TOTAL_HOURS, HOURS_PRESENT, HOURS_ABSENT, PERCENTAGE];
pub const SUMMARY_WIDTH: u32 = SUMMARY_HEADERS.len() as u32;

/// Names the assessment zone may not use.
pub const RESERVED_NAMES: [&str; 5] =
    [TOTAL_HOURS, HOURS_PRESENT, HOURS_ABSENT, PERCENTAGE, FINAL_RESULT];

/// Inclusive column range; empty when `end < start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpan {
    pub start: u32,
    pub end: u32,
}

impl ColumnSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn empty_at(start: u32) -> Self {
        Self {
            start,
            end: start.saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn contains(&self, col: u32) -> bool {
        col >= self.start && col <= self.end
    }

    pub fn cols(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Zone {
    Roster,
    Session,
    Summary,
    Assessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub sessions: ColumnSpan,
    /// `None` until the first roster or session write creates the block.
    pub summary: Option<ColumnSpan>,
    pub assessments: ColumnSpan,
}

impl Layout {
    fn unestablished() -> Self {
        Self {
            sessions: ColumnSpan::empty_at(FIRST_SESSION_COL),
            summary: None,
            assessments: ColumnSpan::empty_at(FIRST_SESSION_COL),
        }
    }

    pub fn is_established(&self) -> bool {
        self.summary.is_some()
    }

    pub fn summary_start(&self) -> Option<u32> {
        self.summary.map(|s| s.start)
    }

    pub fn zone_of(&self, col: u32) -> Option<Zone> {
        if col < FIRST_SESSION_COL {
            return Some(Zone::Roster);
        }
        if self.sessions.contains(col) {
            return Some(Zone::Session);
        }
        if self.summary.is_some_and(|s| s.contains(col)) {
            return Some(Zone::Summary);
        }
        if self.assessments.contains(col) {
            return Some(Zone::Assessment);
        }
        None
    }
}

fn header_is(sheet: &Sheet, col: u32, wanted: &str) -> bool {
    sheet
        .text(HEADER_ROW, col)
        .is_some_and(|h| h.eq_ignore_ascii_case(wanted))
}

/// Resolve the current zone boundaries from the header row.
///
/// The summary block is found by scanning right to left for the
/// "HOURS PRESENT" sentinel; its start is one column before the sentinel and
/// all four summary headers must be in place. Without a sentinel the sheet
/// has no zones yet.
pub fn locate(sheet: &Sheet) -> Result<Layout, LedgerError> {
    let last = sheet.last_header_col();
    let sentinel = (FIRST_SESSION_COL + 1..=last)
        .rev()
        .find(|&col| header_is(sheet, col, HOURS_PRESENT));

    let Some(sentinel) = sentinel else {
        if let Some(col) = (FIRST_SESSION_COL..=last)
            .find(|&col| SUMMARY_HEADERS.iter().any(|h| header_is(sheet, col, h)))
        {
            return Err(LedgerError::structural(format!(
                "Summary headers are incomplete near column {}: '{}' is missing.",
                col, HOURS_PRESENT
            )));
        }
        tracing::debug!("no summary block; layout not established");
        return Ok(Layout::unestablished());
    };

    let start = sentinel - 1;
    for (offset, expected) in SUMMARY_HEADERS.iter().enumerate() {
        let col = start + offset as u32;
        if !header_is(sheet, col, expected) {
            return Err(LedgerError::structural(format!(
                "Summary block is damaged: expected '{}' in column {}.",
                expected, col
            )));
        }
    }

    let summary_end = start + SUMMARY_WIDTH - 1;
    let layout = Layout {
        sessions: ColumnSpan::new(FIRST_SESSION_COL, start - 1),
        summary: Some(ColumnSpan::new(start, summary_end)),
        assessments: ColumnSpan::new(summary_end + 1, last.max(summary_end)),
    };
    tracing::debug!(
        sessions = ?layout.sessions,
        summary_start = start,
        assessments = ?layout.assessments,
        "zones located"
    );
    Ok(layout)
}

/// Write the four summary headers at `start`.
pub(crate) fn write_summary_headers(sheet: &mut Sheet, start: u32) {
    for (offset, header) in SUMMARY_HEADERS.iter().enumerate() {
        sheet.set(HEADER_ROW, start + offset as u32, *header, CellStyle::Header);
    }
}
