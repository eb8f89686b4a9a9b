//! Moving the summary block and the assessment zone.
//!
//! Every rebuild is staged on a copy of the sheet, checked against the
//! assessments read before the move, and only then swapped in. A failed check
//! leaves the caller's sheet exactly as it was.

use super::assessments::{self, AssessmentZone};
use super::roster::RosterIndex;
use super::sheet::{Cell, Sheet, FIRST_SESSION_COL};
use super::zones::{self, write_summary_headers, Layout, SUMMARY_WIDTH};
use super::{summary, LedgerError};
use crate::config::LayoutConfig;

/// Create the summary block on a sheet that has none, leaving
/// `spare_session_columns` empty session columns in front of it.
pub fn establish(sheet: &mut Sheet, cfg: &LayoutConfig) -> Result<Layout, LedgerError> {
    let current = zones::locate(sheet)?;
    if current.is_established() {
        return Ok(current);
    }
    if sheet.last_header_col() >= FIRST_SESSION_COL {
        return Err(LedgerError::structural(
            "Sheet has column headers but no summary block; it cannot be laid out.",
        ));
    }

    let start = FIRST_SESSION_COL + cfg.spare_session_columns;
    let mut candidate = sheet.clone();
    write_summary_headers(&mut candidate, start);
    let layout = zones::locate(&candidate)?;
    let roster = RosterIndex::read(&candidate);
    summary::recompute(&mut candidate, &layout, &roster)?;
    *sheet = candidate;

    tracing::info!(summary_start = start, "layout established");
    Ok(layout)
}

/// Widen the session zone by `extra` columns, shifting the summary block and
/// every assessment right. Assessment columns move verbatim and keep their
/// order; a final result survives only while every assessment it weighs is
/// still present.
pub fn grow_and_relocate(
    sheet: &mut Sheet,
    layout: &Layout,
    extra: u32,
    cfg: &LayoutConfig,
) -> Result<Layout, LedgerError> {
    if extra == 0 {
        return Err(LedgerError::validation(
            "Relocation needs at least one extra column.",
        ));
    }
    let old_start = layout
        .summary_start()
        .ok_or_else(|| LedgerError::structural("Summary block is missing."))?;
    let new_layout = rebuild_tail(sheet, layout, old_start + extra, None, true, cfg)?;
    tracing::info!(
        from = old_start,
        to = old_start + extra,
        assessments = new_layout.assessments.len(),
        "summary and assessments relocated"
    );
    Ok(new_layout)
}

/// Rewrite everything from the summary block rightwards.
///
/// `drop_assessment` leaves one assessment out of the rebuilt zone.
/// `keep_final_result` restores an existing final result after the
/// assessments when its weights still resolve.
pub(crate) fn rebuild_tail(
    sheet: &mut Sheet,
    layout: &Layout,
    new_summary_start: u32,
    drop_assessment: Option<&str>,
    keep_final_result: bool,
    cfg: &LayoutConfig,
) -> Result<Layout, LedgerError> {
    let old_start = layout
        .summary_start()
        .ok_or_else(|| LedgerError::structural("Summary block is missing."))?;
    if new_summary_start < old_start {
        return Err(LedgerError::structural(
            "The summary block can only move right.",
        ));
    }

    let zone = assessments::read_zone(sheet, layout)?;
    let kept: Vec<_> = zone
        .assessments
        .iter()
        .filter(|a| drop_assessment.map_or(true, |d| !a.name.eq_ignore_ascii_case(d)))
        .map(|a| (a, sheet.column_cells(a.col)))
        .collect();

    let mut candidate = sheet.clone();
    candidate.clear_columns_from(old_start);
    write_summary_headers(&mut candidate, new_summary_start);

    let mut col = new_summary_start + SUMMARY_WIDTH + cfg.assessment_gap;
    for (_, cells) in &kept {
        paste_column(&mut candidate, col, cells);
        col += 1;
    }

    if let Some(fr) = &zone.final_result {
        let resolves = fr.weights.as_ref().is_some_and(|w| {
            w.keys()
                .all(|name| kept.iter().any(|(a, _)| a.name.eq_ignore_ascii_case(name)))
        });
        if keep_final_result && resolves {
            paste_column(&mut candidate, col, &sheet.column_cells(fr.col));
        } else {
            tracing::warn!("final result dropped; it must be recalculated");
        }
    }

    let new_layout = zones::locate(&candidate)?;
    let moved = assessments::read_zone(&candidate, &new_layout)?;
    if !same_assessments(&kept.iter().map(|(a, _)| *a).collect::<Vec<_>>(), &moved) {
        tracing::warn!("relocation check failed; sheet left unchanged");
        return Err(LedgerError::structural(
            "Assessment data did not survive the move; the sheet was left unchanged.",
        ));
    }
    let roster = RosterIndex::read(&candidate);
    summary::recompute(&mut candidate, &new_layout, &roster)?;

    *sheet = candidate;
    Ok(new_layout)
}

fn paste_column(sheet: &mut Sheet, col: u32, cells: &[(u32, Cell)]) {
    for (row, cell) in cells {
        sheet.set_cell(*row, col, cell.clone());
    }
}

fn same_assessments(before: &[&assessments::Assessment], after: &AssessmentZone) -> bool {
    before.len() == after.assessments.len()
        && before.iter().zip(&after.assessments).all(|(b, a)| {
            b.name == a.name && b.max_marks == a.max_marks && b.marks == a.marks
        })
}
