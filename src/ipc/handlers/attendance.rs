use crate::config::LedgerConfig;
use crate::ipc::helpers::{
    get_bool_or, get_i64_array, get_required_i64, get_required_str, get_str_array, outcome_json,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::roster::RosterIndex;
use crate::ledger::sessions::{self, AttendanceEntry, RollMode};
use crate::ledger::{self, LedgerError, Outcome};
use crate::store::{SheetStore, SqliteSheetStore};
use rusqlite::Connection;
use serde_json::{json, Value};

fn roll_mode(params: &Value) -> Result<RollMode, HandlerErr> {
    match params.get("mode") {
        None | Some(Value::Null) => Ok(RollMode::default()),
        Some(v) => v
            .as_str()
            .and_then(RollMode::parse)
            .ok_or_else(|| HandlerErr::bad_params("mode must be 'absent' or 'present'")),
    }
}

fn roster_size(sheet: &ledger::Sheet) -> Result<usize, LedgerError> {
    let n = RosterIndex::read(sheet).len();
    if n == 0 {
        return Err(LedgerError::validation("No students in this subject."));
    }
    Ok(n)
}

fn attendance_mark(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let date = get_required_str(params, "date")?;
    let hours = get_required_i64(params, "hours")?;
    let rolls = get_i64_array(params, "rolls")?;
    let mode = roll_mode(params)?;
    let overwrite = get_bool_or(params, "overwrite", false)?;
    let cfg = LedgerConfig::load(conn)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        let entry = AttendanceEntry::from_rolls(&date, hours, &rolls, mode, roster_size(sheet)?)?;
        sessions::mark_attendance(sheet, &entry, overwrite, &cfg.layout)
    })?;
    Ok(outcome_json(&outcome))
}

/// Each line is its own commit unit; a bad line is logged and the rest of
/// the batch still runs.
fn attendance_bulk(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let lines = get_str_array(params, "lines")?;
    let overwrite = get_bool_or(params, "overwrite", false)?;
    let cfg = LedgerConfig::load(conn)?;
    let store = SqliteSheetStore::new(conn);
    // Fail fast on an unknown subject rather than logging it once per line.
    store.load_sheet(&subject)?;

    let mut log = Vec::new();
    let (mut applied, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let result = ledger::apply_to_sheet(&store, &subject, |sheet| {
            let entry = sessions::parse_bulk_line(line, roster_size(sheet)?)?;
            sessions::mark_attendance(sheet, &entry, overwrite, &cfg.layout)
        });
        let (status, message) = match result {
            Ok(Outcome::Applied(m)) => {
                applied += 1;
                ("applied", m)
            }
            Ok(Outcome::Declined(m)) => {
                skipped += 1;
                ("skipped", m)
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(%subject, line, error = %e, "bulk line rejected");
                ("error", e.to_string())
            }
        };
        log.push(json!({ "line": line, "status": status, "message": message }));
    }

    Ok(json!({
        "applied": applied,
        "skipped": skipped,
        "failed": failed,
        "log": log,
    }))
}

fn attendance_dates(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({ "dates": sessions::session_dates(&sheet)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.bulk" => Some(with_conn(state, req, attendance_bulk)),
        "attendance.dates" => Some(with_conn(state, req, attendance_dates)),
        _ => None,
    }
}
