use crate::config::LedgerConfig;
use crate::ipc::helpers::{get_required_str, get_str_array, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{reports, zones};
use crate::store::{SheetStore, SqliteSheetStore};
use rusqlite::Connection;
use serde_json::{json, Value};

fn reports_low_attendance(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let threshold = match params.get("threshold") {
        None | Some(Value::Null) => LedgerConfig::load(conn)?.reports.low_attendance_threshold,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| HandlerErr::bad_params("threshold must be a number"))?,
    };
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;

    match reports::low_attendance(&sheet, threshold)? {
        None => Ok(json!({
            "threshold": threshold,
            "established": false,
            "students": [],
            "message": "No attendance has been recorded for this subject yet.",
        })),
        Some(students) => {
            let lines: Vec<String> = students.iter().map(|s| s.line()).collect();
            let message = if students.is_empty() {
                format!("No students below {}% attendance.", threshold)
            } else {
                format!("Students below {}% attendance:\n{}", threshold, lines.join("\n"))
            };
            Ok(json!({
                "threshold": threshold,
                "established": true,
                "students": students,
                "message": message,
            }))
        }
    }
}

fn reports_by_date(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let dates = get_str_array(params, "dates")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({ "reports": reports::by_date(subject.trim(), &sheet, &dates)? }))
}

fn reports_by_student(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let names = get_str_array(params, "names")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({ "reports": reports::by_student(subject.trim(), &sheet, &names)? }))
}

fn layout_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    let layout = zones::locate(&sheet)?;
    Ok(json!({
        "established": layout.is_established(),
        "layout": layout,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.lowAttendance" => Some(with_conn(state, req, reports_low_attendance)),
        "reports.byDate" => Some(with_conn(state, req, reports_by_date)),
        "reports.byStudent" => Some(with_conn(state, req, reports_by_student)),
        "layout.get" => Some(with_conn(state, req, layout_get)),
        _ => None,
    }
}
