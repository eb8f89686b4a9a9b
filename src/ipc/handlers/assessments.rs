use std::collections::BTreeMap;

use crate::config::LedgerConfig;
use crate::ipc::helpers::{
    get_bool_or, get_required_i64, get_required_str, outcome_json, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, assessments};
use crate::store::{SheetStore, SqliteSheetStore};
use rusqlite::Connection;
use serde_json::{json, Value};

/// `maxMarks` arrives as typed text or a number; text is validated by the
/// registry so a non-numeric value gets its message rather than bad_params.
fn max_marks_raw(params: &Value) -> Result<String, HandlerErr> {
    match params.get("maxMarks") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params("missing maxMarks")),
    }
}

fn marks_param(params: &Value) -> Result<Vec<Option<i64>>, HandlerErr> {
    let Some(items) = params.get("marks").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("marks must be an array"));
    };
    items
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            v => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| HandlerErr::bad_params("marks must contain integers or null")),
        })
        .collect()
}

fn weights_param(params: &Value) -> Result<BTreeMap<String, f64>, HandlerErr> {
    let Some(obj) = params.get("weights").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("weights must be an object"));
    };
    obj.iter()
        .map(|(k, v)| {
            v.as_f64()
                .map(|w| (k.clone(), w))
                .ok_or_else(|| HandlerErr::bad_params(format!("weight for {} must be a number", k)))
        })
        .collect()
}

fn assessments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({
        "assessments": assessments::list(&sheet)?,
        "finalResult": assessments::final_result(&sheet)?,
    }))
}

fn assessments_max_marks(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({ "maxMarks": assessments::max_marks(&sheet, &name)? }))
}

fn assessments_marks_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    Ok(json!({
        "maxMarks": assessments::max_marks(&sheet, &name)?,
        "marks": assessments::marks(&sheet, &name)?,
    }))
}

fn assessments_add(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let max_raw = max_marks_raw(params)?;
    let drop_stale = get_bool_or(params, "dropStaleFinalResult", false)?;
    let cfg = LedgerConfig::load(conn)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        assessments::add(sheet, &name, &max_raw, drop_stale, &cfg.layout)
    })?;
    Ok(outcome_json(&outcome))
}

fn assessments_convert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let old_max = get_required_i64(params, "oldMax")?;
    let new_max = get_required_i64(params, "newMax")?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        assessments::convert(sheet, &name, old_max, new_max)
    })?;
    Ok(outcome_json(&outcome))
}

fn assessments_remove(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let drop_stale = get_bool_or(params, "dropStaleFinalResult", false)?;
    let cfg = LedgerConfig::load(conn)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        assessments::remove(sheet, &name, drop_stale, &cfg.layout)
    })?;
    Ok(outcome_json(&outcome))
}

fn assessments_marks_set(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let name = get_required_str(params, "name")?;
    let marks = marks_param(params)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        assessments::set_marks(sheet, &name, &marks)
    })?;
    Ok(outcome_json(&outcome))
}

fn assessments_finalize(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let weights = weights_param(params)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        assessments::finalize(sheet, &weights)
    })?;
    Ok(outcome_json(&outcome))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.list" => Some(with_conn(state, req, assessments_list)),
        "assessments.maxMarks" => Some(with_conn(state, req, assessments_max_marks)),
        "assessments.marks.get" => Some(with_conn(state, req, assessments_marks_get)),
        "assessments.add" => Some(with_conn(state, req, assessments_add)),
        "assessments.convert" => Some(with_conn(state, req, assessments_convert)),
        "assessments.remove" => Some(with_conn(state, req, assessments_remove)),
        "assessments.marks.set" => Some(with_conn(state, req, assessments_marks_set)),
        "assessments.finalize" => Some(with_conn(state, req, assessments_finalize)),
        _ => None,
    }
}
