use crate::config::LedgerConfig;
use crate::ipc::helpers::{
    get_optional_str_array, get_required_str, get_str_array, max_students, outcome_json,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::roster::{self, RosterIndex};
use crate::ledger::{self, LedgerError};
use crate::store::{SheetStore, SqliteSheetStore};
use rusqlite::Connection;
use serde_json::{json, Value};

fn roster_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let sheet = SqliteSheetStore::new(conn).load_sheet(&subject)?;
    let roster = RosterIndex::read(&sheet);
    Ok(json!({ "students": roster.students() }))
}

fn roster_replace(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = get_required_str(params, "subject")?;
    let names = get_str_array(params, "names")?;
    let external_ids = get_str_array(params, "externalIds")?;
    let cfg = LedgerConfig::load(conn)?;
    let entries = roster::normalize_entries(&names, &external_ids, max_students(params, &cfg)?)?;

    let store = SqliteSheetStore::new(conn);
    let outcome = ledger::apply_to_sheet(&store, &subject, |sheet| {
        roster::replace(sheet, &entries, &cfg.layout)
    })?;
    Ok(outcome_json(&outcome))
}

fn roster_copy(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let from = get_required_str(params, "from")?;
    let to = get_required_str(params, "to")?;
    if from.trim().eq_ignore_ascii_case(to.trim()) {
        return Err(HandlerErr::bad_params("source and destination must differ"));
    }
    let cfg = LedgerConfig::load(conn)?;
    let store = SqliteSheetStore::new(conn);

    let source = RosterIndex::read(&store.load_sheet(&from)?);
    if source.is_empty() {
        return Err(LedgerError::validation(format!("'{}' has no students to copy.", from.trim())).into());
    }
    let names: Vec<String> = source.students().iter().map(|s| s.name.clone()).collect();
    let ids: Vec<String> = source
        .students()
        .iter()
        .map(|s| s.external_id.clone())
        .collect();
    let entries = roster::normalize_entries(&names, &ids, max_students(params, &cfg)?)?;

    let outcome = ledger::apply_to_sheet(&store, &to, |sheet| {
        roster::replace(sheet, &entries, &cfg.layout)
    })?;
    Ok(outcome_json(&outcome))
}

fn roster_generate_ids(params: &Value) -> Result<Value, HandlerErr> {
    let prefixes = get_str_array(params, "prefixes")?;
    let ranges = get_str_array(params, "ranges")?;
    let exclusions = get_optional_str_array(params, "exclusions")?;
    let ids = roster::generate_external_ids(&prefixes, &ranges, &exclusions)?;
    Ok(json!({ "externalIds": ids, "count": ids.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.get" => Some(with_conn(state, req, roster_get)),
        "roster.replace" => Some(with_conn(state, req, roster_replace)),
        "roster.copy" => Some(with_conn(state, req, roster_copy)),
        "roster.generateIds" => Some(match roster_generate_ids(&req.params) {
            Ok(result) => crate::ipc::error::ok(&req.id, result),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
