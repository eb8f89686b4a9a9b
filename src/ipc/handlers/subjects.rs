use crate::ipc::helpers::{get_required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteSheetStore;
use rusqlite::Connection;
use serde_json::{json, Value};

fn subjects_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let subjects = SqliteSheetStore::new(conn).list_subjects()?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let id = SqliteSheetStore::new(conn).create_subject(&name)?;
    Ok(json!({ "subjectId": id, "name": name.trim() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        _ => None,
    }
}
