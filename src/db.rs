use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "rollbook.sqlite3";

/// A locked workspace must surface quickly as a resource error rather than
/// hang the request loop.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cells(
            subject_id TEXT NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            kind TEXT NOT NULL,
            text_value TEXT,
            int_value INTEGER,
            style TEXT NOT NULL,
            PRIMARY KEY(subject_id, row, col),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cells_subject_col ON cells(subject_id, col)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    ensure_subjects_sort_order(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_subjects_sort_order(conn: &Connection) -> anyhow::Result<()> {
    // Renumber densely if an older workspace left gaps or duplicates.
    let mut stmt = conn.prepare("SELECT id FROM subjects ORDER BY sort_order, rowid")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for (i, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE subjects SET sort_order = ? WHERE id = ? AND sort_order <> ?",
            (i as i64, id, i as i64),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        assert_eq!(settings_get_json(&conn, "setup.layout").expect("get"), None);

        let v = serde_json::json!({ "spareSessionColumns": 3 });
        settings_set_json(&conn, "setup.layout", &v).expect("set");
        let w = serde_json::json!({ "spareSessionColumns": 7 });
        settings_set_json(&conn, "setup.layout", &w).expect("set");
        assert_eq!(settings_get_json(&conn, "setup.layout").expect("get"), Some(w));
    }

    #[test]
    fn reopening_keeps_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop(open_db(dir.path()).expect("open"));
        let conn = open_db(dir.path()).expect("reopen");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0);
        assert!(dir.path().join(DB_FILE_NAME).is_file());
    }
}
