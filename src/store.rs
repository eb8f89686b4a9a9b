//! Sheet persistence. Each subject's sheet is a set of sparse cell rows; a
//! commit writes only the cells that changed, inside one immediate
//! transaction.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::ledger::sheet::{Cell, CellChange, CellStyle, CellValue};
use crate::ledger::{self, assessments, roster::RosterIndex, sessions, LedgerError, Sheet};

pub trait SheetStore {
    fn load_sheet(&self, subject: &str) -> Result<Sheet, LedgerError>;

    /// Persist `after`, given the `before` it was derived from. Returns the
    /// number of cells written or removed.
    fn commit_sheet(&self, subject: &str, before: &Sheet, after: &Sheet)
        -> Result<usize, LedgerError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub students: usize,
    pub sessions: usize,
    pub assessments: usize,
}

pub struct SqliteSheetStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSheetStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn subject_id(&self, name: &str) -> Result<String, LedgerError> {
        self.conn
            .query_row(
                "SELECT id FROM subjects WHERE name = ? COLLATE NOCASE",
                [name.trim()],
                |r| r.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Subject '{}' not found.", name.trim())))
    }

    fn load_by_id(&self, subject_id: &str) -> Result<Sheet, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT row, col, kind, text_value, int_value, style
             FROM cells
             WHERE subject_id = ?",
        )?;
        let raw = stmt
            .query_map([subject_id], |r| {
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, u32>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut cells = Vec::with_capacity(raw.len());
        for (row, col, kind, text, int, style) in raw {
            let value = match (kind.as_str(), text, int) {
                ("text", Some(t), _) => CellValue::Text(t),
                ("int", _, Some(n)) => CellValue::Int(n),
                _ => {
                    return Err(LedgerError::structural(format!(
                        "Stored cell ({}, {}) has an unreadable value of kind '{}'.",
                        row, col, kind
                    )))
                }
            };
            let style = CellStyle::parse(&style).unwrap_or_default();
            cells.push(((row, col), Cell { value, style }));
        }
        let sheet = Sheet::from_cells(cells);
        if sheet.is_empty() {
            tracing::warn!(subject_id, "subject has no stored cells");
        } else {
            tracing::debug!(subject_id, cells = sheet.len(), "sheet loaded");
        }
        Ok(sheet)
    }

    /// Subjects in creation order with their current sizes.
    pub fn list_subjects(&self) -> Result<Vec<SubjectSummary>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM subjects ORDER BY sort_order")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, name) in rows {
            let sheet = self.load_by_id(&id)?;
            let sessions = sessions::session_dates(&sheet).map(|d| d.len());
            let assessment_count = assessments::list(&sheet).map(|a| a.len());
            if let (Err(e), _) | (_, Err(e)) = (&sessions, &assessment_count) {
                tracing::warn!(subject = %name, error = %e, "sheet layout unreadable");
            }
            out.push(SubjectSummary {
                id,
                students: RosterIndex::read(&sheet).len(),
                sessions: sessions.unwrap_or(0),
                assessments: assessment_count.unwrap_or(0),
                name,
            });
        }
        Ok(out)
    }

    /// Register a subject and write its formatted empty sheet.
    pub fn create_subject(&self, name: &str) -> Result<String, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("Subject name is required."));
        }
        match self.subject_id(name) {
            Ok(_) => {
                return Err(LedgerError::validation(format!(
                    "A subject named '{}' already exists.",
                    name
                )))
            }
            Err(LedgerError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let mut sheet = Sheet::new();
        ledger::format_new_sheet(&mut sheet, name);

        let id = uuid::Uuid::new_v4().to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let next_order: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subjects",
            [],
            |r| r.get(0),
        )?;
        tx.execute(
            "INSERT INTO subjects(id, name, sort_order, created_at) VALUES(?, ?, ?, ?)",
            (
                &id,
                name,
                next_order,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        write_changes(&tx, &id, &sheet.diff(&Sheet::new()))?;
        tx.commit()?;

        tracing::info!(subject = %name, %id, "subject created");
        Ok(id)
    }
}

fn write_changes(
    tx: &Transaction<'_>,
    subject_id: &str,
    changes: &[CellChange],
) -> Result<(), LedgerError> {
    let mut upsert = tx.prepare(
        "INSERT INTO cells(subject_id, row, col, kind, text_value, int_value, style)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(subject_id, row, col) DO UPDATE SET
            kind = excluded.kind,
            text_value = excluded.text_value,
            int_value = excluded.int_value,
            style = excluded.style",
    )?;
    let mut delete = tx.prepare("DELETE FROM cells WHERE subject_id = ? AND row = ? AND col = ?")?;

    for change in changes {
        match change {
            CellChange::Set { row, col, cell } => {
                let (text, int) = match &cell.value {
                    CellValue::Text(t) => (Some(t.as_str()), None),
                    CellValue::Int(n) => (None, Some(*n)),
                };
                upsert.execute((
                    subject_id,
                    row,
                    col,
                    cell.value.kind(),
                    text,
                    int,
                    cell.style.as_str(),
                ))?;
            }
            CellChange::Clear { row, col } => {
                delete.execute((subject_id, row, col))?;
            }
        }
    }
    Ok(())
}

impl SheetStore for SqliteSheetStore<'_> {
    fn load_sheet(&self, subject: &str) -> Result<Sheet, LedgerError> {
        let id = self.subject_id(subject)?;
        self.load_by_id(&id)
    }

    fn commit_sheet(
        &self,
        subject: &str,
        before: &Sheet,
        after: &Sheet,
    ) -> Result<usize, LedgerError> {
        let changes = after.diff(before);
        if changes.is_empty() {
            return Ok(0);
        }
        let id = self.subject_id(subject)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|e| {
                let e = LedgerError::from(e);
                tracing::warn!(subject, error = %e, "commit could not start");
                e
            })?;
        write_changes(&tx, &id, &changes)?;
        tx.commit().map_err(|e| {
            let e = LedgerError::from(e);
            tracing::warn!(subject, error = %e, "commit failed; changes discarded");
            e
        })?;

        tracing::info!(subject, cells = changes.len(), "sheet saved");
        Ok(changes.len())
    }
}
