//! Sparse cell grid for one subject.
//!
//! Rows and columns are 1-based, like the persisted document. The fixed row
//! axis is: title, session date, session hours (or an assessment's declared
//! maximum), column headers, then one row per student.

use std::collections::BTreeMap;
use std::fmt;

pub const TITLE_ROW: u32 = 1;
pub const DATE_ROW: u32 = 2;
pub const HOURS_ROW: u32 = 3;
pub const HEADER_ROW: u32 = 4;
pub const FIRST_STUDENT_ROW: u32 = 5;

pub const ROLL_COL: u32 = 1;
pub const NAME_COL: u32 = 2;
pub const EXTERNAL_ID_COL: u32 = 3;
pub const FIRST_SESSION_COL: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Int(i64),
}

impl CellValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "int",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Visual marker persisted alongside each value. Present/Absent always travel
/// with the "P"/"A" status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellStyle {
    #[default]
    None,
    Title,
    Bold,
    Header,
    Present,
    Absent,
}

impl CellStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Title => "title",
            Self::Bold => "bold",
            Self::Header => "header",
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "title" => Some(Self::Title),
            "bold" => Some(Self::Bold),
            "header" => Some(Self::Header),
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

impl Cell {
    pub fn new(value: impl Into<CellValue>, style: CellStyle) -> Self {
        Self {
            value: value.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellChange {
    Set { row: u32, col: u32, cell: Cell },
    Clear { row: u32, col: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    cells: BTreeMap<(u32, u32), Cell>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = ((u32, u32), Cell)>,
    {
        Self {
            cells: cells.into_iter().collect(),
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Trimmed text of a cell; integers are rendered. Blank cells yield `None`.
    pub fn text(&self, row: u32, col: u32) -> Option<String> {
        let s = self.cell(row, col)?.value.to_string();
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    }

    pub fn int(&self, row: u32, col: u32) -> Option<i64> {
        match &self.cell(row, col)?.value {
            CellValue::Int(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn is_blank(&self, row: u32, col: u32) -> bool {
        self.text(row, col).is_none()
    }

    pub fn set(&mut self, row: u32, col: u32, value: impl Into<CellValue>, style: CellStyle) {
        self.cells.insert((row, col), Cell::new(value, style));
    }

    pub fn set_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.cells.insert((row, col), cell);
    }

    pub fn clear(&mut self, row: u32, col: u32) -> Option<Cell> {
        self.cells.remove(&(row, col))
    }

    pub fn clear_column(&mut self, col: u32) {
        self.cells.retain(|&(_, c), _| c != col);
    }

    /// Drop every cell at or right of `col`, in all rows.
    pub fn clear_columns_from(&mut self, col: u32) {
        self.cells.retain(|&(_, c), _| c < col);
    }

    /// Drop every cell at or below `row`, in all columns.
    pub fn clear_rows_from(&mut self, row: u32) {
        self.cells.retain(|&(r, _), _| r < row);
    }

    /// All occupied cells of one column, top to bottom.
    pub fn column_cells(&self, col: u32) -> Vec<(u32, Cell)> {
        self.cells
            .iter()
            .filter(|((_, c), _)| *c == col)
            .map(|((r, _), cell)| (*r, cell.clone()))
            .collect()
    }

    /// Rightmost column holding non-blank content in any of the header rows
    /// (title through column headers), or 0 for an empty sheet.
    pub fn last_header_col(&self) -> u32 {
        let mut last = 0;
        for row in TITLE_ROW..=HEADER_ROW {
            let rightmost = self
                .cells
                .range((row, 0)..=(row, u32::MAX))
                .rev()
                .find(|(_, cell)| !cell.value.to_string().trim().is_empty())
                .map(|((_, c), _)| *c)
                .unwrap_or(0);
            last = last.max(rightmost);
        }
        last
    }

    pub fn last_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell-level changes that turn `before` into `self`.
    pub fn diff(&self, before: &Sheet) -> Vec<CellChange> {
        let mut changes = Vec::new();
        for (&(row, col), cell) in &self.cells {
            if before.cells.get(&(row, col)) != Some(cell) {
                changes.push(CellChange::Set {
                    row,
                    col,
                    cell: cell.clone(),
                });
            }
        }
        for &(row, col) in before.cells.keys() {
            if !self.cells.contains_key(&(row, col)) {
                changes.push(CellChange::Clear { row, col });
            }
        }
        changes
    }
}
