use std::fmt;
use std::io::Read;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

/// A single tabular value as loaded from a snapshot CSV.
///
/// Snapshot exports are schemaless at the cell level: the same column can
/// hold contract symbols, timestamps, or numbers depending on the row. Cells
/// therefore keep whichever of the three shapes the raw field had; numeric
/// coercion for metric rows happens later, at the reshaping boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Classify a raw CSV field. Empty fields map to [`Cell::Empty`],
    /// float-parseable fields to [`Cell::Number`], everything else to
    /// [`Cell::Text`].
    pub fn from_csv_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(value) => write!(f, "{}", value),
            Cell::Number(value) => write!(f, "{}", value),
        }
    }
}

/// An ordered, named-column table of [`Cell`] values.
///
/// This is the common currency between the snapshot fetcher and the
/// reshaping layer: one `Table` per fetched CSV object, one row per CSV
/// record, columns in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Parse a CSV document (header row required) into a table.
    ///
    /// Short records are padded with empty cells and long records truncated
    /// to the header width, so a ragged export still loads.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = Table::new(columns);
        for record in csv_reader.records() {
            let record = record?;
            let row: Vec<Cell> = record.iter().map(Cell::from_csv_field).collect();
            table.push_row(row);
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `(row, column name)`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }

    pub fn last_row(&self) -> Option<&[Cell]> {
        self.rows.last().map(|r| r.as_slice())
    }

    /// Append a row, padding or truncating it to the table width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    /// Add a column on the right; existing rows get the fill value.
    pub fn push_column(&mut self, name: impl Into<String>, fill: Cell) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    /// Names from `required` that this table lacks.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }
}
