use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::Cell;

/// Metric rows of a position-P&L snapshot, keyed by the table's unnamed
/// pivot column.
///
/// The raw pivot keys are free-form strings from the exporter; they are
/// normalized into this enumeration once, at ingestion, so downstream code
/// never branches on string literals. `"RealizedPnL:"` (trailing colon) is a
/// known exporter alias for `RealizedPnL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PnlMetric {
    ConPos,
    DailyPnl,
    UnrealizedPnl,
    RealizedPnl,
    Value,
    PnlTimestamp,
}

impl PnlMetric {
    /// Normalize a raw pivot-key string. Returns `None` for keys the
    /// dashboard does not consume.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Con_Pos" => Some(PnlMetric::ConPos),
            "DailyPnL" => Some(PnlMetric::DailyPnl),
            "UnrealizedPnL" => Some(PnlMetric::UnrealizedPnl),
            "RealizedPnL" | "RealizedPnL:" => Some(PnlMetric::RealizedPnl),
            "Value" => Some(PnlMetric::Value),
            "PnlTimestamp" => Some(PnlMetric::PnlTimestamp),
            _ => None,
        }
    }

    /// Every metric except the per-refresh timestamp row holds numbers.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, PnlMetric::PnlTimestamp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PnlMetric::ConPos => "Con_Pos",
            PnlMetric::DailyPnl => "DailyPnL",
            PnlMetric::UnrealizedPnl => "UnrealizedPnL",
            PnlMetric::RealizedPnl => "RealizedPnL",
            PnlMetric::Value => "Value",
            PnlMetric::PnlTimestamp => "PnlTimestamp",
        }
    }
}

impl fmt::Display for PnlMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `WriteTime`-indexed series with one `(contract, metric)` column pair
/// per contract, produced by pivoting a position-P&L table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotedSeries {
    index: Vec<String>,
    columns: Vec<(String, PnlMetric)>,
    rows: Vec<Vec<Cell>>,
}

impl PivotedSeries {
    pub fn new(index: Vec<String>, columns: Vec<(String, PnlMetric)>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            index,
            columns,
            rows,
        }
    }

    /// Write-time values, ascending.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[(String, PnlMetric)] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell for one `(write time, contract, metric)` coordinate.
    pub fn value(&self, write_time: &str, contract: &str, metric: PnlMetric) -> Option<&Cell> {
        let row = self.index.iter().position(|wt| wt == write_time)?;
        let col = self
            .columns
            .iter()
            .position(|(c, m)| c == contract && *m == metric)?;
        self.rows.get(row)?.get(col)
    }
}

/// Output orientation for the total-position table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableOrientation {
    /// One row per field, one column per contract (the dashboard grid view).
    #[default]
    FieldsAsRows,
    /// One row per contract, one column per field.
    ContractsAsRows,
}
