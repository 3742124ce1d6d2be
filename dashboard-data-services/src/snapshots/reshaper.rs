use std::collections::BTreeMap;

use dashboard_core::{Cell, PivotedSeries, PnlMetric, Table, TableOrientation, WRITE_TIME_COLUMN};
use tracing::{debug, warn};

use crate::error::SnapshotError;

/// Values above this magnitude are the exporter's "not applicable" sentinel
/// and are normalized to zero. The boundary is exclusive: a cell of exactly
/// this value passes through.
pub const SENTINEL_MAGNITUDE: f64 = 1e300;

/// Portfolio-level sum column added to cleaned position-P&L tables.
pub const TOTAL_COLUMN: &str = "Total";

const CONTRACT_COLUMN: &str = "Contract";
const FIELD_COLUMN: &str = "Field";
const CONTRACT_POSITION: &str = "Contract Position";
const POSITION_AVG_COST: &str = "Position Avg Cost";
const CONTRACT_POSITION_DUP: &str = "Contract Position (Dup)";
const MKT_VALUE: &str = "MktValue";
const POSITION_TIMESTAMP: &str = "PositionTimestamp";

/// Field rows of the total-position table, in display order.
const TOTAL_POSITION_FIELDS: [&str; 9] = [
    CONTRACT_POSITION,
    POSITION_AVG_COST,
    CONTRACT_POSITION_DUP,
    "DailyPnL",
    "UnrealizedPnL",
    "RealizedPnL",
    MKT_VALUE,
    "PnlTimestamp",
    POSITION_TIMESTAMP,
];

/// Output of [`build_timeseries`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapedTimeseries {
    pub daily_pnl: PivotedSeries,
    pub unrealized_pnl: PivotedSeries,
    /// The input position-P&L table after sentinel cleanup, pivot-key
    /// normalization, and addition of the [`TOTAL_COLUMN`].
    pub position_pnl: Table,
}

struct PnlLayout {
    pivot_col: usize,
    write_col: usize,
    contract_cols: Vec<usize>,
}

fn pnl_layout(table: &Table) -> Result<PnlLayout, SnapshotError> {
    let pivot_col = table.column_index("").ok_or_else(|| {
        SnapshotError::InsufficientData("position-P&L table has no pivot-key column".to_string())
    })?;
    let write_col = table.column_index(WRITE_TIME_COLUMN).ok_or_else(|| {
        SnapshotError::InsufficientData("position-P&L table has no WriteTime column".to_string())
    })?;
    let contract_cols = (0..table.n_columns())
        .filter(|&i| i != pivot_col && i != write_col)
        .collect();
    Ok(PnlLayout {
        pivot_col,
        write_col,
        contract_cols,
    })
}

/// Rebuild the per-contract daily and unrealized P&L time series from a raw
/// position-P&L snapshot.
///
/// The position and average-cost tables are part of the triad contract but
/// only the position-P&L table feeds the series; the other two join in via
/// [`build_total_position`].
pub fn build_timeseries(
    _position: &Table,
    _avg_cost: &Table,
    position_pnl: &Table,
) -> Result<ReshapedTimeseries, SnapshotError> {
    let cleaned = clean_position_pnl(position_pnl)?;
    let daily_pnl = pivot_series(&cleaned, &[PnlMetric::DailyPnl, PnlMetric::PnlTimestamp])?;
    let unrealized_pnl = pivot_series(
        &cleaned,
        &[PnlMetric::UnrealizedPnl, PnlMetric::PnlTimestamp],
    )?;
    Ok(ReshapedTimeseries {
        daily_pnl,
        unrealized_pnl,
        position_pnl: cleaned,
    })
}

/// Normalize pivot keys, coerce metric rows to numbers, zero out sentinel
/// values, and append the portfolio [`TOTAL_COLUMN`].
fn clean_position_pnl(input: &Table) -> Result<Table, SnapshotError> {
    let layout = pnl_layout(input)?;
    let mut columns = input.columns().to_vec();
    columns.push(TOTAL_COLUMN.to_string());
    let mut cleaned = Table::new(columns);
    for row in input.rows() {
        let mut out = row.clone();
        match row[layout.pivot_col].as_text().and_then(PnlMetric::parse) {
            Some(metric) if metric.is_numeric() => {
                out[layout.pivot_col] = Cell::Text(metric.as_str().to_string());
                let mut total = 0.0;
                for &col in &layout.contract_cols {
                    match coerce_metric_cell(&row[col], &input.columns()[col], metric) {
                        Some(value) => {
                            total += value;
                            out[col] = Cell::Number(value);
                        }
                        None => out[col] = Cell::Empty,
                    }
                }
                out.push(Cell::Number(total));
            }
            Some(metric) => {
                // timestamp rows: blank out gaps, no total
                out[layout.pivot_col] = Cell::Text(metric.as_str().to_string());
                for &col in &layout.contract_cols {
                    if out[col].is_empty() {
                        out[col] = Cell::Text(String::new());
                    }
                }
                out.push(Cell::Empty);
            }
            None => {
                debug!(
                    "unrecognized pivot key {:?}, row carried through untouched",
                    row[layout.pivot_col].to_string()
                );
                out.push(Cell::Empty);
            }
        }
        cleaned.push_row(out);
    }
    Ok(cleaned)
}

fn coerce_metric_cell(cell: &Cell, column: &str, metric: PnlMetric) -> Option<f64> {
    let value = match cell {
        Cell::Number(value) => *value,
        Cell::Empty => return None,
        Cell::Text(raw) => match raw.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "non-numeric {} cell for {} ({:?}), treating as missing",
                    metric, column, raw
                );
                return None;
            }
        },
    };
    if value.abs() > SENTINEL_MAGNITUDE {
        Some(0.0)
    } else {
        Some(value)
    }
}

/// Pivot the cleaned table to a `WriteTime` index with one
/// `(contract, metric)` column pair per contract, restricted to `metrics`.
/// An empty selection yields an empty series.
fn pivot_series(cleaned: &Table, metrics: &[PnlMetric]) -> Result<PivotedSeries, SnapshotError> {
    let layout = pnl_layout(cleaned)?;

    let mut by_key: BTreeMap<(String, PnlMetric), &Vec<Cell>> = BTreeMap::new();
    for row in cleaned.rows() {
        let Some(metric) = row[layout.pivot_col].as_text().and_then(PnlMetric::parse) else {
            continue;
        };
        if !metrics.contains(&metric) {
            continue;
        }
        let write_time = row[layout.write_col].to_string();
        if by_key.insert((write_time.clone(), metric), row).is_some() {
            warn!(
                "duplicate position-P&L row for WriteTime {} / {}, keeping the last",
                write_time, metric
            );
        }
    }

    let mut index: Vec<String> = by_key.keys().map(|(wt, _)| wt.clone()).collect();
    index.dedup(); // keys iterate sorted, duplicates are adjacent

    let present: Vec<PnlMetric> = metrics
        .iter()
        .copied()
        .filter(|metric| by_key.keys().any(|(_, km)| km == metric))
        .collect();

    let columns: Vec<(String, PnlMetric)> = layout
        .contract_cols
        .iter()
        .flat_map(|&col| {
            let name = cleaned.columns()[col].clone();
            present.iter().map(move |&metric| (name.clone(), metric))
        })
        .collect();

    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(index.len());
    for write_time in &index {
        let mut cells = Vec::with_capacity(columns.len());
        for &col in &layout.contract_cols {
            for &metric in &present {
                let cell = by_key
                    .get(&(write_time.clone(), metric))
                    .and_then(|row| row.get(col))
                    .cloned()
                    .unwrap_or(Cell::Empty);
                cells.push(cell);
            }
        }
        rows.push(cells);
    }

    Ok(PivotedSeries::new(index, columns, rows))
}

/// Join the latest position row, latest average-cost row, and most recent
/// position-P&L snapshot into the current-state table, one entry per
/// contract.
///
/// Contracts with neither a position nor an average cost are dropped; they
/// are stale or never-traded instruments carried along by the exporter.
pub fn build_total_position(
    position: &Table,
    avg_cost: &Table,
    position_pnl: &Table,
    orientation: TableOrientation,
) -> Result<Table, SnapshotError> {
    let pos_last = position.last_row().ok_or_else(|| {
        SnapshotError::InsufficientData("position table is empty".to_string())
    })?;
    let ac_last = avg_cost.last_row().ok_or_else(|| {
        SnapshotError::InsufficientData("average-cost table is empty".to_string())
    })?;
    let layout = pnl_layout(position_pnl)?;
    if position_pnl.is_empty() {
        return Err(SnapshotError::InsufficientData(
            "position-P&L table is empty".to_string(),
        ));
    }

    let latest_write_time = position_pnl
        .rows()
        .iter()
        .map(|row| row[layout.write_col].to_string())
        .max()
        .unwrap_or_default();

    let mut metric_rows: BTreeMap<PnlMetric, &Vec<Cell>> = BTreeMap::new();
    for row in position_pnl.rows() {
        if row[layout.write_col].to_string() != latest_write_time {
            continue;
        }
        let Some(metric) = row[layout.pivot_col].as_text().and_then(PnlMetric::parse) else {
            continue;
        };
        if metric_rows.insert(metric, row).is_some() {
            warn!(
                "duplicate {} row at WriteTime {}, keeping the last",
                metric, latest_write_time
            );
        }
    }

    // contract universe: union of the three sources, first-seen order
    let mut contracts: Vec<String> = Vec::new();
    let pnl_contract_names = layout
        .contract_cols
        .iter()
        .map(|&col| &position_pnl.columns()[col]);
    for name in position
        .columns()
        .iter()
        .chain(avg_cost.columns().iter())
        .chain(pnl_contract_names)
    {
        if name == WRITE_TIME_COLUMN || name.is_empty() {
            continue;
        }
        if !contracts.iter().any(|c| c == name) {
            contracts.push(name.clone());
        }
    }

    let position_timestamp = match position.column_index(WRITE_TIME_COLUMN) {
        Some(col) => pos_last.get(col).cloned().unwrap_or(Cell::Empty),
        None => {
            warn!("position table has no WriteTime column; PositionTimestamp left blank");
            Cell::Empty
        }
    };

    let metric_value = |metric: PnlMetric, contract: &str| -> Cell {
        metric_rows
            .get(&metric)
            .and_then(|row| {
                position_pnl
                    .column_index(contract)
                    .and_then(|col| row.get(col))
            })
            .cloned()
            .unwrap_or(Cell::Empty)
    };

    let mut records: Vec<(String, Vec<Cell>)> = Vec::new();
    for contract in &contracts {
        let pos_value = position
            .column_index(contract)
            .and_then(|col| pos_last.get(col))
            .cloned()
            .unwrap_or(Cell::Empty);
        let ac_value = avg_cost
            .column_index(contract)
            .and_then(|col| ac_last.get(col))
            .cloned()
            .unwrap_or(Cell::Empty);
        if pos_value.is_empty() && ac_value.is_empty() {
            continue;
        }
        let row = vec![
            pos_value,
            ac_value,
            metric_value(PnlMetric::ConPos, contract),
            metric_value(PnlMetric::DailyPnl, contract),
            metric_value(PnlMetric::UnrealizedPnl, contract),
            metric_value(PnlMetric::RealizedPnl, contract),
            metric_value(PnlMetric::Value, contract),
            metric_value(PnlMetric::PnlTimestamp, contract),
            position_timestamp.clone(),
        ];
        records.push((contract.clone(), row));
    }

    Ok(match orientation {
        TableOrientation::ContractsAsRows => {
            let mut columns = vec![CONTRACT_COLUMN.to_string()];
            columns.extend(TOTAL_POSITION_FIELDS.iter().map(|f| f.to_string()));
            let mut table = Table::new(columns);
            for (contract, row) in records {
                let mut cells = vec![Cell::Text(contract)];
                cells.extend(row);
                table.push_row(cells);
            }
            table
        }
        TableOrientation::FieldsAsRows => {
            let mut columns = vec![FIELD_COLUMN.to_string()];
            columns.extend(records.iter().map(|(contract, _)| contract.clone()));
            let mut table = Table::new(columns);
            for (field_idx, field) in TOTAL_POSITION_FIELDS.iter().enumerate() {
                let mut cells = vec![Cell::Text(field.to_string())];
                cells.extend(records.iter().map(|(_, row)| row[field_idx].clone()));
                table.push_row(cells);
            }
            table
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pnl_table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_coerce_passes_ordinary_values() {
        assert_eq!(
            coerce_metric_cell(&Cell::Number(-50.0), "ESH4", PnlMetric::DailyPnl),
            Some(-50.0)
        );
        assert_eq!(
            coerce_metric_cell(
                &Cell::Text("12.5".to_string()),
                "ESH4",
                PnlMetric::DailyPnl
            ),
            Some(12.5)
        );
    }

    #[test]
    fn test_coerce_zeroes_sentinels_exclusively() {
        assert_eq!(
            coerce_metric_cell(&Cell::Number(1.7976931348623157e308), "ESH4", PnlMetric::Value),
            Some(0.0)
        );
        assert_eq!(
            coerce_metric_cell(&Cell::Number(-2e300), "ESH4", PnlMetric::Value),
            Some(0.0)
        );
        // boundary is exclusive
        assert_eq!(
            coerce_metric_cell(&Cell::Number(1e300), "ESH4", PnlMetric::Value),
            Some(1e300)
        );
    }

    #[test]
    fn test_coerce_treats_garbage_as_missing() {
        assert_eq!(
            coerce_metric_cell(&Cell::Text("n/a".to_string()), "ESH4", PnlMetric::DailyPnl),
            None
        );
        assert_eq!(coerce_metric_cell(&Cell::Empty, "ESH4", PnlMetric::DailyPnl), None);
    }

    #[test]
    fn test_clean_normalizes_realized_pnl_alias() {
        let table = pnl_table(
            "\
,WriteTime,ESH4
RealizedPnL:,2024-01-02,1.7976931348623157E308
",
        );
        let cleaned = clean_position_pnl(&table).unwrap();
        assert_eq!(
            cleaned.get(0, ""),
            Some(&Cell::Text("RealizedPnL".to_string()))
        );
        // alias rows go through sentinel cleanup like any numeric metric
        assert_eq!(cleaned.get(0, "ESH4"), Some(&Cell::Number(0.0)));
        assert_eq!(cleaned.get(0, TOTAL_COLUMN), Some(&Cell::Number(0.0)));
    }

    #[test]
    fn test_clean_totals_numeric_rows_only() {
        let table = pnl_table(
            "\
,WriteTime,ESH4,ESM4
DailyPnL,2024-01-02,100,-50
PnlTimestamp,2024-01-02,09:30,09:30
",
        );
        let cleaned = clean_position_pnl(&table).unwrap();
        assert_eq!(cleaned.get(0, TOTAL_COLUMN), Some(&Cell::Number(50.0)));
        assert_eq!(cleaned.get(1, TOTAL_COLUMN), Some(&Cell::Empty));
    }

    #[test]
    fn test_clean_requires_pivot_and_write_time_columns() {
        let no_pivot = pnl_table("WriteTime,ESH4\n2024-01-02,100\n");
        assert!(matches!(
            clean_position_pnl(&no_pivot),
            Err(SnapshotError::InsufficientData(_))
        ));
        let no_write_time = pnl_table(",ESH4\nDailyPnL,100\n");
        assert!(matches!(
            clean_position_pnl(&no_write_time),
            Err(SnapshotError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_pivot_skips_missing_metric_without_error() {
        let table = pnl_table(
            "\
,WriteTime,ESH4
DailyPnL,2024-01-02,100
",
        );
        let cleaned = clean_position_pnl(&table).unwrap();
        let series = pivot_series(
            &cleaned,
            &[PnlMetric::UnrealizedPnl, PnlMetric::PnlTimestamp],
        )
        .unwrap();
        assert!(series.is_empty());
        assert!(series.columns().is_empty());
    }
}
