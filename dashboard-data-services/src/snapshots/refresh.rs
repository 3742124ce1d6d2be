use std::collections::BTreeMap;

use chrono::NaiveDate;
use dashboard_core::{PivotedSeries, SnapshotKind, Table, TableOrientation};
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::snapshots::fetcher::{FetchedSnapshot, SnapshotFetcher};
use crate::snapshots::object_store::SnapshotStore;
use crate::snapshots::reshaper::{build_timeseries, build_total_position};

/// Everything one dashboard refresh produced.
///
/// Kinds are fetched independently: a failure lands in `failures` against
/// that kind alone and never disturbs the other kinds' tables. The caller
/// keeps showing its previous data for failed kinds.
#[derive(Debug, Default)]
pub struct RefreshCycle {
    pub snapshots: BTreeMap<SnapshotKind, FetchedSnapshot>,
    pub failures: BTreeMap<SnapshotKind, SnapshotError>,
    pub reshape_errors: Vec<SnapshotError>,
    pub daily_pnl: Option<PivotedSeries>,
    pub unrealized_pnl: Option<PivotedSeries>,
    pub total_position: Option<Table>,
}

impl RefreshCycle {
    pub fn all_kinds_failed(&self) -> bool {
        self.snapshots.is_empty() && !self.failures.is_empty()
    }
}

/// One best-effort refresh over every snapshot kind, then the position
/// triad reshaped into its display tables.
pub struct RefreshPipeline<S> {
    fetcher: SnapshotFetcher<S>,
}

impl<S: SnapshotStore> RefreshPipeline<S> {
    pub fn new(fetcher: SnapshotFetcher<S>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &SnapshotFetcher<S> {
        &self.fetcher
    }

    pub async fn run(&self, date: NaiveDate, account: Option<&str>) -> RefreshCycle {
        let mut cycle = RefreshCycle::default();
        for kind in SnapshotKind::ALL {
            match self.fetcher.fetch(kind, date, account).await {
                Ok(snapshot) => {
                    info!(
                        "{}: {} rows as of {}",
                        kind,
                        snapshot.table.n_rows(),
                        snapshot.last_modified
                    );
                    cycle.snapshots.insert(kind, snapshot);
                }
                Err(err) => {
                    warn!("{}: refresh failed: {}", kind, err);
                    cycle.failures.insert(kind, err);
                }
            }
        }
        self.reshape(&mut cycle);
        cycle
    }

    fn reshape(&self, cycle: &mut RefreshCycle) {
        let (Some(position), Some(avg_cost), Some(position_pnl)) = (
            cycle.snapshots.get(&SnapshotKind::Positions),
            cycle.snapshots.get(&SnapshotKind::AvgCost),
            cycle.snapshots.get(&SnapshotKind::PositionPnl),
        ) else {
            return;
        };

        match build_timeseries(&position.table, &avg_cost.table, &position_pnl.table) {
            Ok(reshaped) => {
                // the cleaned table feeds the join, so sentinel cleanup
                // carries into the total-position view
                match build_total_position(
                    &position.table,
                    &avg_cost.table,
                    &reshaped.position_pnl,
                    TableOrientation::default(),
                ) {
                    Ok(total) => cycle.total_position = Some(total),
                    Err(err) => {
                        warn!("total-position reshape failed: {}", err);
                        cycle.reshape_errors.push(err);
                    }
                }
                cycle.daily_pnl = Some(reshaped.daily_pnl);
                cycle.unrealized_pnl = Some(reshaped.unrealized_pnl);
            }
            Err(err) => {
                warn!("timeseries reshape failed: {}", err);
                cycle.reshape_errors.push(err);
            }
        }
    }
}
