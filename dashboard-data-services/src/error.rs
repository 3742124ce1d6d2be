use chrono::NaiveDate;
use dashboard_core::SnapshotKind;
use thiserror::Error;

/// Failures surfaced by the snapshot data layer.
///
/// A missing object for one date is NOT an error — it drives the backward
/// date walk. `NotFound` only fires once the walk exhausts its lookback.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no {kind} snapshot for account {account} within {lookback_days} days of {date}")]
    NotFound {
        kind: SnapshotKind,
        account: String,
        date: NaiveDate,
        lookback_days: u32,
    },

    /// Infra fault after retries, a CSV decode failure, or any other
    /// non-missing-object store fault.
    #[error("snapshot fetch failed: {0}")]
    Fetch(String),

    /// Reshaping cannot produce a defined result from the given tables.
    #[error("insufficient snapshot data: {0}")]
    InsufficientData(String),
}
