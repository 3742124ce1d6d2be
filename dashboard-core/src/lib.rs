pub mod pnl;
pub mod retry;
pub mod snapshot;
pub mod table;

// Re-export common types
pub use pnl::{PivotedSeries, PnlMetric, TableOrientation};
pub use retry::RetryPolicy;
pub use snapshot::SnapshotKind;
pub use table::{Cell, Table};

/// Column holding the refresh instant of each snapshot row.
pub const WRITE_TIME_COLUMN: &str = "WriteTime";

/// Date segment embedded in snapshot object keys.
pub const DATE_KEY_FORMAT: &str = "%Y%m%d";
