pub mod error;
pub mod snapshots;

// Re-export commonly used items
pub use error::SnapshotError;
pub use snapshots::fetcher::{FetchedSnapshot, FetcherConfig, SnapshotFetcher, DISPLAY_TZ};
pub use snapshots::object_store::{
    S3Settings, S3SnapshotStore, SnapshotStore, StoreError, StoredObject,
};
pub use snapshots::refresh::{RefreshCycle, RefreshPipeline};
pub use snapshots::reshaper::{build_timeseries, build_total_position, ReshapedTimeseries};
