pub mod fetcher;
pub mod object_store;
pub mod refresh;
pub mod reshaper;

// Re-export commonly used items
pub use fetcher::SnapshotFetcher;
pub use object_store::{S3SnapshotStore, SnapshotStore};
pub use refresh::RefreshPipeline;
