use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use dashboard_core::{RetryPolicy, SnapshotKind, Table, DATE_KEY_FORMAT};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::SnapshotError;
use crate::snapshots::object_store::{SnapshotStore, StoreError, StoredObject};

/// Fixed timezone for user-facing staleness timestamps, regardless of the
/// store's native timezone.
pub const DISPLAY_TZ: Tz = chrono_tz::America::Chicago;

/// Rendering of staleness timestamps shown next to each table.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S";

/// Static HTML reports live under this key prefix.
const REPORT_KEY_PREFIX: &str = "QFS_";
const REPORT_KEY_PATTERN: &str = r"TradeTrackerApp.*\.html$";

/// Tunables for the snapshot fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Account used when the caller does not name one.
    pub default_account: String,
    /// Calendar days to walk backward when the requested date has no
    /// snapshot (weekends, holidays, late exports).
    pub max_lookback_days: u32,
    /// Validity window for pre-signed report URLs.
    pub url_expiry: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            default_account: String::new(),
            max_lookback_days: 10,
            url_expiry: Duration::from_secs(604_800),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetcherConfig {
    /// Default config with the account taken from `DEFAULT_BROKER_ACCT_NUM`.
    pub fn from_env() -> Self {
        Self {
            default_account: std::env::var("DEFAULT_BROKER_ACCT_NUM").unwrap_or_default(),
            ..Self::default()
        }
    }
}

/// One loaded snapshot: the parsed table plus provenance.
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub kind: SnapshotKind,
    pub table: Table,
    /// Storage last-modified in the display timezone,
    /// formatted per [`DISPLAY_TIMESTAMP_FORMAT`].
    pub last_modified: String,
    pub object_key: String,
    /// Calendar date actually served; earlier than requested when the
    /// backward walk skipped non-trading days.
    pub snapshot_date: NaiveDate,
}

/// Resolves `(kind, date, account)` to a loaded table, walking backward in
/// time over missing days up to the configured lookback.
pub struct SnapshotFetcher<S> {
    store: Arc<S>,
    config: FetcherConfig,
}

impl<S: SnapshotStore> SnapshotFetcher<S> {
    pub fn new(store: Arc<S>, config: FetcherConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    fn account_or_default<'a>(&'a self, account: Option<&'a str>) -> &'a str {
        account.unwrap_or(&self.config.default_account)
    }

    /// Fetch the snapshot for `date`, falling back to the most recent
    /// earlier day within the lookback bound.
    pub async fn fetch(
        &self,
        kind: SnapshotKind,
        date: NaiveDate,
        account: Option<&str>,
    ) -> Result<FetchedSnapshot, SnapshotError> {
        let account = self.account_or_default(account);
        let mut current = date;
        let mut steps_back = 0u32;
        loop {
            let key = kind.object_key(account, current);
            match self.get_with_retry(&key).await {
                Ok(object) => {
                    if steps_back > 0 {
                        info!(
                            "{}: no snapshot for {}, serving {} ({} days back)",
                            kind, date, current, steps_back
                        );
                    }
                    return self.decode_snapshot(kind, current, key, object);
                }
                Err(StoreError::NotFound) => {
                    if steps_back >= self.config.max_lookback_days {
                        return Err(SnapshotError::NotFound {
                            kind,
                            account: account.to_string(),
                            date,
                            lookback_days: self.config.max_lookback_days,
                        });
                    }
                    debug!("{} missing, stepping back one day", key);
                    current = current.pred_opt().ok_or_else(|| {
                        SnapshotError::Fetch(format!("date underflow walking back from {}", date))
                    })?;
                    steps_back += 1;
                }
                Err(err) => {
                    return Err(SnapshotError::Fetch(format!("{}: {}", key, err)));
                }
            }
        }
    }

    fn decode_snapshot(
        &self,
        kind: SnapshotKind,
        snapshot_date: NaiveDate,
        object_key: String,
        object: StoredObject,
    ) -> Result<FetchedSnapshot, SnapshotError> {
        let table = Table::from_csv_reader(object.bytes.as_slice())
            .map_err(|e| SnapshotError::Fetch(format!("csv decode of {}: {}", object_key, e)))?;
        let missing = table.missing_columns(kind.required_columns());
        if !missing.is_empty() {
            warn!(
                "{} snapshot {} lacks expected columns: {}",
                kind,
                object_key,
                missing.join(", ")
            );
        }
        let last_modified = object
            .last_modified
            .with_timezone(&DISPLAY_TZ)
            .format(DISPLAY_TIMESTAMP_FORMAT)
            .to_string();
        debug!(
            "{}: loaded {} ({} rows, as of {})",
            kind,
            object_key,
            table.n_rows(),
            last_modified
        );
        Ok(FetchedSnapshot {
            kind,
            table,
            last_modified,
            object_key,
            snapshot_date,
        })
    }

    async fn get_with_retry(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.config
            .retry
            .run("get_object", StoreError::is_transient, || {
                self.store.get_object(key)
            })
            .await
    }

    /// All dates with a stored snapshot of `kind`, ascending, as `YYYYMMDD`
    /// strings. Keys that do not parse are skipped; the listing is an
    /// availability index, not a source of truth.
    pub async fn list_available_dates(
        &self,
        kind: SnapshotKind,
        account: Option<&str>,
    ) -> Result<Vec<String>, SnapshotError> {
        let account = self.account_or_default(account);
        let prefix = kind.key_prefix(account);
        let keys = self
            .store
            .list_keys(&prefix)
            .await
            .map_err(|e| SnapshotError::Fetch(format!("listing {}: {}", prefix, e)))?;
        let mut dates = Vec::with_capacity(keys.len());
        for key in keys {
            match kind.date_in_key(account, &key) {
                Some(date) => dates.push(date),
                None => warn!("skipping snapshot key with unparseable date: {}", key),
            }
        }
        dates.sort();
        Ok(dates
            .into_iter()
            .map(|d| d.format(DATE_KEY_FORMAT).to_string())
            .collect())
    }

    /// Time-limited read-only URL for a stored object. HTML keys are served
    /// with a `text/html` response content type so browsers render them.
    pub async fn presigned_object_url(&self, key: &str) -> Result<String, SnapshotError> {
        let content_type = if key.contains(".html") {
            Some("text/html")
        } else {
            None
        };
        self.store
            .presign_get(key, self.config.url_expiry, content_type)
            .await
            .map_err(|e| SnapshotError::Fetch(format!("presigning {}: {}", key, e)))
    }

    /// `(key, presigned URL)` for every stored trade-tracker HTML report,
    /// sorted by the trailing `_`-separated key segment (the report stamp).
    pub async fn html_report_links(&self) -> Result<Vec<(String, String)>, SnapshotError> {
        let pattern = Regex::new(REPORT_KEY_PATTERN)
            .map_err(|e| SnapshotError::Fetch(format!("report key pattern: {}", e)))?;
        let keys = self
            .store
            .list_keys(REPORT_KEY_PREFIX)
            .await
            .map_err(|e| SnapshotError::Fetch(format!("listing reports: {}", e)))?;
        let mut links = Vec::new();
        for key in keys.into_iter().filter(|k| pattern.is_match(k)) {
            let url = self.presigned_object_url(&key).await?;
            links.push((key, url));
        }
        links.sort_by(|a, b| report_stamp(&a.0).cmp(report_stamp(&b.0)));
        Ok(links)
    }
}

fn report_stamp(key: &str) -> &str {
    key.rsplit('_').next().unwrap_or(key)
}
