use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use dashboard_core::{RetryPolicy, DATE_KEY_FORMAT};
use dashboard_data_services::{
    FetcherConfig, RefreshPipeline, S3Settings, S3SnapshotStore, SnapshotFetcher, DISPLAY_TZ,
};
use tracing::{info, warn, Level};

/// Operations dashboard refresh tool
///
/// Fetches the day's account snapshots from the export bucket, rebuilds the
/// P&L time series and the total-position table, and logs a summary of what
/// loaded and what did not.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broker account number (defaults to $DEFAULT_BROKER_ACCT_NUM)
    #[arg(short, long)]
    account: Option<String>,

    /// Snapshot date: "today" or YYYYMMDD
    #[arg(short, long, default_value = "today")]
    date: String,

    /// Bucket holding the snapshot exports
    #[arg(short, long, default_value = "sbt-public-share")]
    bucket: String,

    /// Bucket region
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// Custom S3 endpoint (switches to path-style addressing)
    #[arg(long)]
    endpoint: Option<String>,

    /// Access key id (defaults to $AWS_ACCESS_KEY_ID)
    #[arg(long)]
    access_key_id: Option<String>,

    /// Secret access key (defaults to $AWS_SECRET_ACCESS_KEY)
    #[arg(long)]
    secret_access_key: Option<String>,

    /// Calendar days to walk back when a day's snapshot is missing
    #[arg(long, default_value = "10")]
    lookback_days: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Resolve the snapshot date; "today" is the current calendar day in
    /// the dashboard's display timezone, evaluated now, not at startup.
    fn parse_date(&self) -> Result<NaiveDate> {
        if self.date == "today" {
            return Ok(Utc::now().with_timezone(&DISPLAY_TZ).date_naive());
        }
        Ok(NaiveDate::parse_from_str(&self.date, DATE_KEY_FORMAT)?)
    }

    fn parse_log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn resolve_account(&self) -> Result<String> {
        if let Some(account) = &self.account {
            return Ok(account.clone());
        }
        match std::env::var("DEFAULT_BROKER_ACCT_NUM") {
            Ok(account) if !account.is_empty() => Ok(account),
            _ => bail!("no account given; pass --account or set DEFAULT_BROKER_ACCT_NUM"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.parse_log_level())
        .with_target(false)
        .init();

    let account = args.resolve_account()?;
    let date = args.parse_date()?;

    info!("Dashboard snapshot refresh");
    info!("  Account: {}", account);
    info!("  Date: {}", date.format(DATE_KEY_FORMAT));
    info!("  Bucket: {}", args.bucket);

    let settings = S3Settings {
        bucket: args.bucket.clone(),
        region: args.region.clone(),
        endpoint: args.endpoint.clone(),
        access_key_id: args
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .unwrap_or_default(),
        secret_access_key: args
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .unwrap_or_default(),
    };
    let store = Arc::new(S3SnapshotStore::new(&settings));
    let config = FetcherConfig {
        default_account: account,
        max_lookback_days: args.lookback_days,
        retry: RetryPolicy::default(),
        ..FetcherConfig::default()
    };
    let pipeline = RefreshPipeline::new(SnapshotFetcher::new(store, config));

    let cycle = pipeline.run(date, None).await;

    info!("Refresh complete");
    for (kind, snapshot) in &cycle.snapshots {
        info!(
            "  {}: {} rows from {} (as of {})",
            kind,
            snapshot.table.n_rows(),
            snapshot.object_key,
            snapshot.last_modified
        );
    }
    for (kind, err) in &cycle.failures {
        warn!("  {}: {}", kind, err);
    }
    if let Some(daily) = &cycle.daily_pnl {
        info!("  daily P&L series: {} refresh instants", daily.n_rows());
    }
    if let Some(unrealized) = &cycle.unrealized_pnl {
        info!(
            "  unrealized P&L series: {} refresh instants",
            unrealized.n_rows()
        );
    }
    if let Some(total) = &cycle.total_position {
        // first column is the field label, the rest are contracts
        info!(
            "  total position: {} contracts",
            total.n_columns().saturating_sub(1)
        );
    }

    if cycle.all_kinds_failed() {
        bail!("every snapshot kind failed to load");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_date(date: &str) -> Args {
        Args {
            account: Some("ACC1".to_string()),
            date: date.to_string(),
            bucket: "sbt-public-share".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            lookback_days: 10,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_parse_explicit_date() {
        let args = args_with_date("20240607");
        assert_eq!(
            args.parse_date().unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()
        );
    }

    #[test]
    fn test_parse_date_rejects_other_formats() {
        assert!(args_with_date("2024-06-07").parse_date().is_err());
        assert!(args_with_date("yesterday").parse_date().is_err());
    }

    #[test]
    fn test_today_resolves_to_display_timezone_calendar_day() {
        let args = args_with_date("today");
        let expected = Utc::now().with_timezone(&DISPLAY_TZ).date_naive();
        assert_eq!(args.parse_date().unwrap(), expected);
    }

    #[test]
    fn test_explicit_account_wins_over_environment() {
        let args = args_with_date("today");
        assert_eq!(args.resolve_account().unwrap(), "ACC1");
    }
}
