use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::DATE_KEY_FORMAT;

/// Logical snapshot data types exported daily to the bucket.
///
/// Each kind maps to one object per `(account, calendar date)`, named
/// `{account}_{fragment}{YYYYMMDD}.csv` — except [`SnapshotKind::DailySignals`],
/// whose objects are shared across accounts and drop the prefix. The
/// fragments are the upstream exporter's wire constants and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    Positions,
    AvgCost,
    PositionPnl,
    Fills,
    OpenOrders,
    PnlTracker,
    Margin,
    DailySignals,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 8] = [
        SnapshotKind::Positions,
        SnapshotKind::AvgCost,
        SnapshotKind::PositionPnl,
        SnapshotKind::Fills,
        SnapshotKind::OpenOrders,
        SnapshotKind::PnlTracker,
        SnapshotKind::Margin,
        SnapshotKind::DailySignals,
    ];

    /// Key fragment between the account prefix and the date digits.
    /// Margin snapshots use an empty fragment: `{account}_{YYYYMMDD}.csv`.
    pub fn key_fragment(&self) -> &'static str {
        match self {
            SnapshotKind::Positions => "positions_",
            SnapshotKind::AvgCost => "avgcost_",
            SnapshotKind::PositionPnl => "position_pnl_",
            SnapshotKind::Fills => "fills_",
            SnapshotKind::OpenOrders => "open_orders_",
            SnapshotKind::PnlTracker => "pnltracker_",
            SnapshotKind::Margin => "",
            SnapshotKind::DailySignals => "QFS_DailySignals_",
        }
    }

    /// Whether object keys for this kind carry the account prefix.
    pub fn account_scoped(&self) -> bool {
        !matches!(self, SnapshotKind::DailySignals)
    }

    /// Object key for one dated snapshot of this kind.
    pub fn object_key(&self, account: &str, date: NaiveDate) -> String {
        let date = date.format(DATE_KEY_FORMAT);
        if self.account_scoped() {
            format!("{}_{}{}.csv", account, self.key_fragment(), date)
        } else {
            format!("{}{}.csv", self.key_fragment(), date)
        }
    }

    /// Listing prefix covering every date of this kind for the account.
    pub fn key_prefix(&self, account: &str) -> String {
        if self.account_scoped() {
            format!("{}_{}", account, self.key_fragment())
        } else {
            self.key_fragment().to_string()
        }
    }

    /// Parse the `YYYYMMDD` segment embedded in one of this kind's keys.
    /// Returns `None` for keys that do not follow the naming convention.
    pub fn date_in_key(&self, account: &str, key: &str) -> Option<NaiveDate> {
        let rest = key.strip_prefix(&self.key_prefix(account))?;
        let digits = rest.strip_suffix(".csv")?;
        NaiveDate::parse_from_str(digits, DATE_KEY_FORMAT).ok()
    }

    /// Columns the dashboard reads from this kind's CSV schema. Used for
    /// best-effort validation at fetch time; the position-P&L pivot-key
    /// column is unnamed and checked by the reshaper instead.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            SnapshotKind::Positions | SnapshotKind::AvgCost | SnapshotKind::PositionPnl => {
                &["WriteTime"]
            }
            SnapshotKind::Fills => &[
                "Symbol",
                "ExpirationMonth",
                "Time",
                "ExecId",
                "Exchange",
                "Side",
                "NumContracts",
                "Price",
                "AvgPrice",
                "CumQty",
            ],
            SnapshotKind::OpenOrders => &[
                "ConSym",
                "OrderType",
                "OrderAction",
                "OrderQuantity",
                "OrderStatus",
            ],
            SnapshotKind::Margin => &["DailyPnL", "InitMarginReq"],
            SnapshotKind::PnlTracker | SnapshotKind::DailySignals => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotKind::Positions => "positions",
            SnapshotKind::AvgCost => "avg-cost",
            SnapshotKind::PositionPnl => "position-pnl",
            SnapshotKind::Fills => "fills",
            SnapshotKind::OpenOrders => "open-orders",
            SnapshotKind::PnlTracker => "pnl-tracker",
            SnapshotKind::Margin => "margin",
            SnapshotKind::DailySignals => "daily-signals",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnapshotKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| format!("unknown snapshot kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_object_keys_match_exporter_naming() {
        let d = date(2024, 1, 2);
        assert_eq!(
            SnapshotKind::Positions.object_key("ACC1", d),
            "ACC1_positions_20240102.csv"
        );
        assert_eq!(
            SnapshotKind::AvgCost.object_key("ACC1", d),
            "ACC1_avgcost_20240102.csv"
        );
        assert_eq!(
            SnapshotKind::PositionPnl.object_key("ACC1", d),
            "ACC1_position_pnl_20240102.csv"
        );
        assert_eq!(
            SnapshotKind::OpenOrders.object_key("ACC1", d),
            "ACC1_open_orders_20240102.csv"
        );
    }

    #[test]
    fn test_margin_key_has_empty_fragment() {
        assert_eq!(
            SnapshotKind::Margin.object_key("ACC1", date(2024, 1, 2)),
            "ACC1_20240102.csv"
        );
    }

    #[test]
    fn test_daily_signals_key_omits_account() {
        assert_eq!(
            SnapshotKind::DailySignals.object_key("ACC1", date(2024, 1, 2)),
            "QFS_DailySignals_20240102.csv"
        );
        assert_eq!(SnapshotKind::DailySignals.key_prefix("ACC1"), "QFS_DailySignals_");
    }

    #[test]
    fn test_date_in_key_roundtrip() {
        let d = date(2024, 6, 7);
        for kind in SnapshotKind::ALL {
            let key = kind.object_key("ACC1", d);
            assert_eq!(kind.date_in_key("ACC1", &key), Some(d), "kind {}", kind);
        }
    }

    #[test]
    fn test_date_in_key_rejects_malformed_keys() {
        let kind = SnapshotKind::Positions;
        assert_eq!(kind.date_in_key("ACC1", "ACC1_positions_latest.csv"), None);
        assert_eq!(kind.date_in_key("ACC1", "ACC1_positions_20240102.txt"), None);
        assert_eq!(kind.date_in_key("ACC1", "OTHER_positions_20240102.csv"), None);
        // 13th month
        assert_eq!(kind.date_in_key("ACC1", "ACC1_positions_20241302.csv"), None);
    }

    #[test]
    fn test_label_roundtrip() {
        for kind in SnapshotKind::ALL {
            assert_eq!(kind.label().parse::<SnapshotKind>().unwrap(), kind);
        }
        assert!("pnl".parse::<SnapshotKind>().is_err());
    }
}
