use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar date a session query is issued for. Not checked against a holiday calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradingDate(NaiveDate);

impl TradingDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// `YYYYMMDD`, the form the KRX `basDd` parameter expects.
    pub fn to_bas_dd(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// Accepts `YYYY-MM-DD` or `YYYYMMDD`.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let t = s.trim();
        let fmt = if t.len() == 8 { "%Y%m%d" } else { "%Y-%m-%d" };
        NaiveDate::parse_from_str(t, fmt)
            .map(Self)
            .with_context(|| format!("invalid trading date {t:?} (expected YYYY-MM-DD or YYYYMMDD)"))
    }
}

impl fmt::Display for TradingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
