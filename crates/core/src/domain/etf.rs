use crate::rank;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_BASE_DATE: &str = "unknown";

/// One ETF's daily figures before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfQuote {
    pub name: String,
    pub price: i64,
    pub change_pct: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: u32,
    pub name: String,
    pub price: i64,
    pub change_pct: f64,
    pub volume: i64,
}

impl RankedRow {
    pub fn quote(&self) -> EtfQuote {
        EtfQuote {
            name: self.name.clone(),
            price: self.price,
            change_pct: self.change_pct,
            volume: self.volume,
        }
    }
}

/// A complete ranked board for one as-of date.
///
/// Built in one step from a fetch and never edited afterwards; a newer fetch replaces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingSnapshot {
    base_date: String,
    rows: Vec<RankedRow>,
}

impl TradingSnapshot {
    pub fn new(base_date: impl Into<String>, quotes: Vec<EtfQuote>) -> Self {
        Self {
            base_date: base_date.into(),
            rows: rank::rank(quotes),
        }
    }

    pub fn empty() -> Self {
        Self {
            base_date: UNKNOWN_BASE_DATE.to_string(),
            rows: Vec::new(),
        }
    }

    /// `YYYY-MM-DD`, or `"unknown"` when the provider did not report a usable date.
    pub fn base_date(&self) -> &str {
        &self.base_date
    }

    pub fn rows(&self) -> &[RankedRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn top(&self, k: Option<usize>) -> &[RankedRow] {
        rank::top(&self.rows, k)
    }
}

/// One constituent holding of an ETF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRow {
    pub code: String,
    pub name: String,
    pub weight_pct: f64,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionSnapshot {
    isu_cd: String,
    base_date: String,
    rows: Vec<CompositionRow>,
}

impl CompositionSnapshot {
    /// Orders holdings by weight, heaviest first; equal weights keep provider order.
    pub fn new(
        isu_cd: impl Into<String>,
        base_date: impl Into<String>,
        mut rows: Vec<CompositionRow>,
    ) -> Self {
        rows.sort_by(|a, b| b.weight_pct.total_cmp(&a.weight_pct));
        Self {
            isu_cd: isu_cd.into(),
            base_date: base_date.into(),
            rows,
        }
    }

    pub fn empty(isu_cd: impl Into<String>) -> Self {
        Self::new(isu_cd, UNKNOWN_BASE_DATE, Vec::new())
    }

    pub fn isu_cd(&self) -> &str {
        &self.isu_cd
    }

    pub fn base_date(&self) -> &str {
        &self.base_date
    }

    pub fn rows(&self) -> &[CompositionRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
