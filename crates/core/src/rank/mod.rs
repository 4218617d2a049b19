use crate::domain::{EtfQuote, RankedRow};
use std::cmp::Ordering;

pub mod format;

pub use format::{classify, present, DisplayRow, Tone};

/// Orders quotes by `change_pct` (largest first) and numbers them from 1.
///
/// The sort is stable, so quotes with equal change keep their input order. NaN sorts last.
pub fn rank(mut quotes: Vec<EtfQuote>) -> Vec<RankedRow> {
    quotes.sort_by(|a, b| descending(a.change_pct, b.change_pct));

    quotes
        .into_iter()
        .enumerate()
        .map(|(idx, q)| RankedRow {
            rank: (idx + 1) as u32,
            name: q.name,
            price: q.price,
            change_pct: q.change_pct,
            volume: q.volume,
        })
        .collect()
}

/// First `k` rows of an already ranked board (all rows when `k` is `None`).
pub fn top(rows: &[RankedRow], k: Option<usize>) -> &[RankedRow] {
    match k {
        Some(k) => &rows[..k.min(rows.len())],
        None => rows,
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}
