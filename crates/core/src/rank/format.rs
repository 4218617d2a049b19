use crate::domain::RankedRow;
use serde::Serialize;

/// Direction of a day's move, for the renderer to color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

pub fn classify(change_pct: f64) -> Tone {
    if change_pct > 0.0 {
        Tone::Positive
    } else if change_pct < 0.0 {
        Tone::Negative
    } else {
        Tone::Neutral
    }
}

/// A ranked row with every cell already formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub rank: u32,
    pub name: String,
    pub price: String,
    pub change_pct: String,
    pub volume: String,
    pub tone: Tone,
}

pub fn present(rows: &[RankedRow]) -> Vec<DisplayRow> {
    rows.iter().map(present_row).collect()
}

pub fn present_row(row: &RankedRow) -> DisplayRow {
    DisplayRow {
        rank: row.rank,
        name: row.name.clone(),
        price: group_thousands(row.price),
        change_pct: format_pct(row.change_pct),
        volume: group_thousands(row.volume),
        tone: classify(row.change_pct),
    }
}

pub fn format_pct(v: f64) -> String {
    // Avoid printing "-0.00".
    let v = if v == 0.0 { 0.0 } else { v };
    format!("{v:.2}")
}

pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
