use etfboard_core::domain::{CompositionSnapshot, TradingSnapshot};
use etfboard_core::poll::{Board, Notice};
use etfboard_core::rank::{self, DisplayRow, Tone};
use std::fmt::Write;

const HEADERS: [&str; 5] = ["Rank", "Name", "Price", "Change %", "Volume"];

fn paint(text: &str, tone: Tone, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    // Korean convention: red up, blue down.
    let code = match tone {
        Tone::Positive => "1;31",
        Tone::Negative => "1;34",
        Tone::Neutral => "1;90",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn pad_right(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{s}{}", " ".repeat(width.saturating_sub(len)))
}

fn pad_left(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{s}", " ".repeat(width.saturating_sub(len)))
}

pub fn render_rows(rows: &[DisplayRow], color: bool) -> String {
    let mut widths = HEADERS.map(|h| h.chars().count());
    for r in rows {
        let cells = [
            r.rank.to_string(),
            r.name.clone(),
            r.price.clone(),
            r.change_pct.clone(),
            r.volume.clone(),
        ];
        for (w, c) in widths.iter_mut().zip(cells.iter()) {
            *w = (*w).max(c.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_left(HEADERS[0], widths[0]),
        pad_right(HEADERS[1], widths[1]),
        pad_left(HEADERS[2], widths[2]),
        pad_left(HEADERS[3], widths[3]),
        pad_left(HEADERS[4], widths[4]),
    );
    for r in rows {
        let change = paint(&pad_left(&r.change_pct, widths[3]), r.tone, color);
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_left(&r.rank.to_string(), widths[0]),
            pad_right(&r.name, widths[1]),
            pad_left(&r.price, widths[2]),
            change,
            pad_left(&r.volume, widths[4]),
        );
    }
    out
}

pub fn render_snapshot(snapshot: &TradingSnapshot, top: Option<usize>, color: bool) -> String {
    let rows = rank::present(snapshot.top(top));
    let mut out = format!(
        "Base date: {} ({} of {} ETFs)\n",
        snapshot.base_date(),
        rows.len(),
        snapshot.rows().len()
    );
    out.push_str(&render_rows(&rows, color));
    out
}

pub fn render_board(board: &Board, top: Option<usize>, color: bool) -> String {
    let mut out = String::new();
    if let Some(notice) = board.notice() {
        let line = match notice {
            Notice::NoData { date, message } => format!("No data for {date}: {message}"),
            Notice::FetchFailed { date, message, .. } => {
                format!("Fetch for {date} failed: {message}")
            }
        };
        let _ = writeln!(out, "! {line}");
    }

    match board.snapshot() {
        Some(snapshot) => out.push_str(&render_snapshot(snapshot, top, color)),
        None => out.push_str("No board loaded yet.\n"),
    }
    out
}

pub fn render_composition(snapshot: &CompositionSnapshot) -> String {
    let mut out = format!(
        "Holdings of {} (base date {})\n",
        snapshot.isu_cd(),
        snapshot.base_date()
    );
    let code_w = snapshot
        .rows()
        .iter()
        .map(|r| r.code.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let name_w = snapshot
        .rows()
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let _ = writeln!(
        out,
        "{}  {}  {:>8}  Market",
        pad_right("Code", code_w),
        pad_right("Name", name_w),
        "Weight %"
    );
    for r in snapshot.rows() {
        let _ = writeln!(
            out,
            "{}  {}  {:>8}  {}",
            pad_right(&r.code, code_w),
            pad_right(&r.name, name_w),
            rank::format::format_pct(r.weight_pct),
            r.market
        );
    }
    out
}
