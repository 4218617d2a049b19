use crate::domain::{TradingDate, TradingSnapshot};
use crate::ingest::{EtfDataSource, FetchError, FetchOutcome};
use crate::time::kr_market;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Why the latest cycle did not replace the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The provider answered without rows (holiday, not yet published, rejected key).
    NoData { date: TradingDate, message: String },
    /// The request itself failed.
    FetchFailed {
        date: TradingDate,
        error_kind: &'static str,
        message: String,
    },
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::NoData { message, .. } | Notice::FetchFailed { message, .. } => message,
        }
    }
}

/// What the renderer shows: the most recent good snapshot plus the outcome of the latest
/// attempt. A snapshot is only ever replaced whole by a newer non-empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Board {
    snapshot: Option<TradingSnapshot>,
    snapshot_date: Option<TradingDate>,
    notice: Option<Notice>,
    cycles: u64,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one fetch result into the board.
    pub fn apply(
        mut self,
        date: TradingDate,
        attempted_at: DateTime<Utc>,
        result: Result<FetchOutcome<TradingSnapshot>, FetchError>,
    ) -> Self {
        self.cycles += 1;
        self.last_attempt_at = Some(attempted_at);

        match result {
            Ok(FetchOutcome {
                value,
                diagnostic: None,
            }) if !value.is_empty() => {
                self.snapshot = Some(value);
                self.snapshot_date = Some(date);
                self.notice = None;
            }
            Ok(FetchOutcome { diagnostic, .. }) => {
                self.notice = Some(Notice::NoData {
                    date,
                    message: diagnostic.unwrap_or_else(|| format!("no ETF rows for {date}")),
                });
            }
            Err(err) => {
                self.notice = Some(Notice::FetchFailed {
                    date,
                    error_kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }

        self
    }

    pub fn snapshot(&self) -> Option<&TradingSnapshot> {
        self.snapshot.as_ref()
    }

    /// Date that was requested when the current snapshot was fetched.
    pub fn snapshot_date(&self) -> Option<TradingDate> {
        self.snapshot_date
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub market_close: NaiveTime,
    pub session_interval: Duration,
    pub weekend_interval: Duration,
    /// Stop after this many cycles; `None` polls for the life of the process.
    pub max_cycles: Option<u64>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            market_close: kr_market::default_market_close(),
            session_interval: kr_market::session_poll_interval(),
            weekend_interval: kr_market::weekend_poll_interval(),
            max_cycles: None,
        }
    }
}

impl PollOptions {
    pub fn interval_at(&self, now: DateTime<Utc>) -> Duration {
        if kr_market::is_weekend_at(now) {
            self.weekend_interval
        } else {
            self.session_interval
        }
    }
}

/// Polls `source` until `max_cycles` is reached (or forever), calling `on_update` with the
/// board after every cycle. Fetch failures never end the loop.
pub async fn run<S, F>(source: &S, opts: &PollOptions, mut board: Board, mut on_update: F) -> Board
where
    S: EtfDataSource + ?Sized,
    F: FnMut(&Board),
{
    loop {
        let now = Utc::now();
        let date = kr_market::trading_date(now, opts.market_close);

        let result = source.fetch_etf_daily(date).await;
        if let Err(err) = &result {
            tracing::warn!(
                source = source.source_name(),
                endpoint = err.endpoint(),
                %date,
                kind = err.kind(),
                error = %err,
                "ETF board fetch failed; keeping previous board"
            );
        }

        board = board.apply(date, now, result);
        on_update(&board);

        if opts.max_cycles.is_some_and(|max| board.cycles() >= max) {
            return board;
        }

        let interval = opts.interval_at(now);
        tracing::debug!(?interval, cycles = board.cycles(), "sleeping until next poll");
        tokio::time::sleep(interval).await;
    }
}
