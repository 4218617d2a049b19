use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use etfboard_core::domain::{CompositionSnapshot, TradingDate};
use etfboard_core::ingest::{EtfDataSource, FetchError, KrxClient};
use etfboard_core::poll::{self, Board, Notice, PollOptions};
use etfboard_core::rank::{self, DisplayRow};
use etfboard_core::time::kr_market;

const DEFAULT_BOARD_TOP: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = etfboard_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let result = run(&settings).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "etfboard api failed");
    }
    result
}

async fn run(settings: &etfboard_core::config::Settings) -> anyhow::Result<()> {
    let market_close = settings.market_close()?;
    let source: Arc<dyn EtfDataSource> = Arc::new(KrxClient::from_settings(settings)?);

    // Single writer: only the poller task publishes boards.
    let (board_tx, board_rx) = watch::channel(Board::new());
    let poller_source = Arc::clone(&source);
    let opts = PollOptions {
        market_close,
        ..PollOptions::default()
    };
    let poller = tokio::spawn(async move {
        poll::run(poller_source.as_ref(), &opts, Board::new(), move |board| {
            board_tx.send_replace(board.clone());
        })
        .await
    });
    // Without max_cycles the poller never returns, so any exit is a failure.
    tokio::spawn(async move {
        let err = poller_exit_error(poller.await);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "board poller stopped");
    });

    let state = AppState {
        board: board_rx,
        source,
        market_close,
        default_top: settings.board_top.unwrap_or(DEFAULT_BOARD_TOP),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn poller_exit_error(exit: Result<Board, JoinError>) -> anyhow::Error {
    match exit {
        Ok(board) => anyhow::anyhow!(
            "ETF board poller returned after {} cycles",
            board.cycles()
        ),
        Err(err) if err.is_panic() => anyhow::anyhow!("ETF board poller panicked: {err}"),
        Err(err) => anyhow::anyhow!("ETF board poller was cancelled: {err}"),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/board", get(get_board))
        .route("/snapshots/:date", get(get_snapshot_by_date))
        .route("/composition/:isu_cd", get(get_composition))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    board: watch::Receiver<Board>,
    source: Arc<dyn EtfDataSource>,
    market_close: NaiveTime,
    default_top: usize,
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    top: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiBoard {
    base_date: Option<String>,
    requested_date: Option<TradingDate>,
    total_rows: usize,
    rows: Vec<DisplayRow>,
    notice: Option<Notice>,
    last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ApiSnapshot {
    requested_date: TradingDate,
    base_date: String,
    total_rows: usize,
    rows: Vec<DisplayRow>,
    notice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiComposition {
    requested_date: TradingDate,
    #[serde(flatten)]
    composition: CompositionSnapshot,
    notice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    kind: &'static str,
    message: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

async fn get_board(State(state): State<AppState>, Query(q): Query<TopQuery>) -> Json<ApiBoard> {
    let top = q.top.unwrap_or(state.default_top);
    let board = state.board.borrow().clone();
    Json(board_view(&board, top))
}

fn board_view(board: &Board, top: usize) -> ApiBoard {
    let (base_date, total_rows, rows) = match board.snapshot() {
        Some(s) => (
            Some(s.base_date().to_string()),
            s.rows().len(),
            rank::present(s.top(Some(top))),
        ),
        None => (None, 0, Vec::new()),
    };

    ApiBoard {
        base_date,
        requested_date: board.snapshot_date(),
        total_rows,
        rows,
        notice: board.notice().cloned(),
        last_attempt_at: board.last_attempt_at(),
    }
}

async fn get_snapshot_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(q): Query<TopQuery>,
) -> ApiResult<ApiSnapshot> {
    let date = parse_date(&date)?;
    let outcome = state
        .source
        .fetch_etf_daily(date)
        .await
        .map_err(upstream_error)?;

    let snapshot = outcome.value;
    Ok(Json(ApiSnapshot {
        requested_date: date,
        base_date: snapshot.base_date().to_string(),
        total_rows: snapshot.rows().len(),
        rows: rank::present(snapshot.top(q.top)),
        notice: outcome.diagnostic,
    }))
}

async fn get_composition(
    State(state): State<AppState>,
    Path(isu_cd): Path<String>,
    Query(q): Query<DateQuery>,
) -> ApiResult<ApiComposition> {
    let date = match q.date.as_deref() {
        Some(s) => parse_date(s)?,
        None => kr_market::trading_date(Utc::now(), state.market_close),
    };

    let outcome = state
        .source
        .fetch_etf_composition(date, &isu_cd)
        .await
        .map_err(upstream_error)?;

    Ok(Json(ApiComposition {
        requested_date: date,
        composition: outcome.value,
        notice: outcome.diagnostic,
    }))
}

fn parse_date(s: &str) -> Result<TradingDate, (StatusCode, Json<ApiError>)> {
    TradingDate::parse(s).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                kind: "bad_date",
                message: format!("{e:#}"),
            }),
        )
    })
}

fn upstream_error(err: FetchError) -> (StatusCode, Json<ApiError>) {
    tracing::warn!(
        kind = err.kind(),
        endpoint = err.endpoint(),
        error = %err,
        "on-demand KRX fetch failed"
    );
    (
        StatusCode::BAD_GATEWAY,
        Json(ApiError {
            kind: err.kind(),
            message: err.to_string(),
        }),
    )
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &etfboard_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use etfboard_core::domain::{CompositionRow, EtfQuote, TradingSnapshot};
    use etfboard_core::ingest::FetchOutcome;
    use std::sync::Mutex;
    use std::time::Duration;

    type DailyResult = Result<FetchOutcome<TradingSnapshot>, FetchError>;

    /// Answers the next daily request with a canned result.
    struct StubSource {
        daily: Mutex<Option<DailyResult>>,
    }

    #[async_trait::async_trait]
    impl EtfDataSource for StubSource {
        fn source_name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_etf_daily(&self, _date: TradingDate) -> DailyResult {
            self.daily
                .lock()
                .unwrap()
                .take()
                .expect("daily result already consumed")
        }

        async fn fetch_etf_composition(
            &self,
            _date: TradingDate,
            isu_cd: &str,
        ) -> Result<FetchOutcome<CompositionSnapshot>, FetchError> {
            Ok(FetchOutcome::ok(CompositionSnapshot::new(
                isu_cd,
                "2025-10-20",
                vec![CompositionRow {
                    code: "005930".to_string(),
                    name: "삼성전자".to_string(),
                    weight_pct: 30.46,
                    market: "KOSPI".to_string(),
                }],
            )))
        }
    }

    fn state_with(daily: DailyResult) -> AppState {
        AppState {
            board: watch::channel(Board::new()).1,
            source: Arc::new(StubSource {
                daily: Mutex::new(Some(daily)),
            }),
            market_close: kr_market::default_market_close(),
            default_top: DEFAULT_BOARD_TOP,
        }
    }

    async fn snapshot_for(
        daily: DailyResult,
        path: &str,
        top: Option<usize>,
    ) -> ApiResult<ApiSnapshot> {
        get_snapshot_by_date(
            State(state_with(daily)),
            Path(path.to_string()),
            Query(TopQuery { top }),
        )
        .await
    }

    fn connect_err() -> FetchError {
        FetchError::Connect {
            endpoint: "https://example.test".to_string(),
            detail: "refused".to_string(),
        }
    }

    fn date() -> TradingDate {
        TradingDate::new(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())
    }

    fn snapshot() -> TradingSnapshot {
        TradingSnapshot::new(
            "2025-10-20",
            (0..15)
                .map(|i| EtfQuote {
                    name: format!("ETF {i}"),
                    price: 10_000 + i,
                    change_pct: i as f64 / 10.0,
                    volume: 1_000 * i,
                })
                .collect(),
        )
    }

    #[test]
    fn board_view_truncates_and_formats() {
        let at = Utc.with_ymd_and_hms(2025, 10, 21, 7, 0, 0).unwrap();
        let board = Board::new().apply(date(), at, Ok(FetchOutcome::ok(snapshot())));
        let view = board_view(&board, 10);
        assert_eq!(view.total_rows, 15);
        assert_eq!(view.rows.len(), 10);
        assert_eq!(view.rows[0].name, "ETF 14");
        assert_eq!(view.rows[0].price, "10,014");
        assert_eq!(view.base_date.as_deref(), Some("2025-10-20"));
        assert!(view.notice.is_none());
    }

    #[test]
    fn board_view_before_first_success_is_empty() {
        let at = Utc.with_ymd_and_hms(2025, 10, 21, 7, 0, 0).unwrap();
        let err = FetchError::Timeout {
            endpoint: "https://example.test".to_string(),
            timeout: Duration::from_secs(15),
        };
        let board = Board::new().apply(date(), at, Err(err));
        let view = board_view(&board, 10);
        assert!(view.rows.is_empty());
        assert!(view.base_date.is_none());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["notice"]["kind"], "fetch_failed");
        assert_eq!(json["notice"]["error_kind"], "timeout");
    }

    #[test]
    fn every_upstream_error_is_bad_gateway() {
        let (status, body) = upstream_error(FetchError::Timeout {
            endpoint: "https://example.test".to_string(),
            timeout: Duration::from_secs(15),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.0.kind, "timeout");

        let (status, body) = upstream_error(connect_err());
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.0.kind, "connect");
    }

    #[tokio::test]
    async fn snapshot_ranks_and_truncates() {
        let Json(view) = snapshot_for(Ok(FetchOutcome::ok(snapshot())), "2025-10-20", Some(3))
            .await
            .unwrap();
        assert_eq!(view.requested_date, date());
        assert_eq!(view.base_date, "2025-10-20");
        assert_eq!(view.total_rows, 15);
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.rows[0].name, "ETF 14");
        assert!(view.notice.is_none());
    }

    #[tokio::test]
    async fn snapshot_without_rows_is_ok_with_notice() {
        let soft = FetchOutcome::soft_failure(TradingSnapshot::empty(), "no data for 20251020");
        let Json(view) = snapshot_for(Ok(soft), "20251020", None).await.unwrap();
        assert!(view.rows.is_empty());
        assert_eq!(view.total_rows, 0);
        assert_eq!(view.base_date, "unknown");
        assert_eq!(view.notice.as_deref(), Some("no data for 20251020"));

        let json = serde_json::to_value(&view).unwrap();
        assert!(!json["notice"].is_null());
    }

    #[tokio::test]
    async fn snapshot_fetch_failure_is_bad_gateway() {
        let (status, Json(body)) = snapshot_for(Err(connect_err()), "2025-10-20", None)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.kind, "connect");

        let timeout = FetchError::Timeout {
            endpoint: "https://example.test".to_string(),
            timeout: Duration::from_secs(15),
        };
        let (status, _) = snapshot_for(Err(timeout), "2025-10-20", None)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn snapshot_rejects_invalid_date_before_fetching() {
        let (status, Json(body)) = snapshot_for(Err(connect_err()), "2025-13-01", None)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.kind, "bad_date");
    }

    #[tokio::test]
    async fn composition_uses_query_date() {
        let Json(view) = get_composition(
            State(state_with(Err(connect_err()))),
            Path("KR7069500007".to_string()),
            Query(DateQuery {
                date: Some("2025-10-20".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.requested_date, date());
        assert!(view.notice.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["isu_cd"], "KR7069500007");
        assert_eq!(json["rows"][0]["code"], "005930");

        let (status, _) = get_composition(
            State(state_with(Err(connect_err()))),
            Path("KR7069500007".to_string()),
            Query(DateQuery {
                date: Some("yesterday".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reports_why_the_poller_stopped() {
        let err = poller_exit_error(Ok(Board::new()));
        assert!(err.to_string().contains("returned after 0 cycles"));

        async fn explode() -> Board {
            panic!("boom")
        }
        let err = poller_exit_error(tokio::spawn(explode()).await);
        assert!(err.to_string().contains("panicked"));
    }
}
