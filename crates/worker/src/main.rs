use clap::{Parser, Subcommand};
use etfboard_core::domain::TradingDate;
use etfboard_core::ingest::{EtfDataSource, KrxClient};
use etfboard_core::poll::{self, Board, PollOptions};
use etfboard_core::time::kr_market;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

const DEFAULT_BOARD_TOP: usize = 10;

#[derive(Debug, Parser)]
#[command(name = "etfboard_worker")]
struct Args {
    /// Print tables without ANSI colors.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a single ETF board and print it.
    Once {
        /// Trading date (YYYY-MM-DD). Defaults to the latest settled session.
        #[arg(long)]
        date: Option<String>,

        /// Only print the top K rows.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Poll continuously and reprint the leaderboard after every cycle.
    Watch {
        /// Rows to show (defaults to BOARD_TOP or 10).
        #[arg(long)]
        top: Option<usize>,

        /// Stop after N cycles instead of running forever.
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Print the constituent holdings of one ETF.
    Composition {
        /// Standard issue code of the ETF (e.g. KR7069500007).
        #[arg(long)]
        isu_cd: String,

        /// Trading date (YYYY-MM-DD). Defaults to the latest settled session.
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = etfboard_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // Tables go to stdout; keep logs on stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let color = !args.no_color;

    let result = run(args.command, &settings, color).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "etfboard worker failed");
    }
    result
}

async fn run(
    command: Command,
    settings: &etfboard_core::config::Settings,
    color: bool,
) -> anyhow::Result<()> {
    let market_close = settings.market_close()?;
    let client = KrxClient::from_settings(settings)?;

    match command {
        Command::Once { date, top } => {
            let date = resolve_date(date.as_deref(), market_close)?;
            let outcome = client.fetch_etf_daily(date).await?;
            if let Some(diagnostic) = &outcome.diagnostic {
                println!("! No data for {date}: {diagnostic}");
            }
            print!("{}", render::render_snapshot(&outcome.value, top, color));
        }
        Command::Watch { top, cycles } => {
            let top = top.or(settings.board_top).unwrap_or(DEFAULT_BOARD_TOP);
            let opts = PollOptions {
                market_close,
                max_cycles: cycles,
                ..PollOptions::default()
            };

            tracing::info!(
                source = client.source_name(),
                top,
                %market_close,
                "starting ETF board polling"
            );

            poll::run(&client, &opts, Board::new(), |board| {
                let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                println!("\n=== ETF daily change leaderboard ({stamp}) ===");
                print!("{}", render::render_board(board, Some(top), color));
            })
            .await;
        }
        Command::Composition { isu_cd, date } => {
            let date = resolve_date(date.as_deref(), market_close)?;
            let outcome = client.fetch_etf_composition(date, &isu_cd).await?;
            if let Some(diagnostic) = &outcome.diagnostic {
                println!("! No holdings for {isu_cd} on {date}: {diagnostic}");
            }
            print!("{}", render::render_composition(&outcome.value));
        }
    }

    Ok(())
}

fn resolve_date(
    date_arg: Option<&str>,
    market_close: chrono::NaiveTime,
) -> anyhow::Result<TradingDate> {
    match date_arg {
        Some(s) => TradingDate::parse(s),
        None => Ok(kr_market::trading_date(chrono::Utc::now(), market_close)),
    }
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
