pub mod domain;
pub mod ingest;
pub mod poll;
pub mod rank;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_KRX_API_BASE_URL: &str = "https://data-dbg.krx.co.kr/svc/apis";

    // Lets a fresh checkout run locally without secrets; every use is logged at WARN.
    const DEV_FALLBACK_API_KEY: &str = "ETFBOARD-LOCAL-DEV-KEY";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub krx_api_base_url: Option<String>,
        pub krx_api_key: Option<String>,
        pub market_close_kst: Option<String>,
        pub board_top: Option<usize>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let board_top = match std::env::var("BOARD_TOP") {
                Ok(s) => Some(
                    s.trim()
                        .parse::<usize>()
                        .with_context(|| format!("BOARD_TOP must be a positive integer (got {s:?})"))?,
                ),
                Err(_) => None,
            };

            Ok(Self {
                krx_api_base_url: non_empty_var("KRX_API_BASE_URL"),
                krx_api_key: non_empty_var("KRX_API_KEY"),
                market_close_kst: non_empty_var("MARKET_CLOSE_KST"),
                board_top,
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn krx_api_base_url(&self) -> &str {
            self.krx_api_base_url
                .as_deref()
                .unwrap_or(DEFAULT_KRX_API_BASE_URL)
        }

        /// Returns the configured API key, or the development key with a warning.
        pub fn krx_api_key_or_dev_fallback(&self) -> String {
            match self.krx_api_key.as_deref() {
                Some(key) => key.to_string(),
                None => {
                    tracing::warn!(
                        "KRX_API_KEY is not set; using the built-in development key (requests will likely be rejected)"
                    );
                    DEV_FALLBACK_API_KEY.to_string()
                }
            }
        }

        pub fn market_close(&self) -> anyhow::Result<chrono::NaiveTime> {
            match self.market_close_kst.as_deref() {
                Some(s) => chrono::NaiveTime::parse_from_str(s.trim(), "%H:%M")
                    .with_context(|| format!("MARKET_CLOSE_KST must be HH:MM (got {s:?})")),
                None => Ok(crate::time::kr_market::default_market_close()),
            }
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

}
