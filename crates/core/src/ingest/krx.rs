use crate::config::Settings;
use crate::domain::{CompositionSnapshot, TradingDate, TradingSnapshot};
use crate::ingest::cache::{RequestKey, TtlCache};
use crate::ingest::error::FetchError;
use crate::ingest::fields;
use crate::ingest::provider::EtfDataSource;
use crate::ingest::FetchOutcome;
use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MIN_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;

const DEFAULT_AUTH_FIELD: &str = "AUTH_KEY";
const DEFAULT_DAILY_PATH: &str = "/etp/etf_bydd_trd";
const DEFAULT_COMPOSITION_PATH: &str = "/etp/etf_cmpst_isu";

const DATE_PARAM: &str = "basDd";
const ISSUE_PARAM: &str = "isuCd";
// Sent with every daily board request; the endpoint expects it alongside basDd.
const EXTRA_DAILY_PARAMS: [(&str, &str); 1] = [("etc_parm", "Y")];

/// Where the API key travels. KRX endpoints have accepted both forms over time, so the
/// choice is configuration rather than code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `GET` with the key in a custom request header; parameters go in the query string.
    Header { name: String },
    /// `POST` with the key as a JSON body field next to the parameters.
    Body { field: String },
}

impl AuthScheme {
    pub fn parse(scheme: &str, field: &str) -> Result<Self> {
        let field = field.trim();
        anyhow::ensure!(!field.is_empty(), "KRX auth field name must be non-empty");

        match scheme.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(Self::Header {
                name: field.to_string(),
            }),
            "body" => Ok(Self::Body {
                field: field.to_string(),
            }),
            other => anyhow::bail!("unknown KRX_AUTH_SCHEME {other:?} (expected \"header\" or \"body\")"),
        }
    }
}

impl Default for AuthScheme {
    fn default() -> Self {
        Self::Header {
            name: DEFAULT_AUTH_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KrxConfig {
    pub base_url: String,
    pub api_key: String,
    pub auth: AuthScheme,
    pub daily_path: String,
    pub composition_path: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl KrxConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            auth: AuthScheme::default(),
            daily_path: DEFAULT_DAILY_PATH.to_string(),
            composition_path: DEFAULT_COMPOSITION_PATH.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut config = Self::new(
            settings.krx_api_base_url(),
            settings.krx_api_key_or_dev_fallback(),
        );

        let scheme = std::env::var("KRX_AUTH_SCHEME").unwrap_or_else(|_| "header".to_string());
        let field =
            std::env::var("KRX_AUTH_FIELD").unwrap_or_else(|_| DEFAULT_AUTH_FIELD.to_string());
        config.auth = AuthScheme::parse(&scheme, &field)?;

        if let Some(path) = non_empty_env("KRX_ETF_DAILY_PATH") {
            config.daily_path = path;
        }
        if let Some(path) = non_empty_env("KRX_ETF_COMPOSITION_PATH") {
            config.composition_path = path;
        }

        let timeout_secs = timeout_secs(std::env::var("KRX_TIMEOUT_SECS").ok().as_deref());
        config.timeout = Duration::from_secs(timeout_secs);

        let cache_ttl_secs = std::env::var("KRX_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);
        config.cache_ttl = Duration::from_secs(cache_ttl_secs);

        Ok(config)
    }
}

#[derive(Debug)]
pub struct KrxClient {
    http: reqwest::Client,
    config: KrxConfig,
    auth_header: Option<(HeaderName, HeaderValue)>,
    daily_cache: TtlCache<RequestKey, TradingSnapshot>,
    composition_cache: TtlCache<RequestKey, CompositionSnapshot>,
}

impl KrxClient {
    pub fn new(config: KrxConfig) -> Result<Self> {
        let auth_header = match &config.auth {
            AuthScheme::Header { name } => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid KRX auth header name {name:?}"))?;
                let mut value = HeaderValue::from_str(&config.api_key)
                    .context("KRX API key is not a valid header value")?;
                value.set_sensitive(true);
                Some((name, value))
            }
            AuthScheme::Body { .. } => None,
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build KRX http client")?;

        Ok(Self {
            http,
            auth_header,
            daily_cache: TtlCache::new(config.cache_ttl),
            composition_cache: TtlCache::new(config.cache_ttl),
            config,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(KrxConfig::from_settings(settings)?)
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_key(&self, url: &str, params: &[(&str, String)]) -> RequestKey {
        RequestKey {
            endpoint: url.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            credential: self.config.api_key.clone(),
        }
    }

    /// One request, no retries: the poller's next cycle is the retry.
    async fn request_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let timeout = self.config.timeout;

        let req = match &self.config.auth {
            AuthScheme::Header { .. } => {
                let mut req = self.http.get(url).query(params);
                if let Some((name, value)) = &self.auth_header {
                    req = req.header(name.clone(), value.clone());
                }
                req
            }
            AuthScheme::Body { field } => {
                let mut body = Map::new();
                body.insert(field.clone(), Value::String(self.config.api_key.clone()));
                for (k, v) in params {
                    body.insert(k.to_string(), Value::String(v.clone()));
                }
                self.http.post(url).json(&body)
            }
        };

        let res = req
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url, timeout, err))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| FetchError::from_reqwest(url, timeout, err))?;

        if !status.is_success() {
            return Err(FetchError::http_status(url, status, &text));
        }

        serde_json::from_str::<Value>(&text).map_err(|err| FetchError::Decode {
            endpoint: url.to_string(),
            detail: err.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl EtfDataSource for KrxClient {
    fn source_name(&self) -> &'static str {
        "krx_open_api"
    }

    async fn fetch_etf_daily(
        &self,
        date: TradingDate,
    ) -> Result<FetchOutcome<TradingSnapshot>, FetchError> {
        let url = self.url(&self.config.daily_path);
        let mut params = vec![(DATE_PARAM, date.to_bas_dd())];
        params.extend(EXTRA_DAILY_PARAMS.iter().map(|(k, v)| (*k, v.to_string())));
        let key = self.request_key(&url, &params);

        if let Some(snapshot) = self.daily_cache.get(&key).await {
            tracing::debug!(%date, rows = snapshot.rows().len(), "ETF daily board served from cache");
            return Ok(FetchOutcome::ok(snapshot));
        }

        tracing::debug!(endpoint = %url, %date, "requesting KRX ETF daily trade data");
        let body = self.request_json(&url, &params).await?;

        let records = match fields::extract_records(&body) {
            Ok(records) => records,
            Err(diagnostic) => {
                tracing::warn!(%date, %diagnostic, "KRX returned no ETF rows");
                return Ok(FetchOutcome::soft_failure(TradingSnapshot::empty(), diagnostic));
            }
        };

        let base_date = fields::base_date_of(&records);
        let quotes = records
            .iter()
            .map(|rec| fields::quote_from_record(rec))
            .collect();
        let snapshot = TradingSnapshot::new(base_date, quotes);

        tracing::info!(
            %date,
            base_date = snapshot.base_date(),
            rows = snapshot.rows().len(),
            "fetched KRX ETF daily board"
        );

        self.daily_cache.insert(key, snapshot.clone()).await;
        Ok(FetchOutcome::ok(snapshot))
    }

    async fn fetch_etf_composition(
        &self,
        date: TradingDate,
        isu_cd: &str,
    ) -> Result<FetchOutcome<CompositionSnapshot>, FetchError> {
        let isu_cd = isu_cd.trim();
        let url = self.url(&self.config.composition_path);
        let params = [
            (DATE_PARAM, date.to_bas_dd()),
            (ISSUE_PARAM, isu_cd.to_string()),
        ];
        let key = self.request_key(&url, &params);

        if let Some(snapshot) = self.composition_cache.get(&key).await {
            tracing::debug!(%date, isu_cd, "ETF composition served from cache");
            return Ok(FetchOutcome::ok(snapshot));
        }

        tracing::debug!(endpoint = %url, %date, isu_cd, "requesting KRX ETF composition");
        let body = self.request_json(&url, &params).await?;

        let records = match fields::extract_records(&body) {
            Ok(records) => records,
            Err(diagnostic) => {
                tracing::warn!(%date, isu_cd, %diagnostic, "KRX returned no composition rows");
                return Ok(FetchOutcome::soft_failure(
                    CompositionSnapshot::empty(isu_cd),
                    diagnostic,
                ));
            }
        };

        let base_date = fields::base_date_of(&records);
        let rows = records
            .iter()
            .map(|rec| fields::composition_row_from_record(rec))
            .collect();
        let snapshot = CompositionSnapshot::new(isu_cd, base_date, rows);

        tracing::info!(%date, isu_cd, holdings = snapshot.rows().len(), "fetched KRX ETF composition");

        self.composition_cache.insert(key, snapshot.clone()).await;
        Ok(FetchOutcome::ok(snapshot))
    }
}

/// Request timeout from `KRX_TIMEOUT_SECS`, kept within 10..=15 seconds.
fn timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
