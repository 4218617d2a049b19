use crate::domain::{CompositionSnapshot, TradingDate, TradingSnapshot};
use crate::ingest::error::FetchError;
use crate::ingest::FetchOutcome;

/// Source of ETF boards. `KrxClient` is the production implementation; the poller only
/// depends on this trait.
#[async_trait::async_trait]
pub trait EtfDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_etf_daily(
        &self,
        date: TradingDate,
    ) -> Result<FetchOutcome<TradingSnapshot>, FetchError>;

    /// Constituent holdings of one ETF (`isu_cd` is its standard issue code).
    async fn fetch_etf_composition(
        &self,
        date: TradingDate,
        isu_cd: &str,
    ) -> Result<FetchOutcome<CompositionSnapshot>, FetchError>;
}
