pub mod cache;
pub mod error;
pub mod fields;
pub mod krx;
pub mod provider;

pub use error::FetchError;
pub use krx::{AuthScheme, KrxClient, KrxConfig};
pub use provider::EtfDataSource;

/// A successful fetch. `diagnostic` is set when the provider answered but had no rows
/// for the request; `value` is then empty and callers should keep what they already show.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub value: T,
    pub diagnostic: Option<String>,
}

impl<T> FetchOutcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            diagnostic: None,
        }
    }

    pub fn soft_failure(value: T, diagnostic: impl Into<String>) -> Self {
        Self {
            value,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_soft_failure(&self) -> bool {
        self.diagnostic.is_some()
    }
}
