//! Upstream provider traits and structured error types.
//!
//! `MarketDataProvider` abstracts over the quote/history/news source and
//! `PageFetcher` over raw page retrieval (calendar HTML, constituent lists,
//! the sentiment-index JSON API), so fetchers can run against mocks in tests.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One price bar from the quote provider. Bars with no close are dropped at
/// parse time, so `close` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Bar interval requested from the quote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneHour,
    OneDay,
}

impl Interval {
    pub fn as_query(self) -> &'static str {
        match self {
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        }
    }
}

/// Descriptive metadata for an equity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
}

/// A news item as returned by the provider, before dedup and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNewsItem {
    pub title: String,
    pub publisher: String,
    pub link: String,
    pub published: DateTime<Utc>,
}

/// Structured error types for upstream operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Quote, history, profile and news source keyed by ticker symbol.
pub trait MarketDataProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Bars for `symbol` between `start` and `end`, oldest first.
    fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, DataError>;

    fn profile(&self, symbol: &str) -> Result<CompanyProfile, DataError>;

    fn news(&self, symbol: &str) -> Result<Vec<RawNewsItem>, DataError>;
}

/// Raw page retrieval. Only `get_bytes` is required; the text and JSON
/// helpers decode on top of it.
pub trait PageFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError>;

    fn get_text(&self, url: &str) -> Result<String, DataError> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).map_err(|e| DataError::Decode(format!("{url}: {e}")))
    }

    /// Fetch a Shift-JIS encoded page and decode it to UTF-8.
    fn get_shift_jis(&self, url: &str) -> Result<String, DataError> {
        let bytes = self.get_bytes(url)?;
        let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(&bytes);
        if had_errors {
            tracing::debug!(url, "shift-jis decode replaced malformed sequences");
        }
        Ok(text.into_owned())
    }

    fn get_json_value(&self, url: &str) -> Result<serde_json::Value, DataError> {
        let bytes = self.get_bytes(url)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DataError::ResponseFormatChanged(format!("{url}: {e}")))
    }
}

/// Deserialize a JSON page into a typed response.
pub fn fetch_json<T: DeserializeOwned>(pages: &dyn PageFetcher, url: &str) -> Result<T, DataError> {
    let value = pages.get_json_value(url)?;
    serde_json::from_value(value)
        .map_err(|e| DataError::ResponseFormatChanged(format!("{url}: {e}")))
}
