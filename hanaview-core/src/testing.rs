//! In-memory upstreams for tests: a quote provider and a page fetcher that
//! serve canned data and record every request.

use crate::data::{
    CompanyProfile, DataError, Interval, MarketDataProvider, PageFetcher, PriceBar, RawNewsItem,
};
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Build `closes.len()` bars spaced `step` apart and ending at `end`.
pub fn bars_ending_at(end: DateTime<Utc>, step: Duration, closes: &[f64]) -> Vec<PriceBar> {
    let n = closes.len() as i32;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            time: end - step * (n - 1 - i as i32),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct StaticProvider {
    histories: HashMap<(String, Interval), Vec<PriceBar>>,
    profiles: HashMap<String, CompanyProfile>,
    news: HashMap<String, Vec<RawNewsItem>>,
    unreachable: HashSet<String>,
    failing: HashMap<(String, Interval), u16>,
    requests: RefCell<Vec<String>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, symbol: &str, interval: Interval, bars: Vec<PriceBar>) -> Self {
        self.histories.insert((symbol.to_string(), interval), bars);
        self
    }

    pub fn with_profile(mut self, symbol: &str, profile: CompanyProfile) -> Self {
        self.profiles.insert(symbol.to_string(), profile);
        self
    }

    pub fn with_news(mut self, symbol: &str, items: Vec<RawNewsItem>) -> Self {
        self.news.insert(symbol.to_string(), items);
        self
    }

    /// Every request for `symbol` fails with a network error.
    pub fn unreachable(mut self, symbol: &str) -> Self {
        self.unreachable.insert(symbol.to_string());
        self
    }

    /// History requests for `symbol` at `interval` answer with HTTP `status`.
    pub fn failing_interval(mut self, symbol: &str, interval: Interval, status: u16) -> Self {
        self.failing.insert((symbol.to_string(), interval), status);
        self
    }

    /// Requests seen so far, as `kind:symbol`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    fn record(&self, kind: &str, symbol: &str) -> Result<(), DataError> {
        self.requests.borrow_mut().push(format!("{kind}:{symbol}"));
        if self.unreachable.contains(symbol) {
            return Err(DataError::NetworkUnreachable(format!("{symbol} unreachable")));
        }
        Ok(())
    }
}

impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, DataError> {
        self.record("history", symbol)?;
        if let Some(&status) = self.failing.get(&(symbol.to_string(), interval)) {
            return Err(DataError::Http {
                status,
                url: format!("history/{symbol}?interval={}", interval.as_query()),
            });
        }
        Ok(self
            .histories
            .get(&(symbol.to_string(), interval))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.time >= start && b.time <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn profile(&self, symbol: &str) -> Result<CompanyProfile, DataError> {
        self.record("profile", symbol)?;
        self.profiles
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    fn news(&self, symbol: &str) -> Result<Vec<RawNewsItem>, DataError> {
        self.record("news", symbol)?;
        Ok(self.news.get(symbol).cloned().unwrap_or_default())
    }
}

/// Serves pages by URL prefix. Unknown URLs answer HTTP 404.
#[derive(Debug, Default)]
pub struct StaticPages {
    pages: Vec<(String, Vec<u8>)>,
    requests: RefCell<Vec<String>>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url_prefix: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.push((url_prefix.to_string(), body.into()));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl PageFetcher for StaticPages {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| DataError::Http {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Encode UTF-8 text as Shift-JIS, for calendar page fixtures.
pub fn shift_jis(text: &str) -> Vec<u8> {
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(text);
    bytes.into_owned()
}
