//! Yahoo Finance quote provider.
//!
//! Bars come from the v8 chart API, company metadata from the v10
//! quoteSummary API and headlines from the v1 search API. All three share one
//! blocking client and one circuit breaker.
//!
//! quoteSummary rejects requests without a session crumb. The client keeps
//! cookies, picks up the consent cookie once, then asks for a crumb that is
//! cached for the provider's lifetime and refreshed once on a 401.
//!
//! Yahoo has no official API and changes response formats without notice;
//! every parse failure surfaces as `DataError::ResponseFormatChanged`.

use super::circuit_breaker::CircuitBreaker;
use super::http::{send_with_retry, HttpSettings};
use super::provider::{
    CompanyProfile, DataError, Interval, MarketDataProvider, PriceBar, RawNewsItem,
};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cell::RefCell;

const BASE_URL: &str = "https://query2.finance.yahoo.com";
const CONSENT_URL: &str = "https://fc.yahoo.com";

// ── v8 chart ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

// ── v10 quoteSummary ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    quote_summary: SummaryResult,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    result: Option<Vec<SummaryModules>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryModules {
    asset_profile: Option<AssetProfile>,
    price: Option<PriceModule>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    market_cap: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
struct RawNumber {
    raw: Option<f64>,
}

// ── v1 search (news) ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNews {
    title: String,
    #[serde(default)]
    publisher: String,
    link: String,
    provider_publish_time: i64,
}

/// Yahoo Finance implementation of `MarketDataProvider`.
pub struct YahooProvider {
    client: Client,
    settings: HttpSettings,
    breaker: CircuitBreaker,
    news_count: usize,
    crumb: RefCell<Option<String>>,
}

impl YahooProvider {
    pub fn new(settings: HttpSettings, breaker: CircuitBreaker) -> Result<Self, DataError> {
        Ok(Self {
            client: settings.build_client()?,
            settings,
            breaker,
            news_count: 20,
            crumb: RefCell::new(None),
        })
    }

    /// Visit the consent host for its cookie, then request a crumb.
    fn fetch_crumb(&self) -> Result<String, DataError> {
        // The consent host answers 404 but still sets the session cookie.
        if let Err(e) = self.client.get(CONSENT_URL).send() {
            tracing::debug!(error = %e, "consent cookie request failed");
        }
        let body = send_with_retry(
            &self.client,
            &format!("{BASE_URL}/v1/test/getcrumb"),
            &self.settings,
            Some(&self.breaker),
        )?;
        let crumb = parse_crumb(&body)?;
        tracing::debug!("obtained quote API crumb");
        Ok(crumb)
    }

    fn chart_url(
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> String {
        format!(
            "{BASE_URL}/v8/finance/chart/{symbol}?period1={}&period2={}&interval={}",
            start.timestamp(),
            end.timestamp(),
            interval.as_query()
        )
    }

    fn get<T: DeserializeOwned>(&self, url: &str, symbol: &str) -> Result<T, DataError> {
        let body = send_with_retry(&self.client, url, &self.settings, Some(&self.breaker))
            .map_err(|e| match e {
                DataError::Http { status: 404, .. } => DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                other => other,
            })?;
        serde_json::from_slice(&body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })
    }

    /// Parse a chart response into bars, dropping rows without a close.
    fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, DataError> {
        let result = resp.chart.result.ok_or_else(|| yahoo_error(symbol, resp.chart.error))?;
        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;
        // A symbol with no trades in the window has no timestamp array at all.
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(close) = quote.close.get(i).copied().flatten().filter(|c| c.is_finite())
            else {
                continue;
            };
            let time = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten().unwrap_or(close);
            bars.push(PriceBar {
                time,
                open: field(&quote.open),
                high: field(&quote.high),
                low: field(&quote.low),
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            });
        }
        Ok(bars)
    }

    fn parse_profile(symbol: &str, resp: SummaryResponse) -> Result<CompanyProfile, DataError> {
        let modules = resp
            .quote_summary
            .result
            .ok_or_else(|| yahoo_error(symbol, resp.quote_summary.error))?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("empty quoteSummary".into()))?;
        let (sector, industry) = modules
            .asset_profile
            .map(|p| (p.sector, p.industry))
            .unwrap_or_default();
        Ok(CompanyProfile {
            sector,
            industry,
            market_cap: modules.price.and_then(|p| p.market_cap).and_then(|m| m.raw),
        })
    }
}

fn summary_url(symbol: &str, crumb: &str) -> String {
    let crumb: String = url::form_urlencoded::byte_serialize(crumb.as_bytes()).collect();
    format!("{BASE_URL}/v10/finance/quoteSummary/{symbol}?modules=assetProfile,price&crumb={crumb}")
}

/// A crumb is a short opaque token; an HTML or empty body means the session
/// was not established.
fn parse_crumb(body: &[u8]) -> Result<String, DataError> {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() || text.len() > 64 || text.contains(['<', ' ', '{']) {
        return Err(DataError::AuthenticationRequired(
            "quote API did not issue a crumb".into(),
        ));
    }
    Ok(text)
}

/// Run `call` with the cached crumb, fetching one first if needed. On
/// `AuthenticationRequired` the crumb is replaced and `call` retried once.
fn with_crumb<T>(
    cache: &RefCell<Option<String>>,
    mut fetch: impl FnMut() -> Result<String, DataError>,
    mut call: impl FnMut(&str) -> Result<T, DataError>,
) -> Result<T, DataError> {
    let cached = cache.borrow().clone();
    let crumb = match cached {
        Some(crumb) => crumb,
        None => {
            let crumb = fetch()?;
            *cache.borrow_mut() = Some(crumb.clone());
            crumb
        }
    };
    match call(&crumb) {
        Err(DataError::AuthenticationRequired(reason)) => {
            tracing::warn!(%reason, "crumb rejected, refreshing");
            *cache.borrow_mut() = None;
            let fresh = fetch()?;
            *cache.borrow_mut() = Some(fresh.clone());
            call(&fresh)
        }
        other => other,
    }
}

fn yahoo_error(symbol: &str, error: Option<YahooError>) -> DataError {
    match error {
        Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => DataError::ResponseFormatChanged("empty result with no error".into()),
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<PriceBar>, DataError> {
        let url = Self::chart_url(symbol, start, end, interval);
        let resp: ChartResponse = self.get(&url, symbol)?;
        Self::parse_chart(symbol, resp)
    }

    fn profile(&self, symbol: &str) -> Result<CompanyProfile, DataError> {
        let resp: SummaryResponse = with_crumb(
            &self.crumb,
            || self.fetch_crumb(),
            |crumb| self.get(&summary_url(symbol, crumb), symbol),
        )?;
        Self::parse_profile(symbol, resp)
    }

    fn news(&self, symbol: &str) -> Result<Vec<RawNewsItem>, DataError> {
        let url = format!(
            "{BASE_URL}/v1/finance/search?q={symbol}&quotesCount=0&newsCount={}",
            self.news_count
        );
        let resp: SearchResponse = self.get(&url, symbol)?;
        Ok(resp
            .news
            .into_iter()
            .filter_map(|n| {
                Some(RawNewsItem {
                    published: DateTime::from_timestamp(n.provider_publish_time, 0)?,
                    title: n.title,
                    publisher: n.publisher,
                    link: n.link,
                })
            })
            .collect())
    }
}
