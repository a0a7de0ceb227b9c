//! Batched performance fetcher — trailing 1d/1w/1m returns for a symbol list.
//!
//! Symbols are fetched one at a time, in fixed-size batches. A pause follows
//! each batch except the last, and a shorter pause follows each failed
//! symbol. The pauses keep the run under the quote provider's rate limit.

use crate::data::{DataError, Interval, MarketDataProvider, PriceBar};
use crate::snapshot::{HeatmapEntry, Horizon};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

/// Calendar days of daily history fetched per symbol.
pub const HISTORY_DAYS: i64 = 35;

/// Request pacing for batch jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub batch_size: usize,
    pub batch_delay: StdDuration,
    pub failure_delay: StdDuration,
    /// Pause between single-instrument fetches outside of batches.
    pub instrument_delay: StdDuration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: StdDuration::from_millis(2000),
            failure_delay: StdDuration::from_millis(500),
            instrument_delay: StdDuration::from_millis(500),
        }
    }
}

impl PacingPolicy {
    /// No pauses at all. Batch size is kept so batching still shows in logs.
    pub fn none() -> Self {
        Self {
            batch_size: 10,
            batch_delay: StdDuration::ZERO,
            failure_delay: StdDuration::ZERO,
            instrument_delay: StdDuration::ZERO,
        }
    }

    pub fn pause(delay: StdDuration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Which gate a symbol list goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Requires sector, industry and a non-zero market cap.
    Stock,
    /// No classification gate; output sorted by ticker.
    Etf,
}

/// Percent change from the close `lookback` sessions back to the last close.
///
/// `None` when there are fewer than `lookback + 1` closes or the reference
/// close is zero.
pub fn trailing_return(closes: &[f64], horizon: Horizon) -> Option<f64> {
    if closes.len() < horizon.min_bars() {
        return None;
    }
    let last = closes[closes.len() - 1];
    let reference = closes[closes.len() - 1 - horizon.lookback()];
    if reference == 0.0 {
        return None;
    }
    let pct = (last / reference - 1.0) * 100.0;
    pct.is_finite().then_some(pct)
}

/// Outcome of one batched run.
#[derive(Debug, Default)]
pub struct PerformanceSummary {
    pub by_horizon: BTreeMap<Horizon, Vec<HeatmapEntry>>,
    /// Symbols that produced at least one entry.
    pub priced: usize,
    /// Symbols dropped by the data-quality gate.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, DataError)>,
}

impl PerformanceSummary {
    pub fn items(&self, horizon: Horizon) -> Vec<HeatmapEntry> {
        self.by_horizon.get(&horizon).cloned().unwrap_or_default()
    }

    /// True when symbols were requested but every one of them errored.
    pub fn all_failed(&self) -> bool {
        self.priced == 0 && self.skipped.is_empty() && !self.failed.is_empty()
    }
}

pub fn fetch_performance(
    provider: &dyn MarketDataProvider,
    symbols: &[String],
    kind: AssetKind,
    pacing: &PacingPolicy,
    now: DateTime<Utc>,
) -> PerformanceSummary {
    let mut summary = PerformanceSummary::default();
    for horizon in Horizon::ALL {
        summary.by_horizon.insert(horizon, Vec::new());
    }

    let batch_size = pacing.batch_size.max(1);
    let batches: Vec<&[String]> = symbols.chunks(batch_size).collect();
    let batch_count = batches.len();

    'batches: for (batch_index, batch) in batches.into_iter().enumerate() {
        tracing::debug!(batch = batch_index + 1, of = batch_count, ?kind, "fetching batch");

        for (i, symbol) in batch.iter().enumerate() {
            match fetch_one(provider, symbol, kind, now) {
                Ok(Some(entries)) => {
                    summary.priced += 1;
                    for (horizon, entry) in entries {
                        summary.by_horizon.entry(horizon).or_default().push(entry);
                    }
                }
                Ok(None) => summary.skipped.push(symbol.clone()),
                Err(DataError::CircuitBreakerTripped) => {
                    tracing::warn!(ticker = %symbol, "circuit breaker open, abandoning remaining symbols");
                    let remaining = batch[i..]
                        .iter()
                        .chain(symbols.iter().skip((batch_index + 1) * batch_size));
                    for sym in remaining {
                        summary.failed.push((sym.clone(), DataError::CircuitBreakerTripped));
                    }
                    break 'batches;
                }
                Err(e) => {
                    tracing::warn!(ticker = %symbol, error = %e, "performance fetch failed");
                    summary.failed.push((symbol.clone(), e));
                    PacingPolicy::pause(pacing.failure_delay);
                }
            }
        }

        if batch_index + 1 < batch_count {
            PacingPolicy::pause(pacing.batch_delay);
        }
    }

    if kind == AssetKind::Etf {
        for entries in summary.by_horizon.values_mut() {
            entries.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        }
    }

    tracing::info!(
        ?kind,
        requested = symbols.len(),
        priced = summary.priced,
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "performance batch complete"
    );
    summary
}

/// `Ok(None)` means the symbol was dropped by the data-quality gate.
fn fetch_one(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    kind: AssetKind,
    now: DateTime<Utc>,
) -> Result<Option<Vec<(Horizon, HeatmapEntry)>>, DataError> {
    let (sector, industry, market_cap) = match kind {
        AssetKind::Stock => {
            let profile = provider.profile(symbol)?;
            let (Some(sector), Some(industry), Some(cap)) =
                (profile.sector, profile.industry, profile.market_cap)
            else {
                tracing::debug!(ticker = %symbol, "missing classification, skipping");
                return Ok(None);
            };
            if sector.is_empty() || industry.is_empty() || cap == 0.0 || !cap.is_finite() {
                tracing::debug!(ticker = %symbol, "incomplete classification, skipping");
                return Ok(None);
            }
            (Some(sector), Some(industry), Some(cap))
        }
        AssetKind::Etf => (None, None, None),
    };

    let bars = provider.history(symbol, now - Duration::days(HISTORY_DAYS), now, Interval::OneDay)?;
    if bars.is_empty() {
        tracing::debug!(ticker = %symbol, "empty history, skipping");
        return Ok(None);
    }
    let closes: Vec<f64> = bars.iter().map(|b: &PriceBar| b.close).collect();

    let entries = Horizon::ALL
        .into_iter()
        .filter_map(|horizon| {
            trailing_return(&closes, horizon).map(|performance| {
                (
                    horizon,
                    HeatmapEntry {
                        ticker: symbol.to_string(),
                        sector: sector.clone(),
                        industry: industry.clone(),
                        market_cap,
                        performance,
                    },
                )
            })
        })
        .collect();
    Ok(Some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CompanyProfile, RawNewsItem};
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockProvider {
        closes: HashMap<String, Vec<f64>>,
        profiles: HashMap<String, CompanyProfile>,
        failing: Vec<String>,
        calls: RefCell<Vec<String>>,
    }

    impl MockProvider {
        fn with(mut self, symbol: &str, closes: &[f64], cap: Option<f64>) -> Self {
            self.closes.insert(symbol.into(), closes.to_vec());
            self.profiles.insert(
                symbol.into(),
                CompanyProfile {
                    sector: Some("Technology".into()),
                    industry: Some("Software".into()),
                    market_cap: cap,
                },
            );
            self
        }
    }

    impl MarketDataProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn history(
            &self,
            symbol: &str,
            _start: DateTime<Utc>,
            end: DateTime<Utc>,
            _interval: Interval,
        ) -> Result<Vec<PriceBar>, DataError> {
            self.calls.borrow_mut().push(format!("history:{symbol}"));
            if self.failing.iter().any(|s| s == symbol) {
                return Err(DataError::NetworkUnreachable("down".into()));
            }
            let closes = self.closes.get(symbol).cloned().unwrap_or_default();
            let n = closes.len() as i64;
            Ok(closes
                .into_iter()
                .enumerate()
                .map(|(i, c)| PriceBar {
                    time: end - Duration::days(n - i as i64),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 0,
                })
                .collect())
        }

        fn profile(&self, symbol: &str) -> Result<CompanyProfile, DataError> {
            self.calls.borrow_mut().push(format!("profile:{symbol}"));
            if self.failing.iter().any(|s| s == symbol) {
                return Err(DataError::NetworkUnreachable("down".into()));
            }
            Ok(self.profiles.get(symbol).cloned().unwrap_or_default())
        }

        fn news(&self, _symbol: &str) -> Result<Vec<RawNewsItem>, DataError> {
            Ok(Vec::new())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn series(len: usize) -> Vec<f64> {
        (1..=len).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn five_bars_give_one_day_but_not_one_week() {
        let closes = [100.0, 101.0, 102.0, 103.0, 110.0];
        assert!(trailing_return(&closes, Horizon::OneDay).is_some());
        assert_eq!(trailing_return(&closes, Horizon::OneWeek), None);
        assert_eq!(trailing_return(&closes, Horizon::OneMonth), None);
    }

    #[test]
    fn returns_compare_against_the_right_session() {
        let closes = series(21);
        let one_day = trailing_return(&closes, Horizon::OneDay).unwrap();
        assert!((one_day - (121.0 / 120.0 - 1.0) * 100.0).abs() < 1e-9);
        let one_week = trailing_return(&closes, Horizon::OneWeek).unwrap();
        assert!((one_week - (121.0 / 116.0 - 1.0) * 100.0).abs() < 1e-9);
        let one_month = trailing_return(&closes, Horizon::OneMonth).unwrap();
        assert!((one_month - (121.0 / 101.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_reference_close_is_omitted() {
        assert_eq!(trailing_return(&[0.0, 5.0], Horizon::OneDay), None);
    }

    #[test]
    fn zero_market_cap_yields_no_entries() {
        let provider = MockProvider::default()
            .with("AAA", &series(25), Some(0.0))
            .with("BBB", &series(25), Some(1e9));
        let summary = fetch_performance(
            &provider,
            &symbols(&["AAA", "BBB"]),
            AssetKind::Stock,
            &PacingPolicy::none(),
            now(),
        );
        assert_eq!(summary.skipped, vec!["AAA".to_string()]);
        for horizon in Horizon::ALL {
            let tickers: Vec<String> = summary.items(horizon).into_iter().map(|e| e.ticker).collect();
            assert_eq!(tickers, vec!["BBB".to_string()]);
        }
        // Gated symbols never reach the history request.
        assert!(!provider.calls.borrow().contains(&"history:AAA".to_string()));
    }

    #[test]
    fn short_history_lands_only_in_covered_horizons() {
        let provider = MockProvider::default().with("AAA", &series(5), Some(1e9));
        let summary = fetch_performance(
            &provider,
            &symbols(&["AAA"]),
            AssetKind::Stock,
            &PacingPolicy::none(),
            now(),
        );
        assert_eq!(summary.items(Horizon::OneDay).len(), 1);
        assert!(summary.items(Horizon::OneWeek).is_empty());
        assert!(summary.items(Horizon::OneMonth).is_empty());
        let entry = &summary.items(Horizon::OneDay)[0];
        assert_eq!(entry.sector.as_deref(), Some("Technology"));
        assert_eq!(entry.market_cap, Some(1e9));
    }

    #[test]
    fn etfs_skip_the_gate_and_sort_by_ticker() {
        let provider = MockProvider::default()
            .with("XLK", &series(22), None)
            .with("XLE", &series(22), None)
            .with("XLB", &series(22), None);
        let summary = fetch_performance(
            &provider,
            &symbols(&["XLK", "XLE", "XLB"]),
            AssetKind::Etf,
            &PacingPolicy::none(),
            now(),
        );
        let tickers: Vec<String> =
            summary.items(Horizon::OneMonth).into_iter().map(|e| e.ticker).collect();
        assert_eq!(tickers, vec!["XLB", "XLE", "XLK"]);
        assert!(summary.items(Horizon::OneDay).iter().all(|e| e.sector.is_none()));
        assert!(!provider.calls.borrow().iter().any(|c| c.starts_with("profile:")));
    }

    #[test]
    fn failures_are_recorded_and_do_not_stop_the_batch() {
        let mut provider = MockProvider::default()
            .with("AAA", &series(3), Some(1e9))
            .with("CCC", &series(3), Some(1e9));
        provider.failing.push("BBB".into());
        let pacing = PacingPolicy {
            batch_size: 2,
            ..PacingPolicy::none()
        };
        let summary = fetch_performance(
            &provider,
            &symbols(&["AAA", "BBB", "CCC"]),
            AssetKind::Stock,
            &pacing,
            now(),
        );
        assert_eq!(summary.priced, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "BBB");
        assert!(!summary.all_failed());
    }

    #[test]
    fn every_symbol_failing_is_reported() {
        let mut provider = MockProvider::default();
        provider.failing = symbols(&["AAA", "BBB"]);
        let summary = fetch_performance(
            &provider,
            &symbols(&["AAA", "BBB"]),
            AssetKind::Etf,
            &PacingPolicy::none(),
            now(),
        );
        assert!(summary.all_failed());
    }
}
