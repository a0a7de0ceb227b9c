//! Heatmap sections: Nasdaq-100, S&P 500, sector ETFs and the combined
//! S&P 500 + ETF view, each for 1d/1w/1m.

use super::FetchContext;
use crate::data::constituents::extract_symbols;
use crate::data::DataError;
use crate::performance::{fetch_performance, AssetKind, PerformanceSummary};
use crate::snapshot::{
    ErrorCode, ErrorPayload, Heatmap, HeatmapUniverse, Horizon, MarketSnapshot, Section,
};

pub fn fetch_heatmaps(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    let sources = ctx.sources;
    stock_universe(ctx, snapshot, HeatmapUniverse::Nasdaq, &sources.nasdaq100_constituents_url);
    stock_universe(ctx, snapshot, HeatmapUniverse::Sp500, &sources.sp500_constituents_url);

    tracing::info!(universe = "sector_etf", "fetching heatmap");
    let etfs = fetch_performance(
        ctx.quotes,
        &sources.sector_etfs,
        AssetKind::Etf,
        &ctx.pacing,
        ctx.now,
    );
    store(snapshot, HeatmapUniverse::SectorEtf, Ok(etfs));

    combine(snapshot);
}

fn stock_universe(
    ctx: &FetchContext<'_>,
    snapshot: &mut MarketSnapshot,
    universe: HeatmapUniverse,
    constituents_url: &str,
) {
    tracing::info!(universe = universe.key(), "fetching heatmap");
    let summary = ctx
        .pages
        .get_text(constituents_url)
        .and_then(|html| extract_symbols(&html))
        .map(|symbols| {
            tracing::info!(universe = universe.key(), symbols = symbols.len(), "constituents loaded");
            fetch_performance(ctx.quotes, &symbols, AssetKind::Stock, &ctx.pacing, ctx.now)
        });
    store(snapshot, universe, summary);
}

fn store(
    snapshot: &mut MarketSnapshot,
    universe: HeatmapUniverse,
    summary: Result<PerformanceSummary, DataError>,
) {
    let summary = summary.and_then(|s| {
        if s.all_failed() {
            let first = s.failed.first().map(|(t, e)| format!("{t}: {e}")).unwrap_or_default();
            Err(DataError::Other(format!(
                "all {} symbols failed (first: {first})",
                s.failed.len()
            )))
        } else {
            Ok(s)
        }
    });

    match summary {
        Ok(summary) => {
            for horizon in Horizon::ALL {
                let items = summary.items(horizon);
                snapshot.heatmaps.set(universe, horizon, Section::Ready(Heatmap { items }));
            }
        }
        Err(e) => {
            tracing::error!(universe = universe.key(), error = %e, "heatmap fetch failed");
            snapshot
                .heatmaps
                .fail_universe(universe, &ErrorPayload::new(ErrorCode::HeatmapFetch, e));
        }
    }
}

/// S&P 500 entries followed by sector-ETF entries, per horizon. Needs both
/// parts.
fn combine(snapshot: &mut MarketSnapshot) {
    for horizon in Horizon::ALL {
        let stocks = snapshot.heatmaps.get(HeatmapUniverse::Sp500, horizon).ready();
        let etfs = snapshot.heatmaps.get(HeatmapUniverse::SectorEtf, horizon).ready();
        let section = match (stocks, etfs) {
            (Some(stocks), Some(etfs)) => {
                let mut items = stocks.items.clone();
                items.extend(etfs.items.iter().cloned());
                Section::Ready(Heatmap { items })
            }
            _ => Section::failed(
                ErrorCode::HeatmapFetch,
                "combined view needs both S&P 500 and sector ETF data",
            ),
        };
        snapshot
            .heatmaps
            .set(HeatmapUniverse::Sp500Combined, horizon, section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CompanyProfile, Interval};
    use crate::performance::PacingPolicy;
    use crate::sources::SourcesConfig;
    use crate::testing::{bars_ending_at, StaticPages, StaticProvider};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap()
    }

    fn constituents(symbols: &[&str]) -> String {
        let rows: String = symbols
            .iter()
            .map(|s| format!("<tr><td>{s}</td><td>Co</td></tr>"))
            .collect();
        format!("<table><tr><th>Symbol</th><th>Security</th></tr>{rows}</table>")
    }

    fn stock(provider: StaticProvider, symbol: &str, closes: &[f64]) -> StaticProvider {
        provider
            .with_profile(
                symbol,
                CompanyProfile {
                    sector: Some("Tech".into()),
                    industry: Some("Chips".into()),
                    market_cap: Some(1e12),
                },
            )
            .with_history(
                symbol,
                Interval::OneDay,
                bars_ending_at(now(), Duration::days(1), closes),
            )
    }

    fn sources() -> SourcesConfig {
        SourcesConfig {
            sector_etfs: vec!["XLK".into()],
            ..SourcesConfig::default()
        }
    }

    #[test]
    fn universes_and_combined_view_are_filled() {
        let sources = sources();
        let pages = StaticPages::new()
            .with_page(&sources.sp500_constituents_url, constituents(&["AAPL", "BRK.B"]))
            .with_page(&sources.nasdaq100_constituents_url, constituents(&["NVDA"]));
        let mut provider = StaticProvider::new();
        provider = stock(provider, "AAPL", &[100.0, 110.0]);
        provider = stock(provider, "BRK-B", &[50.0, 45.0]);
        provider = stock(provider, "NVDA", &[10.0, 12.0]);
        provider = provider.with_history(
            "XLK",
            Interval::OneDay,
            bars_ending_at(now(), Duration::days(1), &[20.0, 21.0]),
        );
        let ctx = FetchContext {
            quotes: &provider,
            pages: &pages,
            sources: &sources,
            pacing: PacingPolicy::none(),
            now: now(),
        };
        let mut snapshot = MarketSnapshot::default();
        fetch_heatmaps(&ctx, &mut snapshot);

        let h = &snapshot.heatmaps;
        let sp500 = h.sp500_heatmap_1d.ready().unwrap();
        let tickers: Vec<&str> = sp500.items.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "BRK-B"]);
        assert!((sp500.items[0].performance - 10.0).abs() < 1e-9);

        // Two bars cover only the one-day horizon.
        assert!(h.sp500_heatmap_1w.ready().unwrap().items.is_empty());

        assert_eq!(h.nasdaq_heatmap_1d.ready().unwrap().items.len(), 1);
        let combined: Vec<&str> = h
            .sp500_combined_heatmap_1d
            .ready()
            .unwrap()
            .items
            .iter()
            .map(|e| e.ticker.as_str())
            .collect();
        assert_eq!(combined, vec!["AAPL", "BRK-B", "XLK"]);
    }

    #[test]
    fn missing_constituent_page_fails_universe_and_combined_view() {
        let sources = sources();
        let pages = StaticPages::new()
            .with_page(&sources.nasdaq100_constituents_url, constituents(&["NVDA"]));
        let provider = stock(StaticProvider::new(), "NVDA", &[10.0, 12.0]).with_history(
            "XLK",
            Interval::OneDay,
            bars_ending_at(now(), Duration::days(1), &[20.0, 21.0]),
        );
        let ctx = FetchContext {
            quotes: &provider,
            pages: &pages,
            sources: &sources,
            pacing: PacingPolicy::none(),
            now: now(),
        };
        let mut snapshot = MarketSnapshot::default();
        fetch_heatmaps(&ctx, &mut snapshot);

        let h = &snapshot.heatmaps;
        for horizon in Horizon::ALL {
            let err = h.get(HeatmapUniverse::Sp500, horizon).error().unwrap();
            assert_eq!(err.code, Some(ErrorCode::HeatmapFetch));
            assert!(!h.get(HeatmapUniverse::Sp500Combined, horizon).is_ready());
            assert!(h.get(HeatmapUniverse::SectorEtf, horizon).is_ready());
        }
        assert!(h.nasdaq_heatmap_1d.is_ready());
    }
}
