//! Source fetchers — one per snapshot section.
//!
//! Every fetcher owns a disjoint set of sections, catches its own errors and
//! writes an `ErrorPayload` into the section it owns instead of returning
//! one. `FETCH_SEQUENCE` is the fixed order the orchestrator runs them in.

pub mod fear_greed;
pub mod heatmap;
pub mod indicators;
pub mod market;
pub mod news;
pub mod world;

use crate::data::{MarketDataProvider, PageFetcher};
use crate::performance::PacingPolicy;
use crate::snapshot::{ErrorCode, ErrorPayload, HeatmapUniverse, MarketSnapshot, Section};
use crate::sources::SourcesConfig;
use chrono::{DateTime, Utc};

/// Everything a fetcher may touch besides its own sections.
pub struct FetchContext<'a> {
    pub quotes: &'a dyn MarketDataProvider,
    pub pages: &'a dyn PageFetcher,
    pub sources: &'a SourcesConfig,
    pub pacing: PacingPolicy,
    pub now: DateTime<Utc>,
}

/// A named fetch step plus the way to mark its sections failed if the step
/// itself blows up.
pub struct FetchStep {
    pub name: &'static str,
    pub code: ErrorCode,
    pub run: fn(&FetchContext<'_>, &mut MarketSnapshot),
    pub fail: fn(&mut MarketSnapshot, &ErrorPayload),
}

pub const FETCH_SEQUENCE: &[FetchStep] = &[
    FetchStep {
        name: "world",
        code: ErrorCode::UpstreamConnection,
        run: world::fetch_world,
        fail: |s, e| s.world = Section::Failed(e.clone()),
    },
    FetchStep {
        name: "market",
        code: ErrorCode::UpstreamConnection,
        run: market::fetch_market,
        fail: |s, e| {
            s.market.vix = Section::Failed(e.clone());
            s.market.t_note_future = Section::Failed(e.clone());
        },
    },
    FetchStep {
        name: "fear_greed",
        code: ErrorCode::FearGreedFetch,
        run: fear_greed::fetch_fear_greed,
        fail: |s, e| s.market.fear_and_greed = Section::Failed(e.clone()),
    },
    FetchStep {
        name: "indicators",
        code: ErrorCode::CalendarScrape,
        run: indicators::fetch_indicators,
        fail: |s, e| {
            s.indicators.economic = Section::Failed(e.clone());
            s.indicators.us_earnings = Section::Failed(e.clone());
            s.indicators.jp_earnings = Section::Failed(e.clone());
        },
    },
    FetchStep {
        name: "news",
        code: ErrorCode::UpstreamConnection,
        run: news::fetch_news,
        fail: |s, e| s.news_raw = Section::Failed(e.clone()),
    },
    FetchStep {
        name: "heatmaps",
        code: ErrorCode::HeatmapFetch,
        run: heatmap::fetch_heatmaps,
        fail: |s, e| {
            for universe in HeatmapUniverse::ALL {
                s.heatmaps.fail_universe(universe, e);
            }
        },
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_a_step_covers_every_section_it_owns() {
        let mut snapshot = MarketSnapshot::default();
        for step in FETCH_SEQUENCE {
            (step.fail)(&mut snapshot, &ErrorPayload::new(step.code, "boom"));
        }
        let doc = serde_json::to_value(&snapshot).unwrap();
        for key in [
            "world",
            "news_raw",
            "nasdaq_heatmap_1d",
            "sp500_combined_heatmap_1m",
            "sector_etf_heatmap_1w",
        ] {
            assert!(doc[key]["error"].as_str().unwrap().contains("boom"), "{key}");
        }
        assert_eq!(doc["market"]["fear_and_greed"]["code"], "E004");
        assert_eq!(doc["indicators"]["jp_earnings"]["code"], "E007");
    }

    #[test]
    fn steps_run_in_a_fixed_order() {
        let names: Vec<&str> = FETCH_SEQUENCE.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["world", "market", "fear_greed", "indicators", "news", "heatmaps"]
        );
    }
}
