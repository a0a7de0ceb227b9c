//! Fear & Greed panel.
//!
//! The sentiment API returns a daily series with gaps for weekends and
//! holidays. "Now" is the last sample; the historical readings come from the
//! nearest-timestamp lookup.

use super::FetchContext;
use crate::data::{fetch_json, DataError};
use crate::nearest::{nearest_value, TimedSample};
use crate::snapshot::{
    ErrorCode, FearGreedCategory, FearGreedPanel, FearGreedReading, MarketSnapshot, Section,
};
use chrono::Duration;
use serde::Deserialize;

/// Days of history requested; enough to resolve the one-year reading.
pub const HISTORY_DAYS: i64 = 400;

#[derive(Debug, Deserialize)]
struct GraphData {
    fear_and_greed_historical: Historical,
}

#[derive(Debug, Deserialize)]
struct Historical {
    data: Vec<Sample>,
}

#[derive(Debug, Clone, Deserialize)]
struct Sample {
    /// Epoch milliseconds, sent as a float.
    x: f64,
    y: f64,
}

impl TimedSample for Sample {
    fn epoch_millis(&self) -> f64 {
        self.x
    }

    fn value(&self) -> f64 {
        self.y
    }
}

/// Five fixed buckets; `None` is unknown.
pub fn categorize(value: Option<f64>) -> FearGreedCategory {
    match value {
        None => FearGreedCategory::Unknown,
        Some(v) if v.is_nan() => FearGreedCategory::Unknown,
        Some(v) if v <= 25.0 => FearGreedCategory::ExtremeFear,
        Some(v) if v <= 45.0 => FearGreedCategory::Fear,
        Some(v) if v <= 55.0 => FearGreedCategory::Neutral,
        Some(v) if v <= 75.0 => FearGreedCategory::Greed,
        Some(_) => FearGreedCategory::ExtremeGreed,
    }
}

fn reading(value: Option<f64>) -> FearGreedReading {
    FearGreedReading {
        value,
        category: categorize(value),
    }
}

pub fn fetch_fear_greed(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    tracing::info!("fetching fear & greed index");
    snapshot.market.fear_and_greed = match fear_greed_panel(ctx) {
        Ok(panel) => Section::Ready(panel),
        Err(e) => {
            tracing::error!(error = %e, "fear & greed fetch failed");
            Section::failed(ErrorCode::FearGreedFetch, e)
        }
    };
}

fn fear_greed_panel(ctx: &FetchContext<'_>) -> Result<FearGreedPanel, DataError> {
    let start = (ctx.now - Duration::days(HISTORY_DAYS)).format("%Y-%m-%d");
    let url = format!("{}{}", ctx.sources.fear_greed_url, start);
    let graph: GraphData = fetch_json(ctx.pages, &url)?;
    let series = graph.fear_and_greed_historical.data;
    let Some(last) = series.last() else {
        return Err(DataError::ResponseFormatChanged("empty fear & greed history".into()));
    };

    let ago = |days: i64| reading(nearest_value(&series, ctx.now, days));
    Ok(FearGreedPanel {
        now: reading(Some(last.y)),
        previous_close: ago(1),
        prev_week: ago(7),
        prev_month: ago(30),
        prev_year: ago(365),
    })
}
