//! World indices panel.
//!
//! Each catalog instrument gets five days of hourly bars, falling back to
//! three months of daily bars when the hourly series is too thin. The gold
//! price in yen is derived from the gold future and USD/JPY once both have
//! been priced.

use super::FetchContext;
use crate::data::{DataError, Interval, PriceBar};
use crate::performance::PacingPolicy;
use crate::snapshot::{MarketSnapshot, Section, WorldEntry, WorldFailure, WorldIndices, WorldQuote};
use crate::sources::{WorldInstrument, GOLD_USD_TICKER, USD_JPY_TICKER};
use chrono::Duration;

const TROY_OUNCE_GRAMS: f64 = 31.1035;
const CHART_WIDTH: f64 = 85.0;

/// A priced series: the non-empty closes plus their sparkline.
#[derive(Debug, Clone)]
struct Priced {
    closes: Vec<f64>,
    chart: Sparkline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sparkline {
    pub points: String,
    pub min: f64,
    pub max: f64,
}

pub fn fetch_world(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    tracing::info!("fetching world indices");
    let mut world = WorldIndices::new();
    let mut gold: Option<Priced> = None;
    let mut usd_jpy: Option<f64> = None;
    let mut derived_slots: Vec<(String, usize, WorldInstrument)> = Vec::new();

    for category in ctx.sources.world_catalog() {
        let mut entries = Vec::new();
        for (position, instrument) in category.instruments.iter().enumerate() {
            if instrument.derived {
                derived_slots.push((category.name.clone(), position, instrument.clone()));
                continue;
            }
            match price_instrument(ctx, &instrument.ticker) {
                Ok(Some(priced)) => {
                    if instrument.ticker == GOLD_USD_TICKER {
                        gold = Some(priced.clone());
                    }
                    if instrument.ticker == USD_JPY_TICKER {
                        usd_jpy = priced.closes.last().copied();
                    }
                    entries.push(WorldEntry::Quote(quote(instrument, &priced)));
                    PacingPolicy::pause(ctx.pacing.instrument_delay);
                }
                Ok(None) => {
                    tracing::warn!(ticker = %instrument.ticker, name = %instrument.name, "not enough data, skipping");
                }
                Err(e) => {
                    tracing::error!(ticker = %instrument.ticker, name = %instrument.name, error = %e, "world instrument failed");
                    entries.push(WorldEntry::Failed(WorldFailure {
                        name: instrument.name.clone(),
                        ticker: instrument.ticker.clone(),
                        country_code: instrument.country_code.clone(),
                        error: format!("Failed to fetch data: {e}"),
                    }));
                }
            }
        }
        world.insert(category.name, entries);
    }

    for (category, position, instrument) in derived_slots {
        let (Some(gold), Some(rate)) = (gold.as_ref(), usd_jpy) else {
            tracing::warn!(ticker = %instrument.ticker, "components unavailable, skipping derived instrument");
            continue;
        };
        match gold_in_yen(ctx, &instrument, gold, rate) {
            Ok(Some(entry)) => {
                let slot = world.category_mut(&category);
                let at = position.min(slot.len());
                slot.insert(at, WorldEntry::Quote(entry));
            }
            Ok(None) => tracing::warn!("not enough daily history to price gold in yen"),
            Err(e) => tracing::error!(error = %e, "failed to price gold in yen"),
        }
    }

    snapshot.world = Section::Ready(world);
}

/// `Ok(None)` when neither window yields two closes. A failed hourly request
/// counts as an empty series; only a failed daily request is an error.
fn price_instrument(ctx: &FetchContext<'_>, ticker: &str) -> Result<Option<Priced>, DataError> {
    let hourly = ctx
        .quotes
        .history(ticker, ctx.now - Duration::days(5), ctx.now, Interval::OneHour)
        .unwrap_or_else(|e| {
            tracing::warn!(ticker, error = %e, "hourly history failed");
            Vec::new()
        });
    let mut closes = finite_closes(&hourly);
    if closes.len() < 2 {
        tracing::debug!(ticker, "thin hourly series, using daily bars");
        let daily = ctx
            .quotes
            .history(ticker, ctx.now - Duration::days(90), ctx.now, Interval::OneDay)?;
        closes = finite_closes(&daily);
    }
    if closes.len() < 2 {
        return Ok(None);
    }
    let chart = sparkline(&closes);
    Ok(Some(Priced { closes, chart }))
}

fn finite_closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).filter(|c| c.is_finite()).collect()
}

fn quote(instrument: &WorldInstrument, priced: &Priced) -> WorldQuote {
    let current = priced.closes[priced.closes.len() - 1];
    let previous = priced.closes[priced.closes.len() - 2];
    let change = current - previous;
    WorldQuote {
        name: instrument.name.clone(),
        ticker: instrument.ticker.clone(),
        country_code: instrument.country_code.clone(),
        description: instrument.description.clone(),
        current_value: group_thousands(current, 2),
        change_value: group_thousands(change.abs(), 2),
        percentage: format!("{:.2}", percent_change(change, previous).abs()),
        is_positive: change >= 0.0,
        chart_data: priced.chart.points.clone(),
        max_value: group_thousands(priced.chart.max, 0),
        min_value: group_thousands(priced.chart.min, 0),
    }
}

/// Gold per gram in yen. The previous value comes from the second-to-last
/// daily close of each component.
fn gold_in_yen(
    ctx: &FetchContext<'_>,
    instrument: &WorldInstrument,
    gold: &Priced,
    usd_jpy: f64,
) -> Result<Option<WorldQuote>, DataError> {
    let start = ctx.now - Duration::days(7);
    let gold_daily = finite_closes(&ctx.quotes.history(GOLD_USD_TICKER, start, ctx.now, Interval::OneDay)?);
    let fx_daily = finite_closes(&ctx.quotes.history(USD_JPY_TICKER, start, ctx.now, Interval::OneDay)?);
    if gold_daily.len() < 2 || fx_daily.len() < 2 {
        return Ok(None);
    }
    let per_gram = |usd_oz: f64, rate: f64| usd_oz * rate / TROY_OUNCE_GRAMS;

    let gold_usd = gold.closes[gold.closes.len() - 1];
    let current = per_gram(gold_usd, usd_jpy);
    let previous = per_gram(gold_daily[gold_daily.len() - 2], fx_daily[fx_daily.len() - 2]);
    let change = current - previous;

    Ok(Some(WorldQuote {
        name: instrument.name.clone(),
        ticker: instrument.ticker.clone(),
        country_code: instrument.country_code.clone(),
        description: instrument.description.clone(),
        current_value: group_thousands(current, 0),
        change_value: group_thousands(change.abs(), 0),
        percentage: format!("{:.2}", percent_change(change, previous).abs()),
        is_positive: change >= 0.0,
        chart_data: gold.chart.points.clone(),
        max_value: group_thousands(per_gram(gold.chart.max, usd_jpy), 0),
        min_value: group_thousands(per_gram(gold.chart.min, usd_jpy), 0),
    }))
}

fn percent_change(change: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        change / previous * 100.0
    }
}

/// Polyline points in an 85x100 box: x spreads evenly across the width, y
/// maps the close range onto 97..3 (top is high). A flat series sits at 50.
pub fn sparkline(closes: &[f64]) -> Sparkline {
    let Some(min) = closes.iter().copied().reduce(f64::min) else {
        return Sparkline {
            points: String::new(),
            min: 0.0,
            max: 0.0,
        };
    };
    let max = closes.iter().copied().fold(min, f64::max);
    let range = max - min;
    let n = closes.len();

    let points = closes
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            let x = if n > 1 {
                i as f64 / (n - 1) as f64 * CHART_WIDTH
            } else {
                CHART_WIDTH / 2.0
            };
            let y = if range == 0.0 {
                50.0
            } else {
                97.0 - (price - min) / range * 94.0
            };
            format!("{x:.2},{y:.2}")
        })
        .collect::<Vec<_>>()
        .join(" ");

    Sparkline { points, min, max }
}

/// Fixed decimals with comma-grouped thousands: `1234567.891` at 2 places is
/// `1,234,567.89`.
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && text.bytes().any(|b| (b'1'..=b'9').contains(&b)) {
        out.push('-');
    }
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}
