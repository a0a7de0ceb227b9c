//! VIX and 10-year T-note panels: five days of hourly bars resampled into
//! 4-hour candles.

use super::FetchContext;
use crate::clock::jst;
use crate::data::{DataError, Interval, PriceBar};
use crate::snapshot::{ChartPanel, ErrorCode, MarketSnapshot, OhlcPoint, Section};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, TimeZone, Timelike};

pub const CANDLE_HOURS: u32 = 4;
const HISTORY_DAYS: i64 = 5;

pub fn fetch_market(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    snapshot.market.vix = chart_section(ctx, &ctx.sources.vix_ticker, "vix");
    snapshot.market.t_note_future = chart_section(ctx, &ctx.sources.t_note_ticker, "t_note_future");
}

fn chart_section(ctx: &FetchContext<'_>, ticker: &str, section: &str) -> Section<ChartPanel> {
    tracing::info!(section, ticker, "fetching chart panel");
    match chart_panel(ctx, ticker) {
        Ok(panel) => Section::Ready(panel),
        Err(e) => {
            tracing::error!(section, ticker, error = %e, "chart panel failed");
            Section::failed(ErrorCode::UpstreamConnection, format!("{ticker}: {e}"))
        }
    }
}

fn chart_panel(ctx: &FetchContext<'_>, ticker: &str) -> Result<ChartPanel, DataError> {
    let bars = ctx.quotes.history(
        ticker,
        ctx.now - Duration::days(HISTORY_DAYS),
        ctx.now,
        Interval::OneHour,
    )?;
    let candles = resample(&bars, CANDLE_HOURS);
    let Some(last) = candles.last() else {
        return Err(DataError::Other(format!("no bars for {ticker}")));
    };
    let current = last.close;
    let change = match candles.len() {
        n if n >= 2 => current - candles[n - 2].close,
        _ => 0.0,
    };
    Ok(ChartPanel {
        current,
        change,
        history: candles.iter().map(Candle::to_point).collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Candle {
    start: DateTime<FixedOffset>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Candle {
    fn to_point(&self) -> OhlcPoint {
        OhlcPoint {
            time: self.start.to_rfc3339_opts(SecondsFormat::Secs, false),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// Group bars into `hours`-wide buckets aligned to midnight UTC+9. Empty
/// buckets produce no candle.
fn resample(bars: &[PriceBar], hours: u32) -> Vec<Candle> {
    let mut candles: Vec<Candle> = Vec::new();
    for bar in bars.iter().filter(|b| b.close.is_finite()) {
        let Some(start) = bucket_start(bar.time.with_timezone(&jst()), hours) else {
            continue;
        };
        match candles.last_mut() {
            Some(c) if c.start == start => {
                c.high = c.high.max(bar.high);
                c.low = c.low.min(bar.low);
                c.close = bar.close;
            }
            _ => candles.push(Candle {
                start,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            }),
        }
    }
    candles
}

fn bucket_start(local: DateTime<FixedOffset>, hours: u32) -> Option<DateTime<FixedOffset>> {
    let hour = local.hour() - local.hour() % hours.max(1);
    let naive = local.date_naive().and_hms_opt(hour, 0, 0)?;
    jst().from_local_datetime(&naive).single()
}
