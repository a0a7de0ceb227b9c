//! Economic and earnings calendars, scraped from Shift-JIS pages.

use super::FetchContext;
use crate::calendar::{parse_calendar, CalendarError, CalendarLayout};
use crate::snapshot::{ErrorCode, IndicatorCategory, IndicatorEntry, MarketSnapshot, Section};

pub fn fetch_indicators(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    let sources = ctx.sources;
    snapshot.indicators.economic = calendar_section(
        ctx,
        &sources.economic_calendar_url,
        &CalendarLayout::economic(),
        &[],
    );
    snapshot.indicators.us_earnings = calendar_section(
        ctx,
        &sources.us_earnings_url,
        &CalendarLayout::earnings(IndicatorCategory::UsEarnings),
        &sources.us_earnings_watchlist,
    );
    snapshot.indicators.jp_earnings = calendar_section(
        ctx,
        &sources.jp_earnings_url,
        &CalendarLayout::earnings(IndicatorCategory::JpEarnings),
        &sources.jp_earnings_watchlist,
    );
}

fn calendar_section(
    ctx: &FetchContext<'_>,
    url: &str,
    layout: &CalendarLayout,
    watchlist: &[String],
) -> Section<Vec<IndicatorEntry>> {
    tracing::info!(category = ?layout.category, "fetching calendar");
    match scrape(ctx, url, layout) {
        Ok(entries) => {
            let kept: Vec<IndicatorEntry> = entries
                .into_iter()
                .filter(|e| on_watchlist(e, watchlist))
                .collect();
            tracing::info!(category = ?layout.category, rows = kept.len(), "calendar parsed");
            Section::Ready(kept)
        }
        Err(e) => {
            tracing::error!(category = ?layout.category, error = %e, "calendar scrape failed");
            Section::failed(ErrorCode::CalendarScrape, e)
        }
    }
}

fn scrape(
    ctx: &FetchContext<'_>,
    url: &str,
    layout: &CalendarLayout,
) -> Result<Vec<IndicatorEntry>, CalendarError> {
    let html = ctx.pages.get_shift_jis(url)?;
    parse_calendar(&html, layout, ctx.now)
}

/// An empty watchlist keeps everything.
fn on_watchlist(entry: &IndicatorEntry, watchlist: &[String]) -> bool {
    if watchlist.is_empty() {
        return true;
    }
    entry
        .ticker
        .as_deref()
        .is_some_and(|t| watchlist.iter().any(|w| w.eq_ignore_ascii_case(t)))
}
