//! Raw news feed: recent articles across the major index tickers.

use super::FetchContext;
use crate::clock::jst;
use crate::data::{DataError, RawNewsItem};
use crate::snapshot::{ErrorCode, MarketSnapshot, NewsArticle, Section};
use chrono::Duration;
use std::collections::HashSet;
use url::Url;

pub const WINDOW_HOURS: i64 = 24;
const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons?domain=";

pub fn fetch_news(ctx: &FetchContext<'_>, snapshot: &mut MarketSnapshot) {
    tracing::info!("fetching news");
    let mut collected: Vec<RawNewsItem> = Vec::new();
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for ticker in &ctx.sources.news_tickers {
        match ctx.quotes.news(ticker) {
            Ok(items) => collected.extend(items),
            Err(e) => {
                tracing::warn!(ticker = %ticker, error = %e, "news fetch failed");
                errors.push((ticker.clone(), e));
            }
        }
    }

    if collected.is_empty() && !errors.is_empty() && errors.len() == ctx.sources.news_tickers.len() {
        let detail = errors
            .iter()
            .map(|(t, e)| format!("{t}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        snapshot.news_raw = Section::failed(ErrorCode::UpstreamConnection, detail);
        return;
    }

    let articles = recent_unique(collected, ctx);
    tracing::info!(articles = articles.len(), "news collected");
    snapshot.news_raw = Section::Ready(articles);
}

/// Dedupe by canonical link (first wins), keep the last 24 hours, newest
/// first.
fn recent_unique(items: Vec<RawNewsItem>, ctx: &FetchContext<'_>) -> Vec<NewsArticle> {
    let cutoff = ctx.now - Duration::hours(WINDOW_HOURS);
    let mut seen: HashSet<String> = HashSet::new();
    let mut articles: Vec<NewsArticle> = items
        .into_iter()
        .filter(|item| seen.insert(canonical_link(&item.link)))
        .filter(|item| item.published >= cutoff)
        .map(|item| NewsArticle {
            source_icon_url: source_icon_url(&item.link),
            published: item.published.with_timezone(&jst()),
            title: item.title,
            publisher: item.publisher,
            link: item.link,
        })
        .collect();
    articles.sort_by(|a, b| b.published.cmp(&a.published));
    articles
}

/// Lower-cased scheme and host, no fragment, no `utm_*` parameters, no
/// trailing slash. Links that do not parse are compared verbatim.
pub fn canonical_link(link: &str) -> String {
    let Ok(mut url) = Url::parse(link.trim()) else {
        return link.trim().to_string();
    };
    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

pub fn source_icon_url(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.host_str().map(|host| format!("{FAVICON_SERVICE}{host}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PacingPolicy;
    use crate::sources::SourcesConfig;
    use crate::testing::{StaticPages, StaticProvider};
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn item(title: &str, link: &str, hours_ago: i64) -> RawNewsItem {
        RawNewsItem {
            title: title.into(),
            publisher: "Wire".into(),
            link: link.into(),
            published: now() - Duration::hours(hours_ago),
        }
    }

    fn run(provider: &StaticProvider) -> Section<Vec<NewsArticle>> {
        let pages = StaticPages::new();
        let sources = SourcesConfig::default();
        let ctx = FetchContext {
            quotes: provider,
            pages: &pages,
            sources: &sources,
            pacing: PacingPolicy::none(),
            now: now(),
        };
        let mut snapshot = MarketSnapshot::default();
        fetch_news(&ctx, &mut snapshot);
        snapshot.news_raw
    }

    #[test]
    fn dedupes_filters_and_sorts() {
        let provider = StaticProvider::new()
            .with_news(
                "^GSPC",
                vec![
                    item("first", "https://example.com/a?utm_source=x", 5),
                    item("old", "https://example.com/old", 25),
                    item("newest", "https://news.test/n", 1),
                ],
            )
            .with_news(
                "^DJI",
                vec![
                    item("dup", "https://EXAMPLE.com/a#comments", 2),
                    item("middle", "https://example.com/m", 3),
                ],
            );
        let section = run(&provider);
        let articles = section.ready().unwrap();
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "middle", "first"]);
        assert_eq!(articles[0].published.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(
            articles[0].source_icon_url.as_deref(),
            Some("https://www.google.com/s2/favicons?domain=news.test")
        );
    }

    #[test]
    fn one_failing_ticker_does_not_fail_the_section() {
        let provider = StaticProvider::new()
            .unreachable("^DJI")
            .with_news("^IXIC", vec![item("ok", "https://a.test/x", 1)]);
        assert_eq!(run(&provider).ready().unwrap().len(), 1);
    }

    #[test]
    fn every_ticker_failing_fails_the_section() {
        let provider = StaticProvider::new()
            .unreachable("^GSPC")
            .unreachable("^DJI")
            .unreachable("^IXIC");
        let section = run(&provider);
        assert_eq!(section.error().unwrap().code, Some(ErrorCode::UpstreamConnection));
    }

    #[test]
    fn canonical_links_ignore_tracking_and_fragments() {
        assert_eq!(
            canonical_link("https://Example.com/a/?utm_medium=rss&id=3#top"),
            "https://example.com/a?id=3"
        );
        assert_eq!(canonical_link("not a url"), "not a url");
    }
}
