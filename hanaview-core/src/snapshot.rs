//! The aggregated market document.
//!
//! Every panel the dashboard renders is a named field here, so a section can
//! never be absent from the output: a fetch that failed holds an
//! `ErrorPayload` in place of its payload. `Section<T>` serializes untagged,
//! which keeps the on-disk shapes flat (`{"error": ...}` or the bare payload).

use crate::sanitize::nan_if_null;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed taxonomy of fetch and generation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E001")]
    MissingApiKey,
    #[serde(rename = "E002")]
    DataFileUnreadable,
    #[serde(rename = "E003")]
    UpstreamConnection,
    #[serde(rename = "E004")]
    FearGreedFetch,
    #[serde(rename = "E005")]
    TextGeneration,
    #[serde(rename = "E006")]
    HeatmapFetch,
    #[serde(rename = "E007")]
    CalendarScrape,
}

impl ErrorCode {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::MissingApiKey => "E001",
            ErrorCode::DataFileUnreadable => "E002",
            ErrorCode::UpstreamConnection => "E003",
            ErrorCode::FearGreedFetch => "E004",
            ErrorCode::TextGeneration => "E005",
            ErrorCode::HeatmapFetch => "E006",
            ErrorCode::CalendarScrape => "E007",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::MissingApiKey => "Text-generation API key is not configured.",
            ErrorCode::DataFileUnreadable => "Data file could not be read.",
            ErrorCode::UpstreamConnection => "Failed to connect to an external API.",
            ErrorCode::FearGreedFetch => "Failed to fetch Fear & Greed Index data.",
            ErrorCode::TextGeneration => "AI content generation failed.",
            ErrorCode::HeatmapFetch => "Failed to fetch heatmap data.",
            ErrorCode::CalendarScrape => "Failed to fetch calendar data.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

/// Substituted for any section whose fetch or generation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Self {
            error: format!("{code} {detail}"),
            code: Some(code),
        }
    }

    /// Placeholder for a section no fetcher has written yet.
    pub fn pending() -> Self {
        Self {
            error: "not fetched".to_string(),
            code: None,
        }
    }
}

/// A snapshot section: either its payload or the error that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section<T> {
    Failed(ErrorPayload),
    Ready(T),
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Failed(ErrorPayload::pending())
    }
}

impl<T> Section<T> {
    pub fn failed(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Section::Failed(ErrorPayload::new(code, detail))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(v) => Some(v),
            Section::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorPayload> {
        match self {
            Section::Failed(e) => Some(e),
            Section::Ready(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Section::Ready(_))
    }
}

// ── Market panel ────────────────────────────────────────────────────

/// One OHLC candle. `time` is an RFC 3339 string in UTC+9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcPoint {
    pub time: String,
    #[serde(deserialize_with = "nan_if_null")]
    pub open: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub high: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub low: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub close: f64,
}

/// VIX / T-note panel: latest value plus a candle series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPanel {
    #[serde(deserialize_with = "nan_if_null")]
    pub current: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub change: f64,
    pub history: Vec<OhlcPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FearGreedCategory {
    #[serde(rename = "Extreme Fear")]
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    #[serde(rename = "Extreme Greed")]
    ExtremeGreed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedReading {
    pub value: Option<f64>,
    pub category: FearGreedCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedPanel {
    pub now: FearGreedReading,
    pub previous_close: FearGreedReading,
    pub prev_week: FearGreedReading,
    pub prev_month: FearGreedReading,
    pub prev_year: FearGreedReading,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPanel {
    pub vix: Section<ChartPanel>,
    pub t_note_future: Section<ChartPanel>,
    pub fear_and_greed: Section<FearGreedPanel>,
    #[serde(default)]
    pub ai_commentary: String,
}

// ── Indicators ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorCategory {
    Economic,
    UsEarnings,
    JpEarnings,
}

/// One calendar row. `datetime` is the UTC+9 display string `MM/DD HH:MM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorEntry {
    pub datetime: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(rename = "type")]
    pub category: IndicatorCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorsPanel {
    pub economic: Section<Vec<IndicatorEntry>>,
    pub us_earnings: Section<Vec<IndicatorEntry>>,
    pub jp_earnings: Section<Vec<IndicatorEntry>>,
    #[serde(default)]
    pub economic_commentary: String,
    #[serde(default)]
    pub earnings_commentary: String,
}

// ── News ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub publisher: String,
    pub link: String,
    pub published: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsTopic {
    pub title: String,
    pub analysis: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsDigest {
    pub summary: String,
    pub topics: Vec<NewsTopic>,
}

// ── Heatmaps ────────────────────────────────────────────────────────

/// Performance look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Horizon {
    OneDay,
    OneWeek,
    OneMonth,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneDay, Horizon::OneWeek, Horizon::OneMonth];

    /// Sessions between the last close and the reference close.
    pub fn lookback(self) -> usize {
        match self {
            Horizon::OneDay => 1,
            Horizon::OneWeek => 5,
            Horizon::OneMonth => 20,
        }
    }

    pub fn min_bars(self) -> usize {
        self.lookback() + 1
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Horizon::OneDay => "1d",
            Horizon::OneWeek => "1w",
            Horizon::OneMonth => "1m",
        }
    }
}

/// One (ticker, horizon) cell. Stocks carry classification and market cap;
/// ETFs carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapEntry {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(deserialize_with = "nan_if_null")]
    pub performance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub items: Vec<HeatmapEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCommentary {
    #[serde(default)]
    pub ai_commentary: String,
}

/// The heatmap universes rendered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapUniverse {
    Nasdaq,
    Sp500,
    SectorEtf,
    Sp500Combined,
}

impl HeatmapUniverse {
    pub const ALL: [HeatmapUniverse; 4] = [
        HeatmapUniverse::Nasdaq,
        HeatmapUniverse::Sp500,
        HeatmapUniverse::SectorEtf,
        HeatmapUniverse::Sp500Combined,
    ];

    pub fn key(self) -> &'static str {
        match self {
            HeatmapUniverse::Nasdaq => "nasdaq_heatmap",
            HeatmapUniverse::Sp500 => "sp500_heatmap",
            HeatmapUniverse::SectorEtf => "sector_etf_heatmap",
            HeatmapUniverse::Sp500Combined => "sp500_combined_heatmap",
        }
    }
}

/// Heatmap sections, flattened into the snapshot root as
/// `<universe>_heatmap_<horizon>` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPanels {
    pub nasdaq_heatmap_1d: Section<Heatmap>,
    pub nasdaq_heatmap_1w: Section<Heatmap>,
    pub nasdaq_heatmap_1m: Section<Heatmap>,
    pub sp500_heatmap_1d: Section<Heatmap>,
    pub sp500_heatmap_1w: Section<Heatmap>,
    pub sp500_heatmap_1m: Section<Heatmap>,
    pub sector_etf_heatmap_1d: Section<Heatmap>,
    pub sector_etf_heatmap_1w: Section<Heatmap>,
    pub sector_etf_heatmap_1m: Section<Heatmap>,
    pub sp500_combined_heatmap_1d: Section<Heatmap>,
    pub sp500_combined_heatmap_1w: Section<Heatmap>,
    pub sp500_combined_heatmap_1m: Section<Heatmap>,
    #[serde(default)]
    pub nasdaq_heatmap: HeatmapCommentary,
    #[serde(default)]
    pub sp500_heatmap: HeatmapCommentary,
}

impl HeatmapPanels {
    pub fn get(&self, universe: HeatmapUniverse, horizon: Horizon) -> &Section<Heatmap> {
        use HeatmapUniverse::*;
        use Horizon::*;
        match (universe, horizon) {
            (Nasdaq, OneDay) => &self.nasdaq_heatmap_1d,
            (Nasdaq, OneWeek) => &self.nasdaq_heatmap_1w,
            (Nasdaq, OneMonth) => &self.nasdaq_heatmap_1m,
            (Sp500, OneDay) => &self.sp500_heatmap_1d,
            (Sp500, OneWeek) => &self.sp500_heatmap_1w,
            (Sp500, OneMonth) => &self.sp500_heatmap_1m,
            (SectorEtf, OneDay) => &self.sector_etf_heatmap_1d,
            (SectorEtf, OneWeek) => &self.sector_etf_heatmap_1w,
            (SectorEtf, OneMonth) => &self.sector_etf_heatmap_1m,
            (Sp500Combined, OneDay) => &self.sp500_combined_heatmap_1d,
            (Sp500Combined, OneWeek) => &self.sp500_combined_heatmap_1w,
            (Sp500Combined, OneMonth) => &self.sp500_combined_heatmap_1m,
        }
    }

    pub fn set(&mut self, universe: HeatmapUniverse, horizon: Horizon, section: Section<Heatmap>) {
        use HeatmapUniverse::*;
        use Horizon::*;
        let slot = match (universe, horizon) {
            (Nasdaq, OneDay) => &mut self.nasdaq_heatmap_1d,
            (Nasdaq, OneWeek) => &mut self.nasdaq_heatmap_1w,
            (Nasdaq, OneMonth) => &mut self.nasdaq_heatmap_1m,
            (Sp500, OneDay) => &mut self.sp500_heatmap_1d,
            (Sp500, OneWeek) => &mut self.sp500_heatmap_1w,
            (Sp500, OneMonth) => &mut self.sp500_heatmap_1m,
            (SectorEtf, OneDay) => &mut self.sector_etf_heatmap_1d,
            (SectorEtf, OneWeek) => &mut self.sector_etf_heatmap_1w,
            (SectorEtf, OneMonth) => &mut self.sector_etf_heatmap_1m,
            (Sp500Combined, OneDay) => &mut self.sp500_combined_heatmap_1d,
            (Sp500Combined, OneWeek) => &mut self.sp500_combined_heatmap_1w,
            (Sp500Combined, OneMonth) => &mut self.sp500_combined_heatmap_1m,
        };
        *slot = section;
    }

    /// Replace all three horizons of a universe with the same error.
    pub fn fail_universe(&mut self, universe: HeatmapUniverse, error: &ErrorPayload) {
        for horizon in Horizon::ALL {
            self.set(universe, horizon, Section::Failed(error.clone()));
        }
    }
}

// ── World ───────────────────────────────────────────────────────────

/// A successfully priced world instrument, formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldQuote {
    pub name: String,
    pub ticker: String,
    pub country_code: String,
    #[serde(rename = "volatilityIndex")]
    pub description: String,
    #[serde(rename = "currentValue")]
    pub current_value: String,
    #[serde(rename = "changeValue")]
    pub change_value: String,
    pub percentage: String,
    #[serde(rename = "isPositive")]
    pub is_positive: bool,
    #[serde(rename = "chartData")]
    pub chart_data: String,
    #[serde(rename = "maxValue")]
    pub max_value: String,
    #[serde(rename = "minValue")]
    pub min_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldFailure {
    pub name: String,
    pub ticker: String,
    pub country_code: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldEntry {
    Failed(WorldFailure),
    Quote(WorldQuote),
}

/// Category name to the instruments priced in that category. Serializes as a
/// JSON object whose keys keep catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldIndices(Vec<(String, Vec<WorldEntry>)>);

impl WorldIndices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a category's entries, keeping its position if already present.
    pub fn insert(&mut self, category: String, entries: Vec<WorldEntry>) {
        match self.0.iter_mut().find(|(name, _)| *name == category) {
            Some((_, slot)) => *slot = entries,
            None => self.0.push((category, entries)),
        }
    }

    /// Entries of `category`, appending an empty category if missing.
    pub fn category_mut(&mut self, category: &str) -> &mut Vec<WorldEntry> {
        let at = match self.0.iter().position(|(name, _)| name == category) {
            Some(at) => at,
            None => {
                self.0.push((category.to_string(), Vec::new()));
                self.0.len() - 1
            }
        };
        &mut self.0[at].1
    }

    pub fn get(&self, category: &str) -> Option<&[WorldEntry]> {
        self.0
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for WorldIndices {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, entries)| (name, entries)))
    }
}

impl<'de> Deserialize<'de> for WorldIndices {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CategoriesVisitor;

        impl<'de> serde::de::Visitor<'de> for CategoriesVisitor {
            type Value = WorldIndices;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category name to instruments")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut out = WorldIndices::new();
                while let Some((name, entries)) = map.next_entry::<String, Vec<WorldEntry>>()? {
                    out.insert(name, entries);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(CategoriesVisitor)
    }
}

// ── Column ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnArticle {
    pub title: String,
    pub date: String,
    pub content: String,
}

/// Weekly long-form commentary; `weekly_report` is absent on other days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnPanel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_report: Option<Section<ColumnArticle>>,
}

// ── Root documents ──────────────────────────────────────────────────

/// The raw, unenriched aggregate produced by the fetch phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market: MarketPanel,
    pub indicators: IndicatorsPanel,
    pub news_raw: Section<Vec<NewsArticle>>,
    #[serde(default)]
    pub news: NewsDigest,
    #[serde(flatten)]
    pub heatmaps: HeatmapPanels,
    pub world: Section<WorldIndices>,
    #[serde(default)]
    pub column: ColumnPanel,
}

/// A snapshot after commentary enrichment and date stamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Calendar day in UTC+9, `YYYY-MM-DD`.
    pub date: String,
    /// RFC 3339 timestamp in UTC+9.
    pub last_updated: String,
    #[serde(flatten)]
    pub snapshot: MarketSnapshot,
}
