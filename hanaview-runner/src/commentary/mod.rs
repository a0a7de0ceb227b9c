//! Commentary generation.
//!
//! Each step reads aggregated snapshot data, asks the text generator for a
//! JSON object, validates its shape and writes one commentary field. A step
//! never fails: any error is logged and the field it owns gets a fixed
//! degraded value. `COMMENTARY_SEQUENCE` is the order the orchestrator runs
//! them in.

pub mod openai;
pub mod prompts;

pub use openai::{generator_from_env, OpenAiClient};

use crate::config::TokenBudgets;
use chrono::{DateTime, Datelike, FixedOffset, Weekday};
use hanaview_core::fetchers::news::source_icon_url;
use hanaview_core::snapshot::{
    ColumnArticle, ErrorCode, ErrorPayload, HeatmapUniverse, Horizon, MarketSnapshot, NewsDigest,
    NewsTopic, Section,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const COMMENTARY_APOLOGY: &str = "AI解説の生成に失敗しました。";
pub const NEWS_APOLOGY: &str = "ニュースの要約の生成に失敗しました。";
pub const NO_NEWS: &str = "直近24時間の対象ニュースはありません。";
pub const HEATMAP_UNAVAILABLE: &str = "ヒートマップデータを取得できなかったため、解説を生成できませんでした。";
pub const NO_ECONOMIC_EVENTS: &str = "発表予定の主要な経済指標はありません。";
pub const NO_EARNINGS: &str = "発表予定の注目決算はありません。";
pub const CALENDAR_UNAVAILABLE: &str = "カレンダーデータを取得できなかったため、解説を生成できませんでした。";

#[derive(Debug, Error)]
pub enum CommentaryError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty response")]
    EmptyResponse,
    #[error("response is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

impl CommentaryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CommentaryError::MissingApiKey => ErrorCode::MissingApiKey,
            _ => ErrorCode::TextGeneration,
        }
    }
}

/// A text-generation backend that answers with a JSON object.
pub trait TextGenerator {
    fn complete_json(&self, prompt: &str, max_tokens: u32) -> Result<Value, CommentaryError>;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGenerator;

impl TextGenerator for UnconfiguredGenerator {
    fn complete_json(&self, _prompt: &str, _max_tokens: u32) -> Result<Value, CommentaryError> {
        Err(CommentaryError::MissingApiKey)
    }
}

// ── Response validation ─────────────────────────────────────────────

/// `{"response": "<non-empty text>"}`
pub fn expect_response(value: Value) -> Result<String, CommentaryError> {
    match value.get("response").and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(CommentaryError::UnexpectedShape(
            "expected a non-empty \"response\" string".to_string(),
        )),
    }
}

#[derive(Deserialize)]
struct DigestShape {
    summary: String,
    topics: Vec<TopicShape>,
}

#[derive(Deserialize)]
struct TopicShape {
    title: String,
    analysis: String,
    #[serde(default)]
    url: String,
}

/// `{"summary": "...", "topics": [{"title", "analysis", "url"}]}`. Topic
/// icons are derived from each topic's URL.
pub fn expect_digest(value: Value) -> Result<NewsDigest, CommentaryError> {
    let shape: DigestShape = serde_json::from_value(value)
        .map_err(|e| CommentaryError::UnexpectedShape(e.to_string()))?;
    if shape.summary.trim().is_empty() {
        return Err(CommentaryError::UnexpectedShape("empty summary".to_string()));
    }
    let topics = shape
        .topics
        .into_iter()
        .map(|t| NewsTopic {
            source_icon_url: source_icon_url(&t.url),
            title: t.title,
            analysis: t.analysis,
            url: t.url,
        })
        .collect();
    Ok(NewsDigest {
        summary: shape.summary.trim().to_string(),
        topics,
    })
}

#[derive(Deserialize)]
struct ColumnShape {
    title: String,
    content: String,
}

/// `{"title": "...", "content": "..."}`, dated by the caller.
pub fn expect_column(value: Value, date: &str) -> Result<ColumnArticle, CommentaryError> {
    let shape: ColumnShape = serde_json::from_value(value)
        .map_err(|e| CommentaryError::UnexpectedShape(e.to_string()))?;
    if shape.content.trim().is_empty() {
        return Err(CommentaryError::UnexpectedShape("empty column".to_string()));
    }
    Ok(ColumnArticle {
        title: shape.title,
        date: date.to_string(),
        content: shape.content,
    })
}

// ── Steps ───────────────────────────────────────────────────────────

/// What a commentary step may use besides the snapshot it writes to.
pub struct CommentaryContext<'a> {
    pub generator: &'a dyn TextGenerator,
    pub budgets: &'a TokenBudgets,
    pub column_weekday: Weekday,
    /// Report instant in UTC+9.
    pub now: DateTime<FixedOffset>,
}

impl CommentaryContext<'_> {
    fn generate<T>(
        &self,
        field: &'static str,
        prompt: &str,
        max_tokens: u32,
        parse: impl FnOnce(Value) -> Result<T, CommentaryError>,
    ) -> Result<T, CommentaryError> {
        let result = self
            .generator
            .complete_json(prompt, max_tokens)
            .and_then(parse);
        match &result {
            Ok(_) => tracing::info!(field, "commentary generated"),
            Err(e) => tracing::warn!(field, code = e.code().code(), error = %e, "commentary degraded"),
        }
        result
    }

    fn text_or_apology(&self, field: &'static str, prompt: &str, max_tokens: u32) -> String {
        self.generate(field, prompt, max_tokens, expect_response)
            .unwrap_or_else(|_| COMMENTARY_APOLOGY.to_string())
    }
}

/// A commentary step plus the degraded value its fields take if the step
/// itself blows up.
pub struct CommentaryStep {
    pub name: &'static str,
    pub run: fn(&CommentaryContext<'_>, &mut MarketSnapshot),
    pub degrade: fn(&mut MarketSnapshot, &ErrorPayload),
}

pub const COMMENTARY_SEQUENCE: &[CommentaryStep] = &[
    CommentaryStep {
        name: "market",
        run: market_commentary,
        degrade: |s, _| s.market.ai_commentary = COMMENTARY_APOLOGY.to_string(),
    },
    CommentaryStep {
        name: "news",
        run: news_digest,
        degrade: |s, _| s.news = news_apology(),
    },
    CommentaryStep {
        name: "heatmap",
        run: heatmap_commentary,
        degrade: |s, _| {
            s.heatmaps.nasdaq_heatmap.ai_commentary = COMMENTARY_APOLOGY.to_string();
            s.heatmaps.sp500_heatmap.ai_commentary = COMMENTARY_APOLOGY.to_string();
        },
    },
    CommentaryStep {
        name: "indicators",
        run: indicator_commentary,
        degrade: |s, _| {
            s.indicators.economic_commentary = COMMENTARY_APOLOGY.to_string();
            s.indicators.earnings_commentary = COMMENTARY_APOLOGY.to_string();
        },
    },
    CommentaryStep {
        name: "column",
        run: weekly_column,
        degrade: |s, e| s.column.weekly_report = Some(Section::Failed(e.clone())),
    },
];

fn news_apology() -> NewsDigest {
    NewsDigest {
        summary: NEWS_APOLOGY.to_string(),
        topics: Vec::new(),
    }
}

pub fn market_commentary(ctx: &CommentaryContext<'_>, snapshot: &mut MarketSnapshot) {
    let prompt = prompts::market(snapshot);
    snapshot.market.ai_commentary =
        ctx.text_or_apology("market.ai_commentary", &prompt, ctx.budgets.market);
}

pub fn news_digest(ctx: &CommentaryContext<'_>, snapshot: &mut MarketSnapshot) {
    let articles = match snapshot.news_raw.ready() {
        Some(articles) if !articles.is_empty() => articles,
        Some(_) => {
            snapshot.news = NewsDigest {
                summary: NO_NEWS.to_string(),
                topics: Vec::new(),
            };
            return;
        }
        None => {
            tracing::warn!(field = "news", "no raw news; digest degraded");
            snapshot.news = news_apology();
            return;
        }
    };
    let prompt = prompts::news(articles);
    snapshot.news = ctx
        .generate("news", &prompt, ctx.budgets.news, expect_digest)
        .unwrap_or_else(|_| news_apology());
}

pub fn heatmap_commentary(ctx: &CommentaryContext<'_>, snapshot: &mut MarketSnapshot) {
    for (universe, label, field) in [
        (HeatmapUniverse::Nasdaq, "Nasdaq 100", "nasdaq_heatmap.ai_commentary"),
        (HeatmapUniverse::Sp500, "S&P 500", "sp500_heatmap.ai_commentary"),
    ] {
        let heatmaps = &snapshot.heatmaps;
        let text = match heatmaps.get(universe, Horizon::OneDay).ready() {
            Some(day) => {
                let prompt = prompts::heatmap(
                    label,
                    day,
                    heatmaps.get(universe, Horizon::OneWeek).ready(),
                    heatmaps.get(universe, Horizon::OneMonth).ready(),
                );
                ctx.text_or_apology(field, &prompt, ctx.budgets.heatmap)
            }
            None => HEATMAP_UNAVAILABLE.to_string(),
        };
        match universe {
            HeatmapUniverse::Nasdaq => snapshot.heatmaps.nasdaq_heatmap.ai_commentary = text,
            _ => snapshot.heatmaps.sp500_heatmap.ai_commentary = text,
        }
    }
}

pub fn indicator_commentary(ctx: &CommentaryContext<'_>, snapshot: &mut MarketSnapshot) {
    let indicators = &snapshot.indicators;
    let economic = match indicators.economic.ready() {
        Some(entries) if entries.is_empty() => NO_ECONOMIC_EVENTS.to_string(),
        Some(entries) => ctx.text_or_apology(
            "indicators.economic_commentary",
            &prompts::economic(entries),
            ctx.budgets.indicators,
        ),
        None => CALENDAR_UNAVAILABLE.to_string(),
    };

    let earnings = match (indicators.us_earnings.ready(), indicators.jp_earnings.ready()) {
        (None, None) => CALENDAR_UNAVAILABLE.to_string(),
        (us, jp) => {
            let us = us.map(Vec::as_slice).unwrap_or_default();
            let jp = jp.map(Vec::as_slice).unwrap_or_default();
            if us.is_empty() && jp.is_empty() {
                NO_EARNINGS.to_string()
            } else {
                ctx.text_or_apology(
                    "indicators.earnings_commentary",
                    &prompts::earnings(us, jp),
                    ctx.budgets.indicators,
                )
            }
        }
    };

    snapshot.indicators.economic_commentary = economic;
    snapshot.indicators.earnings_commentary = earnings;
}

/// Written only on the configured weekday (UTC+9); absent otherwise.
pub fn weekly_column(ctx: &CommentaryContext<'_>, snapshot: &mut MarketSnapshot) {
    if ctx.now.weekday() != ctx.column_weekday {
        tracing::debug!(weekday = %ctx.now.weekday(), "not a column day");
        snapshot.column.weekly_report = None;
        return;
    }
    let date = ctx.now.format("%Y-%m-%d").to_string();
    let prompt = prompts::weekly_column(snapshot, &date);
    let section = match ctx.generate("column.weekly_report", &prompt, ctx.budgets.column, |v| {
        expect_column(v, &date)
    }) {
        Ok(article) => Section::Ready(article),
        Err(e) => Section::Failed(ErrorPayload::new(e.code(), e)),
    };
    snapshot.column.weekly_report = Some(section);
}
