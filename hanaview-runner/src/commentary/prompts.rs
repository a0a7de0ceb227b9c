//! Prompt builders. Each takes already-aggregated snapshot data, never raw
//! upstream payloads, and asks for a JSON object back.

use hanaview_core::snapshot::{
    ChartPanel, FearGreedCategory, FearGreedPanel, FearGreedReading, Heatmap, HeatmapEntry,
    IndicatorEntry, MarketSnapshot, NewsArticle, Section,
};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Articles beyond this many are left out of the news prompt.
pub const MAX_PROMPT_ARTICLES: usize = 20;
/// Leaders and laggards listed per heatmap prompt.
pub const HEATMAP_EXTREMES: usize = 5;

const UNAVAILABLE: &str = "取得できませんでした";

pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant designed to output JSON. Always answer with a single valid JSON object.";

pub fn market(snapshot: &MarketSnapshot) -> String {
    let market = &snapshot.market;
    let mut p = String::from(
        "以下の市場データに基づいて、日本の個人投資家向けに現在の米国市場の状況を200字程度で簡潔に解説してください。\n\n",
    );
    let _ = writeln!(p, "- VIX指数: {}", chart_line(&market.vix));
    let _ = writeln!(p, "- 米国10年債利回り: {}", chart_line(&market.t_note_future));
    let _ = writeln!(p, "- Fear & Greed Index: {}", fear_greed_line(&market.fear_and_greed));
    p.push_str("\n回答は {\"response\": \"解説文\"} のJSON形式で出力してください。");
    p
}

pub fn news(articles: &[NewsArticle]) -> String {
    let mut p = String::from(
        "以下は過去24時間の米国市場関連ニュースです。市場全体の動向を300字程度で要約し、特に重要なトピックを3つ選んで解説してください。\n\n",
    );
    for (i, a) in articles.iter().take(MAX_PROMPT_ARTICLES).enumerate() {
        let _ = writeln!(
            p,
            "{}. {} ({}, {}) {}",
            i + 1,
            a.title,
            a.publisher,
            a.published.format("%m/%d %H:%M"),
            a.link
        );
    }
    p.push_str(
        "\n回答は {\"summary\": \"要約\", \"topics\": [{\"title\": \"トピック名\", \"analysis\": \"解説\", \"url\": \"元記事のURL\"}]} のJSON形式で出力してください。",
    );
    p
}

pub fn heatmap(index_name: &str, day: &Heatmap, week: Option<&Heatmap>, month: Option<&Heatmap>) -> String {
    let mut p = format!(
        "以下は{index_name}構成銘柄の騰落率データです。相場の特徴とセクターの動向を200字程度で解説してください。\n\n"
    );
    let mut ranked: Vec<&HeatmapEntry> = day.items.iter().filter(|e| e.performance.is_finite()).collect();
    ranked.sort_by(|a, b| b.performance.total_cmp(&a.performance).then_with(|| a.ticker.cmp(&b.ticker)));

    p.push_str("【1日の上昇上位】\n");
    for e in ranked.iter().take(HEATMAP_EXTREMES) {
        let _ = writeln!(p, "- {} ({}): {:+.2}%", e.ticker, e.sector.as_deref().unwrap_or("-"), e.performance);
    }
    p.push_str("【1日の下落上位】\n");
    for e in ranked.iter().rev().take(HEATMAP_EXTREMES) {
        let _ = writeln!(p, "- {} ({}): {:+.2}%", e.ticker, e.sector.as_deref().unwrap_or("-"), e.performance);
    }
    for (label, map) in [("1日", Some(day)), ("1週間", week), ("1ヶ月", month)] {
        let Some(map) = map else { continue };
        let _ = writeln!(p, "【セクター平均 ({label})】");
        for (sector, avg) in sector_averages(map) {
            let _ = writeln!(p, "- {sector}: {avg:+.2}%");
        }
    }
    p.push_str("\n回答は {\"response\": \"解説文\"} のJSON形式で出力してください。");
    p
}

pub fn economic(entries: &[IndicatorEntry]) -> String {
    let mut p = String::from(
        "以下は今後の主要な経済指標の発表予定です。市場への影響が大きい指標に注目し、150字程度で見どころを解説してください。\n\n",
    );
    for e in entries {
        let _ = writeln!(
            p,
            "- {} {} (重要度 {}) 前回: {} 予想: {}",
            e.datetime,
            e.name,
            e.importance.as_deref().unwrap_or("-"),
            e.previous.as_deref().unwrap_or("-"),
            e.forecast.as_deref().unwrap_or("-"),
        );
    }
    p.push_str("\n回答は {\"response\": \"解説文\"} のJSON形式で出力してください。");
    p
}

pub fn earnings(us: &[IndicatorEntry], jp: &[IndicatorEntry]) -> String {
    let mut p = String::from(
        "以下は直近の注目企業の決算発表予定です。注目点を150字程度で解説してください。\n\n",
    );
    for (label, entries) in [("米国", us), ("日本", jp)] {
        let _ = writeln!(p, "【{label}】");
        for e in entries {
            let _ = writeln!(
                p,
                "- {} {} {}",
                e.datetime,
                e.ticker.as_deref().unwrap_or("-"),
                e.company.as_deref().unwrap_or(&e.name)
            );
        }
    }
    p.push_str("\n回答は {\"response\": \"解説文\"} のJSON形式で出力してください。");
    p
}

pub fn weekly_column(snapshot: &MarketSnapshot, date: &str) -> String {
    let mut p = format!(
        "あなたは経験豊富なマーケットアナリストです。{date}時点の以下のデータをもとに、今週の米国市場の展望をまとめた週次コラムを1000字程度で執筆してください。\n\n"
    );
    let market = &snapshot.market;
    let _ = writeln!(p, "- VIX指数: {}", chart_line(&market.vix));
    let _ = writeln!(p, "- 米国10年債利回り: {}", chart_line(&market.t_note_future));
    let _ = writeln!(p, "- Fear & Greed Index: {}", fear_greed_line(&market.fear_and_greed));
    if let Some(week) = snapshot.heatmaps.sector_etf_heatmap_1w.ready() {
        p.push_str("【セクターETF 1週間騰落率】\n");
        for e in &week.items {
            let _ = writeln!(p, "- {}: {:+.2}%", e.ticker, e.performance);
        }
    }
    if let Some(events) = snapshot.indicators.economic.ready() {
        p.push_str("【主要経済指標】\n");
        for e in events {
            let _ = writeln!(p, "- {} {}", e.datetime, e.name);
        }
    }
    p.push_str("\n回答は {\"title\": \"コラムのタイトル\", \"content\": \"本文\"} のJSON形式で出力してください。");
    p
}

/// Mean performance per sector, sector name order. Entries without a sector
/// (ETFs) are grouped under their ticker.
pub fn sector_averages(map: &Heatmap) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for e in map.items.iter().filter(|e| e.performance.is_finite()) {
        let key = e.sector.clone().unwrap_or_else(|| e.ticker.clone());
        let slot = sums.entry(key).or_insert((0.0, 0));
        slot.0 += e.performance;
        slot.1 += 1;
    }
    sums.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

fn chart_line(section: &Section<ChartPanel>) -> String {
    match section.ready() {
        Some(c) => format!("{:.2} (前回比 {:+.2})", c.current, c.change),
        None => UNAVAILABLE.to_string(),
    }
}

fn fear_greed_line(section: &Section<FearGreedPanel>) -> String {
    let Some(fg) = section.ready() else {
        return UNAVAILABLE.to_string();
    };
    format!(
        "現在 {}, 前日 {}, 1週間前 {}, 1ヶ月前 {}, 1年前 {}",
        reading(&fg.now),
        reading(&fg.previous_close),
        reading(&fg.prev_week),
        reading(&fg.prev_month),
        reading(&fg.prev_year)
    )
}

fn reading(r: &FearGreedReading) -> String {
    match r.value {
        Some(v) => format!("{v:.0} ({})", category_label(r.category)),
        None => category_label(r.category).to_string(),
    }
}

fn category_label(category: FearGreedCategory) -> &'static str {
    match category {
        FearGreedCategory::ExtremeFear => "Extreme Fear",
        FearGreedCategory::Fear => "Fear",
        FearGreedCategory::Neutral => "Neutral",
        FearGreedCategory::Greed => "Greed",
        FearGreedCategory::ExtremeGreed => "Extreme Greed",
        FearGreedCategory::Unknown => "Unknown",
    }
}
