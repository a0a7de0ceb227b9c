//! Calendar table parser.
//!
//! Calendar pages render the date once per day: the first row of a day
//! carries a date cell with a `rowspan` attribute, and the remaining rows of
//! that day omit it, so every later column sits one position to the left.
//! Rows are scanned in document order with a running "current date". A row
//! counts as dated when its first cell has `rowspan` or reads as a date;
//! trailing cells never change the classification.
//!
//! A row is kept when it has a real time of day, falls inside the window from
//! two hours before now to twenty-six hours after now, and (for layouts with
//! an importance column) carries a star. Malformed rows are skipped one by
//! one; they never abort the scan.

use crate::clock::jst;
use crate::data::constituents::{cell_text, selector};
use crate::data::DataError;
use crate::snapshot::{IndicatorCategory, IndicatorEntry};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;
use thiserror::Error;

pub const IMPORTANCE_GLYPH: char = '★';
pub const WINDOW_BEFORE_HOURS: i64 = 2;
pub const WINDOW_AFTER_HOURS: i64 = 26;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar page has no table rows")]
    NoRows,
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Column positions on a row that carries the date cell (column 0).
#[derive(Debug, Clone)]
pub struct CalendarLayout {
    pub time: usize,
    pub name: usize,
    /// Cell holding the country flag image, if any.
    pub flag: Option<usize>,
    pub importance: Option<usize>,
    pub previous: Option<usize>,
    pub forecast: Option<usize>,
    pub ticker: Option<usize>,
    pub category: IndicatorCategory,
}

impl CalendarLayout {
    /// Date | time | country | indicator | importance | previous | forecast | result
    pub fn economic() -> Self {
        Self {
            time: 1,
            name: 3,
            flag: Some(2),
            importance: Some(4),
            previous: Some(5),
            forecast: Some(6),
            ticker: None,
            category: IndicatorCategory::Economic,
        }
    }

    /// Date | time | code | company | fiscal period
    pub fn earnings(category: IndicatorCategory) -> Self {
        Self {
            time: 1,
            name: 3,
            flag: None,
            importance: None,
            previous: None,
            forecast: None,
            ticker: Some(2),
            category,
        }
    }
}

/// Why a row was dropped. Only logged.
#[derive(Debug, PartialEq)]
enum RowSkip {
    NoCurrentDate,
    MissingCell(usize),
    PlaceholderTime,
    BadTime(String),
    NotImportant,
    OutsideWindow,
}

pub fn parse_calendar(
    html: &str,
    layout: &CalendarLayout,
    now: DateTime<Utc>,
) -> Result<Vec<IndicatorEntry>, CalendarError> {
    let doc = Html::parse_document(html);
    let row_sel = selector("table tr")?;
    let td_sel = selector("td")?;
    let img_sel = selector("img")?;

    let mut current_date: Option<NaiveDate> = None;
    let mut rows_seen = 0usize;
    let mut entries = Vec::new();

    for row in doc.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cells.is_empty() {
            continue;
        }
        rows_seen += 1;

        let leading_date = parse_date_cell(&cell_text(cells[0]), now);
        let dated = cells[0].value().attr("rowspan").is_some() || leading_date.is_some();
        if dated {
            current_date = leading_date;
        }
        let shift = usize::from(!dated);

        match parse_row(&cells, shift, current_date, layout, now, &img_sel) {
            Ok(entry) => entries.push(entry),
            Err(RowSkip::PlaceholderTime | RowSkip::NotImportant | RowSkip::OutsideWindow) => {}
            Err(reason) => tracing::debug!(?reason, category = ?layout.category, "skipping calendar row"),
        }
    }

    if rows_seen == 0 {
        return Err(CalendarError::NoRows);
    }
    Ok(entries)
}

fn parse_row(
    cells: &[ElementRef<'_>],
    shift: usize,
    current_date: Option<NaiveDate>,
    layout: &CalendarLayout,
    now: DateTime<Utc>,
    img_sel: &scraper::Selector,
) -> Result<IndicatorEntry, RowSkip> {
    let date = current_date.ok_or(RowSkip::NoCurrentDate)?;
    let cell = |declared: usize| {
        declared
            .checked_sub(shift)
            .and_then(|i| cells.get(i))
            .copied()
            .ok_or(RowSkip::MissingCell(declared))
    };
    let text = |declared: Option<usize>| -> Result<Option<String>, RowSkip> {
        match declared {
            Some(i) => Ok(Some(cell_text(cell(i)?)).filter(|t| !t.is_empty())),
            None => Ok(None),
        }
    };

    let time_text = cell_text(cell(layout.time)?);
    let timestamp = combine(date, &time_text)?;
    let window_start = now - Duration::hours(WINDOW_BEFORE_HOURS);
    let window_end = now + Duration::hours(WINDOW_AFTER_HOURS);
    if timestamp < window_start || timestamp > window_end {
        return Err(RowSkip::OutsideWindow);
    }

    let importance = text(layout.importance)?;
    if layout.importance.is_some()
        && !importance.as_deref().is_some_and(|s| s.contains(IMPORTANCE_GLYPH))
    {
        return Err(RowSkip::NotImportant);
    }

    let label = cell_text(cell(layout.name)?);
    let company = layout.ticker.map(|_| label.clone());
    let flag_cell = match layout.flag {
        Some(i) => cell(i)?,
        None => cell(layout.name)?,
    };
    let emoji = flag_cell
        .select(img_sel)
        .filter_map(|img| img.value().attr("src"))
        .find_map(country_code_from_src)
        .and_then(|code| flag_emoji(&code));
    let name = match emoji {
        Some(e) => format!("{e} {label}"),
        None => label,
    };

    Ok(IndicatorEntry {
        datetime: timestamp.format("%m/%d %H:%M").to_string(),
        name,
        importance,
        previous: text(layout.previous)?,
        forecast: text(layout.forecast)?,
        ticker: text(layout.ticker)?,
        company,
        category: layout.category,
    })
}

/// Combine a day with an `HH:MM` cell into a UTC+9 timestamp. Hours past 23
/// (`25:30`) roll into the following day.
fn combine(date: NaiveDate, time_text: &str) -> Result<DateTime<FixedOffset>, RowSkip> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIME_RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})").expect("valid regex"));

    if time_text.is_empty() || time_text.chars().all(|c| matches!(c, '-' | '－' | '―' | '—')) {
        return Err(RowSkip::PlaceholderTime);
    }
    let caps = re
        .captures(time_text)
        .ok_or_else(|| RowSkip::BadTime(time_text.to_string()))?;
    let hours: i64 = caps[1].parse().map_err(|_| RowSkip::BadTime(time_text.to_string()))?;
    let minutes: i64 = caps[2].parse().map_err(|_| RowSkip::BadTime(time_text.to_string()))?;
    if minutes >= 60 || hours >= 48 {
        return Err(RowSkip::BadTime(time_text.to_string()));
    }

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| RowSkip::BadTime(time_text.to_string()))?;
    let local = jst()
        .from_local_datetime(&midnight)
        .single()
        .ok_or_else(|| RowSkip::BadTime(time_text.to_string()))?;
    Ok(local + Duration::hours(hours) + Duration::minutes(minutes))
}

/// Parse `MM/DD` (optionally `YYYY/MM/DD`, trailing weekday ignored). A date
/// without a year takes the year that puts it closest to `now`, so a late
/// December page read in early January still lands in the right year.
pub fn parse_date_cell(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE
        .get_or_init(|| Regex::new(r"(?:(\d{4})/)?(\d{1,2})/(\d{1,2})").expect("valid regex"));
    let caps = re.captures(text)?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    if let Some(year) = caps.get(1) {
        return NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day);
    }
    let today = now.with_timezone(&jst()).date_naive();
    [today.year() - 1, today.year(), today.year() + 1]
        .into_iter()
        .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
        .min_by_key(|d| (*d - today).num_days().abs())
}

/// Two-letter country code from a flag image path such as `/img/flag/us.gif`.
pub fn country_code_from_src(src: &str) -> Option<String> {
    static FLAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = FLAG_RE.get_or_init(|| {
        Regex::new(r"(?i)flag[s]?[/_-]?([a-z]{2})\.(?:gif|png|jpe?g|svg)").expect("valid regex")
    });
    re.captures(src).map(|c| c[1].to_ascii_lowercase())
}

/// Display emoji for a country code. Unmapped codes have none.
pub fn flag_emoji(code: &str) -> Option<&'static str> {
    Some(match code {
        "us" => "🇺🇸",
        "jp" => "🇯🇵",
        "eu" => "🇪🇺",
        "gb" | "uk" => "🇬🇧",
        "de" => "🇩🇪",
        "fr" => "🇫🇷",
        "it" => "🇮🇹",
        "cn" => "🇨🇳",
        "hk" => "🇭🇰",
        "kr" => "🇰🇷",
        "in" => "🇮🇳",
        "au" => "🇦🇺",
        "nz" => "🇳🇿",
        "ca" => "🇨🇦",
        "ch" => "🇨🇭",
        "br" => "🇧🇷",
        "mx" => "🇲🇽",
        "za" => "🇿🇦",
        "tr" => "🇹🇷",
        "sg" => "🇸🇬",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-01-06 07:00 UTC+9
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 22, 0, 0).unwrap()
    }

    fn economic_row(date: Option<(&str, usize)>, time: &str, flag: &str, name: &str, stars: &str) -> String {
        let date_cell = match date {
            Some((d, span)) => format!(r#"<td rowspan="{span}">{d}</td>"#),
            None => String::new(),
        };
        format!(
            r#"<tr>{date_cell}<td>{time}</td><td><img src="/img/flag/{flag}.gif"></td><td>{name}</td><td>{stars}</td><td>1.0%</td><td>1.1%</td><td></td></tr>"#
        )
    }

    fn table(rows: &[String]) -> String {
        format!(
            "<html><body><table><tr><th>日付</th><th>時刻</th><th>国</th><th>指標</th><th>重要度</th><th>前回</th><th>予想</th><th>結果</th></tr>{}</table></body></html>",
            rows.concat()
        )
    }

    #[test]
    fn row_spanned_dates_carry_over_to_following_rows() {
        let html = table(&[
            economic_row(Some(("01/06(月)", 3)), "08:30", "jp", "Tokyo CPI", "★★"),
            economic_row(None, "21:30", "us", "Payrolls", "★★★"),
            economic_row(None, "23:00", "us", "ISM", "★★"),
            economic_row(Some(("01/07(火)", 1)), "08:50", "jp", "GDP", "★★"),
        ]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        let when: Vec<&str> = entries.iter().map(|e| e.datetime.as_str()).collect();
        assert_eq!(when, vec!["01/06 08:30", "01/06 21:30", "01/06 23:00", "01/07 08:50"]);
        assert_eq!(entries[1].name, "🇺🇸 Payrolls");
        assert_eq!(entries[1].previous.as_deref(), Some("1.0%"));
        assert_eq!(entries[1].forecast.as_deref(), Some("1.1%"));
        assert_eq!(entries[1].importance.as_deref(), Some("★★★"));
    }

    #[test]
    fn placeholder_time_and_missing_star_are_excluded() {
        let html = table(&[
            economic_row(Some(("01/06", 3)), "-", "us", "Speech", "★★"),
            economic_row(None, "10:00", "us", "Minor", "☆"),
            economic_row(None, "11:00", "us", "Major", "★"),
        ]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "🇺🇸 Major");
    }

    #[test]
    fn window_runs_from_two_hours_before_to_twenty_six_after() {
        let html = table(&[
            economic_row(Some(("01/06", 3)), "04:59", "jp", "TooEarly", "★"),
            economic_row(None, "05:00", "jp", "JustIn", "★"),
            economic_row(None, "23:59", "jp", "Tonight", "★"),
            economic_row(Some(("01/07", 2)), "09:00", "jp", "Edge", "★"),
            economic_row(None, "09:01", "jp", "TooLate", "★"),
        ]);
        let names: Vec<String> = parse_calendar(&html, &CalendarLayout::economic(), now())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["🇯🇵 JustIn", "🇯🇵 Tonight", "🇯🇵 Edge"]);
    }

    #[test]
    fn malformed_rows_are_skipped_without_aborting() {
        let html = table(&[
            economic_row(Some(("??", 2)), "09:00", "jp", "NoDate", "★"),
            economic_row(None, "09:30", "jp", "AlsoNoDate", "★"),
            "<tr><td rowspan=\"2\">01/06</td><td>10:00</td></tr>".to_string(),
            economic_row(None, "nonsense", "jp", "BadTime", "★"),
            economic_row(Some(("01/06", 1)), "12:00", "jp", "Good", "★"),
        ]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "🇯🇵 Good");
    }

    #[test]
    fn extra_trailing_column_keeps_the_day_together() {
        let with_extra = |row: String| row.replace("</tr>", "<td>memo</td></tr>");
        let html = table(&[
            with_extra(economic_row(Some(("01/06", 3)), "09:00", "us", "A", "★")),
            with_extra(economic_row(None, "10:00", "us", "B", "★")),
            with_extra(economic_row(None, "11:00", "us", "C", "★")),
        ]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["🇺🇸 A", "🇺🇸 B", "🇺🇸 C"]);
        assert_eq!(entries[2].previous.as_deref(), Some("1.0%"));
    }

    #[test]
    fn date_cell_without_rowspan_still_starts_a_day() {
        let html = table(&[
            economic_row(Some(("01/06", 1)), "12:00", "jp", "First", "★"),
            "<tr><td>01/07</td><td>08:50</td><td><img src=\"/img/flag/jp.gif\"></td><td>GDP</td><td>★</td><td></td><td></td><td></td></tr>".to_string(),
        ]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        assert_eq!(entries[1].datetime, "01/07 08:50");
        assert_eq!(entries[1].name, "🇯🇵 GDP");
    }

    #[test]
    fn unmapped_flags_yield_plain_names() {
        let html = table(&[economic_row(Some(("01/06", 1)), "12:00", "zz", "Somewhere", "★")]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        assert_eq!(entries[0].name, "Somewhere");
    }

    #[test]
    fn after_midnight_hours_roll_into_next_day() {
        let html = table(&[economic_row(Some(("01/06", 1)), "24:30", "us", "Late", "★")]);
        let entries = parse_calendar(&html, &CalendarLayout::economic(), now()).unwrap();
        assert_eq!(entries[0].datetime, "01/07 00:30");
    }

    #[test]
    fn earnings_layout_reads_ticker_and_company() {
        let html = r#"<table>
            <tr><td rowspan="2">01/06</td><td>06:00</td><td>AAPL</td><td>Apple</td><td>Q1</td></tr>
            <tr><td>08:00</td><td>MSFT</td><td>Microsoft</td><td>Q2</td></tr></table>"#;
        let layout = CalendarLayout::earnings(IndicatorCategory::UsEarnings);
        let entries = parse_calendar(html, &layout, now()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].ticker.as_deref(), Some("MSFT"));
        assert_eq!(entries[1].name, "Microsoft");
        assert_eq!(entries[1].company.as_deref(), Some("Microsoft"));
        assert_eq!(entries[1].category, IndicatorCategory::UsEarnings);
    }

    #[test]
    fn year_is_inferred_across_new_year() {
        let jan_2 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            parse_date_cell("12/31(火)", jan_2),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert_eq!(parse_date_cell("2026/03/01", jan_2), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date_cell("--", jan_2), None);
    }

    #[test]
    fn country_codes_come_from_flag_paths() {
        assert_eq!(country_code_from_src("/common/img/flag/US.gif").as_deref(), Some("us"));
        assert_eq!(country_code_from_src("flag_eu.png").as_deref(), Some("eu"));
        assert_eq!(country_code_from_src("/img/icon.gif"), None);
        assert_eq!(flag_emoji("eu"), Some("🇪🇺"));
        assert_eq!(flag_emoji("xx"), None);
    }

    #[test]
    fn page_without_rows_is_an_error() {
        let err = parse_calendar("<p>maintenance</p>", &CalendarLayout::economic(), now());
        assert!(matches!(err, Err(CalendarError::NoRows)));
    }
}
