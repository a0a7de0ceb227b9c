//! Index membership lists scraped from generic HTML tables.
//!
//! The constituent pages carry several tables; the membership table is the
//! first one whose header row names a symbol column.

use super::provider::DataError;
use scraper::{ElementRef, Html, Selector};

const SYMBOL_HEADERS: &[&str] = &["Symbol", "Ticker"];

/// Extract ticker symbols from the first table with a symbol/ticker column.
///
/// Symbols are normalized to the quote provider's convention (`BRK.B` becomes
/// `BRK-B`) and de-duplicated in document order.
pub fn extract_symbols(html: &str) -> Result<Vec<String>, DataError> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    for table in doc.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(header) = rows.next() else { continue };
        let Some(col) = header
            .select(&cell_sel)
            .position(|c| SYMBOL_HEADERS.contains(&cell_text(c).as_str()))
        else {
            continue;
        };

        let mut symbols: Vec<String> = Vec::new();
        for row in rows {
            let Some(cell) = row.select(&cell_sel).nth(col) else { continue };
            let symbol = cell_text(cell).replace('.', "-");
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if !symbols.is_empty() {
            return Ok(symbols);
        }
    }

    Err(DataError::ResponseFormatChanged(
        "no table with a Symbol/Ticker column".into(),
    ))
}

pub(crate) fn selector(css: &str) -> Result<Selector, DataError> {
    Selector::parse(css).map_err(|e| DataError::Other(format!("bad selector {css}: {e}")))
}

pub(crate) fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
