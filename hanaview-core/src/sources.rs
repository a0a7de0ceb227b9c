//! Upstream endpoints, symbol lists and the world-instrument catalog.
//!
//! Everything here is plain data with serde defaults, so the runner's TOML
//! config can override any single field and leave the rest alone.

use serde::{Deserialize, Serialize};

pub const GOLD_JPY_TICKER: &str = "GOLD-JPY";
pub const GOLD_USD_TICKER: &str = "GC=F";
pub const USD_JPY_TICKER: &str = "JPY=X";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub economic_calendar_url: String,
    pub us_earnings_url: String,
    pub jp_earnings_url: String,
    /// Start date (`YYYY-MM-DD`) is appended to this prefix.
    pub fear_greed_url: String,
    pub sp500_constituents_url: String,
    pub nasdaq100_constituents_url: String,
    pub vix_ticker: String,
    pub t_note_ticker: String,
    pub news_tickers: Vec<String>,
    pub sector_etfs: Vec<String>,
    /// Empty keeps every row.
    pub us_earnings_watchlist: Vec<String>,
    /// Empty keeps every row.
    pub jp_earnings_watchlist: Vec<String>,
    /// Replaces the built-in catalog when set.
    pub world: Option<Vec<WorldCategory>>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            economic_calendar_url:
                "https://mst.monex.co.jp/pc/servlet/ITS/report/EconomyIndexCalendar".into(),
            us_earnings_url: "https://mst.monex.co.jp/mst/servlet/ITS/fi/FIClosingCalendarUSGuest"
                .into(),
            jp_earnings_url: "https://mst.monex.co.jp/mst/servlet/ITS/fi/FIClosingCalendarJPGuest"
                .into(),
            fear_greed_url: "https://production.dataviz.cnn.io/index/fearandgreed/graphdata/".into(),
            sp500_constituents_url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies"
                .into(),
            nasdaq100_constituents_url: "https://en.wikipedia.org/wiki/Nasdaq-100".into(),
            vix_ticker: "^VIX".into(),
            t_note_ticker: "^TNX".into(),
            news_tickers: strings(&["^GSPC", "^DJI", "^IXIC"]),
            sector_etfs: strings(&[
                "XLK", "XLF", "XLV", "XLY", "XLP", "XLE", "XLI", "XLB", "XLU", "XLRE", "XLC",
            ]),
            us_earnings_watchlist: strings(&[
                "AAPL", "MSFT", "NVDA", "GOOGL", "GOOG", "AMZN", "META", "TSLA", "AVGO", "AMD",
                "NFLX", "ORCL", "CRM", "ADBE", "INTC", "QCOM", "JPM", "BAC", "GS", "V", "MA",
                "WMT", "COST", "KO", "PEP", "JNJ", "LLY", "UNH", "XOM", "CVX", "DIS", "NKE",
                "BA", "PLTR", "ARM", "MU", "SMCI",
            ]),
            jp_earnings_watchlist: strings(&[
                "7203", "6758", "9984", "8035", "6861", "9983", "8306", "6501", "6098", "4063",
                "9432", "9433", "8058", "8031", "7974", "6367", "4519", "6857", "6920", "7741",
                "8316", "8766", "6702", "6752", "7267", "4502", "6146", "6723",
            ]),
            world: None,
        }
    }
}

impl SourcesConfig {
    /// The configured catalog, or the built-in one.
    pub fn world_catalog(&self) -> Vec<WorldCategory> {
        self.world.clone().unwrap_or_else(default_world_catalog)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCategory {
    pub name: String,
    pub instruments: Vec<WorldInstrument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInstrument {
    pub name: String,
    pub ticker: String,
    pub country_code: String,
    #[serde(default)]
    pub description: String,
    /// Priced from other instruments instead of fetched.
    #[serde(default)]
    pub derived: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn instrument(name: &str, ticker: &str, country_code: &str, description: &str) -> WorldInstrument {
    WorldInstrument {
        name: name.into(),
        ticker: ticker.into(),
        country_code: country_code.into(),
        description: description.into(),
        derived: false,
    }
}

fn category(name: &str, instruments: Vec<WorldInstrument>) -> WorldCategory {
    WorldCategory {
        name: name.into(),
        instruments,
    }
}

pub fn default_world_catalog() -> Vec<WorldCategory> {
    vec![
        category(
            "日本",
            vec![
                instrument("日経平均", "^N225", "JP", "東証 日経225平均"),
                instrument("日経時間外", "NIY=F", "JP", "Nikkei/Yen Futures"),
            ],
        ),
        category(
            "米国",
            vec![
                instrument("ダウ", "^DJI", "US", "ダウ30"),
                instrument("ナスダック", "^IXIC", "US", "ナスダック総合"),
                instrument("S&P500", "^GSPC", "US", "S&P500"),
                instrument("SOX指数", "^SOX", "US", "フィラデルフィア半導体指数"),
                instrument("VIX", "^VIX", "US", "VIX恐怖指数"),
                instrument("ラッセル2000", "^RUT", "US", "ラッセル2000"),
            ],
        ),
        category("債券", vec![instrument("米国債10年", "^TNX", "US", "10年債利回り")]),
        category(
            "為替",
            vec![
                instrument("ドル円", USD_JPY_TICKER, "FX", "USD/JPY"),
                instrument("ユーロ円", "EURJPY=X", "FX", "EUR/JPY"),
                instrument("ポンド円", "GBPJPY=X", "FX", "GBP/JPY"),
                instrument("豪ドル円", "AUDJPY=X", "FX", "AUD/JPY"),
                instrument("カナダドル円", "CADJPY=X", "FX", "CAD/JPY"),
                instrument("スイスフラン円", "CHFJPY=X", "FX", "CHF/JPY"),
            ],
        ),
        category(
            "コモディティ",
            vec![
                instrument("ゴールド", GOLD_USD_TICKER, "CM", "金先物 (USD)"),
                WorldInstrument {
                    derived: true,
                    ..instrument("ゴールド(円)", GOLD_JPY_TICKER, "CM", "金 (円換算)")
                },
                instrument("WTI原油", "CL=F", "CM", "原油先物"),
                instrument("北海ブレント", "BZ=F", "CM", "ブレント原油先物"),
                instrument("天然ガス", "NG=F", "CM", "天然ガス先物"),
                instrument("銅", "HG=F", "CM", "銅先物"),
                instrument("ビットコイン", "BTC-USD", "CM", "Bitcoin"),
                instrument("イーサリアム", "ETH-USD", "CM", "Ethereum"),
            ],
        ),
        category(
            "北東アジア",
            vec![
                instrument("上海総合", "000001.SS", "CN", "上海総合指数"),
                instrument("CSI300", "000300.SS", "CN", "CSI300指数"),
                instrument("韓国 KOSPI", "^KS11", "KR", "韓国総合株価指数"),
                instrument("香港 ハンセン", "^HSI", "HK", "香港ハンセン指数"),
                instrument("台湾 加権", "^TWII", "TW", "台湾加権指数"),
            ],
        ),
        category(
            "欧州",
            vec![
                instrument("イギリス FTSE", "^FTSE", "GB", "FTSE100指数"),
                instrument("ドイツ DAX", "^GDAXI", "DE", "DAX指数"),
                instrument("フランス CAC40", "^FCHI", "FR", "CAC40指数"),
                instrument("イタリア MIB", "FTSEMIB.MI", "IT", "FTSE MIB指数"),
                instrument("スイス SMI", "^SSMI", "CH", "SMI指数"),
            ],
        ),
        category(
            "ピックアップ",
            vec![
                instrument("FANG+", "^NYFANG", "US", "NYSE FANG+ Index"),
                instrument("全世界株式 オルカン", "ACWI", "US", "MSCI ACWI"),
            ],
        ),
        category(
            "新興アジア",
            vec![
                instrument("インド Nifty", "^NSEI", "IN", "NIFTY 50"),
                instrument("マレーシア KLCI", "^KLSE", "MY", "FTSE Bursa Malaysia KLCI"),
                instrument("タイ SET指数", "^SET.BK", "TH", "SET Index"),
                instrument("ベトナム", "^VNINDEX.VN", "VN", "VN-Index"),
                instrument("シンガポールSTI", "^STI", "SG", "Straits Times Index"),
                instrument("インドネシアJKSE", "^JKSE", "ID", "Jakarta Composite Index"),
            ],
        ),
        category(
            "オセアニア",
            vec![
                instrument("オーストラリアASX", "^AXJO", "AU", "S&P/ASX 200"),
                instrument("ニュージーランド", "^NZ50", "NZ", "S&P/NZX 50"),
            ],
        ),
        category(
            "アメリカ大陸",
            vec![
                instrument("カナダS&Pトロント総合", "^GSPTSE", "CA", "S&P/TSX Composite"),
                instrument("メキシコIPC", "^MXX", "MX", "S&P/BMV IPC"),
                instrument("アルゼンチン メンバル", "^MERV", "AR", "S&P Merval"),
                instrument("ブラジル ボベスパ", "^BVSP", "BR", "IBOVESPA"),
            ],
        ),
        category(
            "中東･アフリカ",
            vec![
                instrument("トルコ Borsa100", "XU100.IS", "TR", "BIST 100"),
                instrument("ドバイ UAE", "DFMGI.AE", "AE", "DFM General Index"),
                instrument("サウジアラビア", "^TASI.SR", "SA", "Tadawul All Share Index"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gold_in_yen_is_the_only_derived_instrument() {
        let derived: Vec<String> = default_world_catalog()
            .into_iter()
            .flat_map(|c| c.instruments)
            .filter(|i| i.derived)
            .map(|i| i.ticker)
            .collect();
        assert_eq!(derived, vec![GOLD_JPY_TICKER.to_string()]);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: SourcesConfig = serde_json::from_str(r#"{"news_tickers": ["^N225"]}"#).unwrap();
        assert_eq!(cfg.news_tickers, vec!["^N225".to_string()]);
        assert_eq!(cfg.vix_ticker, "^VIX");
        assert_eq!(cfg.sector_etfs.len(), 11);
        assert_eq!(cfg.world_catalog().len(), 12);
    }
}
