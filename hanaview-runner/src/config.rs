//! Serializable pipeline configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so an empty
//! file (or no file) is a valid configuration. The text-generation API key is
//! never part of it: it is read from the environment when the generator is
//! built.

use chrono::Weekday;
use hanaview_core::data::HttpSettings;
use hanaview_core::performance::PacingPolicy;
use hanaview_core::sources::SourcesConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "OPENAI_MODEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the raw snapshot and the report files.
    pub data_dir: PathBuf,
    /// Dated reports older than this many days are deleted.
    pub retention_days: i64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub pacing: PacingConfig,
    pub commentary: CommentaryConfig,
    pub sources: SourcesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            retention_days: 7,
            request_timeout_secs: 30,
            user_agent: hanaview_core::data::http::BROWSER_USER_AGENT.to_string(),
            pacing: PacingConfig::default(),
            commentary: CommentaryConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
            ..HttpSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub failure_delay_ms: u64,
    pub instrument_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        let policy = PacingPolicy::default();
        Self {
            batch_size: policy.batch_size,
            batch_delay_ms: policy.batch_delay.as_millis() as u64,
            failure_delay_ms: policy.failure_delay.as_millis() as u64,
            instrument_delay_ms: policy.instrument_delay.as_millis() as u64,
        }
    }
}

impl PacingConfig {
    pub fn policy(&self) -> PacingPolicy {
        PacingPolicy {
            batch_size: self.batch_size.max(1),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            failure_delay: Duration::from_millis(self.failure_delay_ms),
            instrument_delay: Duration::from_millis(self.instrument_delay_ms),
        }
    }
}

/// Token budgets per commentary call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgets {
    pub market: u32,
    pub news: u32,
    pub heatmap: u32,
    pub indicators: u32,
    pub column: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            market: 500,
            news: 1000,
            heatmap: 500,
            indicators: 600,
            column: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentaryConfig {
    /// Overridden by `OPENAI_MODEL` when set.
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub max_tokens: TokenBudgets,
    /// Day (UTC+9) on which the weekly column is written.
    #[serde(with = "weekday_name")]
    pub column_weekday: Weekday,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.7,
            request_timeout_secs: 120,
            max_tokens: TokenBudgets::default(),
            column_weekday: Weekday::Mon,
        }
    }
}

impl CommentaryConfig {
    /// The configured model unless the environment names another one.
    pub fn resolved_model(&self) -> String {
        std::env::var(MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.model.clone())
    }
}

/// `Weekday` as an English day name (`"monday"`, `"Mon"`, ...).
mod weekday_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&day.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let name = String::deserialize(d)?;
        name.parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("unknown weekday: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = PipelineConfig::from_toml("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.commentary.column_weekday, Weekday::Mon);
        assert_eq!(cfg.pacing.policy(), PacingPolicy::default());
    }

    #[test]
    fn partial_sections_override_single_fields() {
        let cfg = PipelineConfig::from_toml(
            r#"
            data_dir = "/var/lib/hanaview"
            retention_days = 14

            [pacing]
            batch_size = 25

            [commentary]
            column_weekday = "friday"

            [commentary.max_tokens]
            column = 4000

            [sources]
            sector_etfs = ["XLK", "XLF"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.retention_days, 14);
        assert_eq!(cfg.pacing.batch_size, 25);
        assert_eq!(cfg.pacing.batch_delay_ms, 2000);
        assert_eq!(cfg.commentary.column_weekday, Weekday::Fri);
        assert_eq!(cfg.commentary.max_tokens.column, 4000);
        assert_eq!(cfg.commentary.max_tokens.market, 500);
        assert_eq!(cfg.sources.sector_etfs, vec!["XLK", "XLF"]);
        assert_eq!(cfg.sources.vix_ticker, "^VIX");
    }

    #[test]
    fn world_catalog_can_be_replaced() {
        let cfg = PipelineConfig::from_toml(
            r#"
            [[sources.world]]
            name = "Japan"
            [[sources.world.instruments]]
            name = "Nikkei"
            ticker = "^N225"
            country_code = "JP"
            "#,
        )
        .unwrap();
        let catalog = cfg.sources.world_catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].instruments[0].ticker, "^N225");
        assert!(!catalog[0].instruments[0].derived);
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        let err = PipelineConfig::from_toml("[commentary]\ncolumn_weekday = \"someday\"");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/hanaview.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hanaview.toml"));
    }
}
