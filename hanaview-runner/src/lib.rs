//! HanaView Runner — orchestration, commentary and report persistence.
//!
//! This crate builds on `hanaview-core` to provide:
//! - Pipeline configuration loaded from TOML
//! - The `fetch` phase: every source fetcher into the raw snapshot
//! - The `generate` phase: commentary enrichment, date stamping, dated and
//!   latest reports
//! - Text-generation client, prompt builders and response validation
//! - Atomic artifact writes and dated-report retention

pub mod commentary;
pub mod config;
pub mod pipeline;
pub mod store;

pub use commentary::{
    generator_from_env, CommentaryError, OpenAiClient, TextGenerator, UnconfiguredGenerator,
};
pub use config::{CommentaryConfig, ConfigError, PacingConfig, PipelineConfig, TokenBudgets};
pub use pipeline::{GeneratedReport, Pipeline, PipelineError};
pub use store::{ReportStore, StoreError};
