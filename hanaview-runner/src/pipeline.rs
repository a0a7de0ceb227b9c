//! Pipeline orchestrator: the `fetch` and `generate` phases.
//!
//! `fetch_all` runs every source fetcher in order into a fresh snapshot and
//! overwrites the raw file. `generate_report` reloads that file, runs the
//! commentary steps, stamps the date and writes the dated and latest reports,
//! then prunes expired ones. Each step runs under `catch_unwind`, so even a
//! panicking step only costs its own sections.

use crate::commentary::{CommentaryContext, TextGenerator, COMMENTARY_SEQUENCE};
use crate::config::PipelineConfig;
use crate::store::{ReportStore, StoreError};
use chrono::SecondsFormat;
use hanaview_core::clock::Clock;
use hanaview_core::data::{MarketDataProvider, PageFetcher};
use hanaview_core::fetchers::{FetchContext, FETCH_SEQUENCE};
use hanaview_core::snapshot::{ErrorCode, ErrorPayload, MarketSnapshot, Report};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Report generation was invoked before any fetch wrote a raw snapshot.
    #[error("{0}")]
    MissingRawSnapshot(StoreError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingRawSnapshot(_) => PipelineError::MissingRawSnapshot(e),
            other => PipelineError::Store(other),
        }
    }
}

/// Outcome of a `generate` run.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub date: String,
    pub report_path: PathBuf,
    pub latest_path: PathBuf,
    pub pruned: Vec<PathBuf>,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    store: ReportStore,
    quotes: &'a dyn MarketDataProvider,
    pages: &'a dyn PageFetcher,
    generator: &'a dyn TextGenerator,
    clock: &'a dyn Clock,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        quotes: &'a dyn MarketDataProvider,
        pages: &'a dyn PageFetcher,
        generator: &'a dyn TextGenerator,
        clock: &'a dyn Clock,
    ) -> Self {
        let store = ReportStore::new(config.data_dir.clone());
        Self {
            config,
            store,
            quotes,
            pages,
            generator,
            clock,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Fetch every section into a fresh snapshot and overwrite the raw file.
    pub fn fetch_all(&self) -> Result<PathBuf, PipelineError> {
        let ctx = FetchContext {
            quotes: self.quotes,
            pages: self.pages,
            sources: &self.config.sources,
            pacing: self.config.pacing.policy(),
            now: self.clock.now(),
        };
        let started = Instant::now();
        let mut snapshot = MarketSnapshot::default();

        for step in FETCH_SEQUENCE {
            tracing::info!(step = step.name, "fetch step started");
            let outcome = catch_unwind(AssertUnwindSafe(|| (step.run)(&ctx, &mut snapshot)));
            if let Err(panic) = outcome {
                let detail = format!("{} step panicked: {}", step.name, panic_message(&*panic));
                tracing::error!(step = step.name, %detail, "fetch step aborted");
                (step.fail)(&mut snapshot, &ErrorPayload::new(step.code, detail));
            }
        }

        let path = self.store.save_raw(&snapshot)?;
        tracing::info!(
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "raw snapshot written"
        );
        Ok(path)
    }

    /// Enrich the last raw snapshot into today's report.
    pub fn generate_report(&self) -> Result<GeneratedReport, PipelineError> {
        let mut snapshot = self.store.load_raw().map_err(|e| {
            tracing::error!(code = e.code().map(ErrorCode::code), error = %e, "cannot load raw snapshot");
            e
        })?;
        let now = self.clock.now_jst();
        let commentary = &self.config.commentary;
        let ctx = CommentaryContext {
            generator: self.generator,
            budgets: &commentary.max_tokens,
            column_weekday: commentary.column_weekday,
            now,
        };

        for step in COMMENTARY_SEQUENCE {
            tracing::info!(step = step.name, "commentary step started");
            let outcome = catch_unwind(AssertUnwindSafe(|| (step.run)(&ctx, &mut snapshot)));
            if let Err(panic) = outcome {
                let detail = format!("{} step panicked: {}", step.name, panic_message(&*panic));
                tracing::error!(step = step.name, %detail, "commentary step aborted");
                (step.degrade)(
                    &mut snapshot,
                    &ErrorPayload::new(ErrorCode::TextGeneration, detail),
                );
            }
        }

        let report = Report {
            date: now.format("%Y-%m-%d").to_string(),
            last_updated: self
                .clock
                .now_jst()
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            snapshot,
        };
        let report_path = self.store.save_report(&report)?;
        tracing::info!(path = %report_path.display(), date = %report.date, "report written");

        let pruned = self
            .store
            .prune(now.date_naive(), self.config.retention_days)?;

        Ok(GeneratedReport {
            date: report.date,
            report_path,
            latest_path: self.store.latest_path(),
            pruned,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commentary::UnconfiguredGenerator;
    use chrono::{TimeZone, Utc};
    use hanaview_core::clock::FixedClock;
    use hanaview_core::testing::{StaticPages, StaticProvider};
    use tempfile::TempDir;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig {
            data_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        };
        config.pacing.batch_delay_ms = 0;
        config.pacing.failure_delay_ms = 0;
        config.pacing.instrument_delay_ms = 0;
        config.sources.world = Some(Vec::new());
        config
    }

    #[test]
    fn generate_before_fetch_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let (quotes, pages) = (StaticProvider::new(), StaticPages::new());
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 1, 5, 22, 0, 0).unwrap());
        let pipeline = Pipeline::new(config(tmp.path()), &quotes, &pages, &UnconfiguredGenerator, &clock);

        let err = pipeline.generate_report().unwrap_err();
        assert!(matches!(err, PipelineError::MissingRawSnapshot(_)));
        assert!(!pipeline.store().latest_path().exists());
    }

    #[test]
    fn report_is_dated_in_utc_plus_nine() {
        let tmp = TempDir::new().unwrap();
        let (quotes, pages) = (StaticProvider::new(), StaticPages::new());
        // 22:00 UTC on the 5th is 07:00 on the 6th in UTC+9.
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 1, 5, 22, 0, 0).unwrap());
        let pipeline = Pipeline::new(config(tmp.path()), &quotes, &pages, &UnconfiguredGenerator, &clock);

        pipeline.fetch_all().unwrap();
        let out = pipeline.generate_report().unwrap();

        assert_eq!(out.date, "2025-01-06");
        assert_eq!(out.report_path, tmp.path().join("report_2025-01-06.json"));
        let report = pipeline.store().load_latest().unwrap();
        assert_eq!(report.last_updated, "2025-01-06T07:00:00+09:00");
        // No key: every commentary call fails with the missing-key code.
        let column = report.snapshot.column.weekly_report.unwrap();
        assert_eq!(column.error().unwrap().code, Some(ErrorCode::MissingApiKey));
    }

    #[test]
    fn panic_payloads_are_described() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
