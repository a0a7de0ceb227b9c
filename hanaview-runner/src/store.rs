//! On-disk artifacts.
//!
//! Layout under `data_dir`:
//! - `data_raw.json` — the sanitized snapshot from the last fetch
//! - `report_YYYY-MM-DD.json` — one enriched report per calendar day (UTC+9)
//! - `latest.json` — a copy of the newest report
//!
//! Every file is written to a `.tmp` sibling and renamed into place, so a
//! reader never sees a half-written document.

use chrono::{Duration, NaiveDate};
use hanaview_core::sanitize::to_pretty_json;
use hanaview_core::snapshot::{ErrorCode, MarketSnapshot, Report};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RAW_FILE: &str = "data_raw.json";
pub const LATEST_FILE: &str = "latest.json";
const REPORT_PREFIX: &str = "report_";
const REPORT_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("raw snapshot {} does not exist; run fetch first", .0.display())]
    MissingRawSnapshot(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid JSON in {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// Taxonomy code for failures to read a data file. Write failures have
    /// none.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            StoreError::MissingRawSnapshot(_) | StoreError::Read { .. } | StoreError::Decode { .. } => {
                Some(ErrorCode::DataFileUnreadable)
            }
            StoreError::Write { .. } | StoreError::Encode(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(RAW_FILE)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// `report_<date>.json`; `date` is the report's `YYYY-MM-DD` stamp.
    pub fn report_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{REPORT_PREFIX}{date}{REPORT_SUFFIX}"))
    }

    /// Overwrite the raw snapshot.
    pub fn save_raw(&self, snapshot: &MarketSnapshot) -> Result<PathBuf, StoreError> {
        let path = self.raw_path();
        self.write_json(&path, snapshot)?;
        Ok(path)
    }

    pub fn load_raw(&self) -> Result<MarketSnapshot, StoreError> {
        let path = self.raw_path();
        if !path.exists() {
            return Err(StoreError::MissingRawSnapshot(path));
        }
        read_json(&path)
    }

    /// Write the dated report and replace `latest.json` with the same content.
    pub fn save_report(&self, report: &Report) -> Result<PathBuf, StoreError> {
        let path = self.report_path(&report.date);
        self.write_json(&path, report)?;
        self.write_json(&self.latest_path(), report)?;
        Ok(path)
    }

    pub fn load_report(&self, date: &str) -> Result<Report, StoreError> {
        read_json(&self.report_path(date))
    }

    pub fn load_latest(&self) -> Result<Report, StoreError> {
        read_json(&self.latest_path())
    }

    /// Dated report files, oldest first. Files that do not match the naming
    /// scheme are ignored.
    pub fn dated_reports(&self) -> Result<Vec<(NaiveDate, PathBuf)>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut reports: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let date = report_date(name.to_str()?)?;
                Some((date, entry.path()))
            })
            .collect();
        reports.sort();
        Ok(reports)
    }

    /// Delete dated reports older than `retention_days` before `today`. A
    /// report exactly `retention_days` old is kept. Returns the deleted paths.
    pub fn prune(&self, today: NaiveDate, retention_days: i64) -> Result<Vec<PathBuf>, StoreError> {
        let cutoff = today - Duration::days(retention_days);
        let mut removed = Vec::new();
        for (date, path) in self.dated_reports()? {
            if date >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "deleted expired report");
                    removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete expired report");
                }
            }
        }
        Ok(removed)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let json = to_pretty_json(value)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| StoreError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(path = %path.display(), "wrote document");
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn report_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name
        .strip_prefix(REPORT_PREFIX)?
        .strip_suffix(REPORT_SUFFIX)?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
