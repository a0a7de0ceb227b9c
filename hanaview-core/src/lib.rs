//! HanaView Core — snapshot model, upstream providers and source fetchers.
//!
//! This crate contains the aggregation side of the pipeline:
//! - The snapshot document with fail-partial sections
//! - Strict-JSON float sanitizing
//! - Nearest-timestamp lookup over sparse series
//! - Calendar table parsing with row-spanned dates
//! - Batched, paced performance fetching for heatmaps
//! - Quote provider and page fetcher seams with HTTP implementations
//! - One fetcher per snapshot section

pub mod calendar;
pub mod clock;
pub mod data;
pub mod fetchers;
pub mod nearest;
pub mod performance;
pub mod sanitize;
pub mod snapshot;
pub mod sources;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, FixedClock, SystemClock};
pub use snapshot::{ErrorCode, ErrorPayload, MarketSnapshot, Report, Section};
