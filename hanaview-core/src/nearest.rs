//! Nearest-timestamp lookup over sparse time series.
//!
//! The sentiment series skips weekends, holidays and the occasional outage,
//! so "the value N days ago" is the sample closest in time to that instant
//! rather than an exact-date index.

use chrono::{DateTime, Duration, Utc};

/// A sample stamped with Unix epoch milliseconds.
pub trait TimedSample {
    fn epoch_millis(&self) -> f64;
    fn value(&self) -> f64;
}

/// Return the sample closest to `now - days_ago`.
///
/// Ties go to the earliest element in input order. Returns `None` only for
/// an empty series.
pub fn nearest<S: TimedSample>(samples: &[S], now: DateTime<Utc>, days_ago: i64) -> Option<&S> {
    let target = (now - Duration::days(days_ago)).timestamp_millis() as f64;
    let mut best: Option<(&S, f64)> = None;
    for sample in samples {
        let distance = (sample.epoch_millis() - target).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((sample, distance)),
        }
    }
    best.map(|(s, _)| s)
}

pub fn nearest_value<S: TimedSample>(
    samples: &[S],
    now: DateTime<Utc>,
    days_ago: i64,
) -> Option<f64> {
    nearest(samples, now, days_ago).map(TimedSample::value)
}
