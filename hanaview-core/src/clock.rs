//! Time source and the fixed UTC+9 display offset.

use chrono::{DateTime, FixedOffset, Utc};
use std::cell::Cell;

/// Offset used for every display timestamp and for the report date.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("UTC+9 is a valid offset")
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn now_jst(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&jst())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, optionally advancing by `step` on every
/// read.
#[derive(Debug)]
pub struct FixedClock {
    current: Cell<DateTime<Utc>>,
    step: chrono::Duration,
}

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            current: Cell::new(instant),
            step: chrono::Duration::zero(),
        }
    }

    pub fn ticking(instant: DateTime<Utc>, step: chrono::Duration) -> Self {
        Self {
            current: Cell::new(instant),
            step,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.current.get();
        self.current.set(now + self.step);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn jst_is_nine_hours_ahead() {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 1, 5, 22, 0, 0).unwrap());
        let local = clock.now_jst();
        assert_eq!(local.hour(), 7);
        assert_eq!(local.date_naive().to_string(), "2025-01-06");
    }

    #[test]
    fn ticking_clock_advances_per_read() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let clock = FixedClock::ticking(start, chrono::Duration::seconds(1));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(1));
    }
}
