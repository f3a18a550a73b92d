//! Time source for service dates and shift computation.
//!
//! All service-date and shift decisions are made in the configured local
//! time zone, never in UTC. The [`Clock`] trait keeps that decision
//! injectable so tests can pin the time.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of the current time in UTC and in the business time zone.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant in UTC.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Business time zone.
    fn time_zone(&self) -> Tz;

    /// Current instant in the business time zone.
    fn now_local(&self) -> DateTime<Tz> {
        self.utc_now().with_timezone(&self.time_zone())
    }

    /// Calendar date in the business time zone.
    fn today_local(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// Wall clock bound to a business time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    /// Creates a clock reporting local time in `tz`.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn time_zone(&self) -> Tz {
        self.tz
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    tz: Tz,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: RwLock::new(now),
            tz,
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn time_zone(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single() else {
            panic!("valid timestamp");
        };
        t
    }

    #[test]
    fn local_date_uses_business_zone() {
        // 20:30 UTC is already the next day in Bangkok (UTC+7).
        let clock = FixedClock::new(utc(2026, 3, 1, 20, 30), chrono_tz::Asia::Bangkok);
        assert_eq!(clock.today_local(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap_or_default());
        assert_eq!(clock.now_local().hour(), 3);
    }

    #[test]
    fn fixed_clock_can_be_moved() {
        let clock = FixedClock::new(utc(2026, 3, 1, 1, 0), chrono_tz::UTC);
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.utc_now(), utc(2026, 3, 1, 3, 0));
        clock.set(utc(2026, 4, 1, 0, 0));
        assert_eq!(clock.today_local(), NaiveDate::from_ymd_opt(2026, 4, 1).unwrap_or_default());
    }
}
