//! Discrete simulation clock.
//!
//! Elapsed time is kept in integer seconds so that day boundaries are
//! exact. The clock has a single running state and no terminal state.
//!
//! # Example
//!
//! ```
//! use wq_rs::time::Clock;
//!
//! let mut clock = Clock::new(0, 3600).unwrap();
//! let mut boundaries = 0;
//! for _ in 0..24 {
//!     clock.tick(None);
//!     if clock.flag() {
//!         boundaries += 1;
//!     }
//! }
//! assert_eq!(clock.elapsed(), 86_400);
//! assert_eq!(boundaries, 1);
//! ```

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::ConfigError;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Days in a model year.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Integer-second clock with a once-per-day boundary flag.
#[derive(Clone, Debug)]
pub struct Clock {
    /// Elapsed seconds, including the start offset.
    elapsed: i64,
    /// Default step size (s).
    dt: i64,
    /// Number of completed ticks.
    ticks: u64,
    /// Whole-day count at which the next boundary fires.
    next_boundary: i64,
    /// Tick at which the flag last fired.
    fired_at: Option<u64>,
    /// Fraction of the current day elapsed.
    day_fraction: f64,
    /// Fractional day of year.
    year_day: f64,
}

impl Clock {
    /// Create a clock at `start` seconds (since 1 January 00:00) with step `dt`.
    ///
    /// The step must be positive.
    pub fn new(start: i64, dt: i64) -> Result<Self, ConfigError> {
        if dt <= 0 {
            return Err(ConfigError::invalid("clock", "dt", dt as f64));
        }
        let mut clock = Self {
            elapsed: start,
            dt,
            ticks: 0,
            next_boundary: start.div_euclid(SECONDS_PER_DAY) + 1,
            fired_at: None,
            day_fraction: 0.0,
            year_day: 0.0,
        };
        clock.refresh();
        Ok(clock)
    }

    /// Create a clock from a calendar start time.
    pub fn from_calendar(start: NaiveDateTime, dt: i64) -> Result<Self, ConfigError> {
        let new_year = NaiveDate::from_ymd_opt(start.year(), 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or(ConfigError::MissingParameter {
                owner: "clock".into(),
                parameter: "start",
            })?;
        let offset = (start - new_year).num_seconds();
        Self::new(offset, dt)
    }

    /// Advance by the configured step, or by `dt` when supplied.
    pub fn tick(&mut self, dt: Option<i64>) {
        self.elapsed += dt.unwrap_or(self.dt);
        self.ticks += 1;
        self.refresh();
    }

    /// True at most once per simulated calendar day.
    ///
    /// Fires when the whole-day count reaches the stored boundary, then
    /// advances the boundary by one day. Repeated calls within the same
    /// tick never fire twice.
    pub fn flag(&mut self) -> bool {
        if self.fired_at == Some(self.ticks) || self.days() < self.next_boundary {
            return false;
        }
        self.next_boundary += 1;
        self.fired_at = Some(self.ticks);
        debug!(day = self.days(), "day boundary");
        true
    }

    fn refresh(&mut self) {
        let seconds = self.elapsed.rem_euclid(SECONDS_PER_DAY);
        self.day_fraction = seconds as f64 / SECONDS_PER_DAY as f64;
        let days = self.days() as f64 + self.day_fraction;
        self.year_day = days.rem_euclid(DAYS_PER_YEAR);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Elapsed seconds, including the start offset.
    #[inline]
    pub fn elapsed(&self) -> i64 {
        self.elapsed
    }

    /// Configured step size (s).
    #[inline]
    pub fn dt(&self) -> i64 {
        self.dt
    }

    /// Completed ticks.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whole days elapsed.
    #[inline]
    pub fn days(&self) -> i64 {
        self.elapsed.div_euclid(SECONDS_PER_DAY)
    }

    /// Fraction of the current day elapsed, in [0, 1).
    #[inline]
    pub fn day_fraction(&self) -> f64 {
        self.day_fraction
    }

    /// Fractional day of year, in [0, 365).
    #[inline]
    pub fn year_day(&self) -> f64 {
        self.year_day
    }
}
