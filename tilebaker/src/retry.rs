//! Retry and backoff policy shared by the tile sources and the job controller.
//!
//! Both layers retry failed downloads with the same linearly growing,
//! capped sleep. They differ only in how failures are classified and in
//! how the sleep is performed:
//!
//! - [`crate::source::RemoteTileSource`] retries every download failure a
//!   fixed number of times and sleeps plainly.
//! - [`crate::controller::JobController`] retries connectivity failures
//!   indefinitely, propagates HTTP status failures at once, and sleeps in
//!   slices so a stop request interrupts the wait.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tilebaker::retry::{retry, Backoff, Verdict};
//!
//! let backoff = Backoff::new(Duration::from_millis(1));
//! let mut calls = 0;
//! let result: Result<u32, String> = retry(
//!     &backoff,
//!     Some(3),
//!     || {
//!         calls += 1;
//!         if calls < 3 { Err("flaky".to_string()) } else { Ok(calls) }
//!     },
//!     |_| Verdict::Retry,
//!     |delay| {
//!         std::thread::sleep(delay);
//!         Ok(())
//!     },
//! );
//! assert_eq!(result, Ok(3));
//! ```

use std::time::Duration;

// =============================================================================
// Backoff Constants
// =============================================================================

/// Sleep after the first failure, in time units.
pub const DEFAULT_INITIAL_UNITS: u32 = 1;

/// The sleep grows by one unit every this many failures.
pub const DEFAULT_GROWTH_PERIOD: u32 = 2;

/// Upper bound for a single sleep, in time units.
pub const DEFAULT_MAX_UNITS: u32 = 10;

/// Linearly growing, capped backoff schedule.
///
/// The delay after the `n`-th consecutive failure (1-based) is
/// `min(initial + (n - 1) / growth_period, max)` time units, so with the
/// defaults the schedule is 1, 1, 2, 2, 3, 3, ... capped at 10.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Length of one time unit.
    pub unit: Duration,
    /// Delay after the first failure, in units.
    pub initial_units: u32,
    /// Number of failures between each one-unit increase.
    pub growth_period: u32,
    /// Maximum delay, in units.
    pub max_units: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Backoff {
    /// Creates the standard schedule for a given time unit.
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            initial_units: DEFAULT_INITIAL_UNITS,
            growth_period: DEFAULT_GROWTH_PERIOD,
            max_units: DEFAULT_MAX_UNITS,
        }
    }

    /// Delay to wait after the given failure (1-based).
    pub fn delay_for_failure(&self, failure: u32) -> Duration {
        let steps = failure.saturating_sub(1) / self.growth_period.max(1);
        let units = self
            .initial_units
            .saturating_add(steps)
            .min(self.max_units);
        self.unit * units
    }

    /// The longest delay this schedule produces.
    pub fn max_delay(&self) -> Duration {
        self.unit * self.max_units
    }
}

/// Classification of a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Transient failure: sleep and try again.
    Retry,
    /// Fatal failure: return the error immediately.
    Fail,
}

/// Runs `operation` until it succeeds, a failure is classified fatal, or the
/// retry budget is spent.
///
/// # Arguments
///
/// * `backoff` - Sleep schedule between attempts
/// * `budget` - Number of retries after the first attempt; `None` retries
///   without limit
/// * `operation` - The fallible operation
/// * `classify` - Decides whether a failure is worth retrying
/// * `sleep` - Performs the backoff wait; returning an error aborts the loop
///   with that error (used for cooperative cancellation)
///
/// The last error is returned when the budget is exhausted. No sleep happens
/// after the final failed attempt.
pub fn retry<T, E>(
    backoff: &Backoff,
    budget: Option<u32>,
    mut operation: impl FnMut() -> Result<T, E>,
    classify: impl Fn(&E) -> Verdict,
    mut sleep: impl FnMut(Duration) -> Result<(), E>,
) -> Result<T, E> {
    let mut failures: u32 = 0;
    loop {
        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if classify(&error) == Verdict::Fail {
            return Err(error);
        }

        failures = failures.saturating_add(1);
        if let Some(budget) = budget {
            if failures > budget {
                return Err(error);
            }
        }

        sleep(backoff.delay_for_failure(failures))?;
    }
}
