//! One-shot timer adapter.
//!
//! Implements [`TimerPort`] with a deadline per [`TimerId`], checked by the
//! event loop through [`TimerWheel::poll`].
//!
//! - **`target_os = "espidf"`**: deadlines on `esp_timer_get_time()`
//!   (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` for host-side
//!   testing and simulation.

use core::time::Duration;

use log::debug;

use crate::app::ports::{TimerId, TimerPort};

/// Monotonic microsecond clock.
pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since construction.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

const TIMERS: [TimerId; 2] = [TimerId::Interval, TimerId::ResponseTimeout];

fn slot(timer: TimerId) -> usize {
    match timer {
        TimerId::Interval => 0,
        TimerId::ResponseTimeout => 1,
    }
}

/// Deadlines for the fixed timer set.
#[derive(Default)]
pub struct TimerWheel {
    clock: MonotonicClock,
    deadlines: [Option<u64>; 2],
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines[slot(timer)].is_some()
    }

    /// Take the first expired timer, if any.
    pub fn poll(&mut self) -> Option<TimerId> {
        self.poll_at(self.clock.uptime_us())
    }

    /// [`poll`](Self::poll) against an explicit clock reading.
    pub fn poll_at(&mut self, now_us: u64) -> Option<TimerId> {
        let timer = TIMERS
            .into_iter()
            .filter(|t| self.deadlines[slot(*t)].is_some_and(|d| d <= now_us))
            .min_by_key(|t| self.deadlines[slot(*t)])?;
        self.deadlines[slot(timer)] = None;
        debug!("TIMER | {:?} fired", timer);
        Some(timer)
    }

    /// Time until the nearest deadline.  `None` if nothing is armed.
    pub fn next_due(&self) -> Option<Duration> {
        let now = self.clock.uptime_us();
        self.deadlines
            .iter()
            .flatten()
            .min()
            .map(|d| Duration::from_micros(d.saturating_sub(now)))
    }

    fn arm_at(&mut self, timer: TimerId, after: Duration, now_us: u64) {
        let after_us = u64::try_from(after.as_micros()).unwrap_or(u64::MAX);
        self.deadlines[slot(timer)] = Some(now_us.saturating_add(after_us));
    }
}

impl TimerPort for TimerWheel {
    fn arm(&mut self, timer: TimerId, after: Duration) {
        debug!("TIMER | arm {:?} in {:?}", timer, after);
        let now = self.clock.uptime_us();
        self.arm_at(timer, after, now);
    }

    fn disarm(&mut self, timer: TimerId) {
        self.deadlines[slot(timer)] = None;
    }
}
