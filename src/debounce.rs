//! Trailing-edge debouncing for the conversion pipeline.
//!
//! [`Debouncer`] does not own a timer. The event loop calls [`Debouncer::poll`]
//! on every tick, and the clock is injected so tests can drive time by hand.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Quiet window between the last edit and a conversion run.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(300);

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time from [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Holds the latest scheduled value until the quiet window after it elapses.
///
/// Each [`schedule`](Self::schedule) replaces any pending value and restarts
/// the window, so at most one value fires per burst of calls.
#[derive(Debug)]
pub struct Debouncer<T, C = MonotonicClock> {
    delay: Duration,
    clock: C,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self::with_clock(delay, MonotonicClock)
    }
}

impl<T, C: Clock> Debouncer<T, C> {
    pub fn with_clock(delay: Duration, clock: C) -> Self {
        Self {
            delay,
            clock,
            pending: None,
        }
    }

    pub fn schedule(&mut self, value: T) {
        let deadline = self.clock.now() + self.delay;
        self.pending = Some((deadline, value));
    }

    /// Returns the pending value once its quiet window has passed.
    pub fn poll(&mut self) -> Option<T> {
        let now = self.clock.now();
        let due = self
            .pending
            .as_ref()
            .is_some_and(|(deadline, _)| *deadline <= now);
        if due {
            self.cancel()
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the pending value fires, if any.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending
            .as_ref()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn burst_fires_once_with_last_value() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::with_clock(WINDOW, &clock);

        let mut runs = Vec::new();
        for edit in 1..=5 {
            debouncer.schedule(edit);
            clock.advance(Duration::from_millis(100));
            runs.extend(debouncer.poll());
        }
        assert!(runs.is_empty());

        clock.advance(Duration::from_millis(199));
        assert_eq!(debouncer.poll(), None);
        clock.advance(Duration::from_millis(1));
        assert_eq!(debouncer.poll(), Some(5));
        assert_eq!(debouncer.poll(), None);
    }

    #[test]
    fn separate_quiet_windows_fire_separately() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::with_clock(WINDOW, &clock);

        debouncer.schedule("a");
        clock.advance(WINDOW);
        assert_eq!(debouncer.poll(), Some("a"));

        debouncer.schedule("b");
        clock.advance(WINDOW * 2);
        assert_eq!(debouncer.poll(), Some("b"));
    }

    #[test]
    fn remaining_counts_down_and_cancel_drops() {
        let clock = ManualClock::new();
        let mut debouncer = Debouncer::with_clock(WINDOW, &clock);
        assert_eq!(debouncer.remaining(), None);

        debouncer.schedule(());
        clock.advance(Duration::from_millis(120));
        assert_eq!(debouncer.remaining(), Some(Duration::from_millis(180)));

        assert_eq!(debouncer.cancel(), Some(()));
        clock.advance(WINDOW);
        assert_eq!(debouncer.poll(), None);
        assert!(!debouncer.is_pending());
    }
}
