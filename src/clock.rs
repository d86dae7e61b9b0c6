//! Time and frame-tick sources injected into the renderer.
//!
//! The compositor only ever asks "how long has this paint pass been running"
//! and "please call me again next frame". Both are traits so hosts can plug
//! in their event loop and tests can drive time by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the
/// renderer owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Host capability to schedule one more frame callback.
///
/// The host answers a request by calling
/// [`Renderer::on_tick`](crate::renderer::Renderer::on_tick) on its next
/// frame. Requests are not queued: several requests before a tick still mean
/// a single tick.
pub trait TickSource {
    fn request_tick(&mut self);
}

/// Tick source that drops every request. Hosts that poll
/// [`Renderer::pending`](crate::renderer::Renderer::pending) themselves can
/// use it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTicker;

impl TickSource for NoopTicker {
    fn request_tick(&mut self) {}
}

/// Tick source that counts requests; clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    requested: Rc<Cell<usize>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requests so far.
    pub fn requested(&self) -> usize {
        self.requested.get()
    }

    /// Take the pending requests, resetting the counter. Returns whether a
    /// tick was requested.
    pub fn take(&self) -> bool {
        self.requested.replace(0) > 0
    }
}

impl TickSource for ManualTicker {
    fn request_tick(&mut self) {
        self.requested.set(self.requested.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_millis(5));
        handle.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(10));

        clock.set(Duration::from_secs(1));
        assert_eq!(handle.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_ticker_counts_requests() {
        let ticker = ManualTicker::new();
        let mut source = ticker.clone();
        source.request_tick();
        source.request_tick();
        assert_eq!(ticker.requested(), 2);
        assert!(ticker.take());
        assert!(!ticker.take());
    }
}
