// WHY: Timers are driven through this seam so tests run on simulated time
// Times are offsets from the clock's origin (session start)

use std::future::{self, Future};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub trait Clock {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Resolve once `now() >= deadline`
    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()>;
}

/// Wall-clock time through the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep_until(self.origin + deadline)
    }
}

/// Simulated time: sleeping jumps straight to the deadline
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    /// Move to `to`; never goes backwards
    pub fn set(&self, to: Duration) {
        let mut now = self.lock();
        if to > *now {
            *now = to;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Duration> {
        // A poisoned lock still holds a valid Duration
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.lock()
    }

    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> {
        self.set(deadline);
        future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(100));
        clock.sleep_until(Duration::from_millis(750)).await;
        assert_eq!(clock.now(), Duration::from_millis(750));

        // Deadlines in the past leave time untouched
        clock.sleep_until(Duration::from_millis(10)).await;
        assert_eq!(clock.now(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        clock.sleep_until(Duration::from_millis(2000)).await;
        assert!(clock.now() >= Duration::from_millis(2000));
    }
}
