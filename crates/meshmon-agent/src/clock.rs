//! Injectable clock for the periodic status-update loop.
//!
//! The loop never sleeps on wall-clock primitives directly; it goes
//! through [`Clock`] so tests can drive ticks deterministically.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::sync::Notify;

type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of time for the agent runtime.
pub trait Clock: Send + Sync {
    /// Current wall-clock time, used for snapshot timestamps.
    fn now(&self) -> SystemTime;

    /// Completes after `period` has elapsed on this clock.
    fn sleep(&self, period: Duration) -> SleepFuture<'_>;
}

/// The production clock: real time, tokio sleeps.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, period: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(period))
    }
}

/// A clock advanced explicitly (for testing).
///
/// Sleepers are woken whenever [`advance`] moves the clock past their
/// deadline; time never moves on its own.
///
/// [`advance`]: ManualClock::advance
pub struct ManualClock {
    epoch: SystemTime,
    elapsed_nanos: AtomicU64,
    tick: Notify,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            epoch: SystemTime::now(),
            elapsed_nanos: AtomicU64::new(0),
            tick: Notify::new(),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward and wake every pending sleeper.
    pub fn advance(&self, period: Duration) {
        self.elapsed_nanos
            .fetch_add(period.as_nanos() as u64, Ordering::SeqCst);
        self.tick.notify_waiters();
    }

    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.epoch + self.elapsed()
    }

    fn sleep(&self, period: Duration) -> SleepFuture<'_> {
        let deadline = self.elapsed() + period;
        Box::pin(async move {
            loop {
                let woken = self.tick.notified();
                tokio::pin!(woken);
                // Register before re-checking so an advance between the
                // check and the await cannot be missed.
                woken.as_mut().enable();
                if self.elapsed() >= deadline {
                    return;
                }
                woken.await;
            }
        })
    }
}
