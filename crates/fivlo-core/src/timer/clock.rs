//! 1 Hz tick source.
//!
//! A clock carries no business meaning: it calls `on_tick` roughly once a
//! second between `start` and `stop`. `stop` is idempotent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type TickFn = Box<dyn FnMut() + Send + 'static>;

pub trait Clock: Send {
    /// Begin ticking. A clock that is already running is restarted with
    /// the new callback.
    fn start(&mut self, on_tick: TickFn);

    /// Stop ticking. No-op when not running.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Tokio-interval clock used by real hosts.
pub struct IntervalClock {
    runtime: Handle,
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl IntervalClock {
    pub fn new(runtime: Handle) -> Self {
        Self::with_period(runtime, Duration::from_secs(1))
    }

    pub fn with_period(runtime: Handle, period: Duration) -> Self {
        Self {
            runtime,
            period,
            task: None,
        }
    }
}

impl Clock for IntervalClock {
    fn start(&mut self, mut on_tick: TickFn) {
        self.stop();
        let period = self.period;
        self.task = Some(self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clock driven by hand. Clones share state, so a test can keep one copy
/// and hand the other to the controller.
#[derive(Clone, Default)]
pub struct ManualClock {
    running: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    on_tick: Arc<Mutex<Option<TickFn>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one tick. Returns false when the clock is stopped.
    pub fn fire(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.on_tick.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(f) => {
                    f();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// How many times `start` has been called.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn start(&mut self, on_tick: TickFn) {
        if let Ok(mut guard) = self.on_tick.lock() {
            *guard = Some(on_tick);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.on_tick.lock() {
            *guard = None;
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn manual_clock_only_fires_while_running() {
        let hits = Arc::new(AtomicU64::new(0));
        let mut clock = ManualClock::new();
        let remote = clock.clone();
        assert!(!remote.fire());

        let h = hits.clone();
        clock.start(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(remote.fire());
        assert!(remote.fire());
        clock.stop();
        clock.stop();
        assert!(!remote.fire());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(remote.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_clock_ticks_once_per_period() {
        let hits = Arc::new(AtomicU64::new(0));
        let mut clock = IntervalClock::new(Handle::current());
        let h = hits.clone();
        clock.start(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(clock.is_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        clock.stop();
        assert!(!clock.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
