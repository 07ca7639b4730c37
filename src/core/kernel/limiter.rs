//! Sliding-window admission control.
//!
//! Each [`RateClass`] owns an independent window holding the instants of its
//! recent grants. An admission prunes grants that have aged out, proceeds at
//! once when fewer than `max_calls` remain, and otherwise sleeps until the
//! oldest grant leaves the window before checking again. Callers are not
//! served in FIFO order; whoever checks first after a slot frees wins it.
//!
//! The window lock only guards bookkeeping and is never held while sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Budget classes with separate windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    /// Public market-data calls
    Public,
    /// Authenticated trade calls
    Trade,
}

impl std::fmt::Display for RateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Trade => write!(f, "trade"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Most grants allowed inside any window
    pub max_calls: usize,
    pub window: Duration,
    /// Minimum gap between two consecutive grants
    pub min_interval: Duration,
}

impl WindowConfig {
    pub const fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            min_interval: Duration::ZERO,
        }
    }

    /// Public budget, kept below the documented exchange limit
    pub const fn public() -> Self {
        Self::new(100, Duration::from_secs(1))
    }

    pub const fn trade() -> Self {
        Self::new(50, Duration::from_secs(1))
    }

    pub const fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

#[derive(Debug)]
struct RateWindow {
    config: WindowConfig,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            grants: Mutex::new(VecDeque::with_capacity(config.max_calls)),
        }
    }

    /// Either records a grant for `now` or says how long to wait.
    fn try_admit(&self, now: Instant) -> Result<Instant, Duration> {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(oldest) = grants.front() {
            if now.duration_since(*oldest) >= self.config.window {
                grants.pop_front();
            } else {
                break;
            }
        }

        let mut wait = Duration::ZERO;
        if grants.len() >= self.config.max_calls.max(1) {
            if let Some(oldest) = grants.front() {
                wait = (*oldest + self.config.window).saturating_duration_since(now);
            }
        }
        if let Some(last) = grants.back() {
            wait = wait.max((*last + self.config.min_interval).saturating_duration_since(now));
        }

        if wait.is_zero() {
            grants.push_back(now);
            Ok(now)
        } else {
            Err(wait)
        }
    }
}

/// Blocking admission control over the public and trade windows
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: HashMap<RateClass, RateWindow>,
}

impl SlidingWindowLimiter {
    pub fn new(public: WindowConfig, trade: WindowConfig) -> Self {
        let mut windows = HashMap::new();
        windows.insert(RateClass::Public, RateWindow::new(public));
        windows.insert(RateClass::Trade, RateWindow::new(trade));
        Self { windows }
    }

    /// Waits until a slot in `class` is free, records the grant and returns its instant.
    pub async fn admit(&self, class: RateClass) -> Instant {
        let Some(window) = self.windows.get(&class) else {
            return Instant::now();
        };
        loop {
            match window.try_admit(Instant::now()) {
                Ok(granted) => return granted,
                Err(wait) => {
                    trace!(%class, wait_ms = wait.as_millis() as u64, "rate window full");
                    sleep(wait).await;
                }
            }
        }
    }

    /// Grants currently inside the window of `class`
    pub fn in_flight(&self, class: RateClass) -> usize {
        self.windows.get(&class).map_or(0, |w| {
            let now = Instant::now();
            w.grants
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|t| now.duration_since(**t) < w.config.window)
                .count()
        })
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(WindowConfig::public(), WindowConfig::trade())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_no_window_exceeds(grants: &[Instant], window: Duration, cap: usize) {
        let mut sorted = grants.to_vec();
        sorted.sort();
        for (i, start) in sorted.iter().enumerate() {
            let inside = sorted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(inside <= cap, "{} grants inside one window (cap {})", inside, cap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_admissions_respect_cap() {
        let limiter = SlidingWindowLimiter::new(
            WindowConfig::new(5, Duration::from_secs(1)),
            WindowConfig::trade(),
        );
        let started = Instant::now();
        let mut grants = Vec::new();
        for _ in 0..23 {
            grants.push(limiter.admit(RateClass::Public).await);
        }
        assert_no_window_exceeds(&grants, Duration::from_secs(1), 5);
        // 23 grants at 5 per second need four full windows
        assert!(Instant::now().duration_since(started) >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_respect_cap() {
        let limiter = Arc::new(SlidingWindowLimiter::new(
            WindowConfig::public(),
            WindowConfig::new(3, Duration::from_millis(500)),
        ));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let mut grants = Vec::new();
                for _ in 0..4 {
                    grants.push(limiter.admit(RateClass::Trade).await);
                }
                grants
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        assert_eq!(all.len(), 32);
        assert_no_window_exceeds(&all, Duration::from_millis(500), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classes_are_independent() {
        let limiter = SlidingWindowLimiter::new(
            WindowConfig::new(1, Duration::from_secs(10)),
            WindowConfig::new(1, Duration::from_secs(10)),
        );
        let before = Instant::now();
        limiter.admit(RateClass::Public).await;
        limiter.admit(RateClass::Trade).await;
        assert_eq!(Instant::now(), before);
        assert_eq!(limiter.in_flight(RateClass::Public), 1);
        assert_eq!(limiter.in_flight(RateClass::Trade), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spaces_grants() {
        let limiter = SlidingWindowLimiter::new(
            WindowConfig::public().with_min_interval(Duration::from_millis(200)),
            WindowConfig::trade(),
        );
        let first = limiter.admit(RateClass::Public).await;
        let second = limiter.admit(RateClass::Public).await;
        assert!(second.duration_since(first) >= Duration::from_millis(200));
    }
}
