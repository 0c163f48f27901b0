//! Sliding-window call budget.
//!
//! Every attempt, successful or not, consumes one slot. A slot is freed when
//! its timestamp is a full window old.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window rate budget.
#[derive(Debug, Clone)]
pub struct RateBudget {
    cap: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

/// Point-in-time view of the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    /// Calls still allowed in the current window
    pub remaining: usize,
    /// Calls allowed per window
    pub cap: usize,
    /// Window length
    pub window: Duration,
    /// Time until the oldest counted call leaves the window
    pub oldest_expires_in: Option<Duration>,
}

/// Persistable form of the budget, anchored to wall-clock time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudgetSnapshot {
    /// Calls allowed per window
    pub cap: usize,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Wall-clock times of calls still inside the window, oldest first
    pub calls: Vec<DateTime<Utc>>,
}

impl RateBudget {
    /// Create an empty budget.
    #[must_use]
    pub fn new(cap: usize, window: Duration) -> Self {
        Self {
            cap,
            window,
            calls: VecDeque::with_capacity(cap),
        }
    }

    /// Calls allowed per window.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a call at `now` if the window has room.
    ///
    /// # Errors
    /// Returns the time until a slot frees up when the window is full.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.evict(now);
        if self.calls.len() < self.cap {
            self.calls.push_back(now);
            return Ok(());
        }
        Err(self.wait_hint(now))
    }

    fn wait_hint(&self, now: Instant) -> Duration {
        self.calls
            .front()
            .map_or(Duration::ZERO, |oldest| {
                (*oldest + self.window).saturating_duration_since(now)
            })
    }

    /// Calls still allowed in the current window.
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.cap.saturating_sub(self.calls.len())
    }

    /// Number of calls counted in the current window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.calls.len()
    }

    /// Current status.
    pub fn status(&mut self, now: Instant) -> RateStatus {
        self.evict(now);
        RateStatus {
            remaining: self.cap.saturating_sub(self.calls.len()),
            cap: self.cap,
            window: self.window,
            oldest_expires_in: self
                .calls
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now)),
        }
    }

    /// Capture the budget with wall-clock timestamps.
    pub fn snapshot(&mut self, now: Instant) -> RateBudgetSnapshot {
        self.evict(now);
        let wall_now = Utc::now();
        let calls = self
            .calls
            .iter()
            .filter_map(|call| {
                let age = chrono::Duration::from_std(now.saturating_duration_since(*call)).ok()?;
                Some(wall_now - age)
            })
            .collect();

        RateBudgetSnapshot {
            cap: self.cap,
            window_seconds: self.window.as_secs(),
            calls,
        }
    }

    /// Re-seed the window from a snapshot so a resumed scan keeps counting
    /// calls made before the restart. Calls older than the window are dropped.
    pub fn restore(&mut self, snapshot: &RateBudgetSnapshot, now: Instant) {
        let wall_now = Utc::now();
        let mut restored: Vec<Instant> = snapshot
            .calls
            .iter()
            .filter_map(|call| {
                let age = (wall_now - *call).to_std().unwrap_or(Duration::ZERO);
                if age >= self.window {
                    return None;
                }
                Some(now.checked_sub(age).unwrap_or(now))
            })
            .collect();
        restored.sort();

        self.calls = restored.into_iter().collect();
        while self.calls.len() > self.cap {
            self.calls.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_full() {
        let mut budget = RateBudget::new(3, Duration::from_secs(10));
        let now = Instant::now();

        assert!(budget.try_acquire(now).is_ok());
        assert!(budget.try_acquire(now).is_ok());
        assert!(budget.try_acquire(now).is_ok());
        assert_eq!(budget.remaining(now), 0);

        let wait = budget.try_acquire(now).expect_err("window is full");
        assert_eq!(wait, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_frees_when_oldest_leaves_window() {
        let mut budget = RateBudget::new(2, Duration::from_secs(10));
        let start = Instant::now();
        budget.try_acquire(start).expect("first call");
        budget
            .try_acquire(start + Duration::from_secs(4))
            .expect("second call");

        let at_nine = start + Duration::from_secs(9);
        assert_eq!(
            budget.try_acquire(at_nine).expect_err("still full"),
            Duration::from_secs(1)
        );

        let at_ten = start + Duration::from_secs(10);
        assert!(budget.try_acquire(at_ten).is_ok());
        assert_eq!(budget.in_window(at_ten), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status() {
        let mut budget = RateBudget::new(5, Duration::from_secs(60));
        let now = Instant::now();
        let status = budget.status(now);
        assert_eq!(status.remaining, 5);
        assert_eq!(status.oldest_expires_in, None);

        budget.try_acquire(now).expect("call");
        let status = budget.status(now + Duration::from_secs(20));
        assert_eq!(status.remaining, 4);
        assert_eq!(status.oldest_expires_in, Some(Duration::from_secs(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_restore_keeps_recent_calls() {
        let mut budget = RateBudget::new(10, Duration::from_secs(300));
        let now = Instant::now();
        for _ in 0..4 {
            budget.try_acquire(now).expect("call");
        }
        let snapshot = budget.snapshot(now);
        assert_eq!(snapshot.calls.len(), 4);

        let mut restored = RateBudget::new(10, Duration::from_secs(300));
        restored.restore(&snapshot, Instant::now());
        assert_eq!(restored.remaining(Instant::now()), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_drops_expired_calls() {
        let snapshot = RateBudgetSnapshot {
            cap: 10,
            window_seconds: 300,
            calls: vec![
                Utc::now() - chrono::Duration::seconds(600),
                Utc::now() - chrono::Duration::seconds(30),
            ],
        };
        let mut budget = RateBudget::new(10, Duration::from_secs(300));
        budget.restore(&snapshot, Instant::now());
        assert_eq!(budget.in_window(Instant::now()), 1);
    }
}
