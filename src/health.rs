//! Rolling health statistics over observed webhook calls.
//!
//! Every attempt the retry engine makes is recorded here, so the numbers
//! reflect real call volume rather than only final outcomes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::models::call_result::CallResult;
use crate::models::health::HealthSnapshot;

#[derive(Debug, Clone, Copy)]
struct Sample {
    success: bool,
    duration_ms: f64,
}

#[derive(Debug, Default)]
struct HealthWindow {
    samples: VecDeque<Sample>,
    window_successes: usize,
    total_calls: u64,
    successful_calls: u64,
    last_request_time: Option<DateTime<Utc>>,
}

/// Tracks success rate and latency over the last `window` calls.
///
/// All state sits behind one mutex that is never held across an `.await`,
/// so a `record` is a single indivisible step for every reader.
#[derive(Debug)]
pub struct HealthTracker {
    inner: Mutex<HealthWindow>,
    window: usize,
    threshold: f64,
}

impl HealthTracker {
    pub fn new(window: usize, threshold: f64) -> Self {
        let window = window.max(1);
        Self {
            inner: Mutex::new(HealthWindow {
                samples: VecDeque::with_capacity(window),
                ..Default::default()
            }),
            window,
            threshold,
        }
    }

    pub fn record(&self, outcome: &CallResult, duration_ms: f64) {
        let mut state = self.inner.lock();

        if state.samples.len() == self.window {
            if let Some(evicted) = state.samples.pop_front() {
                if evicted.success {
                    state.window_successes -= 1;
                }
            }
        }
        state.samples.push_back(Sample {
            success: outcome.success,
            duration_ms: duration_ms.max(0.0),
        });
        if outcome.success {
            state.window_successes += 1;
            state.successful_calls += 1;
        }
        state.total_calls += 1;
        state.last_request_time = Some(Utc::now());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.inner.lock();
        let n = state.samples.len();

        let (success_rate, average_response_time_ms) = if n == 0 {
            (1.0, 0.0)
        } else {
            // Summed fresh from the window so evictions never accumulate drift.
            let total: f64 = state.samples.iter().map(|s| s.duration_ms).sum();
            (state.window_successes as f64 / n as f64, total / n as f64)
        };

        HealthSnapshot {
            is_healthy: success_rate >= self.threshold,
            success_rate,
            average_response_time_ms,
            last_request_time: state.last_request_time,
            total_calls: state.total_calls,
            successful_calls: state.successful_calls,
            window_size: n,
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(100, 0.9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::call_result::FailureKind;
    use std::sync::Arc;

    fn ok() -> CallResult {
        CallResult::ok(None, Some(200), None)
    }

    fn failed() -> CallResult {
        CallResult::failure(FailureKind::RemoteServer, "boom", Some(500))
    }

    #[test]
    fn test_empty_tracker_is_healthy() {
        let tracker = HealthTracker::default();
        let snap = tracker.snapshot();
        assert!(snap.is_healthy);
        assert_eq!(snap.success_rate, 1.0);
        assert_eq!(snap.window_size, 0);
        assert!(snap.last_request_time.is_none());
    }

    #[test]
    fn test_success_rate_is_exact() {
        let tracker = HealthTracker::default();
        for i in 0..7 {
            if i % 3 == 0 {
                tracker.record(&failed(), 10.0);
            } else {
                tracker.record(&ok(), 10.0);
            }
        }
        // failures at 0, 3, 6
        let snap = tracker.snapshot();
        assert_eq!(snap.total_calls, 7);
        assert_eq!(snap.successful_calls, 4);
        assert_eq!(snap.success_rate, 4.0 / 7.0);
        assert!(!snap.is_healthy);
    }

    #[test]
    fn test_average_response_time() {
        let tracker = HealthTracker::default();
        tracker.record(&ok(), 100.0);
        tracker.record(&failed(), 300.0);
        assert_eq!(tracker.snapshot().average_response_time_ms, 200.0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let tracker = HealthTracker::new(4, 0.5);
        for _ in 0..4 {
            tracker.record(&failed(), 1.0);
        }
        for _ in 0..4 {
            tracker.record(&ok(), 1.0);
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.window_size, 4);
        assert_eq!(snap.success_rate, 1.0);
        assert_eq!(snap.total_calls, 8);
        assert_eq!(snap.successful_calls, 4);
    }

    #[test]
    fn test_threshold_boundary_counts_as_healthy() {
        let tracker = HealthTracker::new(10, 0.9);
        for _ in 0..9 {
            tracker.record(&ok(), 1.0);
        }
        tracker.record(&failed(), 1.0);
        assert!(tracker.snapshot().is_healthy);
        tracker.record(&failed(), 1.0);
        assert!(!tracker.snapshot().is_healthy);
    }

    #[test]
    fn test_last_request_time_updates_on_failure() {
        let tracker = HealthTracker::default();
        tracker.record(&ok(), 1.0);
        let first = tracker.snapshot().last_request_time.unwrap();
        tracker.record(&failed(), 1.0);
        let second = tracker.snapshot().last_request_time.unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(HealthTracker::new(10_000, 0.9));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tracker.record(&ok(), 2.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = tracker.snapshot();
        assert_eq!(snap.total_calls, 2_000);
        assert_eq!(snap.window_size, 2_000);
        assert_eq!(snap.success_rate, 1.0);
    }
}
