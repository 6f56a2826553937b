//! Per-requester sliding-window admission control.

use crate::job::RequesterId;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Earliest instant at which the requester will be admitted again.
    Denied { retry_after: DateTime<Utc> },
}

/// Admits at most `max_requests` requests per requester in any trailing
/// `window` interval.
///
/// Timestamps are evicted lazily on access. Requesters are never forgotten,
/// so the table grows with the number of distinct requesters.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<RequesterId, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window: Duration::seconds(window_seconds as i64),
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window.num_seconds() as u64
    }

    pub fn admit(&self, requester: RequesterId, now: DateTime<Utc>) -> Admission {
        let mut requests = self.lock();
        let history = requests.entry(requester).or_default();
        Self::evict(history, now - self.window);

        if history.len() >= self.max_requests {
            // max_requests == 0 denies everything; report one window from now
            let oldest = history.front().copied().unwrap_or(now);
            return Admission::Denied {
                retry_after: oldest + self.window,
            };
        }

        history.push_back(now);
        Admission::Allowed
    }

    pub fn remaining(&self, requester: RequesterId, now: DateTime<Utc>) -> usize {
        let mut requests = self.lock();
        let Some(history) = requests.get_mut(&requester) else {
            return self.max_requests;
        };
        Self::evict(history, now - self.window);
        self.max_requests.saturating_sub(history.len())
    }

    fn evict(history: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while history.front().is_some_and(|oldest| *oldest < cutoff) {
            history.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequesterId, VecDeque<DateTime<Utc>>>> {
        // The table holds plain data; a panic mid-update cannot leave it unsorted.
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn denies_the_request_after_the_limit() {
        let limiter = RateLimiter::new(3, 300);

        assert_eq!(limiter.admit(7, at(0)), Admission::Allowed);
        assert_eq!(limiter.admit(7, at(10)), Admission::Allowed);
        assert_eq!(limiter.admit(7, at(20)), Admission::Allowed);
        assert_eq!(
            limiter.admit(7, at(30)),
            Admission::Denied {
                retry_after: at(300)
            }
        );
        assert_eq!(limiter.remaining(7, at(30)), 0);
    }

    #[test]
    fn denied_requests_do_not_consume_quota() {
        let limiter = RateLimiter::new(1, 60);

        assert_eq!(limiter.admit(1, at(0)), Admission::Allowed);
        for i in 1..10 {
            assert!(matches!(limiter.admit(1, at(i)), Admission::Denied { .. }));
        }
        assert_eq!(limiter.admit(1, at(61)), Admission::Allowed);
    }

    #[test]
    fn quota_recovers_after_the_window() {
        let limiter = RateLimiter::new(3, 300);

        for i in 0..3 {
            assert_eq!(limiter.admit(42, at(i)), Admission::Allowed);
        }
        assert_eq!(limiter.remaining(42, at(100)), 0);
        // the first entry leaves the window, the other two are still in it
        assert_eq!(limiter.remaining(42, at(301)), 1);
        assert_eq!(limiter.remaining(42, at(303)), 3);
    }

    #[test]
    fn requesters_are_independent() {
        let limiter = RateLimiter::new(1, 300);

        assert_eq!(limiter.admit(1, at(0)), Admission::Allowed);
        assert_eq!(limiter.admit(2, at(0)), Admission::Allowed);
        assert!(matches!(limiter.admit(1, at(1)), Admission::Denied { .. }));
        assert_eq!(limiter.remaining(2, at(1)), 0);
        assert_eq!(limiter.remaining(3, at(1)), 1);
    }

    #[test]
    fn retry_after_tracks_the_oldest_surviving_entry() {
        let limiter = RateLimiter::new(2, 100);

        assert_eq!(limiter.admit(5, at(0)), Admission::Allowed);
        assert_eq!(limiter.admit(5, at(50)), Admission::Allowed);
        assert_eq!(
            limiter.admit(5, at(60)),
            Admission::Denied {
                retry_after: at(100)
            }
        );
        // at(0) is evicted at 101, leaving at(50) as the oldest entry
        assert_eq!(limiter.admit(5, at(101)), Admission::Allowed);
        assert_eq!(
            limiter.admit(5, at(102)),
            Admission::Denied {
                retry_after: at(150)
            }
        );
    }
}
