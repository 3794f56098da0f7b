//! Per-shop admission control.
//!
//! A true sliding window over request timestamps: at most
//! `max_requests` per `window_ms` for each shop key. Denials carry a
//! `retry_after_ms` hint derived from the oldest in-window request.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use vitrine_domain::config::AdmissionConfig;
use vitrine_domain::history::now_ms;

/// Map size at which stale shop windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// Set when denied: milliseconds until a slot frees up.
    pub retry_after_ms: Option<i64>,
}

/// Sliding-window admission controller.
pub struct Admission {
    windows: Mutex<HashMap<String, VecDeque<i64>>>,
    max_requests: usize,
    window_ms: i64,
}

impl Admission {
    pub fn new(cfg: &AdmissionConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests: cfg.max_requests,
            window_ms: cfg.window_ms as i64,
        }
    }

    pub fn admit(&self, shop_key: &str) -> AdmissionDecision {
        self.admit_at(shop_key, now_ms())
    }

    /// Clock-injected variant; `admit` delegates here.
    pub fn admit_at(&self, shop_key: &str, now: i64) -> AdmissionDecision {
        let mut windows = self.windows.lock();

        // Lazy sweep so abandoned shop keys do not accumulate.
        if windows.len() > SWEEP_THRESHOLD {
            let horizon = now - self.window_ms;
            windows.retain(|_, times| times.back().is_some_and(|t| *t > horizon));
        }

        let times = windows.entry(shop_key.to_owned()).or_default();
        let horizon = now - self.window_ms;
        while times.front().is_some_and(|t| *t <= horizon) {
            times.pop_front();
        }

        if times.len() >= self.max_requests {
            let oldest = *times.front().expect("non-empty at capacity");
            return AdmissionDecision {
                allowed: false,
                retry_after_ms: Some((oldest + self.window_ms - now).max(1)),
            };
        }

        times.push_back(now);
        AdmissionDecision {
            allowed: true,
            retry_after_ms: None,
        }
    }

    /// Number of tracked shop keys (for monitoring).
    pub fn shop_count(&self) -> usize {
        self.windows.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn admission() -> Admission {
        Admission::new(&AdmissionConfig::default())
    }

    #[test]
    fn sixty_requests_pass_sixty_first_denied() {
        let adm = admission();
        let now = 1_000_000;
        for _ in 0..60 {
            assert!(adm.admit_at("shop-a", now).allowed);
        }
        let denied = adm.admit_at("shop-a", now);
        assert!(!denied.allowed);
        assert!(denied.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn window_slides_rather_than_resets() {
        let adm = admission();
        let start = 1_000_000;
        // 30 requests at t0, 30 more at t0+30s: full.
        for _ in 0..30 {
            assert!(adm.admit_at("shop-a", start).allowed);
        }
        for _ in 0..30 {
            assert!(adm.admit_at("shop-a", start + 30_000).allowed);
        }
        assert!(!adm.admit_at("shop-a", start + 59_000).allowed);

        // After the first batch ages out, those slots free up.
        assert!(adm.admit_at("shop-a", start + 60_001).allowed);
    }

    #[test]
    fn retry_after_tracks_oldest_request() {
        let adm = admission();
        let now = 1_000_000;
        for _ in 0..60 {
            adm.admit_at("shop-a", now);
        }
        let denied = adm.admit_at("shop-a", now + 10_000);
        assert_eq!(denied.retry_after_ms, Some(50_000));
    }

    #[test]
    fn shops_are_independent() {
        let adm = admission();
        let now = 1_000_000;
        for _ in 0..60 {
            assert!(adm.admit_at("shop-a", now).allowed);
        }
        assert!(!adm.admit_at("shop-a", now).allowed);
        assert!(adm.admit_at("shop-b", now).allowed);
        assert_eq!(adm.shop_count(), 2);
    }
}
