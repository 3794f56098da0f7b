//! Session state and its invariants.
//!
//! Pure data + arithmetic, exercised directly by the actor; every method
//! that depends on time takes `now_ms` so the invariants are testable
//! without a clock.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use vitrine_domain::config::SessionsConfig;
use vitrine_domain::history::HistoryEntry;

/// A product the visitor looked at, reported by the storefront widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    /// View duration in milliseconds.
    pub duration: u64,
    pub ts: i64,
}

/// Caps and windows enforced by the state, lifted from config once.
#[derive(Debug, Clone, Copy)]
pub struct SessionCaps {
    pub history_cap: usize,
    pub archive_watermark: usize,
    pub product_views_cap: usize,
    pub rate_limit_max: u32,
    pub rate_window_ms: i64,
    pub replay_ttl_ms: i64,
}

impl From<&SessionsConfig> for SessionCaps {
    fn from(cfg: &SessionsConfig) -> Self {
        Self {
            history_cap: cfg.history_cap,
            archive_watermark: cfg.archive_watermark,
            product_views_cap: cfg.product_views_cap,
            rate_limit_max: cfg.rate_limit_max,
            rate_window_ms: cfg.rate_window_ms as i64,
            replay_ttl_ms: (cfg.replay_ttl_secs * 1_000) as i64,
        }
    }
}

struct RateCounter {
    window_start_ms: i64,
    count: u32,
}

/// The state owned by one session actor.
pub struct SessionState {
    session_id: String,
    history: VecDeque<HistoryEntry>,
    cart_id: Option<String>,
    last_product_view: Option<ProductView>,
    product_views: VecDeque<ProductView>,
    rate: RateCounter,
    /// Accepted signatures with their record time.
    replay_nonces: HashMap<String, i64>,
    caps: SessionCaps,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, caps: SessionCaps) -> Self {
        Self {
            session_id: session_id.into(),
            history: VecDeque::new(),
            cart_id: None,
            last_product_view: None,
            product_views: VecDeque::new(),
            rate: RateCounter {
                window_start_ms: 0,
                count: 0,
            },
            replay_nonces: HashMap::new(),
            caps,
        }
    }

    /// Seed history from archived entries (newest-last).
    pub fn seed_history(&mut self, entries: Vec<HistoryEntry>) {
        self.history = entries.into();
        self.trim_history();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Replace the session id. Only the first non-conflicting assignment
    /// sticks; re-assigning the same id is a no-op.
    pub fn set_session_id(&mut self, id: &str) -> bool {
        if self.session_id.is_empty() {
            self.session_id = id.to_owned();
            return true;
        }
        self.session_id == id
    }

    // ── History ─────────────────────────────────────────────────────

    /// Push an entry and trim to the cap. Returns the stored length.
    pub fn append(&mut self, entry: HistoryEntry) -> usize {
        self.history.push_back(entry);
        self.trim_history();
        self.history.len()
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.caps.history_cap {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drain entries older than the archive watermark, oldest first.
    /// Returns `None` while the watermark has not been crossed.
    pub fn take_archive_batch(&mut self) -> Option<Vec<HistoryEntry>> {
        if self.history.len() <= self.caps.archive_watermark {
            return None;
        }
        let surplus = self.history.len() - self.caps.archive_watermark;
        let batch: Vec<HistoryEntry> = self.history.drain(..surplus).collect();
        Some(batch)
    }

    // ── Cart ────────────────────────────────────────────────────────

    pub fn set_cart_id(&mut self, id: String) {
        self.cart_id = Some(id);
    }

    pub fn cart_id(&self) -> Option<String> {
        self.cart_id.clone()
    }

    // ── Product views ───────────────────────────────────────────────

    pub fn track_product_view(&mut self, view: ProductView) {
        self.last_product_view = Some(view.clone());
        self.product_views.push_back(view);
        while self.product_views.len() > self.caps.product_views_cap {
            self.product_views.pop_front();
        }
    }

    pub fn recent_product_views(&self) -> Vec<ProductView> {
        self.product_views.iter().cloned().collect()
    }

    pub fn last_product_view(&self) -> Option<ProductView> {
        self.last_product_view.clone()
    }

    // ── Replay nonces ───────────────────────────────────────────────

    /// Returns `true` when the signature was already recorded (replay).
    /// Otherwise records it and returns `false`. Expired nonces are
    /// pruned opportunistically.
    pub fn replay_check(&mut self, signature: &str, now_ms: i64) -> bool {
        let ttl = self.caps.replay_ttl_ms;
        self.replay_nonces.retain(|_, seen| now_ms - *seen < ttl);

        if self.replay_nonces.contains_key(signature) {
            return true;
        }
        self.replay_nonces.insert(signature.to_owned(), now_ms);
        false
    }

    // ── Rate counter ────────────────────────────────────────────────

    /// Count a request against the per-session window. `true` = admitted.
    pub fn rate_ok(&mut self, now_ms: i64) -> bool {
        if now_ms - self.rate.window_start_ms >= self.caps.rate_window_ms {
            self.rate.window_start_ms = now_ms;
            self.rate.count = 1;
            return true;
        }
        if self.rate.count < self.caps.rate_limit_max {
            self.rate.count += 1;
            return true;
        }
        false
    }

    /// Milliseconds until the current rate window rolls over.
    pub fn rate_retry_after_ms(&self, now_ms: i64) -> i64 {
        (self.rate.window_start_ms + self.caps.rate_window_ms - now_ms).max(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> SessionCaps {
        SessionCaps::from(&SessionsConfig::default())
    }

    fn view(id: &str) -> ProductView {
        ProductView {
            product_id: id.into(),
            product_type: None,
            product_title: None,
            duration: 1200,
            ts: 0,
        }
    }

    #[test]
    fn history_never_exceeds_cap() {
        let mut state = SessionState::new("s", caps());
        for i in 0..250 {
            state.append(HistoryEntry::user(format!("m{i}")));
            // Drain archive batches the way the actor does, so the cap
            // invariant is exercised independently of archival.
            let _ = state.take_archive_batch();
        }
        assert!(state.history_len() <= 200);
    }

    #[test]
    fn history_trims_oldest_first() {
        let mut small = caps();
        small.history_cap = 3;
        small.archive_watermark = 100;
        let mut state = SessionState::new("s", small);
        for i in 0..5 {
            state.append(HistoryEntry::user(format!("m{i}")));
        }
        let contents: Vec<String> = state.history().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn archive_batch_drains_past_watermark() {
        let mut small = caps();
        small.archive_watermark = 4;
        let mut state = SessionState::new("s", small);
        for i in 0..4 {
            state.append(HistoryEntry::user(format!("m{i}")));
            assert!(state.take_archive_batch().is_none());
        }
        state.append(HistoryEntry::user("m4"));
        let batch = state.take_archive_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].content, "m0");
        assert_eq!(state.history_len(), 4);
    }

    #[test]
    fn product_views_ring_caps_at_ten() {
        let mut state = SessionState::new("s", caps());
        for i in 0..15 {
            state.track_product_view(view(&format!("p{i}")));
        }
        let views = state.recent_product_views();
        assert_eq!(views.len(), 10);
        assert_eq!(views[0].product_id, "p5");
        assert_eq!(state.last_product_view().unwrap().product_id, "p14");
    }

    #[test]
    fn rate_allows_twenty_then_denies() {
        let mut state = SessionState::new("s", caps());
        let now = 1_000_000;
        for _ in 0..20 {
            assert!(state.rate_ok(now));
        }
        assert!(!state.rate_ok(now));
        assert!(state.rate_retry_after_ms(now) > 0);
    }

    #[test]
    fn rate_window_rolls_over() {
        let mut state = SessionState::new("s", caps());
        let now = 1_000_000;
        for _ in 0..20 {
            assert!(state.rate_ok(now));
        }
        assert!(!state.rate_ok(now + 59_999));
        assert!(state.rate_ok(now + 60_000));
    }

    #[test]
    fn replay_detects_duplicate_signature() {
        let mut state = SessionState::new("s", caps());
        assert!(!state.replay_check("sig-a", 0));
        assert!(state.replay_check("sig-a", 1_000));
        assert!(!state.replay_check("sig-b", 1_000));
    }

    #[test]
    fn replay_nonce_expires_after_ttl() {
        let mut state = SessionState::new("s", caps());
        assert!(!state.replay_check("sig-a", 0));
        // Ten minutes later the nonce is gone and the signature is
        // accepted again (the ±300 s timestamp window has long since
        // rejected such requests anyway).
        assert!(!state.replay_check("sig-a", 600_000));
    }

    #[test]
    fn set_session_id_is_idempotent() {
        let mut state = SessionState::new("visitor-1", caps());
        assert!(state.set_session_id("visitor-1"));
        assert!(!state.set_session_id("other"));
        assert_eq!(state.session_id(), "visitor-1");
    }

    #[test]
    fn seed_history_respects_cap() {
        let mut state = SessionState::new("s", caps());
        let entries: Vec<HistoryEntry> =
            (0..300).map(|i| HistoryEntry::user(format!("m{i}"))).collect();
        state.seed_history(entries);
        assert_eq!(state.history_len(), 200);
        assert_eq!(state.history()[0].content, "m100");
    }
}
