use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Most-recent history entries kept per session.
    #[serde(default = "d_history_cap")]
    pub history_cap: usize,

    /// History length at which older entries are offered to the archive.
    #[serde(default = "d_archive_watermark")]
    pub archive_watermark: usize,

    /// Product-view records kept per session.
    #[serde(default = "d_product_views_cap")]
    pub product_views_cap: usize,

    /// Per-session request ceiling within `rate_window_ms`.
    #[serde(default = "d_rate_limit_max")]
    pub rate_limit_max: u32,

    #[serde(default = "d_rate_window_ms")]
    pub rate_window_ms: u64,

    /// How long an accepted signature is remembered for replay rejection.
    #[serde(default = "d_replay_ttl_secs")]
    pub replay_ttl_secs: u64,

    /// Idle time after which a session actor is evicted from memory.
    #[serde(default = "d_idle_evict_secs")]
    pub idle_evict_secs: u64,

    /// History tail length assembled into the LLM input.
    #[serde(default = "d_history_tail")]
    pub history_tail: usize,

    /// Entries loaded from the archive when rehydrating an evicted session.
    #[serde(default = "d_rehydrate_limit")]
    pub rehydrate_limit: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            history_cap: d_history_cap(),
            archive_watermark: d_archive_watermark(),
            product_views_cap: d_product_views_cap(),
            rate_limit_max: d_rate_limit_max(),
            rate_window_ms: d_rate_window_ms(),
            replay_ttl_secs: d_replay_ttl_secs(),
            idle_evict_secs: d_idle_evict_secs(),
            history_tail: d_history_tail(),
            rehydrate_limit: d_rehydrate_limit(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_history_cap() -> usize {
    200
}
fn d_archive_watermark() -> usize {
    150
}
fn d_product_views_cap() -> usize {
    10
}
fn d_rate_limit_max() -> u32 {
    20
}
fn d_rate_window_ms() -> u64 {
    60_000
}
fn d_replay_ttl_secs() -> u64 {
    600
}
fn d_idle_evict_secs() -> u64 {
    1_800
}
fn d_history_tail() -> usize {
    20
}
fn d_rehydrate_limit() -> usize {
    50
}
