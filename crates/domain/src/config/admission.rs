use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admission (per-shop sliding window)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests allowed per shop key within `window_ms`.
    #[serde(default = "d_max_requests")]
    pub max_requests: usize,

    #[serde(default = "d_window_ms")]
    pub window_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: d_max_requests(),
            window_ms: d_window_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_max_requests() -> usize {
    60
}
fn d_window_ms() -> u64 {
    60_000
}
