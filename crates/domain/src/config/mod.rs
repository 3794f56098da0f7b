mod admission;
mod archive;
mod llm;
mod server;
mod sessions;
mod shop;

pub use admission::*;
pub use archive::*;
pub use llm::*;
pub use server::*;
pub use sessions::*;
pub use shop::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shop: ShopConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Config {
    /// Overlay the documented environment variables onto the file config.
    ///
    /// Secrets (`SHOPIFY_APP_SECRET`, `LLM_API_KEY`, `INTERNAL_KEY`) are
    /// deliberately NOT stored here; the gateway reads them once at boot.
    pub fn apply_env(&mut self) {
        if let Ok(domain) = std::env::var("SHOP_DOMAIN") {
            if !domain.is_empty() {
                self.shop.domain = domain;
            }
        }
        if let Ok(origin) = std::env::var("ALLOWED_ORIGIN") {
            if !origin.is_empty() {
                self.server.allowed_origin = origin;
            }
        }
        if std::env::var("DEV_BYPASS").map(|v| !v.is_empty()).unwrap_or(false) {
            self.server.dev_bypass = true;
        }
    }

    /// Validate the configuration, returning all issues found.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.shop.domain.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "shop.domain".into(),
                message: "shop domain is required (set [shop] domain or SHOP_DOMAIN)".into(),
            });
        }
        if self.server.dev_bypass {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.dev_bypass".into(),
                message: "HMAC bypass on /chat is enabled — do not run this in production".into(),
            });
        }
        if self.server.allowed_origin == "*" {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.allowed_origin".into(),
                message: "CORS allows all origins".into(),
            });
        }
        if self.sessions.history_cap == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.history_cap".into(),
                message: "history cap must be at least 1".into(),
            });
        }
        if self.llm.model.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.model".into(),
                message: "model identifier must not be empty".into(),
            });
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
