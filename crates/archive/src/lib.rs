//! Client for the external archive store.
//!
//! The archive is the durable fallback for evicted sessions: older
//! history entries are appended to it asynchronously, and a freshly
//! created actor rehydrates from it. Failures are logged and never
//! propagated to the request path.

mod rest;

use std::sync::Arc;

use async_trait::async_trait;

use vitrine_domain::config::ArchiveConfig;
use vitrine_domain::error::Result;
use vitrine_domain::history::HistoryEntry;

pub use rest::RestArchiveClient;

/// The two operations the archive collaborator exposes.
///
/// `archive` is idempotent under the same `conversation_id`;
/// `load_recent` returns entries ordered newest-last.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn archive(
        &self,
        session_id: &str,
        conversation_id: Option<&str>,
        entries: &[HistoryEntry],
    ) -> Result<String>;

    async fn load_recent(&self, session_id: &str, limit: usize) -> Result<Vec<HistoryEntry>>;
}

/// Build the archive client from config: REST when a base URL is set,
/// otherwise the in-process no-op.
pub fn create_store(cfg: &ArchiveConfig) -> Result<Arc<dyn ArchiveStore>> {
    match cfg.base_url {
        Some(ref url) if !url.is_empty() => {
            Ok(Arc::new(RestArchiveClient::new(url, cfg.timeout_ms)?))
        }
        _ => Ok(Arc::new(NoopArchive)),
    }
}

/// Used when no archive service is configured (dev, tests): archival is
/// accepted and dropped, rehydration finds nothing.
pub struct NoopArchive;

#[async_trait]
impl ArchiveStore for NoopArchive {
    async fn archive(
        &self,
        _session_id: &str,
        conversation_id: Option<&str>,
        _entries: &[HistoryEntry],
    ) -> Result<String> {
        Ok(conversation_id
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
    }

    async fn load_recent(&self, _session_id: &str, _limit: usize) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_archive_echoes_conversation_id() {
        let store = NoopArchive;
        let id = store
            .archive("s1", Some("conv-7"), &[HistoryEntry::user("hej")])
            .await
            .unwrap();
        assert_eq!(id, "conv-7");
    }

    #[tokio::test]
    async fn noop_archive_mints_conversation_id_when_absent() {
        let store = NoopArchive;
        let id = store.archive("s1", None, &[]).await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn noop_load_recent_is_empty() {
        let store = NoopArchive;
        assert!(store.load_recent("s1", 50).await.unwrap().is_empty());
    }

    #[test]
    fn create_store_defaults_to_noop() {
        let store = create_store(&ArchiveConfig::default());
        assert!(store.is_ok());
    }
}
