//! REST implementation of [`ArchiveStore`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vitrine_domain::error::{Error, Result};
use vitrine_domain::history::HistoryEntry;

use crate::ArchiveStore;

/// A REST client for the archive service.
///
/// Created once and reused; the underlying `reqwest::Client` maintains a
/// connection pool.
pub struct RestArchiveClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ArchiveRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    entries: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct ArchiveResponse {
    conversation_id: String,
}

#[derive(Deserialize)]
struct RecentResponse {
    #[serde(default)]
    entries: Vec<HistoryEntry>,
}

impl RestArchiveClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::Archive(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl ArchiveStore for RestArchiveClient {
    async fn archive(
        &self,
        session_id: &str,
        conversation_id: Option<&str>,
        entries: &[HistoryEntry],
    ) -> Result<String> {
        let url = format!("{}/sessions/{}/archive", self.base_url, session_id);
        let body = ArchiveRequest {
            conversation_id,
            entries,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Archive(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Archive(format!("archive HTTP {}", status.as_u16())));
        }

        let parsed: ArchiveResponse = resp
            .json()
            .await
            .map_err(|e| Error::Archive(e.to_string()))?;
        Ok(parsed.conversation_id)
    }

    async fn load_recent(&self, session_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let url = format!(
            "{}/sessions/{}/recent?limit={}",
            self.base_url, session_id, limit
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Archive(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Archive(format!(
                "load_recent HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: RecentResponse = resp
            .json()
            .await
            .map_err(|e| Error::Archive(e.to_string()))?;
        Ok(parsed.entries)
    }
}
