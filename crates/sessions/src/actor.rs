//! The session actor: one tokio task per `session_id`, fed by a typed
//! mailbox. The mailbox is the serialization point — at most one op runs
//! at a time, and ops within a session are totally ordered by arrival.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use vitrine_archive::ArchiveStore;
use vitrine_domain::error::{Error, Result};
use vitrine_domain::history::{now_ms, HistoryEntry};

use crate::state::{ProductView, SessionState};

/// Mailbox depth. Ops are tiny; a full mailbox only means a hot session.
const MAILBOX_CAPACITY: usize = 64;

pub(crate) enum SessionOp {
    Append {
        entry: HistoryEntry,
        reply: oneshot::Sender<usize>,
    },
    History {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    CartId {
        reply: oneshot::Sender<Option<String>>,
    },
    SetCartId {
        id: String,
        reply: oneshot::Sender<()>,
    },
    SetSessionId {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    TrackProductView {
        view: ProductView,
        reply: oneshot::Sender<()>,
    },
    ReplayCheck {
        signature: String,
        reply: oneshot::Sender<bool>,
    },
    RateOk {
        reply: oneshot::Sender<(bool, i64)>,
    },
    RecentViews {
        reply: oneshot::Sender<Vec<ProductView>>,
    },
}

/// Cheap cloneable handle to a session actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    tx: mpsc::Sender<SessionOp>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionOp,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::Other("session actor is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Other("session actor dropped the reply".into()))
    }

    /// Push an entry; returns the stored history length.
    pub async fn append(&self, entry: HistoryEntry) -> Result<usize> {
        self.send(|reply| SessionOp::Append { entry, reply }).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.send(|reply| SessionOp::History { reply }).await
    }

    pub async fn cart_id(&self) -> Result<Option<String>> {
        self.send(|reply| SessionOp::CartId { reply }).await
    }

    pub async fn set_cart_id(&self, id: String) -> Result<()> {
        self.send(|reply| SessionOp::SetCartId { id, reply }).await
    }

    /// Idempotent: `true` when the id is (now) the session's id.
    pub async fn set_session_id(&self, id: String) -> Result<bool> {
        self.send(|reply| SessionOp::SetSessionId { id, reply }).await
    }

    pub async fn track_product_view(&self, view: ProductView) -> Result<()> {
        self.send(|reply| SessionOp::TrackProductView { view, reply })
            .await
    }

    /// `true` when the signature was seen before (replay).
    pub async fn replay_check(&self, signature: String) -> Result<bool> {
        self.send(|reply| SessionOp::ReplayCheck { signature, reply })
            .await
    }

    /// `(admitted, retry_after_ms)`.
    pub async fn rate_ok(&self) -> Result<(bool, i64)> {
        self.send(|reply| SessionOp::RateOk { reply }).await
    }

    pub async fn recent_product_views(&self) -> Result<Vec<ProductView>> {
        self.send(|reply| SessionOp::RecentViews { reply }).await
    }
}

/// Spawn the actor task for `state` and return its handle.
pub(crate) fn spawn_actor(
    state: SessionState,
    archive: Arc<dyn ArchiveStore>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let session_id = state.session_id().to_owned();

    tokio::spawn(run_actor(state, rx, archive));

    SessionHandle { session_id, tx }
}

async fn run_actor(
    mut state: SessionState,
    mut rx: mpsc::Receiver<SessionOp>,
    archive: Arc<dyn ArchiveStore>,
) {
    // Conversation id minted by the archive on first write; shared with
    // the fire-and-forget tasks so later batches stay idempotent.
    let conversation_id: Arc<parking_lot::Mutex<Option<String>>> = Default::default();

    while let Some(op) = rx.recv().await {
        match op {
            SessionOp::Append { entry, reply } => {
                let len = state.append(entry);
                let _ = reply.send(len);

                // Archival never blocks appends: drain the batch here,
                // ship it on a spawned task.
                if let Some(batch) = state.take_archive_batch() {
                    spawn_archive_task(
                        archive.clone(),
                        state.session_id().to_owned(),
                        conversation_id.clone(),
                        batch,
                    );
                }
            }
            SessionOp::History { reply } => {
                let _ = reply.send(state.history());
            }
            SessionOp::CartId { reply } => {
                let _ = reply.send(state.cart_id());
            }
            SessionOp::SetCartId { id, reply } => {
                state.set_cart_id(id);
                let _ = reply.send(());
            }
            SessionOp::SetSessionId { id, reply } => {
                let _ = reply.send(state.set_session_id(&id));
            }
            SessionOp::TrackProductView { view, reply } => {
                state.track_product_view(view);
                let _ = reply.send(());
            }
            SessionOp::ReplayCheck { signature, reply } => {
                let _ = reply.send(state.replay_check(&signature, now_ms()));
            }
            SessionOp::RateOk { reply } => {
                let now = now_ms();
                let admitted = state.rate_ok(now);
                let retry_after = if admitted {
                    0
                } else {
                    state.rate_retry_after_ms(now)
                };
                let _ = reply.send((admitted, retry_after));
            }
            SessionOp::RecentViews { reply } => {
                let _ = reply.send(state.recent_product_views());
            }
        }
    }

    tracing::debug!(session_id = state.session_id(), "session actor stopped");
}

fn spawn_archive_task(
    archive: Arc<dyn ArchiveStore>,
    session_id: String,
    conversation_id: Arc<parking_lot::Mutex<Option<String>>>,
    batch: Vec<HistoryEntry>,
) {
    tokio::spawn(async move {
        let known = conversation_id.lock().clone();
        match archive
            .archive(&session_id, known.as_deref(), &batch)
            .await
        {
            Ok(id) => {
                *conversation_id.lock() = Some(id);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    entries = batch.len(),
                    error = %e,
                    "history archival failed"
                );
            }
        }
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
