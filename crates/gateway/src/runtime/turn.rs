//! Chat turn execution — the loop that streams the LLM response,
//! intercepts tool calls, dispatches them, and resumes generation.
//!
//! Entry point: [`run_chat_turn`] spawns the async loop and returns a
//! channel of [`ChatEvent`]s the SSE handler drains.

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

use vitrine_domain::history::{HistoryEntry, ToolInvocation};
use vitrine_domain::stream::StreamEvent;
use vitrine_mcp_client::normalize::cart_key_of;
use vitrine_mcp_client::{registry, ToolCallContext};
use vitrine_providers::ChatRequest;
use vitrine_sessions::SessionHandle;

use crate::state::AppState;

/// Tool-call iterations per turn before the loop drains into FINAL.
const MAX_TOOL_LOOPS: usize = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatEvent — what the SSE handler renders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during one chat turn, in wire order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// Always first: the (possibly freshly minted) session id.
    #[serde(rename = "session")]
    Session { session_id: String },

    /// Incremental assistant text.
    #[serde(rename = "delta")]
    Delta { text: String },

    /// A tool is about to run.
    #[serde(rename = "status")]
    Status { message: String },

    /// Terminal failure; the stream closes after this.
    #[serde(rename = "error")]
    Error { message: String },

    /// Normal termination (`data: [DONE]` on the wire).
    #[serde(rename = "done")]
    Done,
}

/// Input to a single chat turn.
pub struct ChatTurnInput {
    pub session: SessionHandle,
    pub user_message: String,
    /// Cart id supplied by the widget, stored before the turn runs.
    pub cart_id: Option<String>,
    /// Token of an authenticated customer, surfaced to the model.
    pub customer_token: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_chat_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one chat turn on a spawned task; the receiver feeds the SSE
/// response. A failed send means the client is gone — the loop stops
/// without emitting anything further.
pub fn run_chat_turn(state: AppState, input: ChatTurnInput) -> mpsc::Receiver<ChatEvent> {
    let (tx, rx) = mpsc::channel::<ChatEvent>(64);

    let session_id = input.session.session_id().to_owned();
    let span = tracing::info_span!("chat_turn", session_id = %session_id);
    tokio::spawn(tracing::Instrument::instrument(
        async move {
            match run_chat_turn_inner(state, input, &tx).await {
                Ok(()) => {}
                Err(TurnAbort::ClientGone) => {
                    tracing::debug!("client disconnected, turn abandoned");
                }
                Err(TurnAbort::Fatal(message)) => {
                    tracing::error!(error = %message, "chat turn failed");
                    let _ = tx
                        .send(ChatEvent::Error {
                            message: "assistant_unavailable".into(),
                        })
                        .await;
                }
            }
        },
        span,
    ));

    rx
}

/// Why the turn stopped early.
enum TurnAbort {
    /// The SSE consumer dropped; stop quietly.
    ClientGone,
    /// Unexpected failure; surfaced as an opaque `error` event.
    Fatal(String),
}

fn fatal(e: impl std::fmt::Display) -> TurnAbort {
    TurnAbort::Fatal(e.to_string())
}

async fn emit(tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<(), TurnAbort> {
    tx.send(event).await.map_err(|_| TurnAbort::ClientGone)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_chat_turn_inner(
    state: AppState,
    input: ChatTurnInput,
    tx: &mpsc::Sender<ChatEvent>,
) -> Result<(), TurnAbort> {
    let session = &input.session;

    // 1. Session id first, so a brand-new client can persist it
    //    before any other frame arrives.
    emit(
        tx,
        ChatEvent::Session {
            session_id: session.session_id().to_owned(),
        },
    )
    .await?;

    if let Some(ref cart_id) = input.cart_id {
        session.set_cart_id(cart_id.clone()).await.map_err(fatal)?;
    }

    // 2. Persist the user turn.
    session
        .append(HistoryEntry::user(&input.user_message))
        .await
        .map_err(fatal)?;

    // 3. Greeting prefilter: canned reply, no LLM round-trip.
    if state.greeting.is_greeting(&input.user_message) {
        let reply = state.greeting.reply().to_owned();
        emit(tx, ChatEvent::Delta { text: reply.clone() }).await?;
        session
            .append(HistoryEntry::assistant(reply))
            .await
            .map_err(fatal)?;
        emit(tx, ChatEvent::Done).await?;
        return Ok(());
    }

    let Some(llm) = state.llm.clone() else {
        return Err(TurnAbort::Fatal("no LLM provider configured".into()));
    };

    // 4. Assemble the LLM input.
    let mut messages = assemble_messages(&state, session, &input).await?;
    let tools = registry::definitions().to_vec();

    // 5. Tool loop.
    let mut call_seq = 0usize;
    let mut last_text = String::new();

    for loop_idx in 0..MAX_TOOL_LOOPS {
        tracing::debug!(loop_idx, "tool loop iteration");

        let req = ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
        };
        let mut stream = llm.chat_stream(&req).await.map_err(fatal)?;

        let mut iteration_text = String::new();
        let mut pending_calls: Vec<ToolInvocation> = Vec::new();

        // Consume the stream to its natural end even after a tool call
        // shows up, so trailing usage metadata is captured.
        while let Some(event) = stream.next().await {
            match event.map_err(fatal)? {
                StreamEvent::Text { text } => {
                    emit(tx, ChatEvent::Delta { text: text.clone() }).await?;
                    iteration_text.push_str(&text);
                }
                StreamEvent::ToolCall { name, arguments } => {
                    pending_calls.push(ToolInvocation { name, arguments });
                }
                StreamEvent::Usage(usage) => {
                    tracing::info!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        total_tokens = usage.total_tokens,
                        "llm usage"
                    );
                }
            }
        }

        last_text = iteration_text;

        // No tool call: this iteration's text is the final answer.
        if pending_calls.is_empty() {
            break;
        }

        // Persist the assistant tool-calls turn (empty content), then a
        // tool turn per call, and extend the working messages with the
        // same entries so the next iteration sees them.
        let assistant_entry = HistoryEntry::assistant_tool_calls(pending_calls.clone());
        session.append(assistant_entry.clone()).await.map_err(fatal)?;
        messages.push(assistant_entry);

        for call in &pending_calls {
            call_seq += 1;
            emit(
                tx,
                ChatEvent::Status {
                    message: format!("Using tool: {}", call.name),
                },
            )
            .await?;

            // Resolved per call: an update_cart earlier in this batch may
            // have stored a fresh cart key, and later cart-scoped calls
            // must canonicalize against it.
            let cart_key = session
                .cart_id()
                .await
                .map_err(fatal)?
                .and_then(|c| cart_key_of(&c).map(str::to_owned));
            let ctx = ToolCallContext { cart_key };
            let outcome = state.tools.call(&call.name, call.arguments.clone(), &ctx).await;

            // Both results and errors are persisted; the model explains
            // failures to the user.
            let content = match &outcome {
                Ok(result) => result.to_string(),
                Err(error) => serde_json::to_string(error)
                    .unwrap_or_else(|_| format!("{{\"code\":{},\"message\":\"tool failed\"}}", error.code)),
            };

            if call.name == registry::UPDATE_CART {
                if let Ok(ref result) = outcome {
                    store_returned_cart_id(session, result).await;
                }
            }

            let tool_entry =
                HistoryEntry::tool_result(&call.name, format!("call_{call_seq}"), content);
            session.append(tool_entry.clone()).await.map_err(fatal)?;
            messages.push(tool_entry);
        }

        if loop_idx == MAX_TOOL_LOOPS - 1 {
            tracing::warn!(
                iterations = MAX_TOOL_LOOPS,
                "tool loop limit reached, draining to final"
            );
        }
    }

    // 6. Final: persist whatever text the last iteration produced, then
    //    close the stream.
    if !last_text.is_empty() {
        session
            .append(HistoryEntry::assistant(last_text))
            .await
            .map_err(fatal)?;
    }
    emit(tx, ChatEvent::Done).await?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the LLM input: persona, tool schema, session context, and the
/// history tail (which already contains the just-appended user turn).
async fn assemble_messages(
    state: &AppState,
    session: &SessionHandle,
    input: &ChatTurnInput,
) -> Result<Vec<HistoryEntry>, TurnAbort> {
    let mut messages = Vec::new();

    messages.push(HistoryEntry::system(&state.config.shop.persona));
    messages.push(HistoryEntry::system(format!(
        "Available tools (JSON schema): {}",
        registry::schema_summary()
    )));

    let mut context_lines = Vec::new();
    if let Some(cart_id) = session.cart_id().await.map_err(fatal)? {
        context_lines.push(format!("Active cart: {cart_id}"));
    }
    if let Some(ref token) = input.customer_token {
        context_lines.push(format!("Authenticated customer token: {token}"));
    }
    if !context_lines.is_empty() {
        messages.push(HistoryEntry::system(context_lines.join("\n")));
    }

    let views = session.recent_product_views().await.map_err(fatal)?;
    if !views.is_empty() {
        let listed = views
            .iter()
            .rev()
            .take(3)
            .map(|v| {
                v.product_title
                    .clone()
                    .unwrap_or_else(|| v.product_id.clone())
            })
            .collect::<Vec<_>>()
            .join(", ");
        messages.push(HistoryEntry::system(format!(
            "Recently viewed products: {listed}"
        )));
    }

    let history = session.history().await.map_err(fatal)?;
    let tail_len = state.config.sessions.history_tail;
    let start = history.len().saturating_sub(tail_len);
    messages.extend(history.into_iter().skip(start));

    Ok(messages)
}

/// `update_cart` without a cart id makes the remote service mint one;
/// remember it so follow-up calls reuse the same cart.
async fn store_returned_cart_id(session: &SessionHandle, result: &serde_json::Value) {
    let returned = result
        .get("cart_id")
        .and_then(|v| v.as_str())
        .or_else(|| {
            result
                .get("cart")
                .and_then(|c| c.get("id"))
                .and_then(|v| v.as_str())
        });

    if let Some(id) = returned {
        if let Err(e) = session.set_cart_id(id.to_owned()).await {
            tracing::warn!(error = %e, "failed to store returned cart id");
        }
    }
}
