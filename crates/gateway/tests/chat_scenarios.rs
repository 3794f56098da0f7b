//! End-to-end chat-turn scenarios against scripted doubles for the LLM
//! transport and the tool dispatcher.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use vitrine_domain::config::Config;
use vitrine_domain::error::Result;
use vitrine_domain::history::Role;
use vitrine_domain::stream::{BoxStream, StreamEvent};
use vitrine_gateway::runtime::greeting::GreetingFilter;
use vitrine_gateway::runtime::{run_chat_turn, ChatEvent, ChatTurnInput};
use vitrine_gateway::security::admission::Admission;
use vitrine_gateway::state::AppState;
use vitrine_mcp_client::{JsonRpcError, ToolCallContext, ToolDispatcher, ToolOutcome};
use vitrine_providers::{ChatRequest, LlmProvider};
use vitrine_sessions::{SessionHandle, SessionRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Script {
    /// One event list per LLM call, in order.
    Sequence(Mutex<VecDeque<Vec<StreamEvent>>>),
    /// The same event list for every call (tool-loop ceiling).
    Always(Vec<StreamEvent>),
}

struct ScriptedLlm {
    script: Script,
}

impl ScriptedLlm {
    fn sequence(turns: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Sequence(Mutex::new(turns.into())),
        })
    }

    fn always(events: Vec<StreamEvent>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Always(events),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let events = match &self.script {
            Script::Sequence(turns) => turns.lock().pop_front().unwrap_or_default(),
            Script::Always(events) => events.clone(),
        };
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

struct RecordedCall {
    tool: String,
    #[allow(dead_code)]
    args: Value,
    cart_key: Option<String>,
}

struct ScriptedTools {
    outcomes: Mutex<VecDeque<ToolOutcome>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTools {
    fn new(outcomes: Vec<ToolOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn cart_key_of_call(&self, index: usize) -> Option<String> {
        self.calls.lock()[index].cart_key.clone()
    }
}

#[async_trait]
impl ToolDispatcher for ScriptedTools {
    async fn call(&self, tool: &str, args: Value, ctx: &ToolCallContext) -> ToolOutcome {
        self.calls.lock().push(RecordedCall {
            tool: tool.to_owned(),
            args,
            cart_key: ctx.cart_key.clone(),
        });
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn test_state(
    llm: Option<Arc<dyn LlmProvider>>,
    tools: Arc<dyn ToolDispatcher>,
) -> AppState {
    let mut config = Config::default();
    config.shop.domain = "example.myshopify.com".into();
    let config = Arc::new(config);

    AppState {
        sessions: Arc::new(SessionRegistry::new(
            &config.sessions,
            Arc::new(vitrine_archive::NoopArchive),
        )),
        admission: Arc::new(Admission::new(&config.admission)),
        greeting: Arc::new(GreetingFilter::from_config(&config.shop)),
        tools,
        llm,
        app_secret: None,
        config,
    }
}

async fn new_session(state: &AppState) -> SessionHandle {
    let id = SessionRegistry::mint_session_id();
    state.sessions.get_or_create(&id).await
}

async fn drive(state: &AppState, session: SessionHandle, message: &str) -> Vec<ChatEvent> {
    let mut rx = run_chat_turn(
        state.clone(),
        ChatTurnInput {
            session,
            user_message: message.to_owned(),
            cart_id: None,
            customer_token: None,
        },
    );

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn tool_call_event(name: &str, args: Value) -> StreamEvent {
    StreamEvent::ToolCall {
        name: name.into(),
        arguments: args,
    }
}

fn text_event(text: &str) -> StreamEvent {
    StreamEvent::Text { text: text.into() }
}

fn deltas(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Delta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn has_error(events: &[ChatEvent]) -> bool {
    events.iter().any(|e| matches!(e, ChatEvent::Error { .. }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn cold_greeting_answers_without_llm() {
    // No LLM configured at all: the prefilter must still answer.
    let tools = ScriptedTools::new(vec![]);
    let state = test_state(None, tools);
    let session = new_session(&state).await;
    let session_id = session.session_id().to_owned();

    let events = drive(&state, session.clone(), "cześć").await;

    assert!(matches!(
        &events[0],
        ChatEvent::Session { session_id: sid } if *sid == session_id
    ));
    let reply = state.greeting.reply().to_owned();
    assert_eq!(deltas(&events), reply);
    assert!(matches!(events.last(), Some(ChatEvent::Done)));
    assert!(!has_error(&events));

    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "cześć");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, reply);
}

#[tokio::test]
async fn product_search_runs_tool_then_answers() {
    let llm = ScriptedLlm::sequence(vec![
        vec![tool_call_event(
            "search_shop_catalog",
            serde_json::json!({"query": "pierścionki", "context": "biżuteria"}),
        )],
        vec![text_event("Mamy dwa modele: "), text_event("Aurora i Luna.")],
    ]);
    let tools = ScriptedTools::new(vec![Ok(serde_json::json!({
        "products": [{"title": "Aurora"}, {"title": "Luna"}]
    }))]);
    let state = test_state(Some(llm), tools.clone());
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "pokaż pierścionki").await;

    // Event shape: session, status, deltas, done.
    assert!(matches!(events[0], ChatEvent::Session { .. }));
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Status { message } if message == "Using tool: search_shop_catalog"
    )));
    assert_eq!(deltas(&events), "Mamy dwa modele: Aurora i Luna.");
    assert!(matches!(events.last(), Some(ChatEvent::Done)));

    // Persisted turn bracketing: user, assistant(tool_calls), tool, assistant.
    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, Role::User);
    assert!(history[1].has_tool_calls());
    assert!(history[1].content.is_empty());
    assert_eq!(history[2].role, Role::Tool);
    assert!(history[2].content.contains("Aurora"));
    assert_eq!(history[3].role, Role::Assistant);
    assert_eq!(history[3].content, "Mamy dwa modele: Aurora i Luna.");

    assert_eq!(tools.call_count(), 1);
}

#[tokio::test]
async fn tool_outage_fallback_is_not_an_error() {
    // The HTTP client maps a 522 to this fallback result (covered by its
    // own tests); the orchestrator must treat it as a success.
    let llm = ScriptedLlm::sequence(vec![
        vec![tool_call_event(
            "search_shop_catalog",
            serde_json::json!({"query": "pierścionki", "context": "biżuteria"}),
        )],
        vec![text_event("Przepraszam, sklep chwilowo nie odpowiada.")],
    ]);
    let tools = ScriptedTools::new(vec![Ok(serde_json::json!({
        "products": [],
        "system_note": "Store temporarily unavailable. Product search could not \
                        be completed; apologize and suggest trying again shortly."
    }))]);
    let state = test_state(Some(llm), tools);
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "pokaż pierścionki").await;

    assert!(!has_error(&events));
    assert!(matches!(events.last(), Some(ChatEvent::Done)));

    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history[2].content.contains("Store temporarily unavailable"));
    assert!(history[3].content.contains("Przepraszam"));
}

#[tokio::test]
async fn tool_error_is_persisted_and_explained() {
    let llm = ScriptedLlm::sequence(vec![
        vec![tool_call_event(
            "get_order_status",
            serde_json::json!({"order_id": "1001"}),
        )],
        vec![text_event("Nie udało się sprawdzić zamówienia.")],
    ]);
    let tools = ScriptedTools::new(vec![Err(JsonRpcError::new(
        -32000,
        "tool service timed out",
    ))]);
    let state = test_state(Some(llm), tools);
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "gdzie moje zamówienie 1001?").await;

    // Transport-level tool failures are recoverable: no error event.
    assert!(!has_error(&events));

    let history = session.history().await.unwrap();
    assert_eq!(history[2].role, Role::Tool);
    assert!(history[2].content.contains("-32000"));
    assert!(history[2].content.contains("tool service timed out"));
}

#[tokio::test]
async fn tool_loop_stops_after_five_iterations() {
    // A model that calls a tool on every turn.
    let llm = ScriptedLlm::always(vec![tool_call_event(
        "search_shop_catalog",
        serde_json::json!({"query": "więcej", "context": "biżuteria"}),
    )]);
    let tools = ScriptedTools::new(vec![]);
    let state = test_state(Some(llm), tools.clone());
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "pokaż wszystko").await;

    assert!(matches!(events.last(), Some(ChatEvent::Done)));
    assert!(!has_error(&events));
    assert_eq!(tools.call_count(), 5);

    let history = session.history().await.unwrap();
    let tool_turns = history.iter().filter(|e| e.role == Role::Tool).count();
    assert_eq!(tool_turns, 5);
    // user + 5 * (assistant tool_calls + tool result), no final text.
    assert_eq!(history.len(), 11);
}

#[tokio::test]
async fn missing_llm_surfaces_error_event() {
    let tools = ScriptedTools::new(vec![]);
    let state = test_state(None, tools);
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "pokaż pierścionki").await;

    assert!(matches!(events[0], ChatEvent::Session { .. }));
    assert!(has_error(&events));
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Done)));

    // The user turn is still persisted.
    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn turn_bracketing_holds_across_consecutive_turns() {
    let llm = ScriptedLlm::sequence(vec![
        vec![text_event("Dzień dobry, w czym pomóc?")],
        vec![tool_call_event(
            "search_shop_catalog",
            serde_json::json!({"query": "kolczyki", "context": "biżuteria"}),
        )],
        vec![text_event("Polecam kolczyki Stella.")],
    ]);
    let tools = ScriptedTools::new(vec![Ok(serde_json::json!({"products": []}))]);
    let state = test_state(Some(llm), tools);
    let session = new_session(&state).await;

    drive(&state, session.clone(), "dzień dobry, szukam prezentu").await;
    drive(&state, session.clone(), "jakieś kolczyki?").await;

    let history = session.history().await.unwrap();
    let roles: Vec<Role> = history.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant, // tool_calls
            Role::Tool,
            Role::Assistant, // final text
        ]
    );

    // Every assistant tool_calls turn is followed by exactly its tool
    // replies, in order.
    for (i, entry) in history.iter().enumerate() {
        if let Some(calls) = &entry.tool_calls {
            for (j, call) in calls.iter().enumerate() {
                let reply = &history[i + 1 + j];
                assert_eq!(reply.role, Role::Tool);
                assert_eq!(reply.name.as_deref(), Some(call.name.as_str()));
                assert!(call.arguments.is_object());
            }
        }
    }
}

#[tokio::test]
async fn text_before_tool_call_still_streams() {
    // The model narrates, then calls a tool; deltas must reach the
    // client live even though the turn continues.
    let llm = ScriptedLlm::sequence(vec![
        vec![
            text_event("Sprawdzam katalog... "),
            tool_call_event(
                "search_shop_catalog",
                serde_json::json!({"query": "broszki", "context": "biżuteria"}),
            ),
        ],
        vec![text_event("Znalazłam trzy broszki.")],
    ]);
    let tools = ScriptedTools::new(vec![Ok(serde_json::json!({"products": []}))]);
    let state = test_state(Some(llm), tools);
    let session = new_session(&state).await;

    let events = drive(&state, session.clone(), "masz broszki?").await;
    assert_eq!(
        deltas(&events),
        "Sprawdzam katalog... Znalazłam trzy broszki."
    );

    // Only the final iteration's text is persisted as the answer.
    let history = session.history().await.unwrap();
    assert_eq!(history.last().unwrap().content, "Znalazłam trzy broszki.");
}

#[tokio::test]
async fn cart_key_from_update_cart_reaches_later_calls_in_same_batch() {
    // One assistant turn invoking two tools: update_cart (the remote
    // service mints a cart) followed by get_cart. The key stored by the
    // first call must reach the second call's normalization context.
    let llm = ScriptedLlm::sequence(vec![
        vec![
            tool_call_event(
                "update_cart",
                serde_json::json!({
                    "cart_id": null,
                    "lines": [{"merchandiseId": "gid://shopify/ProductVariant/1", "quantity": 1}]
                }),
            ),
            tool_call_event(
                "get_cart",
                serde_json::json!({"cart_id": "gid://shopify/Cart/abc"}),
            ),
        ],
        vec![text_event("Dodałam do koszyka.")],
    ]);
    let tools = ScriptedTools::new(vec![
        Ok(serde_json::json!({"cart_id": "gid://shopify/Cart/abc?key=fresh"})),
        Ok(serde_json::json!({"cart": {"lines": []}})),
    ]);
    let state = test_state(Some(llm), tools.clone());
    let session = new_session(&state).await;

    drive(&state, session.clone(), "dodaj ten pierścionek do koszyka").await;

    assert_eq!(tools.call_count(), 2);
    assert_eq!(tools.calls.lock()[0].tool, "update_cart");
    // No cart known when the batch starts.
    assert_eq!(tools.cart_key_of_call(0), None);
    // The second call sees the key minted by the first.
    assert_eq!(tools.cart_key_of_call(1), Some("fresh".into()));
    assert_eq!(
        session.cart_id().await.unwrap().as_deref(),
        Some("gid://shopify/Cart/abc?key=fresh")
    );

    // Bracketing: user, assistant(two tool_calls), tool, tool, assistant.
    let history = session.history().await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[1].tool_calls.as_ref().unwrap().len(), 2);
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(history[3].role, Role::Tool);
}
