use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shop / storefront
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Merchant shop domain, e.g. `example.myshopify.com`.
    /// Used to build the tool endpoint URL `https://{domain}/api/mcp`.
    #[serde(default)]
    pub domain: String,

    /// Environment variable holding the app-proxy HMAC secret.
    #[serde(default = "d_secret_env")]
    pub app_secret_env: String,

    /// Environment variable holding the optional shared secret attached
    /// as `X-Internal-Key` on tool-service calls.
    #[serde(default = "d_internal_key_env")]
    pub internal_key_env: String,

    /// Default `context` tag injected into catalog searches when the
    /// model omits one.
    #[serde(default = "d_search_context")]
    pub search_context: String,

    /// The brand/persona system prompt.
    #[serde(default = "d_persona")]
    pub persona: String,

    /// Short greetings answered without an LLM round-trip.
    #[serde(default = "d_greetings")]
    pub greetings: Vec<String>,

    /// Canned reply for the greeting prefilter.
    #[serde(default = "d_greeting_reply")]
    pub greeting_reply: String,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            app_secret_env: d_secret_env(),
            internal_key_env: d_internal_key_env(),
            search_context: d_search_context(),
            persona: d_persona(),
            greetings: d_greetings(),
            greeting_reply: d_greeting_reply(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_secret_env() -> String {
    "SHOPIFY_APP_SECRET".into()
}

fn d_internal_key_env() -> String {
    "INTERNAL_KEY".into()
}

fn d_search_context() -> String {
    "biżuteria".into()
}

fn d_persona() -> String {
    "Jesteś doradcą klienta sklepu jubilerskiego. Odpowiadasz po polsku, \
     krótko i rzeczowo. Gdy pytanie dotyczy produktów, cen, koszyka lub \
     zamówień, korzystasz z dostępnych narzędzi zamiast zgadywać. Nie \
     obiecujesz rabatów ani terminów dostawy, których nie potwierdza sklep."
        .into()
}

fn d_greetings() -> Vec<String> {
    [
        "cześć", "czesc", "hej", "hejka", "witam", "dzień dobry", "dzien dobry", "hello", "hi",
        "hey",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn d_greeting_reply() -> String {
    "Cześć! Jestem asystentem sklepu — chętnie pomogę znaleźć biżuterię, \
     sprawdzić koszyk albo status zamówienia. W czym mogę pomóc?"
        .into()
}
