//! Short-greeting prefilter.
//!
//! A bare "cześć" does not need an LLM round-trip; the orchestrator
//! answers it with the configured canned reply and terminates the turn.

use vitrine_domain::config::ShopConfig;

/// Messages at or above this length are never treated as greetings.
const MAX_GREETING_CHARS: usize = 15;

pub struct GreetingFilter {
    pattern: regex::Regex,
    reply: String,
}

impl GreetingFilter {
    /// Compile the configured greeting set into one case-insensitive
    /// pattern. Trailing punctuation after the greeting is tolerated.
    pub fn from_config(shop: &ShopConfig) -> Self {
        let alternatives = shop
            .greetings
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| regex::escape(g))
            .collect::<Vec<_>>()
            .join("|");
        let source = if alternatives.is_empty() {
            // Config cleared the set; match nothing.
            "$^".to_string()
        } else {
            format!(r"(?i)^(?:{alternatives})[\s!.,?]*$")
        };
        let pattern = regex::Regex::new(&source).expect("greeting set compiles");

        Self {
            pattern,
            reply: shop.greeting_reply.clone(),
        }
    }

    pub fn is_greeting(&self, message: &str) -> bool {
        let trimmed = message.trim();
        trimmed.chars().count() < MAX_GREETING_CHARS && self.pattern.is_match(trimmed)
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> GreetingFilter {
        GreetingFilter::from_config(&ShopConfig::default())
    }

    #[test]
    fn bare_greetings_match() {
        let f = filter();
        assert!(f.is_greeting("cześć"));
        assert!(f.is_greeting("  Hej  "));
        assert!(f.is_greeting("Dzień dobry!"));
        assert!(f.is_greeting("hello"));
    }

    #[test]
    fn greeting_with_request_does_not_match() {
        let f = filter();
        assert!(!f.is_greeting("cześć, pokaż pierścionki"));
        assert!(!f.is_greeting("hej, gdzie moje zamówienie?"));
    }

    #[test]
    fn long_messages_never_match() {
        let f = filter();
        assert!(!f.is_greeting("dzień dobry dzień dobry"));
    }

    #[test]
    fn non_greeting_short_message_does_not_match() {
        let f = filter();
        assert!(!f.is_greeting("pierścionki"));
    }

    #[test]
    fn empty_greeting_set_matches_nothing() {
        let mut shop = ShopConfig::default();
        shop.greetings.clear();
        let f = GreetingFilter::from_config(&shop);
        assert!(!f.is_greeting("cześć"));
    }
}
