//! Core runtime — the orchestrator that ties the session actor, the LLM
//! stream, and tool dispatch into one bounded loop.

pub mod greeting;
pub mod turn;

pub use turn::{run_chat_turn, ChatEvent, ChatTurnInput};
