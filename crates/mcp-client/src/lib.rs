//! JSON-RPC 2.0 client for the merchant tool service.
//!
//! The remote endpoint (`https://{shop_domain}/api/mcp`) exposes the
//! catalog / cart / order tools; this crate owns the wire envelopes, the
//! static tool registry, argument normalization, and the HTTP dispatch
//! with timeout + degradation semantics.

pub mod client;
pub mod normalize;
pub mod protocol;
pub mod registry;

pub use client::{HttpToolClient, ToolCallContext, ToolDispatcher, ToolOutcome};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
