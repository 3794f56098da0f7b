//! Argument normalization applied before transport.
//!
//! The model's tool calls arrive as free-form JSON; this module coerces
//! them into what the remote service accepts: catalog searches always
//! carry a numeric `first` and a non-empty `context`, and cart ids are
//! canonicalized to the `gid://shopify/Cart/<id>?key=<k>` form (the
//! `null` sentinel is dropped so the service mints a fresh cart).

use serde_json::Value;

use crate::protocol::{JsonRpcError, INVALID_PARAMS};
use crate::registry;

const CART_GID_PREFIX: &str = "gid://shopify/Cart/";
const DEFAULT_FIRST: u64 = 5;

/// Per-call normalization inputs.
pub struct NormalizeContext<'a> {
    /// Fallback `context` tag for catalog searches.
    pub default_search_context: &'a str,
    /// Cart key known from the session, appended to bare cart GIDs.
    pub session_cart_key: Option<&'a str>,
}

/// Normalize `arguments` for `tool`. Returns the arguments to send, or a
/// `-32602` error when they cannot be repaired.
pub fn normalize_args(
    tool: &str,
    args: Value,
    ctx: &NormalizeContext<'_>,
) -> Result<Value, JsonRpcError> {
    // All tools take an object; coerce scalars/null to an empty one.
    let mut obj = match args {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(JsonRpcError::with_data(
                INVALID_PARAMS,
                "arguments must be a JSON object",
                serde_json::json!({ "got": other }),
            ))
        }
    };

    match tool {
        registry::SEARCH_SHOP_CATALOG => {
            let first = obj.get("first").and_then(Value::as_u64).unwrap_or(DEFAULT_FIRST);
            obj.insert("first".into(), Value::from(first));

            let context_ok = obj
                .get("context")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty());
            if !context_ok {
                obj.insert(
                    "context".into(),
                    Value::String(ctx.default_search_context.to_string()),
                );
            }
        }
        registry::GET_CART | registry::UPDATE_CART => {
            match obj.get("cart_id") {
                Some(Value::Null) => {
                    // New-cart sentinel: the remote service creates a cart
                    // when the field is absent.
                    obj.remove("cart_id");
                }
                Some(Value::String(raw)) => {
                    let canonical = canonicalize_cart_gid(raw, ctx.session_cart_key)?;
                    obj.insert("cart_id".into(), Value::String(canonical));
                }
                Some(other) => {
                    return Err(JsonRpcError::with_data(
                        INVALID_PARAMS,
                        "cart_id must be a string or null",
                        serde_json::json!({ "got": other }),
                    ));
                }
                None => {}
            }
        }
        _ => {}
    }

    Ok(Value::Object(obj))
}

/// Validate and canonicalize a cart GID.
///
/// Whitespace is stripped; a missing `?key=…` suffix is filled in from
/// the session cart key when one is known, and otherwise left bare for
/// the authenticated-customer path.
pub fn canonicalize_cart_gid(
    raw: &str,
    session_cart_key: Option<&str>,
) -> Result<String, JsonRpcError> {
    let trimmed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let invalid = || {
        JsonRpcError::with_data(
            INVALID_PARAMS,
            "cart_id is not a valid cart GID",
            serde_json::json!({ "expected": "gid://shopify/Cart/<id>?key=<k>" }),
        )
    };

    let Some(rest) = trimmed.strip_prefix(CART_GID_PREFIX) else {
        return Err(invalid());
    };
    let id_part = rest.split('?').next().unwrap_or("");
    if id_part.is_empty() {
        return Err(invalid());
    }

    if rest.contains("?key=") {
        return Ok(trimmed);
    }
    if rest.contains('?') {
        // Query string present but not a key — malformed.
        return Err(invalid());
    }

    match session_cart_key {
        Some(key) if !key.is_empty() => Ok(format!("{trimmed}?key={key}")),
        _ => Ok(trimmed),
    }
}

/// Extract the `?key=` value from a canonical cart GID.
pub fn cart_key_of(cart_id: &str) -> Option<&str> {
    cart_id.split_once("?key=").map(|(_, k)| k).filter(|k| !k.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
