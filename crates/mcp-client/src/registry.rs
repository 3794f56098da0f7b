//! Static registry of the merchant tools.
//!
//! One table drives everything: the definitions handed to the LLM, the
//! `tools/list` surface, and the unknown-tool check before dispatch.
//! Adding a tool is a change in this file only.

use std::sync::OnceLock;

use vitrine_domain::tool::ToolDefinition;

pub const SEARCH_SHOP_CATALOG: &str = "search_shop_catalog";
pub const SEARCH_SHOP_POLICIES: &str = "search_shop_policies_and_faqs";
pub const GET_CART: &str = "get_cart";
pub const UPDATE_CART: &str = "update_cart";
pub const GET_ORDER_STATUS: &str = "get_order_status";
pub const GET_MOST_RECENT_ORDER_STATUS: &str = "get_most_recent_order_status";

/// All tool definitions, built once.
pub fn definitions() -> &'static [ToolDefinition] {
    static DEFS: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    DEFS.get_or_init(build_definitions)
}

/// Look up a tool by name.
pub fn find(name: &str) -> Option<&'static ToolDefinition> {
    definitions().iter().find(|d| d.name == name)
}

pub fn is_known(name: &str) -> bool {
    find(name).is_some()
}

/// Compact JSON rendering of the table for the tool-schema system turn.
pub fn schema_summary() -> String {
    let entries: Vec<serde_json::Value> = definitions()
        .iter()
        .map(|d| {
            serde_json::json!({
                "name": d.name,
                "description": d.description,
                "inputSchema": d.input_schema,
            })
        })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".into())
}

fn build_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SEARCH_SHOP_CATALOG.into(),
            description: "Search the shop catalog for products matching a query.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Free-text product query." },
                    "context": { "type": "string", "description": "Domain tag narrowing the search." },
                    "first": { "type": "number", "description": "Maximum number of products to return." }
                },
                "required": ["query", "context"]
            }),
        },
        ToolDefinition {
            name: SEARCH_SHOP_POLICIES.into(),
            description: "Search shop policies and FAQ entries (shipping, returns, warranty)."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "context": { "type": "string" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: GET_CART.into(),
            description: "Fetch the current cart contents by cart id.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "cart_id": { "type": "string", "description": "Cart GID, e.g. gid://shopify/Cart/<id>?key=<k>." }
                },
                "required": ["cart_id"]
            }),
        },
        ToolDefinition {
            name: UPDATE_CART.into(),
            description: "Add or change cart lines. Pass cart_id null to create a new cart."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "cart_id": { "type": ["string", "null"] },
                    "lines": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "merchandiseId": { "type": "string" },
                                "quantity": { "type": "number" }
                            },
                            "required": ["merchandiseId", "quantity"]
                        }
                    }
                },
                "required": ["lines"]
            }),
        },
        ToolDefinition {
            name: GET_ORDER_STATUS.into(),
            description: "Check the status of an order by order id.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "order_id": { "type": "string" }
                },
                "required": ["order_id"]
            }),
        },
        ToolDefinition {
            name: GET_MOST_RECENT_ORDER_STATUS.into(),
            description: "Check the status of the customer's most recent order.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_six_tools() {
        assert_eq!(definitions().len(), 6);
    }

    #[test]
    fn find_known_and_unknown() {
        assert!(is_known(SEARCH_SHOP_CATALOG));
        assert!(is_known(GET_MOST_RECENT_ORDER_STATUS));
        assert!(!is_known("drop_tables"));
    }

    #[test]
    fn catalog_schema_requires_query_and_context() {
        let def = find(SEARCH_SHOP_CATALOG).unwrap();
        let required = def.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));
        assert!(required.iter().any(|v| v == "context"));
    }

    #[test]
    fn schema_summary_is_valid_json() {
        let summary = schema_summary();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 6);
    }
}
