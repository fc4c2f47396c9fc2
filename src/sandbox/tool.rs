//! Helpers for exposing the sandbox as a "run this code" tool.

use serde_json::json;

/// Name of the tool argument carrying the script.
pub const CODE_ARGUMENT: &str = "code";

/// JSON input schema for a tool taking a single `code` string.
pub fn code_snippet_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            CODE_ARGUMENT: {
                "type": "string",
                "description": description,
            }
        },
        "required": [CODE_ARGUMENT],
    })
}

/// The `code` argument of a tool call, if present and a string.
pub fn code_argument(arguments: &serde_json::Value) -> Option<&str> {
    arguments.get(CODE_ARGUMENT)?.as_str()
}

pub(crate) fn missing_code_message() -> String {
    format!("Missing required argument: {CODE_ARGUMENT}")
}
