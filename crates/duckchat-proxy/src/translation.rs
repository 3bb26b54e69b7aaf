//! Request and event translation between the OpenAI and DuckDuckGo formats.
//!
//! Outgoing: the backend rejects the `system` role, so system messages are sent
//! as `user` messages in place. Incoming: each data frame is a loose JSON object
//! whose `message` field carries the next content fragment.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{Message, ROLE_SYSTEM, ROLE_USER};

/// Backend data frame. Anything besides `message` is ignored.
#[derive(Debug, Default, Deserialize)]
struct BackendFrame {
    #[serde(default)]
    message: Option<String>,
}

/// Extract the content fragment from a backend data frame payload.
///
/// Total: malformed JSON, non-object payloads, a missing `message` field or a
/// non-string `message` all yield an empty string.
pub fn extract_content(raw: &str) -> String {
    // Serde happily reads a struct from a JSON array, so require an object first.
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
        .and_then(|value| serde_json::from_value::<BackendFrame>(value).ok())
        .and_then(|frame| frame.message)
        .unwrap_or_default()
}

/// Rewrite every `system` message to `user`, preserving order and content.
pub fn normalize_roles(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut msg| {
            if msg.role == ROLE_SYSTEM {
                msg.role = ROLE_USER.to_string();
            }
            msg
        })
        .collect()
}
