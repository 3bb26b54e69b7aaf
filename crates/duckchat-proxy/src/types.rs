//! Wire types.
//!
//! Client side: the OpenAI `chat/completions` subset this gateway accepts and
//! the chunk / completion shapes it emits. Backend side: the `{model, messages}`
//! body the DuckDuckGo chat endpoint expects.

use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// A chat message. `role` is kept free-form; the backend only rejects `system`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Incoming `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,

    /// Accepted for compatibility; the backend has no equivalent knob.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    pub messages: Vec<Message>,
}

/// Body of the backend streaming call.
#[derive(Debug, Serialize)]
pub struct BackendChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
}

/// One client-facing SSE chunk: `{"choices":[{"delta":{"content":...}}]}`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk<'a> {
    pub choices: [ChunkChoice<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice<'a> {
    pub delta: Delta<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Delta<'a> {
    pub content: &'a str,
}

impl<'a> ChatCompletionChunk<'a> {
    pub fn delta(content: &'a str) -> Self {
        Self {
            choices: [ChunkChoice {
                delta: Delta { content },
                finish_reason: None,
            }],
        }
    }

    pub fn stop() -> Self {
        Self {
            choices: [ChunkChoice {
                delta: Delta { content: "" },
                finish_reason: Some("stop"),
            }],
        }
    }
}

const PONG_ID: &str = "ec0afa48-b167-4299-b3d7-825bcd859f06";
const PONG_MODEL: &str = "glm4";

/// Non-streamed completion object. Only produced for the liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub id: String,
    pub object: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
    pub function_call: Option<serde_json::Value>,
}

impl ChatCompletion {
    /// Fixed reply to a `ping` message. `finish_reason` is `length` on purpose:
    /// existing health checkers match on this exact object.
    pub fn pong() -> Self {
        Self {
            model: PONG_MODEL.to_string(),
            id: PONG_ID.to_string(),
            object: "chat.completion".to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: ROLE_ASSISTANT.to_string(),
                    content: "pong".to_string(),
                    function_call: None,
                },
                finish_reason: "length".to_string(),
            }],
        }
    }
}
