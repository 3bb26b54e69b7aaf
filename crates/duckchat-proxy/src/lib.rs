//! DuckChat Proxy - OpenAI-compatible front for the DuckDuckGo AI chat backend.
//!
//! Clients speak the `/v1/chat/completions` API. This crate forwards their
//! conversation to DuckDuckGo's session-token-gated chat stream and reframes
//! the backend's events as OpenAI chat completion chunks.
//!
//! Design goals:
//! - Accept OpenAI-style streaming chat requests.
//! - Keep one process-wide session token alive (handshake, in-band rotation,
//!   re-handshake when the backend rejects it).
//! - Retry failed backend attempts with exponential backoff and always finish
//!   the client stream with a stop chunk and `[DONE]`.

pub mod backend;
pub mod config;
pub mod error;
pub mod headers;
pub mod retry;
pub mod server;
pub mod session;
pub mod sse;
pub mod streaming;
pub mod testing;
pub mod translation;
pub mod types;

pub use backend::{ChatBackend, DuckChatClient, LineStream};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use retry::RetryPolicy;
pub use server::{serve, AppState};
pub use session::{SessionCredential, SessionHolder};
