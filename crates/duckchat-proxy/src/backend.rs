//! Backend stream client.
//!
//! Opens the DuckDuckGo chat stream and yields the payload of every
//! `data: ` line, retrying failed attempts:
//!
//! - HTTP 400 means the session token was rejected. The credential is replaced
//!   by a fresh handshake and the next attempt starts immediately.
//! - Any other status, or a transport error (connect, timeout, broken body),
//!   waits `unit * 2^attempt` before the next attempt.
//! - Once attempts run out, a single `{"error": ...}` payload is yielded.
//!
//! Lines already yielded by a failed attempt are not retracted; the next
//! attempt's output is appended after them. The returned stream is lazy and
//! owns the in-flight response, so dropping it cancels the call and stops
//! further retries.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::ProxyError;
use crate::headers::{self, SESSION_HEADER};
use crate::retry::RetryPolicy;
use crate::session::SessionHolder;
use crate::sse::{self, LineBuffer};
use crate::translation::normalize_roles;
use crate::types::{BackendChatRequest, Message};

/// Lazy stream of raw data frame payloads (prefix already stripped).
pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Status the backend answers with when the session token is stale.
pub const SESSION_EXPIRED_STATUS: StatusCode = StatusCode::BAD_REQUEST;

/// Anything that can turn a conversation into a stream of backend payloads.
pub trait ChatBackend: Send + Sync {
    /// Start a chat. Errors are reserved for failures before any I/O, such as
    /// building the request body; backend failures surface inside the stream.
    fn stream_chat(&self, messages: Vec<Message>, model: &str) -> Result<LineStream, ProxyError>;
}

/// Payload yielded after the last failed attempt.
pub fn exhausted_payload() -> String {
    json!({ "error": ProxyError::ExhaustedRetries.to_string() }).to_string()
}

pub struct DuckChatClient {
    http: reqwest::Client,
    session: Arc<SessionHolder>,
    chat_url: String,
    retry: RetryPolicy,
}

impl DuckChatClient {
    pub fn new(
        http: reqwest::Client,
        session: Arc<SessionHolder>,
        chat_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            session,
            chat_url: chat_url.into(),
            retry,
        }
    }

    pub fn session(&self) -> &Arc<SessionHolder> {
        &self.session
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl ChatBackend for DuckChatClient {
    fn stream_chat(&self, messages: Vec<Message>, model: &str) -> Result<LineStream, ProxyError> {
        let messages = normalize_roles(messages);
        let body = Bytes::from(serde_json::to_vec(&BackendChatRequest {
            model,
            messages: &messages,
        })?);

        let http = self.http.clone();
        let session = self.session.clone();
        let chat_url = self.chat_url.clone();
        let retry = self.retry.clone();
        let model = model.to_string();

        let lines = stream! {
            for attempt in 0..retry.attempts() {
                debug!(attempt, max_attempts = retry.attempts(), %model, "opening backend stream");

                let failure = match open_stream(&http, &chat_url, &session, body.clone()).await {
                    Ok(response) => {
                        let mut bytes = response.bytes_stream();
                        let mut buffer = LineBuffer::new();
                        let mut failure = None;

                        while let Some(chunk) = bytes.next().await {
                            match chunk {
                                Ok(chunk) => {
                                    buffer.push(&chunk);
                                    while let Some(line) = buffer.next_line() {
                                        if let Some(payload) = sse::data_payload(&line) {
                                            yield payload.to_string();
                                        }
                                    }
                                }
                                Err(e) => {
                                    failure = Some(ProxyError::Transport(e));
                                    break;
                                }
                            }
                        }

                        match failure {
                            Some(e) => e,
                            None => {
                                if let Some(payload) = buffer.finish().as_deref().and_then(sse::data_payload) {
                                    yield payload.to_string();
                                }
                                if attempt > 0 {
                                    info!(attempt, "backend stream succeeded after retry");
                                }
                                return;
                            }
                        }
                    }
                    Err(e) => e,
                };

                if !failure.backs_off() {
                    warn!(attempt, error = %failure, "session rejected, running a fresh handshake");
                    if let Err(e) = session.initialize().await {
                        warn!(error = %e, "re-handshake failed");
                    }
                    continue;
                }

                warn!(attempt, max_attempts = retry.attempts(), error = %failure, "backend attempt failed");

                if retry.has_next(attempt) {
                    let delay = retry.backoff_delay(attempt);
                    info!(delay_ms = delay.as_millis() as u64, "retrying backend stream after delay");
                    tokio::time::sleep(delay).await;
                }
            }

            error!(max_attempts = retry.attempts(), "all backend attempts failed");
            yield exhausted_payload();
        };

        Ok(Box::pin(lines))
    }
}

/// Open one streaming call. `Ok` only for a 200; the body is not read yet.
async fn open_stream(
    http: &reqwest::Client,
    chat_url: &str,
    session: &SessionHolder,
    body: Bytes,
) -> Result<reqwest::Response, ProxyError> {
    if !session.is_usable() {
        debug!("no usable session token, handshaking before the call");
        session.initialize().await?;
    }

    let response = http
        .post(chat_url)
        .headers(headers::chat_headers(&session.current())?)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::OK {
        if let Some(next) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            session.rotate(next);
        }
        return Ok(response);
    }

    if status == SESSION_EXPIRED_STATUS {
        return Err(ProxyError::SessionExpired {
            status: status.as_u16(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProxyError::UpstreamStatus {
        status: status.as_u16(),
        body,
    })
}
