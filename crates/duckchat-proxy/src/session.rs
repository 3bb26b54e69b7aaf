//! Session credential holder.
//!
//! Every streaming call must carry a token the backend issued, either through
//! the status handshake or in-band on the previous chat response. The pair is
//! replaced under one write lock so readers never see a half-rotated state.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::headers::{self, SESSION_HEADER};

/// Current and last-superseded session token. An empty `current` is unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredential {
    pub current: String,
    /// Kept for diagnostics only; never sent on the wire.
    pub previous: String,
}

impl SessionCredential {
    fn fresh(token: String) -> Self {
        Self {
            previous: token.clone(),
            current: token,
        }
    }
}

pub struct SessionHolder {
    http: reqwest::Client,
    status_url: String,
    state: RwLock<SessionCredential>,
}

impl SessionHolder {
    /// Create a holder with no token yet. Call [`SessionHolder::initialize`]
    /// before the first backend call.
    pub fn new(http: reqwest::Client, status_url: impl Into<String>) -> Self {
        Self {
            http,
            status_url: status_url.into(),
            state: RwLock::new(SessionCredential::default()),
        }
    }

    /// Run the status handshake and replace the whole credential with the
    /// issued token. On failure the credential is cleared.
    pub async fn initialize(&self) -> Result<(), ProxyError> {
        match self.handshake().await {
            Ok(token) => {
                *self.state.write() = SessionCredential::fresh(token);
                info!(status_url = %self.status_url, "session handshake succeeded");
                Ok(())
            }
            Err(e) => {
                *self.state.write() = SessionCredential::default();
                warn!(status_url = %self.status_url, error = %e, "session handshake failed");
                Err(e)
            }
        }
    }

    /// Demote the current token to previous and install `new_token`.
    pub fn rotate(&self, new_token: impl Into<String>) {
        let new_token = new_token.into();
        let mut state = self.state.write();
        state.previous = std::mem::replace(&mut state.current, new_token);
        debug!("session token rotated");
    }

    pub fn current(&self) -> String {
        self.state.read().current.clone()
    }

    pub fn previous(&self) -> String {
        self.state.read().previous.clone()
    }

    pub fn snapshot(&self) -> SessionCredential {
        self.state.read().clone()
    }

    pub fn is_usable(&self) -> bool {
        !self.state.read().current.is_empty()
    }

    async fn handshake(&self) -> Result<String, ProxyError> {
        let response = self
            .http
            .get(&self.status_url)
            .headers(headers::status_headers())
            .send()
            .await
            .map_err(|e| ProxyError::Handshake(e.to_string()))?;

        let status = response.status();
        response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ProxyError::Handshake(format!(
                    "status endpoint answered {} without a {} header",
                    status, SESSION_HEADER
                ))
            })
    }
}
