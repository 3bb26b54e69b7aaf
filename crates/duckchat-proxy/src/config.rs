//! Configuration from defaults, an optional YAML file and environment variables.
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 5002
//! http_proxy: http://127.0.0.1:7890
//! https_proxy: https://127.0.0.1:7890
//! request_timeout_secs: 30
//! max_retries: 3
//! ```
//!
//! **Environment variables** (override the file):
//! - `HOST`, `PORT`: listen address (default: 0.0.0.0:5002)
//! - `HTTP_PROXY`, `HTTPS_PROXY`: outbound proxies (default: a local proxy on 7890)
//! - `DUCKCHAT_STATUS_URL`, `DUCKCHAT_CHAT_URL`: backend endpoints
//! - `REQUEST_TIMEOUT_SECS`: whole-exchange timeout per backend attempt (default: 30)
//! - `DUCKCHAT_MAX_RETRIES`: attempts per request, at least one (default: 3)
//! - `DUCKCHAT_BACKOFF_MS`: one backoff time-unit in milliseconds (default: 1000)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ProxyError;
use crate::retry::RetryPolicy;

pub const DEFAULT_STATUS_URL: &str = "https://duckduckgo.com/duckchat/v1/status";
pub const DEFAULT_CHAT_URL: &str = "https://duckduckgo.com/duckchat/v1/chat";
const DEFAULT_HTTP_PROXY: &str = "http://127.0.0.1:7890";
const DEFAULT_HTTPS_PROXY: &str = "https://127.0.0.1:7890";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub status_url: String,
    pub chat_url: String,
    /// `None` connects directly.
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_unit_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5002,
            status_url: DEFAULT_STATUS_URL.to_string(),
            chat_url: DEFAULT_CHAT_URL.to_string(),
            http_proxy: Some(DEFAULT_HTTP_PROXY.to_string()),
            https_proxy: Some(DEFAULT_HTTPS_PROXY.to_string()),
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_unit_ms: 1000,
            max_payload_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Load a YAML file, then apply the process environment on top.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_file_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load a YAML file, then apply overrides from `lookup`.
    pub fn from_yaml_file_with_env(
        path: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.with_env(lookup))
    }

    /// Apply overrides from `lookup`. Unparseable numbers are ignored.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = lookup("DUCKCHAT_STATUS_URL") {
            self.status_url = url;
        }
        if let Some(url) = lookup("DUCKCHAT_CHAT_URL") {
            self.chat_url = url;
        }
        if let Some(proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = Some(proxy);
        }
        if let Some(proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = Some(proxy);
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS").and_then(|p| p.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(retries) = lookup("DUCKCHAT_MAX_RETRIES").and_then(|p| p.parse().ok()) {
            self.max_retries = retries;
        }
        if let Some(ms) = lookup("DUCKCHAT_BACKOFF_MS").and_then(|p| p.parse().ok()) {
            self.backoff_unit_ms = ms;
        }
        self
    }

    /// Drop both outbound proxies.
    pub fn without_proxy(mut self) -> Self {
        self.http_proxy = None;
        self.https_proxy = None;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_unit_ms))
    }

    /// The one HTTP client shared by the handshake and the streaming calls.
    pub fn build_http_client(&self) -> Result<reqwest::Client, ProxyError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs));

        if self.http_proxy.is_none() && self.https_proxy.is_none() {
            builder = builder.no_proxy();
        }
        if let Some(proxy) = &self.http_proxy {
            let proxy = reqwest::Proxy::http(proxy)
                .map_err(|e| ProxyError::Configuration(format!("invalid HTTP proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = &self.https_proxy {
            let proxy = reqwest::Proxy::https(proxy).map_err(|e| {
                ProxyError::Configuration(format!("invalid HTTPS proxy {}: {}", proxy, e))
            })?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| ProxyError::Configuration(format!("failed to build HTTP client: {}", e)))
    }
}
