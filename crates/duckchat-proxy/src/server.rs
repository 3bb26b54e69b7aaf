//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `POST /v1/chat/completions`
//! - `GET /health`

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{error::InternalError, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    backend::{ChatBackend, DuckChatClient},
    config::ProxyConfig,
    error::ProxyError,
    session::SessionHolder,
    streaming,
    types::{ChatCompletion, ChatCompletionRequest, Message},
};

/// Message content that short-circuits to a fixed `pong` completion.
pub const LIVENESS_PROBE: &str = "ping";

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }
}

/// Register routes and extractor config. Shared by [`serve`] and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/v1/chat/completions", web::post().to(chat_completions));
}

/// JSON extractor config answering malformed bodies with 422 and a `detail`.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let detail = err.to_string();
            InternalError::from_response(
                err,
                HttpResponse::UnprocessableEntity().json(json!({ "detail": detail })),
            )
            .into()
        })
}

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let http = config
        .build_http_client()
        .context("failed to build reqwest client")?;

    let session = Arc::new(SessionHolder::new(http.clone(), config.status_url.clone()));
    if let Err(e) = session.initialize().await {
        // An empty token is retried lazily on the first request.
        warn!(error = %e, "starting without a session token");
    }

    let backend = DuckChatClient::new(http, session, config.chat_url.clone(), config.retry_policy());
    let state = web::Data::new(AppState::new(Arc::new(backend)));

    let addr = config.bind_addr();
    let payload_limit = config.max_payload_bytes;
    info!(addr = %addr, "duckchat-proxy listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(json_config(payload_limit))
            .wrap(Cors::permissive())
            .configure(configure)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

fn is_liveness_probe(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.content == LIVENESS_PROBE)
}

async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, ProxyError> {
    let req = body.into_inner();

    if is_liveness_probe(&req.messages) {
        debug!("liveness probe answered locally");
        return Ok(HttpResponse::Ok().json(ChatCompletion::pong()));
    }

    for message in &req.messages {
        debug!(role = %message.role, content = %message.content, "user message");
    }
    if let Some(max_tokens) = req.max_tokens {
        debug!(max_tokens, "max_tokens has no backend equivalent, ignoring");
    }

    let lines = state.backend.stream_chat(req.messages, &req.model)?;
    let body = streaming::completion_stream(lines, req.model);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("cache-control", "no-cache"))
        .streaming(body))
}
