//! Gateway HTTP server: webhook endpoint and health check.

use crate::channels::{log_event, parse_content_lossy, InboundEvent, Route, TikTokChannel};
use crate::config::{self, Config};
use crate::gateway::protocol::{WebhookAck, WebhookEnvelope};
use crate::llm::ChatApiClient;
use crate::relay::{Relay, RelayOutcome, RelaySettings};
use crate::routing::InMemorySessionRegistry;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Shared state for the gateway (config and relay).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub relay: Relay,
}

impl GatewayState {
    /// Build the production relay from config: chat API client, TikTok channel, in-memory registry.
    pub fn from_config(config: Config) -> Result<Self> {
        let timeout = config.relay.request_timeout();
        let ai = ChatApiClient::new(
            Some(config::resolve_ai_base_url(&config)),
            config::resolve_ai_api_key(&config),
            config.relay.degraded_reply.clone(),
            Some(timeout),
        )
        .context("building ai client")?;
        let tiktok = TikTokChannel::new(
            Some(config.platform.base_url.clone()),
            config::resolve_access_token(&config),
            Some(timeout),
        )
        .context("building tiktok client")?;
        if !tiktok.has_token() {
            log::warn!("tiktok access token not configured (set TIKTOK_ACCESS_TOKEN); replies will fail");
        }
        let relay = Relay::new(
            Arc::new(ai),
            Arc::new(tiktok),
            Arc::new(InMemorySessionRegistry::new()),
            RelaySettings {
                model: config.ai.model.trim().to_string(),
                fallback_message: config.relay.fallback_message.clone(),
                default_business_id: config::resolve_business_id(&config),
            },
        );
        Ok(Self {
            config: Arc::new(config),
            relay,
        })
    }
}

/// Short id used to correlate the log lines of one delivery.
fn delivery_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Accept one webhook body. Never fails: malformed bodies yield `success: false`, everything past
/// envelope parsing yields `success: true` echoing the delivered event name.
///
/// Relayable events are handed to a spawned task so the platform is acknowledged without waiting
/// on the AI backend; the handle resolves to the relay outcome.
pub fn accept_webhook(
    relay: &Relay,
    body: &[u8],
) -> (WebhookAck, Option<JoinHandle<RelayOutcome>>) {
    let delivery = delivery_id();
    let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("[{}] invalid webhook body: {}", delivery, e);
            return (WebhookAck::failed(format!("invalid webhook body: {}", e)), None);
        }
    };
    let ack = WebhookAck::received(envelope.event_name());
    let event = InboundEvent::from(envelope);
    let content = parse_content_lossy(&event.raw_content, &delivery);
    log_event(&delivery, &event, &content);
    if event.event_type.route() != Route::Relay {
        return (ack, None);
    }

    let relay = relay.clone();
    let task = tokio::spawn(async move {
        let outcome = relay.handle(&delivery, &event, &content).await;
        log::debug!("[{}] outcome: {:?}", delivery, outcome);
        outcome
    });
    (ack, Some(task))
}

/// Router with the health check at `/` and the webhook at the configured path.
pub fn router(state: GatewayState) -> Router {
    let webhook_path = config::webhook_path(&state.config);
    Router::new()
        .route("/", get(health_http))
        .route(&webhook_path, any(webhook))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let webhook_path = config::webhook_path(&config);
    let state = GatewayState::from_config(config)?;
    log::info!(
        "relay: model {}, ai backend {}",
        state.relay.settings().model,
        config::resolve_ai_base_url(&state.config)
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook {})", bind_addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// Webhook endpoint. Non-POST → 405; every POST → 200 with a `WebhookAck`.
async fn webhook(State(state): State<GatewayState>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response();
    }
    let (ack, _relay_task) = accept_webhook(&state.relay, &body);
    (StatusCode::OK, Json(ack)).into_response()
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}
