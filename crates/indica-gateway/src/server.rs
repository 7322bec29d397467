// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use indica_config::model::GatewayConfig;
use indica_core::{FlowRepository, IndicaError, QueueStore, TemplateCatalog};
use indica_dispatch::QueueProcessor;
use indica_flows::FlowTriggerEngine;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{catalog, handlers};

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub queue: Arc<dyn QueueStore>,
    pub flows: Arc<dyn FlowRepository>,
    pub templates: Arc<dyn TemplateCatalog>,
    pub engine: Arc<FlowTriggerEngine>,
    pub processor: Arc<QueueProcessor>,
    /// Sender used for ad-hoc messages that name none.
    pub default_sender: String,
    /// Attempt budget for ad-hoc messages that name none.
    pub default_max_retries: u32,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Builds the full route table.
///
/// `/health` is public; everything under `/v1` requires the bearer token.
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/queue/messages",
            post(handlers::post_message).get(handlers::list_messages),
        )
        .route("/v1/queue/messages/cleanup", delete(handlers::cleanup_messages))
        .route("/v1/queue/messages/reset-failed", post(handlers::reset_failed))
        .route("/v1/queue/messages/{id}", delete(handlers::delete_message))
        .route(
            "/v1/queue/messages/{id}/status",
            put(handlers::put_message_status),
        )
        .route(
            "/v1/queue/messages/{id}/delivered",
            post(handlers::mark_delivered),
        )
        .route("/v1/queue/status", get(handlers::queue_status))
        .route("/v1/queue/process", post(handlers::process_queue))
        .route(
            "/v1/queue/clients/{client_id}/stats",
            get(handlers::client_stats),
        )
        .route("/v1/triggers", post(handlers::post_trigger))
        .route(
            "/v1/flows",
            post(catalog::create_flow).get(catalog::list_flows),
        )
        .route(
            "/v1/flows/{id}",
            get(catalog::get_flow)
                .put(catalog::update_flow)
                .delete(catalog::delete_flow),
        )
        .route("/v1/flows/{id}/status", post(catalog::set_flow_status))
        .route(
            "/v1/templates",
            post(catalog::create_template).get(catalog::list_templates),
        )
        .route("/v1/templates/{id}", get(catalog::get_template))
        .route(
            "/v1/templates/{id}/status",
            post(catalog::set_template_status),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP server and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), IndicaError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| IndicaError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| IndicaError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_from_gateway_config() {
        let config = ServerConfig::from(&GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..GatewayConfig::default()
        });
        assert_eq!(config.port, 3000);
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
