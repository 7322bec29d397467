// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the queue, trigger and health endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use indica_core::{
    DeliveryOutcome, EntryMetadata, IndicaError, MessageContent, NewQueueEntry, Page,
    PageRequest, Priority, QueueEntry, QueueFilter, QueueOverview, QueueStatus, ResetSelector,
    TenantQueueStats, TriggerData, TriggerEvent, Variables,
};
use indica_dispatch::TickOutcome;
use indica_flows::TriggerOutcome;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
}

/// Request body for POST /v1/queue/messages.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    pub content: MessageContent,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub priority: Priority,
    pub trigger: String,
    #[serde(default)]
    pub trigger_data: TriggerData,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl EnqueueRequest {
    /// Fills omitted sender and attempt budget from the gateway defaults.
    fn into_entry(self, default_sender: &str, default_max_retries: u32) -> NewQueueEntry {
        let from = self
            .from
            .filter(|from| !from.trim().is_empty())
            .unwrap_or_else(|| default_sender.to_string());
        NewQueueEntry {
            tenant_id: self.tenant_id,
            flow_id: self.flow_id,
            template_id: self.template_id,
            to: self.to,
            from,
            content: self.content,
            variables: self.variables,
            priority: self.priority,
            trigger: self.trigger,
            trigger_data: self.trigger_data,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            metadata: self.metadata,
        }
    }
}

/// Query string for GET /v1/queue/messages.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<QueueStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub trigger: Option<String>,
    /// Tenant filter.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: QueueStatus,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Row count returned by bulk operations.
#[derive(Debug, Serialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// POST /v1/queue/messages
///
/// Enqueues an ad-hoc message. A missing sender or attempt budget falls
/// back to the configured default.
pub async fn post_message(
    State(state): State<GatewayState>,
    Json(body): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<QueueEntry>)> {
    let entry = body.into_entry(&state.default_sender, state.default_max_retries);
    let entry = state.queue.enqueue(entry).await?;
    tracing::debug!(entry_id = %entry.id, tenant_id = %entry.tenant_id, "ad-hoc message queued");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /v1/queue/messages
pub async fn list_messages(
    State(state): State<GatewayState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<QueueEntry>>> {
    let filter = QueueFilter {
        status: params.status,
        priority: params.priority,
        trigger: params.trigger,
        tenant_id: params.client_id,
    };
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        params.page.unwrap_or(defaults.page),
        params.limit.unwrap_or(defaults.limit),
    );
    Ok(Json(state.queue.list_entries(&filter, page).await?))
}

/// GET /v1/queue/status
pub async fn queue_status(State(state): State<GatewayState>) -> ApiResult<Json<QueueOverview>> {
    Ok(Json(state.queue.queue_overview().await?))
}

/// PUT /v1/queue/messages/{id}/status
pub async fn put_message_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<QueueEntry>> {
    let entry = state.queue.force_status(&id, body.status).await?;
    tracing::info!(entry_id = %id, status = %body.status, "entry status forced");
    Ok(Json(entry))
}

/// DELETE /v1/queue/messages/{id}
pub async fn delete_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.queue.delete_entry(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/queue/messages/cleanup
///
/// Purges finished entries; `days` defaults to the retention window.
pub async fn cleanup_messages(
    State(state): State<GatewayState>,
    Query(params): Query<CleanupParams>,
) -> ApiResult<Json<AffectedResponse>> {
    let days = params
        .days
        .unwrap_or(state.processor.settings().retention_days);
    let affected = state.processor.purge(days).await?;
    Ok(Json(AffectedResponse { affected }))
}

/// POST /v1/queue/messages/reset-failed
pub async fn reset_failed(
    State(state): State<GatewayState>,
    Json(selector): Json<ResetSelector>,
) -> ApiResult<Json<AffectedResponse>> {
    let affected = state.queue.reset_failed(&selector).await?;
    tracing::info!(affected, "failed entries reset to pending");
    Ok(Json(AffectedResponse { affected }))
}

/// POST /v1/queue/messages/{id}/delivered
///
/// Provider delivery receipt for a completed entry.
pub async fn mark_delivered(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let entry = state
        .queue
        .get_entry(&id)
        .await?
        .ok_or_else(|| IndicaError::not_found("queue entry", &id))?;
    if entry.status != QueueStatus::Completed {
        return Err(ApiError(IndicaError::Conflict(format!(
            "entry {id} is {} and cannot be marked delivered",
            entry.status
        ))));
    }
    if let Some(flow_id) = entry.flow_id.as_deref() {
        state
            .flows
            .record_delivery_outcome(flow_id, DeliveryOutcome::Delivered)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/queue/process
///
/// Runs one sweep immediately. Reports `skipped` when a sweep is already
/// in flight.
pub async fn process_queue(
    State(state): State<GatewayState>,
    body: Option<Json<ProcessRequest>>,
) -> Json<TickOutcome> {
    let limit = body
        .and_then(|Json(b)| b.limit)
        .unwrap_or(state.processor.settings().batch_size);
    Json(state.processor.process_now(limit).await)
}

/// GET /v1/queue/clients/{client_id}/stats
pub async fn client_stats(
    State(state): State<GatewayState>,
    Path(client_id): Path<String>,
) -> ApiResult<Json<TenantQueueStats>> {
    Ok(Json(state.queue.tenant_stats(&client_id).await?))
}

/// POST /v1/triggers
///
/// Hands a business event to the flow trigger engine. Per-flow failures
/// are reported in the body, never as an HTTP error.
pub async fn post_trigger(
    State(state): State<GatewayState>,
    Json(event): Json<TriggerEvent>,
) -> Json<TriggerOutcome> {
    Json(state.engine.process_trigger(&event).await)
}
