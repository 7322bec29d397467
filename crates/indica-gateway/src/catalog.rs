// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow and template management endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use indica_core::{
    FlowDefinition, FlowStatus, FlowUpdate, IndicaError, MessageTemplate, NewFlow, NewTemplate,
    TemplateStatus,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct FlowListParams {
    pub tenant_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateListParams {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlowStatusRequest {
    pub status: FlowStatus,
}

#[derive(Debug, Deserialize)]
pub struct TemplateStatusRequest {
    pub status: TemplateStatus,
}

pub async fn create_flow(
    State(state): State<GatewayState>,
    Json(body): Json<NewFlow>,
) -> ApiResult<(StatusCode, Json<FlowDefinition>)> {
    let flow = state.flows.create_flow(body).await?;
    tracing::info!(flow_id = %flow.id, tenant_id = %flow.tenant_id, "flow created");
    Ok((StatusCode::CREATED, Json(flow)))
}

pub async fn list_flows(
    State(state): State<GatewayState>,
    Query(params): Query<FlowListParams>,
) -> ApiResult<Json<Vec<FlowDefinition>>> {
    Ok(Json(state.flows.list_flows(&params.tenant_id).await?))
}

pub async fn get_flow(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FlowDefinition>> {
    let flow = state
        .flows
        .get_flow(&id)
        .await?
        .ok_or_else(|| IndicaError::not_found("flow", &id))?;
    Ok(Json(flow))
}

pub async fn update_flow(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<FlowUpdate>,
) -> ApiResult<Json<FlowDefinition>> {
    Ok(Json(state.flows.update_flow(&id, body).await?))
}

/// POST /v1/flows/{id}/status
pub async fn set_flow_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<FlowStatusRequest>,
) -> ApiResult<Json<FlowDefinition>> {
    let flow = state.flows.set_flow_status(&id, body.status).await?;
    tracing::info!(flow_id = %id, status = %flow.status, "flow status changed");
    Ok(Json(flow))
}

pub async fn delete_flow(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.flows.delete_flow(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_template(
    State(state): State<GatewayState>,
    Json(body): Json<NewTemplate>,
) -> ApiResult<(StatusCode, Json<MessageTemplate>)> {
    let template = state.templates.create_template(body).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /v1/templates
///
/// With `tenant_id`, lists that tenant's templates plus platform-wide ones.
pub async fn list_templates(
    State(state): State<GatewayState>,
    Query(params): Query<TemplateListParams>,
) -> ApiResult<Json<Vec<MessageTemplate>>> {
    Ok(Json(
        state
            .templates
            .list_templates(params.tenant_id.as_deref())
            .await?,
    ))
}

pub async fn get_template(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageTemplate>> {
    let template = state
        .templates
        .get_template(&id)
        .await?
        .ok_or_else(|| IndicaError::not_found("template", &id))?;
    Ok(Json(template))
}

/// POST /v1/templates/{id}/status
pub async fn set_template_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<TemplateStatusRequest>,
) -> ApiResult<Json<MessageTemplate>> {
    Ok(Json(
        state.templates.set_template_status(&id, body.status).await?,
    ))
}
