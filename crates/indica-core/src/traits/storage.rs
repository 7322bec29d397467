// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits: backend lifecycle, the message queue, flows and templates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IndicaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    DeliveryOutcome, FlowDefinition, FlowStatus, FlowUpdate, MessageTemplate, NewFlow,
    NewQueueEntry, NewTemplate, Page, PageRequest, QueueEntry, QueueFilter, QueueOverview,
    QueueStatus, ResetSelector, TemplateStatus, TenantQueueStats, Transition,
};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), IndicaError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), IndicaError>;
}

/// Durable priority queue of outbound messages.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Normalizes and validates the recipient, assigns a queue position and
    /// persists the entry as `pending`.
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<QueueEntry, IndicaError>;

    async fn get_entry(&self, id: &str) -> Result<Option<QueueEntry>, IndicaError>;

    /// Entries ready for dispatch at `now`, in priority order, with at most
    /// one entry per `(flow, recipient)` group.
    async fn list_eligible_for_dispatch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, IndicaError>;

    /// Applies a processor-driven state change. Terminal entries are rejected.
    async fn transition(&self, id: &str, transition: Transition)
    -> Result<QueueEntry, IndicaError>;

    /// Puts an entry back to `pending` with cleared retry bookkeeping.
    async fn reset_to_pending(&self, id: &str) -> Result<QueueEntry, IndicaError>;

    /// The lowest-order non-terminal entry of the group after `after_order`.
    async fn next_step_in_group(
        &self,
        flow_id: &str,
        to: &str,
        after_order: u32,
    ) -> Result<Option<QueueEntry>, IndicaError>;

    /// Deletes terminal entries last updated more than `days` before `now`.
    async fn purge_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<u64, IndicaError>;

    /// Resets entries stuck in `processing` since before `cutoff`.
    async fn reclaim_stuck(&self, cutoff: DateTime<Utc>) -> Result<u64, IndicaError>;

    async fn list_entries(
        &self,
        filter: &QueueFilter,
        page: PageRequest,
    ) -> Result<Page<QueueEntry>, IndicaError>;

    async fn queue_overview(&self) -> Result<QueueOverview, IndicaError>;

    /// Administrative override. Bypasses the terminal-state rule.
    async fn force_status(&self, id: &str, status: QueueStatus)
    -> Result<QueueEntry, IndicaError>;

    /// Deletes an entry that is not being or has not been dispatched.
    async fn delete_entry(&self, id: &str) -> Result<(), IndicaError>;

    /// Resets failed and over-retried entries; returns how many changed.
    async fn reset_failed(&self, selector: &ResetSelector) -> Result<u64, IndicaError>;

    async fn tenant_stats(&self, tenant_id: &str) -> Result<TenantQueueStats, IndicaError>;
}

/// Tenant flow definitions.
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// Creates a flow in `draft` state after validating its step orders.
    async fn create_flow(&self, flow: NewFlow) -> Result<FlowDefinition, IndicaError>;

    async fn get_flow(&self, id: &str) -> Result<Option<FlowDefinition>, IndicaError>;

    async fn list_flows(&self, tenant_id: &str) -> Result<Vec<FlowDefinition>, IndicaError>;

    async fn update_flow(&self, id: &str, update: FlowUpdate)
    -> Result<FlowDefinition, IndicaError>;

    async fn set_flow_status(
        &self,
        id: &str,
        status: FlowStatus,
    ) -> Result<FlowDefinition, IndicaError>;

    /// Refused while the flow is active.
    async fn delete_flow(&self, id: &str) -> Result<(), IndicaError>;

    async fn active_flows_for_trigger(
        &self,
        tenant_id: &str,
        trigger: &str,
    ) -> Result<Vec<FlowDefinition>, IndicaError>;

    async fn record_delivery_outcome(
        &self,
        flow_id: &str,
        outcome: DeliveryOutcome,
    ) -> Result<(), IndicaError>;
}

/// Reusable message templates.
#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    async fn create_template(&self, template: NewTemplate)
    -> Result<MessageTemplate, IndicaError>;

    async fn get_template(&self, id: &str) -> Result<Option<MessageTemplate>, IndicaError>;

    /// Templates visible to `tenant_id` (its own plus platform-wide), or all
    /// templates when `None`.
    async fn list_templates(
        &self,
        tenant_id: Option<&str>,
    ) -> Result<Vec<MessageTemplate>, IndicaError>;

    async fn set_template_status(
        &self,
        id: &str,
        status: TemplateStatus,
    ) -> Result<MessageTemplate, IndicaError>;

    /// Looks a template up in the tenant's scope, falling back to the
    /// platform scope.
    async fn resolve_template(
        &self,
        tenant_id: &str,
        template_id: &str,
    ) -> Result<Option<MessageTemplate>, IndicaError>;
}
