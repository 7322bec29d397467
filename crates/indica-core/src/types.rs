// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Indica delivery engine.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::IndicaError;

/// Template variables and free-form event data.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
}

// --- Queue types ---

/// Dispatch priority. Lower bands are always drained first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric band used for ordering and queue positions.
    pub fn band(self) -> i64 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn from_band(band: i64) -> Option<Self> {
        match band {
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Lifecycle state of a queue entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 5] = [
        QueueStatus::Pending,
        QueueStatus::Processing,
        QueueStatus::Completed,
        QueueStatus::Failed,
        QueueStatus::Retry,
    ];

    /// Completed and failed entries are kept for audit only.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// Rendered message content, snapshotted onto the queue entry at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
}

impl MessageContent {
    /// Flattens header, body and footer into the text sent to the provider.
    pub fn to_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(header) = self.header.as_deref().filter(|h| !h.is_empty()) {
            parts.push(header);
        }
        parts.push(&self.body);
        if let Some(footer) = self.footer.as_deref().filter(|f| !f.is_empty()) {
            parts.push(footer);
        }
        parts.join("\n\n")
    }
}

/// Identifiers of the business event that produced a queue entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub event_data: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Step order within the originating flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_order: Option<u32>,
    /// The entry is withheld from dispatch until this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

/// A persisted outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub tenant_id: String,
    pub flow_id: Option<String>,
    pub template_id: Option<String>,
    pub to: String,
    pub from: String,
    pub content: MessageContent,
    pub variables: Variables,
    pub priority: Priority,
    pub status: QueueStatus,
    pub trigger: String,
    pub trigger_data: TriggerData,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts_count: u32,
    pub queue_position: i64,
    pub metadata: EntryMetadata,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Retries left before the next failure becomes permanent.
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count + 1 < self.max_retries
    }
}

/// Input to [`crate::QueueStore::enqueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub tenant_id: String,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    pub to: String,
    #[serde(default)]
    pub from: String,
    pub content: MessageContent,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub priority: Priority,
    pub trigger: String,
    #[serde(default)]
    pub trigger_data: TriggerData,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

fn default_max_retries() -> u32 {
    1
}

/// A state change applied by [`crate::QueueStore::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Processing,
    Completed { provider_message_id: String },
    Retry { error: String },
    Failed { error: String },
}

impl Transition {
    pub fn target(&self) -> QueueStatus {
        match self {
            Transition::Processing => QueueStatus::Processing,
            Transition::Completed { .. } => QueueStatus::Completed,
            Transition::Retry { .. } => QueueStatus::Retry,
            Transition::Failed { .. } => QueueStatus::Failed,
        }
    }
}

/// Delay table for scheduled retries, indexed by retry number and capped at
/// its last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    /// Builds a schedule from minute values. An empty table falls back to the default.
    pub fn from_minutes(minutes: &[u64]) -> Self {
        if minutes.is_empty() {
            return Self::default();
        }
        Self {
            steps: minutes
                .iter()
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .collect(),
        }
    }

    /// Delay before retry number `retry_count` (1-based).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let idx = (retry_count.max(1) as usize - 1).min(self.steps.len() - 1);
        self.steps[idx]
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_minutes(&[1, 5, 15, 30])
    }
}

/// Listing filter for the administrative surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueFilter {
    #[serde(default)]
    pub status: Option<QueueStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let limit = u64::from(request.limit);
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub retry: u64,
    pub total: u64,
}

impl StatusCounts {
    /// Adds `count` to the bucket for `status` and to the total.
    pub fn add(&mut self, status: QueueStatus, count: u64) {
        match status {
            QueueStatus::Pending => self.pending += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Completed => self.completed += count,
            QueueStatus::Failed => self.failed += count,
            QueueStatus::Retry => self.retry += count,
        }
        self.total += count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl PriorityCounts {
    pub fn add(&mut self, priority: Priority, count: u64) {
        match priority {
            Priority::High => self.high += count,
            Priority::Medium => self.medium += count,
            Priority::Low => self.low += count,
        }
    }
}

/// Queue-wide counters returned by `GET /queue/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOverview {
    pub by_status: StatusCounts,
    pub by_priority: PriorityCounts,
}

/// Per-tenant totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantQueueStats {
    pub tenant_id: String,
    pub counts: StatusCounts,
    /// completed / (completed + failed), 0.0 when nothing has finished yet.
    pub success_rate: f64,
}

impl TenantQueueStats {
    pub fn from_counts(tenant_id: impl Into<String>, counts: StatusCounts) -> Self {
        let finished = counts.completed + counts.failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            counts.completed as f64 / finished as f64
        };
        Self {
            tenant_id: tenant_id.into(),
            counts,
            success_rate,
        }
    }
}

/// Selects entries for `reset-failed`. With no ids, every failed or
/// over-retried entry matching the optional scopes is reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSelector {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub flow_id: Option<String>,
}

// --- Flow types ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl FlowStatus {
    pub fn can_transition_to(self, next: FlowStatus) -> bool {
        use FlowStatus::*;
        match (self, next) {
            (Archived, _) => false,
            (_, Archived) => true,
            (Draft, Active) | (Active, Paused) | (Paused, Active) => true,
            (a, b) => a == b,
        }
    }
}

/// One message of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    /// 1-based position in the flow.
    pub order: u32,
    pub template_id: String,
    /// Delay after the trigger fires.
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatistics {
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Outcome counters bumped on a flow's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub audience_tag: Option<String>,
    pub triggers: Vec<String>,
    pub steps: Vec<FlowStep>,
    pub status: FlowStatus,
    pub statistics: FlowStatistics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowDefinition {
    pub fn subscribes_to(&self, trigger: &str) -> bool {
        self.triggers.iter().any(|t| t == trigger)
    }

    /// Steps sorted by order.
    pub fn ordered_steps(&self) -> Vec<&FlowStep> {
        let mut steps: Vec<&FlowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

/// Checks that step orders are exactly `{1..N}` and that triggers are present.
pub fn validate_flow_shape(triggers: &[String], steps: &[FlowStep]) -> Result<(), IndicaError> {
    if triggers.iter().all(|t| t.trim().is_empty()) {
        return Err(IndicaError::Validation(
            "flow must subscribe to at least one trigger".into(),
        ));
    }
    if steps.is_empty() {
        return Err(IndicaError::Validation(
            "flow must have at least one step".into(),
        ));
    }
    let orders: BTreeSet<u32> = steps.iter().map(|s| s.order).collect();
    if orders.len() != steps.len() {
        return Err(IndicaError::Validation(
            "flow step orders must be unique".into(),
        ));
    }
    let expected: BTreeSet<u32> = (1..=steps.len() as u32).collect();
    if orders != expected {
        return Err(IndicaError::Validation(format!(
            "flow step orders must be contiguous from 1 to {}",
            steps.len()
        )));
    }
    if let Some(step) = steps.iter().find(|s| s.template_id.trim().is_empty()) {
        return Err(IndicaError::Validation(format!(
            "step {} has no template",
            step.order
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlow {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub audience_tag: Option<String>,
    pub triggers: Vec<String>,
    pub steps: Vec<FlowStep>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub audience_tag: Option<String>,
    #[serde(default)]
    pub triggers: Option<Vec<String>>,
    #[serde(default)]
    pub steps: Option<Vec<FlowStep>>,
}

// --- Template types ---

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TemplateStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: String,
    /// `None` for platform-wide templates.
    pub tenant_id: Option<String>,
    pub name: String,
    pub content: MessageContent,
    pub status: TemplateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub name: String,
    pub content: MessageContent,
    #[serde(default)]
    pub status: TemplateStatus,
}

// --- Provider types ---

/// Acknowledgement returned by a successful provider send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
}
