// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue processor: drains eligible entries through the provider and
//! moves each one to its next state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use indica_config::model::{DispatchConfig, RetentionConfig};
use indica_core::{
    DeliveryOutcome, FlowRepository, IndicaError, MessagingProvider, QueueEntry, QueueStore,
    Transition, contact,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Tuning knobs for [`QueueProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Entries fetched per scheduled tick.
    pub batch_size: usize,
    /// Pause between consecutive sends.
    pub send_interval: Duration,
    /// Upper bound on one provider call.
    pub provider_timeout: Duration,
    /// Entries left in `processing` longer than this are reclaimed.
    pub processing_timeout: Duration,
    pub retention_days: u32,
}

impl ProcessorSettings {
    pub fn from_config(dispatch: &DispatchConfig, retention: &RetentionConfig) -> Self {
        Self {
            batch_size: dispatch.batch_size,
            send_interval: Duration::from_millis(dispatch.send_interval_ms),
            provider_timeout: Duration::from_secs(dispatch.provider_timeout_secs),
            processing_timeout: Duration::from_secs(dispatch.processing_timeout_secs),
            retention_days: retention.retention_days,
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default(), &RetentionConfig::default())
    }
}

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub reclaimed: u64,
    pub processed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    /// Failed entries whose next flow step was released.
    pub advanced: usize,
    /// Entries that hit a storage error mid-dispatch.
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Another sweep held the guard; nothing was done.
    Skipped,
    Ran(TickReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub reclaimed: u64,
    pub purged: u64,
}

enum EntryOutcome {
    Completed,
    Retried,
    Failed { advanced: bool },
}

/// Releases the re-entrancy flag when the sweep ends, including on panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tick-driven dispatcher. At most one sweep runs at a time; overlapping
/// calls return [`TickOutcome::Skipped`] without touching the queue.
pub struct QueueProcessor {
    queue: Arc<dyn QueueStore>,
    flows: Arc<dyn FlowRepository>,
    provider: Arc<dyn MessagingProvider>,
    settings: ProcessorSettings,
    running: AtomicBool,
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        flows: Arc<dyn FlowRepository>,
        provider: Arc<dyn MessagingProvider>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            queue,
            flows,
            provider,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// True while a sweep holds the guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<TickGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(&self.running))
    }

    /// One scheduled sweep of up to `batch_size` entries.
    pub async fn tick(&self) -> TickOutcome {
        self.process_now(self.settings.batch_size).await
    }

    /// An operator-initiated sweep of up to `limit` entries.
    pub async fn process_now(&self, limit: usize) -> TickOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("sweep already running, tick skipped");
            return TickOutcome::Skipped;
        };
        TickOutcome::Ran(self.run_batch(limit).await)
    }

    async fn run_batch(&self, limit: usize) -> TickReport {
        let mut report = TickReport::default();

        match self.reclaim_stuck().await {
            Ok(n) => report.reclaimed = n,
            Err(e) => warn!(error = %e, "stuck-entry reclaim failed"),
        }

        let entries = match self
            .queue
            .list_eligible_for_dispatch(limit, Utc::now())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to list eligible entries");
                report.errors += 1;
                return report;
            }
        };

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && !self.settings.send_interval.is_zero() {
                tokio::time::sleep(self.settings.send_interval).await;
            }
            report.processed += 1;
            match self.dispatch_entry(entry).await {
                Ok(EntryOutcome::Completed) => report.completed += 1,
                Ok(EntryOutcome::Retried) => report.retried += 1,
                Ok(EntryOutcome::Failed { advanced }) => {
                    report.failed += 1;
                    if advanced {
                        report.advanced += 1;
                    }
                }
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "dispatch aborted for entry");
                    report.errors += 1;
                }
            }
        }

        if report.processed > 0 || report.reclaimed > 0 {
            info!(
                processed = report.processed,
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                advanced = report.advanced,
                reclaimed = report.reclaimed,
                "sweep finished"
            );
        }
        report
    }

    async fn dispatch_entry(&self, entry: &QueueEntry) -> Result<EntryOutcome, IndicaError> {
        let entry = self.queue.transition(&entry.id, Transition::Processing).await?;

        let to = match contact::canonicalize(&entry.to) {
            Ok(to) => to,
            Err(e) => return self.fail_permanently(&entry, e.to_string()).await,
        };

        let body = entry.content.to_text();
        let timeout = self.settings.provider_timeout;
        let result = match tokio::time::timeout(timeout, self.provider.send_text(&to, &body)).await
        {
            Ok(result) => result,
            Err(_) => Err(IndicaError::Timeout { duration: timeout }),
        };

        match result {
            Ok(receipt) => {
                self.queue
                    .transition(
                        &entry.id,
                        Transition::Completed {
                            provider_message_id: receipt.provider_message_id.clone(),
                        },
                    )
                    .await?;
                self.record(&entry, DeliveryOutcome::Sent).await;
                debug!(
                    entry_id = %entry.id,
                    provider_message_id = %receipt.provider_message_id,
                    "entry completed"
                );
                Ok(EntryOutcome::Completed)
            }
            Err(e) if entry.has_retry_budget() => {
                let updated = self
                    .queue
                    .transition(
                        &entry.id,
                        Transition::Retry {
                            error: e.to_string(),
                        },
                    )
                    .await?;
                warn!(
                    entry_id = %entry.id,
                    retry_count = updated.retry_count,
                    next_retry_at = ?updated.next_retry_at,
                    error = %e,
                    "send failed, retry scheduled"
                );
                Ok(EntryOutcome::Retried)
            }
            Err(e) => self.fail_permanently(&entry, e.to_string()).await,
        }
    }

    async fn fail_permanently(
        &self,
        entry: &QueueEntry,
        error: String,
    ) -> Result<EntryOutcome, IndicaError> {
        warn!(entry_id = %entry.id, flow_id = ?entry.flow_id, error = %error, "entry failed permanently");
        self.queue
            .transition(&entry.id, Transition::Failed { error })
            .await?;
        self.record(entry, DeliveryOutcome::Failed).await;

        let advanced = match self.advance_group(entry).await {
            Ok(advanced) => advanced,
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "sequential fallback failed");
                false
            }
        };
        Ok(EntryOutcome::Failed { advanced })
    }

    /// Releases the next step of the failed entry's `(flow, recipient)` group.
    async fn advance_group(&self, entry: &QueueEntry) -> Result<bool, IndicaError> {
        let (Some(flow_id), Some(order)) = (entry.flow_id.as_deref(), entry.metadata.message_order)
        else {
            return Ok(false);
        };
        let Some(next) = self
            .queue
            .next_step_in_group(flow_id, &entry.to, order)
            .await?
        else {
            return Ok(false);
        };
        self.queue.reset_to_pending(&next.id).await?;
        info!(
            flow_id,
            failed_entry = %entry.id,
            next_entry = %next.id,
            next_order = ?next.metadata.message_order,
            "flow advanced to next step"
        );
        Ok(true)
    }

    async fn record(&self, entry: &QueueEntry, outcome: DeliveryOutcome) {
        let Some(flow_id) = entry.flow_id.as_deref() else {
            return;
        };
        if let Err(e) = self.flows.record_delivery_outcome(flow_id, outcome).await {
            warn!(flow_id, %outcome, error = %e, "failed to update flow statistics");
        }
    }

    /// Returns entries stuck in `processing` beyond the timeout to `pending`.
    pub async fn reclaim_stuck(&self) -> Result<u64, IndicaError> {
        let timeout = TimeDelta::from_std(self.settings.processing_timeout)
            .map_err(|e| IndicaError::Internal(format!("processing timeout out of range: {e}")))?;
        let reclaimed = self.queue.reclaim_stuck(Utc::now() - timeout).await?;
        if reclaimed > 0 {
            warn!(count = reclaimed, "reclaimed entries stuck in processing");
        }
        Ok(reclaimed)
    }

    /// Deletes finished entries older than `days`.
    pub async fn purge(&self, days: u32) -> Result<u64, IndicaError> {
        let purged = self.queue.purge_older_than(days, Utc::now()).await?;
        info!(days, purged, "purged finished entries");
        Ok(purged)
    }

    /// Periodic housekeeping: stuck-entry reclaim, then retention purge.
    pub async fn maintain(&self) -> Result<MaintenanceReport, IndicaError> {
        let reclaimed = self.reclaim_stuck().await?;
        let purged = self.purge(self.settings.retention_days).await?;
        Ok(MaintenanceReport { reclaimed, purged })
    }
}
