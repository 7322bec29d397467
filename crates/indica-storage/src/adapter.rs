// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use indica_config::model::StorageConfig;
use indica_core::{
    AdapterType, BackoffSchedule, DeliveryOutcome, FlowDefinition, FlowRepository, FlowStatus,
    FlowUpdate, HealthStatus, IndicaError, MessageTemplate, NewFlow, NewQueueEntry, NewTemplate,
    Page, PageRequest, PluginAdapter, QueueEntry, QueueFilter, QueueOverview, QueueStatus,
    QueueStore, ResetSelector, StorageAdapter, TemplateCatalog, TemplateStatus, TenantQueueStats,
    Transition,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    backoff: BackoffSchedule,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the default retry backoff.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            backoff: BackoffSchedule::default(),
            db: OnceCell::new(),
        }
    }

    /// Replaces the delay table used when an entry moves to `retry`.
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, IndicaError> {
        self.db.get().ok_or_else(|| IndicaError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), IndicaError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.config.database_path, "WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, IndicaError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), IndicaError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), IndicaError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| IndicaError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), IndicaError> {
        let db = self.db()?;
        self.checkpoint(db).await
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<QueueEntry, IndicaError> {
        queries::queue::enqueue(self.db()?, entry).await
    }

    async fn get_entry(&self, id: &str) -> Result<Option<QueueEntry>, IndicaError> {
        queries::queue::get_entry(self.db()?, id).await
    }

    async fn list_eligible_for_dispatch(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, IndicaError> {
        queries::queue::list_eligible_for_dispatch(self.db()?, limit, now).await
    }

    async fn transition(
        &self,
        id: &str,
        transition: Transition,
    ) -> Result<QueueEntry, IndicaError> {
        queries::queue::transition(self.db()?, id, transition, &self.backoff).await
    }

    async fn reset_to_pending(&self, id: &str) -> Result<QueueEntry, IndicaError> {
        queries::queue::reset_to_pending(self.db()?, id).await
    }

    async fn next_step_in_group(
        &self,
        flow_id: &str,
        to: &str,
        after_order: u32,
    ) -> Result<Option<QueueEntry>, IndicaError> {
        queries::queue::next_step_in_group(self.db()?, flow_id, to, after_order).await
    }

    async fn purge_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<u64, IndicaError> {
        queries::queue::purge_older_than(self.db()?, days, now).await
    }

    async fn reclaim_stuck(&self, cutoff: DateTime<Utc>) -> Result<u64, IndicaError> {
        queries::queue::reclaim_stuck(self.db()?, cutoff).await
    }

    async fn list_entries(
        &self,
        filter: &QueueFilter,
        page: PageRequest,
    ) -> Result<Page<QueueEntry>, IndicaError> {
        queries::queue::list_entries(self.db()?, filter, page).await
    }

    async fn queue_overview(&self) -> Result<QueueOverview, IndicaError> {
        queries::queue::queue_overview(self.db()?).await
    }

    async fn force_status(
        &self,
        id: &str,
        status: QueueStatus,
    ) -> Result<QueueEntry, IndicaError> {
        queries::queue::force_status(self.db()?, id, status).await
    }

    async fn delete_entry(&self, id: &str) -> Result<(), IndicaError> {
        queries::queue::delete_entry(self.db()?, id).await
    }

    async fn reset_failed(&self, selector: &ResetSelector) -> Result<u64, IndicaError> {
        queries::queue::reset_failed(self.db()?, selector).await
    }

    async fn tenant_stats(&self, tenant_id: &str) -> Result<TenantQueueStats, IndicaError> {
        queries::queue::tenant_stats(self.db()?, tenant_id).await
    }
}

#[async_trait]
impl FlowRepository for SqliteStorage {
    async fn create_flow(&self, flow: NewFlow) -> Result<FlowDefinition, IndicaError> {
        queries::flows::create_flow(self.db()?, flow).await
    }

    async fn get_flow(&self, id: &str) -> Result<Option<FlowDefinition>, IndicaError> {
        queries::flows::get_flow(self.db()?, id).await
    }

    async fn list_flows(&self, tenant_id: &str) -> Result<Vec<FlowDefinition>, IndicaError> {
        queries::flows::list_flows(self.db()?, tenant_id).await
    }

    async fn update_flow(
        &self,
        id: &str,
        update: FlowUpdate,
    ) -> Result<FlowDefinition, IndicaError> {
        queries::flows::update_flow(self.db()?, id, update).await
    }

    async fn set_flow_status(
        &self,
        id: &str,
        status: FlowStatus,
    ) -> Result<FlowDefinition, IndicaError> {
        queries::flows::set_flow_status(self.db()?, id, status).await
    }

    async fn delete_flow(&self, id: &str) -> Result<(), IndicaError> {
        queries::flows::delete_flow(self.db()?, id).await
    }

    async fn active_flows_for_trigger(
        &self,
        tenant_id: &str,
        trigger: &str,
    ) -> Result<Vec<FlowDefinition>, IndicaError> {
        queries::flows::active_flows_for_trigger(self.db()?, tenant_id, trigger).await
    }

    async fn record_delivery_outcome(
        &self,
        flow_id: &str,
        outcome: DeliveryOutcome,
    ) -> Result<(), IndicaError> {
        queries::flows::record_delivery_outcome(self.db()?, flow_id, outcome).await
    }
}

#[async_trait]
impl TemplateCatalog for SqliteStorage {
    async fn create_template(
        &self,
        template: NewTemplate,
    ) -> Result<MessageTemplate, IndicaError> {
        queries::templates::create_template(self.db()?, template).await
    }

    async fn get_template(&self, id: &str) -> Result<Option<MessageTemplate>, IndicaError> {
        queries::templates::get_template(self.db()?, id).await
    }

    async fn list_templates(
        &self,
        tenant_id: Option<&str>,
    ) -> Result<Vec<MessageTemplate>, IndicaError> {
        queries::templates::list_templates(self.db()?, tenant_id).await
    }

    async fn set_template_status(
        &self,
        id: &str,
        status: TemplateStatus,
    ) -> Result<MessageTemplate, IndicaError> {
        queries::templates::set_template_status(self.db()?, id, status).await
    }

    async fn resolve_template(
        &self,
        tenant_id: &str,
        template_id: &str,
    ) -> Result<Option<MessageTemplate>, IndicaError> {
        queries::templates::resolve_template(self.db()?, tenant_id, template_id).await
    }
}
