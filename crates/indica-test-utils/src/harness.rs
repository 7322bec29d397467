// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete delivery stack: a temp SQLite
//! database, the flow trigger engine and a queue processor wired to a
//! [`MockTextProvider`]. Retries are due immediately so a test can drive
//! the whole lifecycle with repeated `tick()` calls.

use std::sync::Arc;
use std::time::Duration;

use indica_config::model::StorageConfig;
use indica_core::types::{
    BackoffSchedule, FlowStatus, FlowStep, MessageContent, NewFlow, NewTemplate, PageRequest,
    QueueEntry, QueueFilter, TemplateStatus,
};
use indica_core::{FlowRepository, IndicaError, QueueStore, StorageAdapter, TemplateCatalog};
use indica_dispatch::{ProcessorSettings, QueueProcessor, TickOutcome};
use indica_flows::{EngineSettings, FlowTriggerEngine};
use indica_storage::SqliteStorage;

use crate::mock_provider::MockTextProvider;

/// Tenant every harness helper writes under.
pub const TEST_TENANT: &str = "tenant-test";

/// Sender identity stamped on engine-created entries.
pub const TEST_SENDER: &str = "+15550001111";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    max_retries: u32,
    batch_size: usize,
    provider: MockTextProvider,
    provider_timeout: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            max_retries: 3,
            batch_size: 50,
            provider: MockTextProvider::new(),
            provider_timeout: Duration::from_secs(5),
        }
    }

    /// Attempts each engine-created entry gets before failing permanently.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Use a pre-configured provider instead of an always-succeeding one.
    pub fn with_provider(mut self, provider: MockTextProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, IndicaError> {
        let temp_dir = tempfile::TempDir::new().map_err(IndicaError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().into_owned(),
            wal_mode: true,
        })
        .with_backoff(BackoffSchedule::from_minutes(&[0]));
        storage.initialize().await?;
        let storage = Arc::new(storage);
        let provider = Arc::new(self.provider);

        let engine = Arc::new(FlowTriggerEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            EngineSettings {
                sender: TEST_SENDER.to_string(),
                default_max_retries: self.max_retries,
            },
        ));

        let processor = Arc::new(QueueProcessor::new(
            storage.clone(),
            storage.clone(),
            provider.clone(),
            ProcessorSettings {
                batch_size: self.batch_size,
                send_interval: Duration::ZERO,
                provider_timeout: self.provider_timeout,
                ..ProcessorSettings::default()
            },
        ));

        Ok(TestHarness {
            storage,
            provider,
            engine,
            processor,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock provider and temp storage.
pub struct TestHarness {
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub provider: Arc<MockTextProvider>,
    pub engine: Arc<FlowTriggerEngine>,
    pub processor: Arc<QueueProcessor>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings.
    pub async fn new() -> Result<Self, IndicaError> {
        Self::builder().build().await
    }

    /// Create an approved tenant template with the given body.
    pub async fn approved_template(&self, body: &str) -> Result<String, IndicaError> {
        let template = self
            .storage
            .create_template(NewTemplate {
                tenant_id: Some(TEST_TENANT.to_string()),
                name: format!("tpl-{}", uuid::Uuid::new_v4()),
                content: MessageContent {
                    body: body.to_string(),
                    ..Default::default()
                },
                status: TemplateStatus::Approved,
            })
            .await?;
        Ok(template.id)
    }

    /// Create and activate a flow whose steps use `steps` as
    /// `(template_id, delay_secs)`, numbered from 1 in slice order.
    pub async fn active_flow(
        &self,
        trigger: &str,
        steps: &[(&str, u64)],
    ) -> Result<String, IndicaError> {
        let flow = self
            .storage
            .create_flow(NewFlow {
                tenant_id: TEST_TENANT.to_string(),
                name: format!("{trigger} flow"),
                audience_tag: None,
                triggers: vec![trigger.to_string()],
                steps: steps
                    .iter()
                    .zip(1u32..)
                    .map(|((template_id, delay_secs), order)| FlowStep {
                        order,
                        template_id: (*template_id).to_string(),
                        delay_secs: *delay_secs,
                    })
                    .collect(),
            })
            .await?;
        self.storage
            .set_flow_status(&flow.id, FlowStatus::Active)
            .await?;
        Ok(flow.id)
    }

    /// Every queue entry, ordered by step order within each flow.
    pub async fn entries(&self) -> Result<Vec<QueueEntry>, IndicaError> {
        let page = self
            .storage
            .list_entries(&QueueFilter::default(), PageRequest::new(1, PageRequest::MAX_LIMIT))
            .await?;
        let mut items = page.items;
        items.sort_by_key(|e| (e.flow_id.clone(), e.metadata.message_order, e.queue_position));
        Ok(items)
    }

    pub async fn entry(&self, id: &str) -> Result<QueueEntry, IndicaError> {
        self.storage
            .get_entry(id)
            .await?
            .ok_or_else(|| IndicaError::not_found("queue entry", id))
    }

    /// Run sweeps until one processes nothing, up to `max_ticks`.
    pub async fn drain(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks {
            ticks += 1;
            match self.processor.tick().await {
                TickOutcome::Ran(report) if report.processed == 0 => break,
                _ => {}
            }
        }
        ticks
    }
}
