// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of storage, provider, engine and processor from configuration.

use std::sync::Arc;

use indica_config::IndicaConfig;
use indica_core::{BackoffSchedule, IndicaError, MessagingProvider, StorageAdapter};
use indica_dispatch::{ProcessorSettings, QueueProcessor};
use indica_flows::{EngineSettings, FlowTriggerEngine};
use indica_sms::TwilioProvider;
use indica_storage::SqliteStorage;
use tracing::info;

/// Workspace crates whose events honor the configured level.
const LOG_TARGETS: &[&str] = &[
    "indica",
    "indica_config",
    "indica_core",
    "indica_dispatch",
    "indica_flows",
    "indica_gateway",
    "indica_sms",
    "indica_storage",
];

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={log_level}"))
            .collect();
        EnvFilter::new(format!("{},warn", directives.join(",")))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

/// Opens and migrates the configured database.
pub async fn open_storage(config: &IndicaConfig) -> Result<Arc<SqliteStorage>, IndicaError> {
    let storage = SqliteStorage::new(config.storage.clone()).with_backoff(
        BackoffSchedule::from_minutes(&config.dispatch.retry_backoff_minutes),
    );
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage ready");
    Ok(Arc::new(storage))
}

/// The running service graph.
pub struct Services {
    pub storage: Arc<SqliteStorage>,
    pub engine: Arc<FlowTriggerEngine>,
    pub processor: Arc<QueueProcessor>,
    pub sender: String,
}

impl Services {
    pub async fn build(config: &IndicaConfig) -> Result<Self, IndicaError> {
        let storage = open_storage(config).await?;
        let provider = TwilioProvider::new(&config.sms)?;
        let sender = provider.from_number().to_string();
        let provider: Arc<dyn MessagingProvider> = Arc::new(provider);

        let engine = Arc::new(FlowTriggerEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            EngineSettings {
                sender: sender.clone(),
                default_max_retries: config.dispatch.default_max_retries,
            },
        ));
        let processor = Arc::new(QueueProcessor::new(
            storage.clone(),
            storage.clone(),
            provider,
            ProcessorSettings::from_config(&config.dispatch, &config.retention),
        ));

        Ok(Self {
            storage,
            engine,
            processor,
            sender,
        })
    }

    pub async fn close(&self) -> Result<(), IndicaError> {
        self.storage.close().await
    }
}
