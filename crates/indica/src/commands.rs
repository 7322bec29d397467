// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot commands: `process`, `purge` and `config check`.

use chrono::Utc;
use indica_config::IndicaConfig;
use indica_core::{IndicaError, QueueStore, StorageAdapter};
use indica_dispatch::TickOutcome;

use crate::app::{Services, init_tracing, open_storage};

/// Runs a single sweep and prints its report as JSON.
pub async fn run_process(config: IndicaConfig, limit: Option<usize>) -> Result<(), IndicaError> {
    init_tracing(&config.service.log_level);
    let services = Services::build(&config).await?;
    let limit = limit.unwrap_or(config.dispatch.batch_size);
    let outcome = services.processor.process_now(limit).await;
    services.close().await?;

    match &outcome {
        TickOutcome::Ran(report) if report.errors > 0 => {
            eprintln!("indica process: {} entries hit storage errors", report.errors);
        }
        TickOutcome::Skipped => eprintln!("indica process: another sweep is running"),
        TickOutcome::Ran(_) => {}
    }
    print_json(&outcome)
}

/// Purges finished entries older than `days` (or the retention window).
pub async fn run_purge(config: IndicaConfig, days: Option<u32>) -> Result<(), IndicaError> {
    init_tracing(&config.service.log_level);
    let storage = open_storage(&config).await?;
    let days = days.unwrap_or(config.retention.retention_days);
    let purged = storage.purge_older_than(days, Utc::now()).await?;
    storage.close().await?;
    println!("indica purge: removed {purged} entries older than {days} days");
    Ok(())
}

/// Prints the effective configuration with secrets masked.
pub fn print_config_summary(config: &IndicaConfig) {
    let mask = |v: &Option<String>| if v.is_some() { "set" } else { "not set" };
    println!("config ok");
    println!("  service.name          = {}", config.service.name);
    println!("  service.log_level     = {}", config.service.log_level);
    println!("  storage.database_path = {}", config.storage.database_path);
    println!(
        "  gateway               = {} ({}:{}, token {})",
        if config.gateway.enabled { "enabled" } else { "disabled" },
        config.gateway.host,
        config.gateway.port,
        mask(&config.gateway.bearer_token)
    );
    println!(
        "  sms                   = account {}, token {}, from {}",
        mask(&config.sms.account_sid),
        mask(&config.sms.auth_token),
        config.sms.from_number.as_deref().unwrap_or("not set")
    );
    println!(
        "  dispatch              = every {}s, batch {}, max_retries {}, backoff {:?} min",
        config.dispatch.tick_interval_secs,
        config.dispatch.batch_size,
        config.dispatch.default_max_retries,
        config.dispatch.retry_backoff_minutes
    );
    println!(
        "  retention             = {} days, sweep every {}h",
        config.retention.retention_days, config.retention.sweep_interval_hours
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), IndicaError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| IndicaError::Internal(format!("failed to encode report: {e}")))?;
    println!("{json}");
    Ok(())
}
