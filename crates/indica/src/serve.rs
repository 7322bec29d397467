// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `indica serve` command implementation.
//!
//! Opens storage, connects the SMS provider, and runs the dispatch loop,
//! the maintenance loop and the admin gateway until SIGINT/SIGTERM.

use std::time::Duration;

use indica_config::IndicaConfig;
use indica_core::IndicaError;
use indica_dispatch::{drain_processor, install_signal_handler, run_dispatch_loop, run_maintenance_loop};
use indica_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use tracing::{error, info, warn};

use crate::app::{Services, init_tracing};

/// How long shutdown waits for an in-flight sweep.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `indica serve` command.
pub async fn run_serve(config: IndicaConfig) -> Result<(), IndicaError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting indica serve");

    let services = Services::build(&config).await?;

    // Entries left in processing by a previous crash go back to pending.
    match services.processor.reclaim_stuck().await {
        Ok(0) => {}
        Ok(n) => info!(count = n, "recovered entries from previous run"),
        Err(e) => warn!(error = %e, "startup reclaim failed (non-fatal)"),
    }

    let cancel = install_signal_handler();

    let dispatch = tokio::spawn(run_dispatch_loop(
        services.processor.clone(),
        Duration::from_secs(config.dispatch.tick_interval_secs),
        cancel.clone(),
    ));
    let maintenance = tokio::spawn(run_maintenance_loop(
        services.processor.clone(),
        Duration::from_secs(config.retention.sweep_interval_hours * 3600),
        cancel.clone(),
    ));

    let gateway = if config.gateway.enabled {
        if config.gateway.bearer_token.is_none() {
            warn!("gateway.bearer_token is not set -- every admin request will be rejected");
        }
        let state = GatewayState {
            queue: services.storage.clone(),
            flows: services.storage.clone(),
            templates: services.storage.clone(),
            engine: services.engine.clone(),
            processor: services.processor.clone(),
            default_sender: services.sender.clone(),
            default_max_retries: config.dispatch.default_max_retries,
            auth: AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
        };
        let server_config = ServerConfig::from(&config.gateway);
        let gateway_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            let result =
                indica_gateway::start_server(&server_config, state, gateway_cancel.clone()).await;
            if result.is_err() {
                // Stop the loops if the admin API cannot run.
                gateway_cancel.cancel();
            }
            result
        }))
    } else {
        info!("gateway disabled");
        None
    };

    cancel.cancelled().await;
    info!("shutdown requested");

    if let Some(handle) = gateway {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "gateway exited with error"),
            Err(e) => error!(error = %e, "gateway task panicked"),
        }
    }
    for (name, handle) in [("dispatch", dispatch), ("maintenance", maintenance)] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "background task panicked");
        }
    }

    if !drain_processor(&services.processor, DRAIN_TIMEOUT).await {
        warn!("sweep still running at shutdown; unfinished entries will be reclaimed on next start");
    }
    services.close().await?;

    info!("indica serve shutdown complete");
    Ok(())
}
