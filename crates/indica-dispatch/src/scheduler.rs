// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background loops driving the processor until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::processor::{QueueProcessor, TickOutcome};

/// Runs a sweep every `every`, starting immediately.
pub async fn run_dispatch_loop(
    processor: Arc<QueueProcessor>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "dispatch loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let TickOutcome::Skipped = processor.tick().await {
                    debug!("dispatch tick skipped");
                }
            }
            _ = cancel.cancelled() => {
                info!("dispatch loop shutting down");
                break;
            }
        }
    }
}

/// Runs housekeeping every `every`. The first pass happens one period
/// after start.
pub async fn run_maintenance_loop(
    processor: Arc<QueueProcessor>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match processor.maintain().await {
                    Ok(report) => debug!(reclaimed = report.reclaimed, purged = report.purged, "maintenance pass complete"),
                    Err(e) => warn!(error = %e, "maintenance pass failed (non-fatal)"),
                }
            }
            _ = cancel.cancelled() => {
                info!("maintenance loop shutting down");
                break;
            }
        }
    }
}
