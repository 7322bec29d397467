// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue processor for the Indica delivery engine.
//!
//! The [`QueueProcessor`] drains eligible entries through the messaging
//! provider under a re-entrancy guard, schedules retries, fails entries
//! permanently and advances their flow to the next step. [`scheduler`]
//! drives it from background loops until a shutdown token fires.

pub mod processor;
pub mod scheduler;
pub mod shutdown;

pub use processor::{
    MaintenanceReport, ProcessorSettings, QueueProcessor, TickOutcome, TickReport,
};
pub use scheduler::{run_dispatch_loop, run_maintenance_loop};
pub use shutdown::{drain_processor, install_signal_handler};
