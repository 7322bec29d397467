// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow trigger engine for the Indica delivery engine.
//!
//! Maps business events to the active flows that subscribe to them,
//! renders each step's template and queues one entry per step.

pub mod engine;
pub mod projection;
pub mod render;

pub use engine::{EngineSettings, FlowTriggerEngine, TriggerOutcome, priority_for};
