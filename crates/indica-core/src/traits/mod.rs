// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Indica delivery engine.
//!
//! Backends implement these traits with `#[async_trait]` so they can be held
//! as `Arc<dyn Trait>` by the engine, the processor and the gateway.

pub mod adapter;
pub mod provider;
pub mod storage;

pub use adapter::PluginAdapter;
pub use provider::MessagingProvider;
pub use storage::{FlowRepository, QueueStore, StorageAdapter, TemplateCatalog};
