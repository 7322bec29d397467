// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Indica delivery engine.
//!
//! This crate provides the foundational trait definitions, error types,
//! domain types and the contact normalizer used throughout the Indica
//! workspace. Storage and provider backends implement traits defined here.

pub mod contact;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::IndicaError;
pub use event::{Participant, Referral, Reward, TriggerEvent, TriggerPayload};
pub use types::{
    AdapterType, BackoffSchedule, DeliveryOutcome, EntryMetadata, FlowDefinition, FlowStatistics,
    FlowStatus, FlowStep, FlowUpdate, HealthStatus, MessageContent, MessageTemplate, NewFlow,
    NewQueueEntry, NewTemplate, Page, PageRequest, Priority, PriorityCounts, ProviderReceipt,
    QueueEntry, QueueFilter, QueueOverview, QueueStatus, ResetSelector, StatusCounts,
    TemplateStatus, TenantQueueStats, Transition, TriggerData, Variables, validate_flow_shape,
};

// Re-export all adapter traits at crate root.
pub use traits::{
    FlowRepository, MessagingProvider, PluginAdapter, QueueStore, StorageAdapter,
    TemplateCatalog,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indica_error_has_all_variants() {
        let _config = IndicaError::Config("test".into());
        let _storage = IndicaError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _validation = IndicaError::Validation("test".into());
        let _not_found = IndicaError::not_found("queue entry", "q1");
        let _transition = IndicaError::InvalidTransition {
            id: "q1".into(),
            from: QueueStatus::Completed,
            to: QueueStatus::Processing,
        };
        let _conflict = IndicaError::Conflict("test".into());
        let _provider = IndicaError::Provider {
            message: "test".into(),
            source: None,
        };
        let _timeout = IndicaError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = IndicaError::Internal("test".into());
    }

    #[test]
    fn error_messages_are_readable() {
        let err = IndicaError::InvalidTransition {
            id: "q1".into(),
            from: QueueStatus::Completed,
            to: QueueStatus::Retry,
        };
        assert_eq!(err.to_string(), "invalid transition for q1: completed -> retry");
        let err = IndicaError::not_found("flow", "f1");
        assert_eq!(err.to_string(), "flow not found: f1");
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Provider, AdapterType::Storage] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_queue_store<T: QueueStore>() {}
        fn _assert_flow_repository<T: FlowRepository>() {}
        fn _assert_template_catalog<T: TemplateCatalog>() {}
        fn _assert_messaging_provider<T: MessagingProvider>() {}
    }
}
