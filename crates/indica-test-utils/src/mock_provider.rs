// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock SMS provider for deterministic testing.
//!
//! `MockTextProvider` implements `MessagingProvider` with a scripted queue of
//! outcomes and records every send, so dispatch can be tested without a
//! real gateway.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use indica_core::traits::adapter::PluginAdapter;
use indica_core::traits::provider::MessagingProvider;
use indica_core::types::{AdapterType, HealthStatus, ProviderReceipt};
use indica_core::IndicaError;

/// One send the provider accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub to: String,
    pub body: String,
}

/// A mock provider whose outcomes are popped from a FIFO queue.
///
/// When the queue is empty every send succeeds with a fresh
/// `mock-<uuid>` message id.
pub struct MockTextProvider {
    outcomes: Arc<Mutex<VecDeque<Result<String, String>>>>,
    sent: Arc<Mutex<Vec<SentText>>>,
    delay: Option<Duration>,
}

impl MockTextProvider {
    /// Create a provider that accepts every send.
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep this long inside every send. Used to hold a sweep open.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful send with the given provider id.
    pub async fn push_success(&self, provider_message_id: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(Ok(provider_message_id.into()));
    }

    /// Queue a provider rejection with the given message.
    pub async fn push_failure(&self, message: impl Into<String>) {
        self.outcomes.lock().await.push_back(Err(message.into()));
    }

    /// Queue `n` consecutive rejections.
    pub async fn push_failures(&self, n: usize, message: &str) {
        let mut outcomes = self.outcomes.lock().await;
        for _ in 0..n {
            outcomes.push_back(Err(message.to_string()));
        }
    }

    /// Every send attempted so far, in call order.
    pub async fn sent(&self) -> Vec<SentText> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for MockTextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTextProvider {
    fn name(&self) -> &str {
        "mock-sms"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, IndicaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), IndicaError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for MockTextProvider {
    async fn send_text(&self, to: &str, body: &str) -> Result<ProviderReceipt, IndicaError> {
        self.sent.lock().await.push(SentText {
            to: to.to_string(),
            body: body.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("mock-{}", uuid::Uuid::new_v4())));
        match outcome {
            Ok(provider_message_id) => Ok(ProviderReceipt {
                provider_message_id,
            }),
            Err(message) => Err(IndicaError::Provider {
                message,
                source: None,
            }),
        }
    }
}
