// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for outbound text-message delivery.

use async_trait::async_trait;

use crate::error::IndicaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ProviderReceipt;

/// Adapter for an external text-messaging provider.
///
/// Implementations make exactly one delivery attempt per call. Retry policy
/// belongs to the queue processor.
#[async_trait]
pub trait MessagingProvider: PluginAdapter {
    /// Sends `body` to the canonical address `to`.
    async fn send_text(&self, to: &str, body: &str) -> Result<ProviderReceipt, IndicaError>;
}
