// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio text-message provider for the Indica delivery engine.
//!
//! Implements [`MessagingProvider`] on top of the Twilio Messages REST API.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use indica_config::model::SmsConfig;
use indica_core::{
    AdapterType, HealthStatus, IndicaError, MessagingProvider, PluginAdapter, ProviderReceipt,
};
use tracing::{debug, info};

use crate::client::TwilioClient;

/// Twilio provider implementing [`MessagingProvider`].
pub struct TwilioProvider {
    client: TwilioClient,
    from_number: String,
}

impl TwilioProvider {
    /// Builds a provider from the `[sms]` config section.
    ///
    /// Fails with a configuration error when any credential is missing.
    pub fn new(config: &SmsConfig) -> Result<Self, IndicaError> {
        let (Some(account_sid), Some(auth_token), Some(from_number)) = (
            config.account_sid.clone(),
            config.auth_token.clone(),
            config.from_number.clone(),
        ) else {
            return Err(IndicaError::Config(
                "sms.account_sid, sms.auth_token and sms.from_number are required".into(),
            ));
        };

        let client = TwilioClient::new(
            account_sid,
            auth_token,
            &config.api_base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(base_url = %config.api_base_url, "Twilio provider initialized");

        Ok(Self {
            client,
            from_number,
        })
    }

    /// The sender address stamped on outgoing messages.
    pub fn from_number(&self) -> &str {
        &self.from_number
    }
}

#[async_trait]
impl PluginAdapter for TwilioProvider {
    fn name(&self) -> &str {
        "twilio"
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
impl MessagingProvider for TwilioProvider {
    async fn send_text(&self, to: &str, body: &str) -> Result<ProviderReceipt, IndicaError> {
        let created = self
            .client
            .create_message(to, &self.from_number, body)
            .await?;
        debug!(sid = %created.sid, status = ?created.status, "message accepted by provider");
        Ok(ProviderReceipt {
            provider_message_id: created.sid,
        })
    }
}
