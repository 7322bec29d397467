// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Indica delivery engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Indica configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndicaConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Administrative HTTP surface.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Text-message provider credentials.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Queue processor tick, batching and retry policy.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Retention of finished queue entries.
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "indica".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("indica").join("indica.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("indica.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Administrative HTTP gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serve the admin API alongside the processor.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on every admin route. `None` rejects all requests.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3080
}

/// Twilio-compatible provider configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sender number in canonical `+` form.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Base URL of the provider REST API.
    #[serde(default = "default_sms_api_base_url")]
    pub api_base_url: String,

    /// HTTP client timeout for a single send.
    #[serde(default = "default_sms_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base_url: default_sms_api_base_url(),
            timeout_secs: default_sms_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("from_number", &self.from_number)
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmsConfig {
    /// True when every credential needed to send is present.
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

fn default_sms_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_sms_timeout_secs() -> u64 {
    30
}

/// Queue processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between scheduled ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Maximum entries dispatched per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive sends within a tick. 0 disables the pause.
    #[serde(default)]
    pub send_interval_ms: u64,

    /// `max_retries` stamped on entries created by the trigger engine.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Retry delays in minutes; the last value repeats.
    #[serde(default = "default_retry_backoff_minutes")]
    pub retry_backoff_minutes: Vec<u64>,

    /// Entries left in `processing` longer than this are reclaimed.
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,

    /// Upper bound on a single provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            batch_size: default_batch_size(),
            send_interval_ms: 0,
            default_max_retries: default_max_retries(),
            retry_backoff_minutes: default_retry_backoff_minutes(),
            processing_timeout_secs: default_processing_timeout_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_minutes() -> Vec<u64> {
    vec![1, 5, 15, 30]
}

fn default_processing_timeout_secs() -> u64 {
    900
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// Retention sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Completed and failed entries older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Hours between maintenance sweeps.
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            sweep_interval_hours: default_sweep_interval_hours(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_sweep_interval_hours() -> u64 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_deserialize_independently() {
        let config: IndicaConfig = toml::from_str("[dispatch]\nsend_interval_ms = 250\n").unwrap();
        assert_eq!(config.dispatch.send_interval_ms, 250);
        assert_eq!(config.dispatch.tick_interval_secs, 30);
        assert_eq!(config.gateway.port, 3080);
    }

    #[test]
    fn defaults_serialize_to_toml() {
        let rendered = toml::to_string(&IndicaConfig::default()).unwrap();
        assert!(rendered.contains("[dispatch]"));
        assert!(rendered.contains("retry_backoff_minutes = [1, 5, 15, 30]"));
    }

    #[test]
    fn sms_requires_all_credentials() {
        let mut sms = SmsConfig {
            account_sid: Some("AC1".into()),
            auth_token: Some("t".into()),
            ..Default::default()
        };
        assert!(!sms.is_configured());
        sms.from_number = Some("+15550001111".into());
        assert!(sms.is_configured());
    }
}
