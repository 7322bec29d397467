// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints that serde attributes cannot express:
//! non-empty paths, positive intervals, a usable bind address and a
//! parseable provider URL.

use crate::diagnostic::ConfigError;
use crate::model::IndicaConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest accepted retry delay: one week.
const MAX_BACKOFF_MINUTES: u64 = 7 * 24 * 60;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &IndicaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        invalid(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        invalid("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            invalid(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config
        .gateway
        .bearer_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        invalid("gateway.bearer_token must not be blank when set".to_string());
    }

    let base_url = config.sms.api_base_url.trim();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        invalid(format!(
            "sms.api_base_url `{base_url}` must be an http(s) URL"
        ));
    }

    if config.sms.timeout_secs == 0 {
        invalid("sms.timeout_secs must be at least 1".to_string());
    }

    let dispatch = &config.dispatch;
    if dispatch.tick_interval_secs == 0 {
        invalid("dispatch.tick_interval_secs must be at least 1".to_string());
    }
    if dispatch.batch_size == 0 {
        invalid("dispatch.batch_size must be at least 1".to_string());
    }
    if dispatch.default_max_retries == 0 {
        invalid("dispatch.default_max_retries must be at least 1".to_string());
    }
    if dispatch.retry_backoff_minutes.is_empty() {
        invalid("dispatch.retry_backoff_minutes must list at least one delay".to_string());
    }
    if dispatch.retry_backoff_minutes.contains(&0) {
        invalid("dispatch.retry_backoff_minutes values must be positive".to_string());
    }
    if dispatch
        .retry_backoff_minutes
        .iter()
        .any(|m| *m > MAX_BACKOFF_MINUTES)
    {
        invalid(format!(
            "dispatch.retry_backoff_minutes values must not exceed {MAX_BACKOFF_MINUTES}"
        ));
    }
    if dispatch.processing_timeout_secs == 0 {
        invalid("dispatch.processing_timeout_secs must be at least 1".to_string());
    }
    if dispatch.provider_timeout_secs == 0 {
        invalid("dispatch.provider_timeout_secs must be at least 1".to_string());
    }

    if config.retention.retention_days == 0 {
        invalid("retention.retention_days must be at least 1".to_string());
    }
    if config.retention.sweep_interval_hours == 0 {
        invalid("retention.sweep_interval_hours must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = IndicaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = IndicaConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_intervals_fail_validation() {
        let mut config = IndicaConfig::default();
        config.dispatch.tick_interval_secs = 0;
        config.dispatch.batch_size = 0;
        config.retention.retention_days = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_error(&errors, "tick_interval_secs"));
        assert!(has_error(&errors, "batch_size"));
        assert!(has_error(&errors, "retention_days"));
    }

    #[test]
    fn empty_backoff_table_fails_validation() {
        let mut config = IndicaConfig::default();
        config.dispatch.retry_backoff_minutes.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "retry_backoff_minutes"));
    }

    #[test]
    fn oversized_backoff_fails_validation() {
        let mut config = IndicaConfig::default();
        config.dispatch.retry_backoff_minutes = vec![1, u64::MAX];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "must not exceed"));

        config.dispatch.retry_backoff_minutes = vec![1, MAX_BACKOFF_MINUTES];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_host_and_url_fail_validation() {
        let mut config = IndicaConfig::default();
        config.gateway.host = "not a host!".to_string();
        config.sms.api_base_url = "ftp://example.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "gateway.host"));
        assert!(has_error(&errors, "api_base_url"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = IndicaConfig::default();
        config.service.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "log_level"));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = IndicaConfig::default();
        config.gateway.host = "0.0.0.0".to_string();
        config.gateway.bearer_token = Some("secret".to_string());
        config.storage.database_path = "/tmp/test.db".to_string();
        config.dispatch.retry_backoff_minutes = vec![2, 10];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let mut config = IndicaConfig::default();
        config.gateway.bearer_token = Some("gw-secret".to_string());
        config.sms.auth_token = Some("sms-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("gw-secret"));
        assert!(!rendered.contains("sms-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
