// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./indica.toml` > `~/.config/indica/indica.toml` > `/etc/indica/indica.toml`
//! with environment variable overrides via `INDICA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::IndicaConfig;

/// Config sections addressable from the environment, e.g.
/// `INDICA_DISPATCH_BATCH_SIZE` -> `dispatch.batch_size`.
const ENV_SECTIONS: &[&str] = &["service", "storage", "gateway", "sms", "dispatch", "retention"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/indica/indica.toml` (system-wide)
/// 3. `~/.config/indica/indica.toml` (user XDG config)
/// 4. `./indica.toml` (local directory)
/// 5. `INDICA_*` environment variables
pub fn load_config() -> Result<IndicaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<IndicaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(IndicaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<IndicaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(IndicaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(IndicaConfig::default()))
        .merge(Toml::file("/etc/indica/indica.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("indica/indica.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("indica.toml"))
        .merge(env_provider())
}

/// Environment provider mapping the first underscore after a known section
/// name to a dot.
///
/// `Env::split("_")` would turn `INDICA_DISPATCH_BATCH_SIZE` into
/// `dispatch.batch.size`, so the mapping is explicit.
fn env_provider() -> Env {
    Env::prefixed("INDICA_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("dispatch_batch_size"), "dispatch.batch_size");
        assert_eq!(map_env_key("sms_auth_token"), "sms.auth_token");
        assert_eq!(
            map_env_key("retention_retention_days"),
            "retention.retention_days"
        );
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }
}
