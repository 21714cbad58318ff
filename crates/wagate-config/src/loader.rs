// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wagate.toml` > `~/.config/wagate/wagate.toml`
//! > `/etc/wagate/wagate.toml` with environment variable overrides via the
//! `WAGATE_` prefix. The ingestion pipeline additionally recognizes the
//! flat `INGEST_*` variables, mapped into the `[ingest]` section.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WagateConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wagate/wagate.toml` (system-wide)
/// 3. `~/.config/wagate/wagate.toml` (user XDG config)
/// 4. `./wagate.toml` (local directory)
/// 5. `WAGATE_*` environment variables
/// 6. `INGEST_*` environment variables (ingest section only)
pub fn load_config() -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::file("/etc/wagate/wagate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wagate/wagate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wagate.toml"))
        .merge(env_provider())
        .merge(ingest_env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WagateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WagateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(ingest_env_provider())
        .extract()
}

/// Create the `WAGATE_*` provider using explicit `map()` for section-to-dot
/// mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WAGATE_INGEST_QUEUE_CAPACITY` must map
/// to `ingest.queue_capacity`, not `ingest.queue.capacity`.
fn env_provider() -> Env {
    Env::prefixed("WAGATE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("ingest_", "ingest.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("session_", "session.", 1)
            .replacen("ops_", "ops.", 1);
        mapped.into()
    })
}

/// Create the flat `INGEST_*` provider recognized for pipeline tuning.
///
/// `INGEST_LOG_PATH` maps to `ingest.log_path`, `INGEST_QUEUE_CAPACITY` to
/// `ingest.queue_capacity`, and so on.
fn ingest_env_provider() -> Env {
    Env::prefixed("INGEST_").map(|key| format!("ingest.{}", key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.ingest.queue_capacity, 5000);
        assert_eq!(config.ingest.batch_size, 100);
        assert_eq!(config.ingest.workers, 2);
        assert_eq!(config.session.max_reconnect_attempts, 5);
    }

    #[test]
    fn ingest_env_vars_override_section() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("INGEST_QUEUE_CAPACITY", "16");
            jail.set_env("INGEST_LOG_PATH", "/tmp/custom.log");
            jail.set_env("INGEST_RETRY_MAX_ATTEMPTS", "3");

            let config: WagateConfig = Figment::new()
                .merge(Serialized::defaults(WagateConfig::default()))
                .merge(super::ingest_env_provider())
                .extract()?;

            assert_eq!(config.ingest.queue_capacity, 16);
            assert_eq!(config.ingest.log_path.as_deref(), Some("/tmp/custom.log"));
            assert_eq!(config.ingest.retry_max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn wagate_env_vars_map_to_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("WAGATE_AGENT_DATA_DIR", "/var/lib/wagate");
            jail.set_env("WAGATE_SESSION_QR_TIMEOUT_SECS", "30");

            let config: WagateConfig = Figment::new()
                .merge(Serialized::defaults(WagateConfig::default()))
                .merge(super::env_provider())
                .extract()?;

            assert_eq!(config.agent.data_dir, "/var/lib/wagate");
            assert_eq!(config.session.qr_timeout_secs, 30);
            Ok(())
        });
    }
}
