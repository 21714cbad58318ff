// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the Wagate gateway.

pub mod loader;
pub mod model;

pub use figment::Error as ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AgentConfig, IngestConfig, OpsConfig, SessionConfig, StorageConfig, WagateConfig,
};
