// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tessera.toml` > `~/.config/tessera/tessera.toml` > `/etc/tessera/tessera.toml`
//! with environment variable overrides via `TESSERA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TesseraConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tessera/tessera.toml` (system-wide)
/// 3. `~/.config/tessera/tessera.toml` (user XDG config)
/// 4. `./tessera.toml` (local directory)
/// 5. `TESSERA_*` environment variables
pub fn load_config() -> Result<TesseraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TesseraConfig::default()))
        .merge(Toml::file("/etc/tessera/tessera.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tessera/tessera.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tessera.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TesseraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TesseraConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TesseraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TesseraConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. `TESSERA_LIFECYCLE_RESTART_CEILING` must
/// map to `lifecycle.restart_ceiling`, not `lifecycle.restart.ceiling`.
fn env_provider() -> Env {
    Env::prefixed("TESSERA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: TESSERA_LIFECYCLE_RESTART_CEILING -> "lifecycle_restart_ceiling"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("host_", "host.", 1)
            .replacen("lifecycle_", "lifecycle.", 1)
            .replacen("updates_", "updates.", 1);
        mapped.into()
    })
}
