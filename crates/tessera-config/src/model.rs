// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tessera plugin runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Tessera configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TesseraConfig {
    /// Host process settings: logging, plugin directories, state file.
    #[serde(default)]
    pub host: HostConfig,

    /// Worker lifecycle settings: timeouts, restart policy, backoff.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Render update pacing settings.
    #[serde(default)]
    pub updates: UpdatesConfig,
}

/// Host process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directories scanned for plugins, in priority order.
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Path to the persisted state file (pages and instance settings).
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            plugin_dirs: default_plugin_dirs(),
            state_path: default_state_path(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![dirs::data_dir()
        .map(|p| p.join("tessera").join("plugins"))
        .unwrap_or_else(|| PathBuf::from("plugins"))]
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("tessera").join("state.json"))
        .unwrap_or_else(|| PathBuf::from("state.json"))
}

/// Worker lifecycle configuration.
///
/// All durations are in milliseconds to keep TOML values unambiguous.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// How long a freshly spawned worker has to send its ready message.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// How long a correlated request may stay unanswered.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a worker has to exit after a shutdown request before it is
    /// force-killed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Automatic restarts allowed per instance before the crash is terminal.
    #[serde(default = "default_restart_ceiling")]
    pub restart_ceiling: u32,

    /// Base of the exponential restart backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on the restart backoff delay.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: default_startup_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            restart_ceiling: default_restart_ceiling(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_startup_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

fn default_restart_ceiling() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

/// Render update pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatesConfig {
    /// Minimum interval between renders delivered for one instance.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Window during which bursts of updates are coalesced, latest wins.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            coalesce_window_ms: default_coalesce_window_ms(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_coalesce_window_ms() -> u64 {
    100
}
