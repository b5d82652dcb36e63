// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero timeouts and consistent backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::TesseraConfig;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TesseraConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !KNOWN_LOG_LEVELS.contains(&config.host.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "host.log_level `{}` is not one of: trace, debug, info, warn, error",
                config.host.log_level
            ),
        });
    }

    if config.host.plugin_dirs.is_empty() {
        errors.push(ConfigError::Validation {
            message: "host.plugin_dirs must list at least one directory".to_string(),
        });
    }

    if config.host.state_path.as_os_str().is_empty() {
        errors.push(ConfigError::Validation {
            message: "host.state_path must not be empty".to_string(),
        });
    }

    for (name, value) in [
        ("lifecycle.startup_timeout_ms", config.lifecycle.startup_timeout_ms),
        ("lifecycle.request_timeout_ms", config.lifecycle.request_timeout_ms),
        ("lifecycle.shutdown_grace_ms", config.lifecycle.shutdown_grace_ms),
        ("lifecycle.backoff_base_ms", config.lifecycle.backoff_base_ms),
        ("updates.min_interval_ms", config.updates.min_interval_ms),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{name} must be greater than zero"),
            });
        }
    }

    if config.lifecycle.restart_ceiling == 0 {
        errors.push(ConfigError::Validation {
            message: "lifecycle.restart_ceiling must be greater than zero".to_string(),
        });
    }

    if config.lifecycle.backoff_cap_ms < config.lifecycle.backoff_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "lifecycle.backoff_cap_ms ({}) must be at least lifecycle.backoff_base_ms ({})",
                config.lifecycle.backoff_cap_ms, config.lifecycle.backoff_base_ms
            ),
        });
    }

    if config.updates.coalesce_window_ms > config.updates.min_interval_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "updates.coalesce_window_ms ({}) must not exceed updates.min_interval_ms ({})",
                config.updates.coalesce_window_ms, config.updates.min_interval_ms
            ),
        });
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

    #[test]
    fn default_config_validates() {
        let config = TesseraConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = TesseraConfig::default();
        config.host.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("log_level"))));
    }

    #[test]
    fn zero_startup_timeout_fails_validation() {
        let mut config = TesseraConfig::default();
        config.lifecycle.startup_timeout_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("startup_timeout_ms"))));
    }

    #[test]
    fn zero_restart_ceiling_fails_validation() {
        // A zero ceiling would make every first crash terminal.
        let mut config = TesseraConfig::default();
        config.lifecycle.restart_ceiling = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("restart_ceiling"))));
    }

    #[test]
    fn backoff_cap_below_base_fails_validation() {
        let mut config = TesseraConfig::default();
        config.lifecycle.backoff_base_ms = 5000;
        config.lifecycle.backoff_cap_ms = 1000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("backoff_cap_ms"))));
    }

    #[test]
    fn empty_plugin_dirs_fails_validation() {
        let mut config = TesseraConfig::default();
        config.host.plugin_dirs.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("plugin_dirs"))));
    }

    #[test]
    fn coalesce_window_wider_than_interval_fails_validation() {
        let mut config = TesseraConfig::default();
        config.updates.min_interval_ms = 100;
        config.updates.coalesce_window_ms = 500;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("coalesce_window_ms"))));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = TesseraConfig::default();
        config.host.log_level = "debug".to_string();
        config.lifecycle.restart_ceiling = 5;
        config.lifecycle.backoff_base_ms = 500;
        config.lifecycle.backoff_cap_ms = 10_000;
        assert!(validate_config(&config).is_ok());
    }
}
