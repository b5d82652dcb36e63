// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tessera plugin runtime.

use thiserror::Error;

/// The primary error type used across the Tessera workspace.
///
/// The first eight variants are the runtime's failure taxonomy; the
/// remaining variants cover ambient concerns (configuration, persistence,
/// transport plumbing).
#[derive(Debug, Error)]
pub enum TesseraError {
    /// A plugin declaration file failed validation.
    #[error("invalid manifest: {reason}")]
    ManifestInvalid { reason: String },

    /// Two discovered manifests declared the same plugin id.
    #[error("duplicate plugin id `{id}` (first declared at {first_path})")]
    DuplicatePluginId { id: String, first_path: String },

    /// The worker process could not be spawned.
    #[error("failed to launch worker process: {message}")]
    ProcessLaunchFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The worker never sent `ready` within the startup timeout.
    #[error("worker did not become ready within {timeout_ms} ms")]
    StartupTimeout { timeout_ms: u64 },

    /// The worker broke the wire protocol (malformed envelope, oversized
    /// line, wrong instance id, unexpected exit).
    #[error("protocol violation: {detail}")]
    ProtocolViolation { detail: String },

    /// A correlated request was not answered within its deadline.
    #[error("request `{kind}` timed out after {timeout_ms} ms")]
    RequestTimeout { kind: String, timeout_ms: u64 },

    /// A settings edit did not conform to the manifest's settings schema.
    #[error("settings validation failed: {detail}")]
    SettingsValidationFailed { detail: String },

    /// The instance crashed too often and will not be restarted.
    #[error("restart ceiling of {ceiling} exceeded")]
    RestartCeilingExceeded { ceiling: u32 },

    /// Configuration errors (invalid TOML, missing fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Settings/page persistence errors.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Worker transport errors (channel closed, write failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Convenience constructor for transport errors without a source.
    pub fn transport(message: impl Into<String>) -> Self {
        TesseraError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Convenience constructor for manifest validation failures.
    pub fn manifest(reason: impl Into<String>) -> Self {
        TesseraError::ManifestInvalid {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_variants_render() {
        let err = TesseraError::StartupTimeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "worker did not become ready within 5000 ms");

        let err = TesseraError::DuplicatePluginId {
            id: "clock".into(),
            first_path: "/plugins/clock".into(),
        };
        assert!(err.to_string().contains("duplicate plugin id `clock`"));

        let err = TesseraError::RestartCeilingExceeded { ceiling: 3 };
        assert!(err.to_string().contains("ceiling of 3"));
    }

    #[test]
    fn constructors_build_expected_variants() {
        assert!(matches!(
            TesseraError::manifest("missing id"),
            TesseraError::ManifestInvalid { .. }
        ));
        assert!(matches!(
            TesseraError::transport("stdin closed"),
            TesseraError::Transport { source: None, .. }
        ));
    }
}
