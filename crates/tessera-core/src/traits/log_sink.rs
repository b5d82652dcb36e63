// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging collaborator boundary.

use async_trait::async_trait;

use crate::types::{InstanceId, LogLevel};

/// Receives worker-origin log and error events. Best-effort; no delivery
/// guarantees beyond per-instance arrival order.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log(&self, id: &InstanceId, level: LogLevel, message: &str);
}

/// A `LogSink` that re-emits worker events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn log(&self, id: &InstanceId, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(instance = %id, "{message}"),
            LogLevel::Info => tracing::info!(instance = %id, "{message}"),
            LogLevel::Warn => tracing::warn!(instance = %id, "{message}"),
            LogLevel::Error => tracing::error!(instance = %id, "{message}"),
        }
    }
}
