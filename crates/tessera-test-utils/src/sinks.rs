// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording sinks that capture tile and log traffic for assertions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use tessera_core::types::{InstanceId, LogLevel};
use tessera_core::{LogSink, TileSink};

/// A `TileSink` that records every render call.
#[derive(Default)]
pub struct RecordingTileSink {
    renders: Arc<Mutex<Vec<(InstanceId, Value)>>>,
    unavailable: Arc<Mutex<Vec<(InstanceId, String)>>>,
}

impl RecordingTileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(instance, payload)` render calls, in arrival order.
    pub async fn renders(&self) -> Vec<(InstanceId, Value)> {
        self.renders.lock().await.clone()
    }

    /// Render payloads delivered for one instance, in arrival order.
    pub async fn renders_for(&self, id: &InstanceId) -> Vec<Value> {
        self.renders
            .lock()
            .await
            .iter()
            .filter(|(i, _)| i == id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// All "unavailable" placeholder calls.
    pub async fn unavailable(&self) -> Vec<(InstanceId, String)> {
        self.unavailable.lock().await.clone()
    }
}

#[async_trait]
impl TileSink for RecordingTileSink {
    async fn render(&self, id: &InstanceId, payload: &Value) {
        self.renders.lock().await.push((id.clone(), payload.clone()));
    }

    async fn render_unavailable(&self, id: &InstanceId, message: &str) {
        self.unavailable
            .lock()
            .await
            .push((id.clone(), message.to_string()));
    }
}

/// A `LogSink` that records every worker log event.
#[derive(Default)]
pub struct RecordingLogSink {
    entries: Arc<Mutex<Vec<(InstanceId, LogLevel, String)>>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(InstanceId, LogLevel, String)> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn log(&self, id: &InstanceId, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .await
            .push((id.clone(), level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn tile_sink_records_renders_per_instance() {
        let sink = RecordingTileSink::new();
        let a = InstanceId("a".into());
        let b = InstanceId("b".into());
        sink.render(&a, &json!({"n": 1})).await;
        sink.render(&b, &json!({"n": 2})).await;
        sink.render(&a, &json!({"n": 3})).await;

        assert_eq!(sink.renders().await.len(), 3);
        let for_a = sink.renders_for(&a).await;
        assert_eq!(for_a, vec![json!({"n": 1}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn log_sink_records_entries() {
        let sink = RecordingLogSink::new();
        let id = InstanceId("a".into());
        sink.log(&id, LogLevel::Warn, "low disk").await;

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, LogLevel::Warn);
        assert_eq!(entries[0].2, "low disk");
    }
}
