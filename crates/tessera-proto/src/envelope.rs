// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire envelope exchanged between the host and a worker process.
//!
//! Envelopes are immutable once constructed and are the only objects that
//! cross the process boundary. Request/response pairs share a correlation
//! id; one-way events carry none.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

use tessera_core::types::{CorrelationId, InstanceId, LogLevel};

/// The recognized message kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    /// Worker -> host: startup handshake complete.
    Ready,
    /// Worker -> host: a render payload for the owning tile.
    Update,
    /// Worker -> host: a log event.
    Log,
    /// Worker -> host: an error event.
    Error,
    /// Host -> worker: apply a new (already validated) settings blob.
    Configure,
    /// Worker -> host: response to `configure`.
    ConfigureAck,
    /// Host -> worker: polite shutdown request.
    ShutdownRequest,
    /// Worker -> host: response to `shutdownRequest`.
    ShutdownAck,
}

/// One message unit on the wire, serialized as a single camelCase JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Present on request/response envelopes, absent on one-way events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub kind: EnvelopeKind,
    pub instance_id: InstanceId,
    /// Kind-specific structured data.
    #[serde(default)]
    pub payload: Value,
    /// Milliseconds since the sender's transport epoch.
    pub timestamp_monotonic: u64,
}

impl Envelope {
    /// Builds a one-way event envelope (no correlation id).
    pub fn event(
        kind: EnvelopeKind,
        instance_id: InstanceId,
        payload: Value,
        timestamp_monotonic: u64,
    ) -> Self {
        Envelope {
            correlation_id: None,
            kind,
            instance_id,
            payload,
            timestamp_monotonic,
        }
    }

    /// Builds a request envelope with a fresh correlation id.
    pub fn request(
        kind: EnvelopeKind,
        instance_id: InstanceId,
        payload: Value,
        timestamp_monotonic: u64,
    ) -> Self {
        Envelope {
            correlation_id: Some(CorrelationId::generate()),
            kind,
            instance_id,
            payload,
            timestamp_monotonic,
        }
    }

    /// Builds the response to a request, echoing its correlation id.
    pub fn response_to(
        request: &Envelope,
        kind: EnvelopeKind,
        payload: Value,
        timestamp_monotonic: u64,
    ) -> Self {
        Envelope {
            correlation_id: request.correlation_id.clone(),
            kind,
            instance_id: request.instance_id.clone(),
            payload,
            timestamp_monotonic,
        }
    }

    /// The `configure` payload: the validated settings blob under `settings`.
    pub fn configure_payload(settings: &Value) -> Value {
        json!({ "settings": settings })
    }

    /// Extracts `(level, message)` from a `log` or `error` payload.
    ///
    /// `error` events default to [`LogLevel::Error`]; `log` events without
    /// a recognizable level default to [`LogLevel::Info`].
    pub fn log_fields(&self) -> (LogLevel, String) {
        let fallback = if self.kind == EnvelopeKind::Error {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let level = self
            .payload
            .get("level")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(fallback);
        let message = self
            .payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (level, message)
    }
}
