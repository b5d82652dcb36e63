// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlation bookkeeping over a worker link.
//!
//! `InstanceChannel` wraps one [`WorkerLink`] and tracks the outstanding
//! correlated requests. Its event stream is what the supervisor actually
//! consumes: responses are matched to their requests, late or unknown
//! responses are dropped, wrong-instance envelopes surface as violations,
//! and unanswered requests expire against the request timeout.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use tessera_core::types::{CorrelationId, InstanceId};
use tessera_core::TesseraError;
use tessera_proto::{Envelope, EnvelopeKind, LinkEvent, MonotonicClock, WorkerLink};

/// What the supervisor sees from one worker.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A one-way event from the worker (ready, update, log, error).
    Inbound(Envelope),
    /// A response matched to an outstanding request.
    Response(Envelope),
    /// The worker broke the protocol; detail for the crash record.
    Violation(String),
    /// An outstanding request passed its deadline unanswered.
    RequestExpired { kind: EnvelopeKind },
    /// The worker process exited; code if available.
    Exited(Option<i32>),
}

struct PendingRequest {
    kind: EnvelopeKind,
    deadline: Instant,
}

/// One worker link plus its outstanding-request table.
pub struct InstanceChannel {
    instance_id: InstanceId,
    link: Box<dyn WorkerLink>,
    clock: MonotonicClock,
    request_timeout: Duration,
    pending: HashMap<CorrelationId, PendingRequest>,
}

impl InstanceChannel {
    pub fn new(
        instance_id: InstanceId,
        link: Box<dyn WorkerLink>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            instance_id,
            link,
            clock: MonotonicClock::new(),
            request_timeout,
            pending: HashMap::new(),
        }
    }

    /// Sends a correlated request and registers its deadline.
    pub async fn request(
        &mut self,
        kind: EnvelopeKind,
        payload: Value,
    ) -> Result<CorrelationId, TesseraError> {
        let envelope = Envelope::request(
            kind,
            self.instance_id.clone(),
            payload,
            self.clock.now_ms(),
        );
        let correlation_id = envelope
            .correlation_id
            .clone()
            .ok_or_else(|| TesseraError::Internal("request envelope without correlation id".into()))?;
        self.pending.insert(
            correlation_id.clone(),
            PendingRequest {
                kind,
                deadline: Instant::now() + self.request_timeout,
            },
        );
        self.link.send(envelope).await?;
        Ok(correlation_id)
    }

    /// Next channel event. Cancel-safe; resolves when the worker produces
    /// traffic, exits, or an outstanding request expires.
    pub async fn next(&mut self) -> ChannelEvent {
        loop {
            let next_deadline = self.pending.values().map(|p| p.deadline).min();

            tokio::select! {
                event = self.link.recv() => match event {
                    None => return ChannelEvent::Exited(None),
                    Some(LinkEvent::Exited(code)) => return ChannelEvent::Exited(code),
                    Some(LinkEvent::Malformed(detail)) => return ChannelEvent::Violation(detail),
                    Some(LinkEvent::Envelope(envelope)) => {
                        if envelope.instance_id != self.instance_id {
                            return ChannelEvent::Violation(format!(
                                "envelope reports instance `{}`, expected `{}`",
                                envelope.instance_id, self.instance_id
                            ));
                        }
                        match &envelope.correlation_id {
                            Some(correlation_id) => {
                                if self.pending.remove(correlation_id).is_some() {
                                    return ChannelEvent::Response(envelope);
                                }
                                // Late or unknown response: dropped, not fatal.
                                debug!(
                                    instance = %self.instance_id,
                                    correlation = %correlation_id,
                                    kind = %envelope.kind,
                                    "dropping unmatched response"
                                );
                            }
                            None => return ChannelEvent::Inbound(envelope),
                        }
                    }
                },
                _ = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let now = Instant::now();
                    let expired = self
                        .pending
                        .iter()
                        .find(|(_, p)| p.deadline <= now)
                        .map(|(id, _)| id.clone());
                    if let Some(correlation_id) = expired
                        && let Some(request) = self.pending.remove(&correlation_id)
                    {
                        return ChannelEvent::RequestExpired { kind: request.kind };
                    }
                }
            }
        }
    }

    /// Force-terminates the worker behind this channel.
    pub async fn kill(&mut self) {
        self.link.kill().await;
    }
}
