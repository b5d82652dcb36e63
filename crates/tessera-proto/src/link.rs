// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker-transport seam: spawning a worker and exchanging envelopes
//! with it.
//!
//! This is the only polymorphic surface in the lifecycle path. Production
//! links wrap an OS process; tests substitute scripted in-memory links.

use std::path::PathBuf;

use async_trait::async_trait;

use tessera_core::types::InstanceId;
use tessera_core::TesseraError;

use crate::envelope::Envelope;

/// Everything needed to launch one worker.
///
/// The worker receives its instance id as its final command-line argument
/// and speaks the envelope protocol over its stdin/stdout.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub instance_id: InstanceId,
    /// Resolved path to the worker executable.
    pub program: PathBuf,
    /// Arguments from the manifest, before the appended instance id.
    pub args: Vec<String>,
    /// The plugin's source directory, used as the worker's working dir.
    pub current_dir: PathBuf,
}

/// Inbound traffic and exit notifications from one worker.
#[derive(Debug)]
pub enum LinkEvent {
    /// A decoded envelope from the worker.
    Envelope(Envelope),
    /// A line that could not be decoded or exceeded the size ceiling.
    Malformed(String),
    /// The worker process exited; exit code if available.
    Exited(Option<i32>),
}

/// One live bidirectional channel to a worker.
///
/// All envelopes passed to [`send`](WorkerLink::send) for a given link are
/// delivered in order, never interleaved mid-envelope.
#[async_trait]
pub trait WorkerLink: Send {
    /// Queues an envelope for ordered delivery to the worker.
    async fn send(&mut self, envelope: Envelope) -> Result<(), TesseraError>;

    /// Next inbound event. Returns `None` once the link is closed and all
    /// buffered events have been drained.
    async fn recv(&mut self) -> Option<LinkEvent>;

    /// Force-terminates the worker. Idempotent; also invoked implicitly
    /// when the link is dropped.
    async fn kill(&mut self);
}

/// Launches workers. At most one spawn per instance is in flight at a
/// time; the supervisor owns spawning exclusively.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Box<dyn WorkerLink>, TesseraError>;
}
