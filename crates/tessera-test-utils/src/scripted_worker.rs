// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted worker link for deterministic lifecycle testing.
//!
//! `ScriptedWorker` implements `WorkerLink` with a declarative behavior
//! script: what to emit after spawn, and how to react to host requests.
//! `ScriptedSpawner` hands out one scripted worker per spawn attempt and
//! records every spawn and every envelope the host sent, for assertions.
//!
//! All delays go through `tokio::time::sleep`, so tests drive them with
//! `tokio::time::pause()` and virtual time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use tessera_core::TesseraError;
use tessera_proto::{Envelope, EnvelopeKind, LinkEvent, SpawnSpec, WorkerLink, WorkerSpawner};

/// Declarative script for one worker incarnation.
#[derive(Debug, Clone)]
pub struct ScriptedBehavior {
    /// Fail the spawn itself with this launch error message.
    pub fail_spawn: Option<String>,
    /// Emit the `ready` event after `ready_delay_ms`.
    pub send_ready: bool,
    pub ready_delay_ms: u64,
    /// Render payloads emitted as `update` events after `ready`.
    pub updates: Vec<Value>,
    /// Delay before each update.
    pub update_interval_ms: u64,
    /// Emit one undecodable line after the updates.
    pub emit_malformed: bool,
    /// Exit with this code after the scripted updates.
    pub exit_after_updates: Option<i32>,
    /// Report this instance id on emitted envelopes instead of the real one.
    pub misreport_instance_id: Option<String>,
    /// Refuse every host send with a transport error, as a link whose
    /// worker-side pipe is gone would.
    pub reject_sends: bool,
    /// Answer `configure` requests with a correlated `configureAck`.
    pub ack_configure: bool,
    pub configure_ack_delay_ms: u64,
    /// Answer `shutdownRequest` with a correlated `shutdownAck` and exit.
    pub ack_shutdown: bool,
}

impl Default for ScriptedBehavior {
    fn default() -> Self {
        Self {
            fail_spawn: None,
            send_ready: true,
            ready_delay_ms: 0,
            updates: Vec::new(),
            update_interval_ms: 0,
            emit_malformed: false,
            exit_after_updates: None,
            misreport_instance_id: None,
            reject_sends: false,
            ack_configure: true,
            configure_ack_delay_ms: 0,
            ack_shutdown: true,
        }
    }
}

impl ScriptedBehavior {
    /// A well-behaved worker: ready immediately, acks everything.
    pub fn well_behaved() -> Self {
        Self::default()
    }

    /// A worker that never sends `ready`.
    pub fn silent() -> Self {
        Self {
            send_ready: false,
            ..Self::default()
        }
    }

    /// A worker whose launch fails outright.
    pub fn unlaunchable(message: &str) -> Self {
        Self {
            fail_spawn: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// A worker that emits the given updates and then exits.
    pub fn crashing_after(updates: Vec<Value>, exit_code: i32) -> Self {
        Self {
            updates,
            exit_after_updates: Some(exit_code),
            ..Self::default()
        }
    }
}

/// An in-memory `WorkerLink` driven by a [`ScriptedBehavior`].
pub struct ScriptedWorker {
    behavior: ScriptedBehavior,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    sent: Arc<Mutex<Vec<Envelope>>>,
    killed: bool,
}

impl ScriptedWorker {
    fn new(spec: &SpawnSpec, behavior: ScriptedBehavior, sent: Arc<Mutex<Vec<Envelope>>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reported_id = behavior
            .misreport_instance_id
            .clone()
            .map(tessera_core::types::InstanceId)
            .unwrap_or_else(|| spec.instance_id.clone());
        let script = behavior.clone();
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if script.send_ready {
                tokio::time::sleep(Duration::from_millis(script.ready_delay_ms)).await;
                let ready = Envelope::event(EnvelopeKind::Ready, reported_id.clone(), json!({}), 0);
                if tx.send(LinkEvent::Envelope(ready)).is_err() {
                    return;
                }
            }
            for (i, payload) in script.updates.iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(script.update_interval_ms)).await;
                let update = Envelope::event(
                    EnvelopeKind::Update,
                    reported_id.clone(),
                    payload.clone(),
                    (i + 1) as u64,
                );
                if tx.send(LinkEvent::Envelope(update)).is_err() {
                    return;
                }
            }
            if script.emit_malformed {
                let _ = tx.send(LinkEvent::Malformed("scripted garbage line".to_string()));
            }
            if let Some(code) = script.exit_after_updates {
                let _ = tx.send(LinkEvent::Exited(Some(code)));
            }
        });

        Self {
            behavior,
            events_tx,
            events_rx,
            sent,
            killed: false,
        }
    }
}

#[async_trait]
impl WorkerLink for ScriptedWorker {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TesseraError> {
        if self.killed {
            return Err(TesseraError::transport("link killed"));
        }
        if self.behavior.reject_sends {
            return Err(TesseraError::transport("scripted link refused the send"));
        }
        self.sent.lock().await.push(envelope.clone());

        match envelope.kind {
            EnvelopeKind::Configure if self.behavior.ack_configure => {
                let tx = self.events_tx.clone();
                let delay = Duration::from_millis(self.behavior.configure_ack_delay_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let ack =
                        Envelope::response_to(&envelope, EnvelopeKind::ConfigureAck, json!({}), 0);
                    let _ = tx.send(LinkEvent::Envelope(ack));
                });
            }
            EnvelopeKind::ShutdownRequest if self.behavior.ack_shutdown => {
                let ack =
                    Envelope::response_to(&envelope, EnvelopeKind::ShutdownAck, json!({}), 0);
                let _ = self.events_tx.send(LinkEvent::Envelope(ack));
                let _ = self.events_tx.send(LinkEvent::Exited(Some(0)));
            }
            _ => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<LinkEvent> {
        self.events_rx.recv().await
    }

    async fn kill(&mut self) {
        self.killed = true;
        self.events_rx.close();
    }
}

/// A `WorkerSpawner` that pops one scripted behavior per spawn attempt.
///
/// When the queue runs dry the last behavior repeats, so restart loops can
/// be scripted with a finite sequence (e.g. two crashers then a healthy
/// worker).
pub struct ScriptedSpawner {
    scripts: StdMutex<VecDeque<ScriptedBehavior>>,
    last: StdMutex<Option<ScriptedBehavior>>,
    spawn_count: AtomicUsize,
    specs: StdMutex<Vec<SpawnSpec>>,
    sent: Arc<Mutex<Vec<Envelope>>>,
}

impl ScriptedSpawner {
    /// Every spawn uses the same behavior.
    pub fn repeating(behavior: ScriptedBehavior) -> Self {
        Self::with_sequence(vec![behavior])
    }

    /// Spawns consume behaviors in order; the final one repeats.
    pub fn with_sequence(behaviors: Vec<ScriptedBehavior>) -> Self {
        Self {
            scripts: StdMutex::new(behaviors.into_iter().collect()),
            last: StdMutex::new(None),
            spawn_count: AtomicUsize::new(0),
            specs: StdMutex::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// How many spawn attempts were made.
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }

    /// The spawn specs, in attempt order.
    pub fn specs(&self) -> Vec<SpawnSpec> {
        self.specs.lock().expect("specs lock poisoned").clone()
    }

    /// Every envelope the host sent to any scripted worker, in order.
    pub async fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Box<dyn WorkerLink>, TesseraError> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        self.specs
            .lock()
            .expect("specs lock poisoned")
            .push(spec.clone());

        let behavior = {
            let mut scripts = self.scripts.lock().expect("scripts lock poisoned");
            let mut last = self.last.lock().expect("last lock poisoned");
            match scripts.pop_front() {
                Some(b) => {
                    *last = Some(b.clone());
                    b
                }
                None => last.clone().unwrap_or_default(),
            }
        };

        if let Some(message) = behavior.fail_spawn {
            return Err(TesseraError::ProcessLaunchFailed {
                message,
                source: None,
            });
        }

        Ok(Box::new(ScriptedWorker::new(spec, behavior, self.sent.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tessera_core::types::InstanceId;

    fn spec() -> SpawnSpec {
        SpawnSpec {
            instance_id: InstanceId("i-1".into()),
            program: PathBuf::from("worker"),
            args: vec![],
            current_dir: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn well_behaved_worker_sends_ready() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior::well_behaved());
        let mut link = spawner.spawn(&spec()).await.unwrap();
        match link.recv().await {
            Some(LinkEvent::Envelope(env)) => assert_eq!(env.kind, EnvelopeKind::Ready),
            other => panic!("expected ready envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn configure_is_acked_with_matching_correlation() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior::well_behaved());
        let mut link = spawner.spawn(&spec()).await.unwrap();
        // Drain ready.
        let _ = link.recv().await;

        let req = Envelope::request(
            EnvelopeKind::Configure,
            InstanceId("i-1".into()),
            json!({"settings": {}}),
            0,
        );
        let cid = req.correlation_id.clone();
        link.send(req).await.unwrap();

        match link.recv().await {
            Some(LinkEvent::Envelope(env)) => {
                assert_eq!(env.kind, EnvelopeKind::ConfigureAck);
                assert_eq!(env.correlation_id, cid);
            }
            other => panic!("expected configureAck, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_request_acks_then_exits() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior::well_behaved());
        let mut link = spawner.spawn(&spec()).await.unwrap();
        let _ = link.recv().await;

        let req = Envelope::request(
            EnvelopeKind::ShutdownRequest,
            InstanceId("i-1".into()),
            json!({}),
            0,
        );
        link.send(req).await.unwrap();

        match link.recv().await {
            Some(LinkEvent::Envelope(env)) => assert_eq!(env.kind, EnvelopeKind::ShutdownAck),
            other => panic!("expected shutdownAck, got {other:?}"),
        }
        match link.recv().await {
            Some(LinkEvent::Exited(code)) => assert_eq!(code, Some(0)),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn crashing_worker_emits_updates_then_exits() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior::crashing_after(
            vec![json!({"text": "a"})],
            7,
        ));
        let mut link = spawner.spawn(&spec()).await.unwrap();

        let _ready = link.recv().await;
        match link.recv().await {
            Some(LinkEvent::Envelope(env)) => assert_eq!(env.kind, EnvelopeKind::Update),
            other => panic!("expected update, got {other:?}"),
        }
        match link.recv().await {
            Some(LinkEvent::Exited(code)) => assert_eq!(code, Some(7)),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejecting_link_fails_sends_but_still_emits() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior {
            reject_sends: true,
            ..ScriptedBehavior::well_behaved()
        });
        let mut link = spawner.spawn(&spec()).await.unwrap();
        match link.recv().await {
            Some(LinkEvent::Envelope(env)) => assert_eq!(env.kind, EnvelopeKind::Ready),
            other => panic!("expected ready envelope, got {other:?}"),
        }

        let req = Envelope::request(
            EnvelopeKind::Configure,
            InstanceId("i-1".into()),
            json!({"settings": {}}),
            0,
        );
        assert!(link.send(req).await.is_err());
        assert!(spawner.sent_envelopes().await.is_empty());
    }

    #[tokio::test]
    async fn sequence_spawner_pops_then_repeats_last() {
        let spawner = ScriptedSpawner::with_sequence(vec![
            ScriptedBehavior::unlaunchable("gone"),
            ScriptedBehavior::well_behaved(),
        ]);

        assert!(spawner.spawn(&spec()).await.is_err());
        assert!(spawner.spawn(&spec()).await.is_ok());
        // Queue exhausted: the last behavior repeats.
        assert!(spawner.spawn(&spec()).await.is_ok());
        assert_eq!(spawner.spawn_count(), 3);
    }

    #[tokio::test]
    async fn sent_envelopes_are_recorded() {
        let spawner = ScriptedSpawner::repeating(ScriptedBehavior::well_behaved());
        let mut link = spawner.spawn(&spec()).await.unwrap();
        let req = Envelope::request(
            EnvelopeKind::Configure,
            InstanceId("i-1".into()),
            json!({"settings": {"k": 1}}),
            0,
        );
        link.send(req).await.unwrap();

        let sent = spawner.sent_envelopes().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, EnvelopeKind::Configure);
    }
}
