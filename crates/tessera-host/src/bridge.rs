// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tile bridge: routing hub between supervisors and the UI boundary.
//!
//! One bridge task fans in events from every instance supervisor and fans
//! them out to the tile sink, the log sink, and the settings store. Render
//! traffic goes through a per-instance [`UpdatePacer`]; settings writes are
//! ack-gated (persisted only after the worker's `configureAck`); a terminal
//! crash paints the "plugin unavailable" placeholder.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use jsonschema::Validator;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tessera_config::model::UpdatesConfig;
use tessera_core::types::InstanceId;
use tessera_core::{LogSink, SettingsStore, TesseraError, TileSink};
use tessera_plugin::PluginManifest;
use tessera_proto::{SpawnSpec, WorkerSpawner};

use crate::pacer::UpdatePacer;
use crate::supervisor::{
    prepare_instance, CrashReason, InstanceEvent, InstanceHandle, SupervisorConfig,
};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

enum BridgeCommand {
    AddInstance {
        handle: InstanceHandle,
        validator: Option<Validator>,
        pacer: UpdatePacer,
        registered: oneshot::Sender<()>,
    },
    ApplySettings {
        instance_id: InstanceId,
        settings: Value,
        reply: oneshot::Sender<Result<(), TesseraError>>,
    },
    RemoveInstance {
        instance_id: InstanceId,
    },
    ReaddInstance {
        instance_id: InstanceId,
    },
}

/// Client handle to the bridge task. Cheap to clone.
#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<BridgeCommand>,
    events: mpsc::Sender<(InstanceId, InstanceEvent)>,
    updates: UpdatesConfig,
}

impl BridgeHandle {
    /// Builds, registers, and starts one supervised instance.
    ///
    /// Registration is confirmed before the supervisor task starts, so no
    /// event of the instance can arrive at an unregistered bridge.
    pub async fn launch_instance(
        &self,
        spec: SpawnSpec,
        spawner: Arc<dyn WorkerSpawner>,
        config: SupervisorConfig,
        initial_settings: Option<Value>,
        manifest: &PluginManifest,
    ) -> Result<InstanceHandle, TesseraError> {
        let (handle, pending) =
            prepare_instance(spec, spawner, config, initial_settings, self.events.clone());
        self.add_instance(handle.clone(), manifest).await?;
        pending.start();
        Ok(handle)
    }

    /// Registers an already-built instance with the bridge and waits for
    /// the registration to take effect.
    ///
    /// The settings validator is compiled here, once per instance, from the
    /// manifest's schema; apply-settings calls then validate against it.
    pub async fn add_instance(
        &self,
        handle: InstanceHandle,
        manifest: &PluginManifest,
    ) -> Result<(), TesseraError> {
        let validator = match &manifest.settings_schema {
            Some(schema) => Some(jsonschema::validator_for(schema).map_err(|e| {
                TesseraError::manifest(format!("settings_schema does not compile: {e}"))
            })?),
            None => None,
        };
        let pacer = UpdatePacer::new(&self.updates, manifest.update_interval_hint_ms);
        let (registered_tx, registered_rx) = oneshot::channel();
        self.send(BridgeCommand::AddInstance {
            handle,
            validator,
            pacer,
            registered: registered_tx,
        })
        .await?;
        registered_rx
            .await
            .map_err(|_| TesseraError::transport("tile bridge gone"))
    }

    /// Validates a settings blob and forwards it to the worker.
    ///
    /// On schema violation nothing reaches the worker and the stored blob
    /// is untouched. Success here means "forwarded", not "persisted":
    /// persistence waits for the worker's ack.
    pub async fn apply_settings(
        &self,
        instance_id: InstanceId,
        settings: Value,
    ) -> Result<(), TesseraError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BridgeCommand::ApplySettings {
            instance_id,
            settings,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| TesseraError::transport("bridge dropped the reply"))?
    }

    /// Gracefully removes an instance and deletes its stored settings.
    pub async fn remove_instance(&self, instance_id: InstanceId) -> Result<(), TesseraError> {
        self.send(BridgeCommand::RemoveInstance { instance_id }).await
    }

    /// Re-arms a terminally crashed instance.
    pub async fn readd_instance(&self, instance_id: InstanceId) -> Result<(), TesseraError> {
        self.send(BridgeCommand::ReaddInstance { instance_id }).await
    }

    async fn send(&self, command: BridgeCommand) -> Result<(), TesseraError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TesseraError::transport("tile bridge gone"))
    }
}

struct InstanceEntry {
    handle: InstanceHandle,
    validator: Option<Validator>,
    pacer: UpdatePacer,
}

/// The bridge task state. Construct with [`TileBridge::new`], then drive
/// with [`TileBridge::run`] on its own task.
pub struct TileBridge {
    entries: HashMap<InstanceId, InstanceEntry>,
    /// Instances being removed by user action; their settings are deleted
    /// once the supervisor confirms disposal. Shutdown drain does not mark
    /// instances here, so it never deletes settings.
    removing: HashSet<InstanceId>,
    commands_rx: mpsc::Receiver<BridgeCommand>,
    events_rx: mpsc::Receiver<(InstanceId, InstanceEvent)>,
    // Keeps the event channel open even with no live supervisor.
    _events_tx: mpsc::Sender<(InstanceId, InstanceEvent)>,
    tiles: Arc<dyn TileSink>,
    logs: Arc<dyn LogSink>,
    store: Arc<dyn SettingsStore>,
    drain_timeout: Duration,
}

impl TileBridge {
    /// Returns the bridge, its handle, and the event sender to hand to
    /// every supervisor spawned for it.
    pub fn new(
        tiles: Arc<dyn TileSink>,
        logs: Arc<dyn LogSink>,
        store: Arc<dyn SettingsStore>,
        updates: UpdatesConfig,
        drain_timeout: Duration,
    ) -> (
        Self,
        BridgeHandle,
        mpsc::Sender<(InstanceId, InstanceEvent)>,
    ) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let bridge = Self {
            entries: HashMap::new(),
            removing: HashSet::new(),
            commands_rx,
            events_rx,
            _events_tx: events_tx.clone(),
            tiles,
            logs,
            store,
            drain_timeout,
        };
        let handle = BridgeHandle {
            commands: commands_tx,
            events: events_tx.clone(),
            updates,
        };
        (bridge, handle, events_tx)
    }

    /// Routes traffic until cancelled, then drains: every live instance
    /// gets a graceful remove, and the task returns once all have disposed
    /// or the drain timeout expires.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let next_flush = self
                .entries
                .values()
                .filter_map(|entry| entry.pacer.deadline())
                .min();

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain().await;
                    return;
                }
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.drain().await;
                        return;
                    }
                },
                event = self.events_rx.recv() => {
                    if let Some((instance_id, event)) = event {
                        self.handle_event(instance_id, event).await;
                    }
                },
                _ = async {
                    match next_flush {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => self.flush_due().await,
            }
        }
    }

    async fn handle_command(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::AddInstance {
                handle,
                validator,
                pacer,
                registered,
            } => {
                let instance_id = handle.instance_id.clone();
                debug!(instance = %instance_id, "instance registered with bridge");
                self.entries.insert(
                    instance_id,
                    InstanceEntry {
                        handle,
                        validator,
                        pacer,
                    },
                );
                let _ = registered.send(());
            }
            BridgeCommand::ApplySettings {
                instance_id,
                settings,
                reply,
            } => {
                let result = self.apply_settings(&instance_id, settings).await;
                let _ = reply.send(result);
            }
            BridgeCommand::RemoveInstance { instance_id } => {
                if let Some(entry) = self.entries.get(&instance_id) {
                    self.removing.insert(instance_id.clone());
                    if let Err(e) = entry.handle.remove().await {
                        warn!(instance = %instance_id, error = %e, "remove not delivered");
                    }
                } else {
                    debug!(instance = %instance_id, "remove for unknown instance ignored");
                }
            }
            BridgeCommand::ReaddInstance { instance_id } => {
                if let Some(entry) = self.entries.get(&instance_id) {
                    if let Err(e) = entry.handle.readd().await {
                        warn!(instance = %instance_id, error = %e, "readd not delivered");
                    }
                } else {
                    debug!(instance = %instance_id, "readd for unknown instance ignored");
                }
            }
        }
    }

    async fn apply_settings(
        &mut self,
        instance_id: &InstanceId,
        settings: Value,
    ) -> Result<(), TesseraError> {
        let Some(entry) = self.entries.get(instance_id) else {
            return Err(TesseraError::Internal(format!(
                "settings for unknown instance `{instance_id}`"
            )));
        };
        if let Some(validator) = &entry.validator
            && let Err(e) = validator.validate(&settings)
        {
            return Err(TesseraError::SettingsValidationFailed {
                detail: e.to_string(),
            });
        }
        entry.handle.configure(settings).await
    }

    async fn handle_event(&mut self, instance_id: InstanceId, event: InstanceEvent) {
        match event {
            InstanceEvent::Render { payload } => {
                if let Some(entry) = self.entries.get_mut(&instance_id) {
                    entry.pacer.submit(Instant::now(), payload);
                }
                self.flush_due().await;
            }
            InstanceEvent::Log { level, message } => {
                self.logs.log(&instance_id, level, &message).await;
            }
            InstanceEvent::ConfigureAcked { settings } => {
                if let Err(e) = self.store.put_settings(&instance_id, &settings).await {
                    warn!(instance = %instance_id, error = %e, "settings not persisted");
                }
            }
            InstanceEvent::Crashed { reason, terminal } => {
                if terminal {
                    self.tiles
                        .render_unavailable(&instance_id, &unavailable_message(&reason))
                        .await;
                } else {
                    debug!(instance = %instance_id, reason = %reason, "instance restarting");
                }
            }
            InstanceEvent::StateChanged { state } => {
                debug!(instance = %instance_id, state = %state, "instance state");
            }
            InstanceEvent::Removed => {
                self.entries.remove(&instance_id);
                if self.removing.remove(&instance_id)
                    && let Err(e) = self.store.delete_settings(&instance_id).await
                {
                    warn!(instance = %instance_id, error = %e, "settings not deleted");
                }
            }
        }
    }

    /// Deliver every paced payload whose deadline has passed.
    async fn flush_due(&mut self) {
        let now = Instant::now();
        for (instance_id, entry) in &mut self.entries {
            if let Some(payload) = entry.pacer.take_due(now) {
                self.tiles.render(instance_id, &payload).await;
            }
        }
    }

    async fn drain(&mut self) {
        debug!(instances = self.entries.len(), "bridge draining");
        for (instance_id, entry) in &self.entries {
            if let Err(e) = entry.handle.remove().await {
                debug!(instance = %instance_id, error = %e, "drain remove not delivered");
            }
        }
        let deadline = Instant::now() + self.drain_timeout;
        while !self.entries.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(remaining = self.entries.len(), "drain timeout expired");
                    return;
                }
                event = self.events_rx.recv() => match event {
                    Some((instance_id, InstanceEvent::Removed)) => {
                        self.entries.remove(&instance_id);
                    }
                    Some(_) => {}
                    None => return,
                }
            }
        }
    }
}

fn unavailable_message(reason: &CrashReason) -> String {
    format!("plugin unavailable: {reason}")
}
