// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-instance lifecycle supervision.
//!
//! Every placed instance gets one supervisor task that owns its worker
//! exclusively: it spawns the process, waits for the ready handshake,
//! relays traffic while running, restarts after crashes with exponential
//! backoff, and stops restarting once the ceiling is exceeded. A terminal
//! instance stays addressable so the user can re-add it, which resets the
//! restart budget.
//!
//! State machine: init -> starting -> running -> stopping -> disposed,
//! with crashed reachable from starting and running. A user re-add takes a
//! terminally crashed instance back to init. No other transitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strum::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tessera_config::model::LifecycleConfig;
use tessera_core::types::{CorrelationId, InstanceId, LogLevel};
use tessera_core::TesseraError;
use tessera_proto::{Envelope, EnvelopeKind, SpawnSpec, WorkerSpawner};

use crate::channel::{ChannelEvent, InstanceChannel};

/// Lifecycle states of one plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InstanceState {
    Init,
    Starting,
    Running,
    Stopping,
    Crashed,
    Disposed,
}

impl InstanceState {
    /// The legal lifecycle edges. `Disposed` is final.
    pub fn can_transition(self, to: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, to),
            (Init, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Crashed)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Disposed)
                | (Crashed, Init)
                | (Crashed, Starting)
                | (Crashed, Disposed)
        )
    }
}

/// Why a worker incarnation ended abnormally.
#[derive(Debug, Clone)]
pub enum CrashReason {
    LaunchFailed(String),
    StartupTimeout,
    ProtocolViolation(String),
    RequestTimeout(String),
    /// The outbound link refused a request; the worker is unreachable
    /// without having been observed to exit.
    LinkClosed(String),
    WorkerExited(Option<i32>),
}

impl CrashReason {
    /// Maps the crash cause onto the error taxonomy, filling in the
    /// deadlines the cause was judged against.
    pub fn to_error(&self, config: &SupervisorConfig) -> TesseraError {
        match self {
            CrashReason::LaunchFailed(message) => TesseraError::ProcessLaunchFailed {
                message: message.clone(),
                source: None,
            },
            CrashReason::StartupTimeout => TesseraError::StartupTimeout {
                timeout_ms: config.startup_timeout.as_millis() as u64,
            },
            CrashReason::ProtocolViolation(detail) => TesseraError::ProtocolViolation {
                detail: detail.clone(),
            },
            CrashReason::RequestTimeout(kind) => TesseraError::RequestTimeout {
                kind: kind.clone(),
                timeout_ms: config.request_timeout.as_millis() as u64,
            },
            CrashReason::LinkClosed(kind) => TesseraError::transport(format!(
                "worker link closed before `{kind}` was delivered"
            )),
            CrashReason::WorkerExited(code) => TesseraError::transport(match code {
                Some(code) => format!("worker exited with code {code}"),
                None => "worker exited".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CrashReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrashReason::LaunchFailed(message) => write!(f, "launch failed: {message}"),
            CrashReason::StartupTimeout => write!(f, "worker never became ready"),
            CrashReason::ProtocolViolation(detail) => write!(f, "protocol violation: {detail}"),
            CrashReason::RequestTimeout(kind) => write!(f, "`{kind}` request timed out"),
            CrashReason::LinkClosed(kind) => {
                write!(f, "worker link closed before `{kind}` was delivered")
            }
            CrashReason::WorkerExited(Some(code)) => {
                write!(f, "worker exited with code {code}")
            }
            CrashReason::WorkerExited(None) => write!(f, "worker exited"),
        }
    }
}

/// Lifecycle tuning for supervisors, in resolved durations.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub restart_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl SupervisorConfig {
    pub fn from_lifecycle(config: &LifecycleConfig) -> Self {
        Self {
            startup_timeout: Duration::from_millis(config.startup_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
            restart_ceiling: config.restart_ceiling,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_lifecycle(&LifecycleConfig::default())
    }
}

/// Commands accepted by a supervisor task.
#[derive(Debug)]
pub enum InstanceCommand {
    /// Forward an already-validated settings blob to the worker.
    Configure { settings: Value },
    /// Stop the worker gracefully and dispose of the instance.
    Remove,
    /// Re-arm a terminally crashed instance, resetting the restart budget.
    Readd,
}

/// Notifications emitted by a supervisor task.
#[derive(Debug)]
pub enum InstanceEvent {
    StateChanged { state: InstanceState },
    /// A render payload from the worker, unpaced.
    Render { payload: Value },
    Log { level: LogLevel, message: String },
    /// The worker acknowledged a user-driven configure; safe to persist.
    ConfigureAcked { settings: Value },
    Crashed { reason: CrashReason, terminal: bool },
    /// The instance is disposed; no further events follow.
    Removed,
}

/// Client handle to one supervisor task.
#[derive(Clone)]
pub struct InstanceHandle {
    pub instance_id: InstanceId,
    commands: mpsc::Sender<InstanceCommand>,
}

impl InstanceHandle {
    pub async fn configure(&self, settings: Value) -> Result<(), TesseraError> {
        self.send(InstanceCommand::Configure { settings }).await
    }

    pub async fn remove(&self) -> Result<(), TesseraError> {
        self.send(InstanceCommand::Remove).await
    }

    pub async fn readd(&self) -> Result<(), TesseraError> {
        self.send(InstanceCommand::Readd).await
    }

    async fn send(&self, command: InstanceCommand) -> Result<(), TesseraError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TesseraError::transport("instance supervisor gone"))
    }
}

/// A supervisor built but not yet running. Lets callers register the
/// handle elsewhere before the first event can possibly fire.
pub struct PendingInstance {
    supervisor: InstanceSupervisor,
}

impl PendingInstance {
    pub fn start(self) {
        tokio::spawn(self.supervisor.run());
    }
}

/// Builds the supervisor for one instance without starting it.
///
/// `initial_settings` is the persisted blob pushed to the worker right
/// after it becomes ready (and again after every restart).
pub fn prepare_instance(
    spec: SpawnSpec,
    spawner: Arc<dyn WorkerSpawner>,
    config: SupervisorConfig,
    initial_settings: Option<Value>,
    events: mpsc::Sender<(InstanceId, InstanceEvent)>,
) -> (InstanceHandle, PendingInstance) {
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let handle = InstanceHandle {
        instance_id: spec.instance_id.clone(),
        commands: commands_tx,
    };
    let supervisor = InstanceSupervisor {
        spec,
        spawner,
        config,
        commands: commands_rx,
        events,
        state: InstanceState::Init,
        settings: initial_settings,
        restart_count: 0,
    };
    (handle, PendingInstance { supervisor })
}

/// Builds and immediately starts the supervisor task for one instance.
pub fn spawn_instance(
    spec: SpawnSpec,
    spawner: Arc<dyn WorkerSpawner>,
    config: SupervisorConfig,
    initial_settings: Option<Value>,
    events: mpsc::Sender<(InstanceId, InstanceEvent)>,
) -> InstanceHandle {
    let (handle, pending) = prepare_instance(spec, spawner, config, initial_settings, events);
    pending.start();
    handle
}

enum RunOutcome {
    Removed,
    Crashed(CrashReason),
}

enum StartOutcome {
    Ready(InstanceChannel),
    /// A remove command arrived before the worker became ready.
    RemovedDuringStartup(InstanceChannel),
    Crashed(CrashReason),
}

enum Flow {
    Restart,
    Disposed,
}

struct InstanceSupervisor {
    spec: SpawnSpec,
    spawner: Arc<dyn WorkerSpawner>,
    config: SupervisorConfig,
    commands: mpsc::Receiver<InstanceCommand>,
    events: mpsc::Sender<(InstanceId, InstanceEvent)>,
    state: InstanceState,
    /// Last settings blob seen; re-pushed after every restart.
    settings: Option<Value>,
    restart_count: u32,
}

impl InstanceSupervisor {
    async fn run(mut self) {
        info!(instance = %self.spec.instance_id, "supervisor started");
        loop {
            let outcome = match self.start_worker().await {
                StartOutcome::Ready(mut channel) => {
                    self.set_state(InstanceState::Running).await;
                    let initial_cid = self.push_settings(&mut channel).await;
                    self.run_running(&mut channel, initial_cid).await
                }
                StartOutcome::RemovedDuringStartup(mut channel) => {
                    self.stop_worker(&mut channel).await
                }
                StartOutcome::Crashed(reason) => RunOutcome::Crashed(reason),
            };
            match outcome {
                RunOutcome::Removed => return,
                RunOutcome::Crashed(reason) => {
                    if matches!(self.handle_crash(reason).await, Flow::Disposed) {
                        return;
                    }
                }
            }
        }
    }

    /// Spawn the worker and wait for its ready handshake. A remove command
    /// during the wait abandons it and hands the worker to graceful stop.
    async fn start_worker(&mut self) -> StartOutcome {
        self.set_state(InstanceState::Starting).await;
        let link = match self.spawner.spawn(&self.spec).await {
            Ok(link) => link,
            Err(e) => return StartOutcome::Crashed(CrashReason::LaunchFailed(e.to_string())),
        };
        let mut channel = InstanceChannel::new(
            self.spec.instance_id.clone(),
            link,
            self.config.request_timeout,
        );

        let startup = tokio::time::sleep(self.config.startup_timeout);
        tokio::pin!(startup);
        loop {
            tokio::select! {
                _ = &mut startup => {
                    channel.kill().await;
                    return StartOutcome::Crashed(CrashReason::StartupTimeout);
                }
                command = self.commands.recv() => match command {
                    None | Some(InstanceCommand::Remove) => {
                        return StartOutcome::RemovedDuringStartup(channel);
                    }
                    Some(InstanceCommand::Configure { settings }) => {
                        // Pushed once the worker becomes ready.
                        self.settings = Some(settings);
                    }
                    Some(InstanceCommand::Readd) => {
                        debug!(instance = %self.spec.instance_id, "readd ignored while starting");
                    }
                },
                event = channel.next() => match event {
                    ChannelEvent::Inbound(env) if env.kind == EnvelopeKind::Ready => {
                        debug!(instance = %self.spec.instance_id, "worker ready");
                        return StartOutcome::Ready(channel);
                    }
                    ChannelEvent::Inbound(env) => {
                        channel.kill().await;
                        return StartOutcome::Crashed(CrashReason::ProtocolViolation(format!(
                            "`{}` before ready",
                            env.kind
                        )));
                    }
                    ChannelEvent::Violation(detail) => {
                        channel.kill().await;
                        return StartOutcome::Crashed(CrashReason::ProtocolViolation(detail));
                    }
                    ChannelEvent::Exited(code) => {
                        return StartOutcome::Crashed(CrashReason::WorkerExited(code));
                    }
                    ChannelEvent::Response(_) | ChannelEvent::RequestExpired { .. } => {}
                }
            }
        }
    }

    /// Re-push the stored settings to a freshly started worker.
    ///
    /// The eventual ack is not re-persisted (the blob already came from
    /// the store), so its correlation id maps to `None`.
    async fn push_settings(&mut self, channel: &mut InstanceChannel) -> Option<CorrelationId> {
        let settings = self.settings.clone()?;
        match channel
            .request(
                EnvelopeKind::Configure,
                Envelope::configure_payload(&settings),
            )
            .await
        {
            Ok(cid) => Some(cid),
            Err(e) => {
                warn!(instance = %self.spec.instance_id, error = %e, "initial configure not sent");
                None
            }
        }
    }

    async fn run_running(
        &mut self,
        channel: &mut InstanceChannel,
        initial_cid: Option<CorrelationId>,
    ) -> RunOutcome {
        // Correlation id -> settings to persist on ack. `None` marks the
        // startup re-push, which needs no persistence event.
        let mut pending_configures: HashMap<CorrelationId, Option<Value>> = HashMap::new();
        if let Some(cid) = initial_cid {
            pending_configures.insert(cid, None);
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(InstanceCommand::Remove) => {
                        return self.stop_worker(channel).await;
                    }
                    Some(InstanceCommand::Configure { settings }) => {
                        self.settings = Some(settings.clone());
                        match channel
                            .request(
                                EnvelopeKind::Configure,
                                Envelope::configure_payload(&settings),
                            )
                            .await
                        {
                            Ok(cid) => {
                                pending_configures.insert(cid, Some(settings));
                            }
                            Err(e) => {
                                warn!(instance = %self.spec.instance_id, error = %e, "configure not sent");
                                channel.kill().await;
                                return RunOutcome::Crashed(CrashReason::LinkClosed(
                                    EnvelopeKind::Configure.to_string(),
                                ));
                            }
                        }
                    }
                    Some(InstanceCommand::Readd) => {
                        debug!(instance = %self.spec.instance_id, "readd ignored while running");
                    }
                },
                event = channel.next() => match event {
                    ChannelEvent::Inbound(env) => match env.kind {
                        EnvelopeKind::Update => {
                            self.emit(InstanceEvent::Render { payload: env.payload }).await;
                        }
                        EnvelopeKind::Log | EnvelopeKind::Error => {
                            let (level, message) = env.log_fields();
                            self.emit(InstanceEvent::Log { level, message }).await;
                        }
                        EnvelopeKind::Ready => {
                            debug!(instance = %self.spec.instance_id, "duplicate ready ignored");
                        }
                        other => {
                            debug!(instance = %self.spec.instance_id, kind = %other, "unexpected event dropped");
                        }
                    },
                    ChannelEvent::Response(env) => match env.kind {
                        EnvelopeKind::ConfigureAck => {
                            let settings = env
                                .correlation_id
                                .as_ref()
                                .and_then(|cid| pending_configures.remove(cid));
                            match settings {
                                Some(Some(settings)) => {
                                    self.emit(InstanceEvent::ConfigureAcked { settings }).await;
                                }
                                Some(None) => {
                                    debug!(instance = %self.spec.instance_id, "startup settings applied");
                                }
                                None => {
                                    debug!(instance = %self.spec.instance_id, "unmatched configureAck dropped");
                                }
                            }
                        }
                        other => {
                            debug!(instance = %self.spec.instance_id, kind = %other, "unexpected response dropped");
                        }
                    },
                    ChannelEvent::Violation(detail) => {
                        channel.kill().await;
                        return RunOutcome::Crashed(CrashReason::ProtocolViolation(detail));
                    }
                    ChannelEvent::RequestExpired { kind } => {
                        channel.kill().await;
                        return RunOutcome::Crashed(CrashReason::RequestTimeout(kind.to_string()));
                    }
                    ChannelEvent::Exited(code) => {
                        return RunOutcome::Crashed(CrashReason::WorkerExited(code));
                    }
                }
            }
        }
    }

    /// Graceful stop: shutdownRequest, then grace, then force-kill.
    ///
    /// A correlated shutdownAck, a bare shutdownAck event, or a plain
    /// process exit all count as compliance.
    async fn stop_worker(&mut self, channel: &mut InstanceChannel) -> RunOutcome {
        self.set_state(InstanceState::Stopping).await;
        if let Err(e) = channel
            .request(EnvelopeKind::ShutdownRequest, json!({}))
            .await
        {
            debug!(instance = %self.spec.instance_id, error = %e, "shutdown request not sent");
        }

        let grace = tokio::time::sleep(self.config.shutdown_grace);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                _ = &mut grace => {
                    warn!(instance = %self.spec.instance_id, "shutdown grace expired");
                    break;
                }
                event = channel.next() => match event {
                    ChannelEvent::Response(env) if env.kind == EnvelopeKind::ShutdownAck => break,
                    ChannelEvent::Inbound(env) if env.kind == EnvelopeKind::ShutdownAck => break,
                    ChannelEvent::Exited(_) => break,
                    ChannelEvent::RequestExpired { .. } => break,
                    _ => {} // traffic during stop is dropped
                }
            }
        }
        channel.kill().await;
        self.set_state(InstanceState::Disposed).await;
        self.emit(InstanceEvent::Removed).await;
        info!(instance = %self.spec.instance_id, "instance removed");
        RunOutcome::Removed
    }

    /// Record a crash, then either back off and restart, or park terminally.
    async fn handle_crash(&mut self, reason: CrashReason) -> Flow {
        self.set_state(InstanceState::Crashed).await;
        self.restart_count += 1;
        let terminal = self.restart_count > self.config.restart_ceiling;
        warn!(
            instance = %self.spec.instance_id,
            reason = %reason,
            restart_count = self.restart_count,
            terminal,
            "worker crashed"
        );
        if terminal {
            let ceiling = TesseraError::RestartCeilingExceeded {
                ceiling: self.config.restart_ceiling,
            };
            tracing::error!(
                instance = %self.spec.instance_id,
                cause = %reason.to_error(&self.config),
                "{ceiling}"
            );
        }
        self.emit(InstanceEvent::Crashed {
            reason,
            terminal,
        })
        .await;

        if terminal {
            // Parked: only re-add or removal get it out of here.
            loop {
                match self.commands.recv().await {
                    None | Some(InstanceCommand::Remove) => return self.dispose().await,
                    Some(InstanceCommand::Readd) => {
                        info!(instance = %self.spec.instance_id, "re-added, restart budget reset");
                        self.restart_count = 0;
                        // A re-add is a fresh placement, not a retry.
                        self.set_state(InstanceState::Init).await;
                        return Flow::Restart;
                    }
                    Some(InstanceCommand::Configure { settings }) => {
                        // Applied when the instance comes back.
                        self.settings = Some(settings);
                    }
                }
            }
        }

        let delay = self.backoff_delay();
        debug!(
            instance = %self.spec.instance_id,
            delay_ms = delay.as_millis() as u64,
            "restart backoff"
        );
        let backoff = tokio::time::sleep(delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => return Flow::Restart,
                command = self.commands.recv() => match command {
                    None | Some(InstanceCommand::Remove) => return self.dispose().await,
                    Some(InstanceCommand::Configure { settings }) => {
                        self.settings = Some(settings);
                    }
                    Some(InstanceCommand::Readd) => {}
                }
            }
        }
    }

    /// Exponential backoff: base * 2^(n-1), capped.
    fn backoff_delay(&self) -> Duration {
        let exp = self.restart_count.saturating_sub(1).min(16);
        let base_ms = self.config.backoff_base.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(1u64 << exp)).min(self.config.backoff_cap)
    }

    async fn dispose(&mut self) -> Flow {
        self.set_state(InstanceState::Disposed).await;
        self.emit(InstanceEvent::Removed).await;
        info!(instance = %self.spec.instance_id, "instance removed");
        Flow::Disposed
    }

    async fn set_state(&mut self, state: InstanceState) {
        if self.state == state {
            return;
        }
        debug_assert!(
            self.state.can_transition(state),
            "illegal transition {} -> {state}",
            self.state
        );
        debug!(instance = %self.spec.instance_id, from = %self.state, to = %state, "state change");
        self.state = state;
        self.emit(InstanceEvent::StateChanged { state }).await;
    }

    async fn emit(&self, event: InstanceEvent) {
        let _ = self
            .events
            .send((self.spec.instance_id.clone(), event))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tessera_test_utils::{ScriptedBehavior, ScriptedSpawner};

    fn spec() -> SpawnSpec {
        SpawnSpec {
            instance_id: InstanceId("i-1".into()),
            program: PathBuf::from("worker"),
            args: vec![],
            current_dir: PathBuf::from("."),
        }
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig::default()
    }

    async fn next_event(
        rx: &mut mpsc::Receiver<(InstanceId, InstanceEvent)>,
    ) -> InstanceEvent {
        let (_, event) = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("no event before timeout")
            .expect("event channel closed");
        event
    }

    /// Wait for a `StateChanged` event, skipping unrelated events.
    async fn next_state(
        rx: &mut mpsc::Receiver<(InstanceId, InstanceEvent)>,
    ) -> InstanceState {
        loop {
            if let InstanceEvent::StateChanged { state } = next_event(rx).await {
                return state;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_worker_reaches_running() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::well_behaved()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let _handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        assert_eq!(next_state(&mut events_rx).await, InstanceState::Starting);
        assert_eq!(next_state(&mut events_rx).await, InstanceState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_surface_as_render_events() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior {
            updates: vec![json!({"text": "12:00"})],
            ..ScriptedBehavior::well_behaved()
        }));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let _handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        loop {
            if let InstanceEvent::Render { payload } = next_event(&mut events_rx).await {
                assert_eq!(payload, json!({"text": "12:00"}));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_worker_crashes_with_startup_timeout() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::silent()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let _handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        loop {
            if let InstanceEvent::Crashed { reason, terminal } = next_event(&mut events_rx).await {
                assert!(matches!(reason, CrashReason::StartupTimeout));
                assert!(!terminal);
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crash_loop_hits_ceiling_after_allowed_restarts() {
        // Ceiling 3: the first crash plus three restarted incarnations all
        // fail, the fourth crash is terminal. Four spawn attempts total.
        let spawner = Arc::new(ScriptedSpawner::repeating(
            ScriptedBehavior::crashing_after(vec![], 1),
        ));
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let _handle =
            spawn_instance(spec(), spawner.clone(), fast_config(), None, events_tx);

        let mut crashes = 0;
        loop {
            if let InstanceEvent::Crashed { terminal, .. } = next_event(&mut events_rx).await {
                crashes += 1;
                if terminal {
                    break;
                }
            }
        }
        assert_eq!(crashes, 4);
        assert_eq!(spawner.spawn_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn readd_resets_restart_budget() {
        // Four unlaunchable incarnations park the instance terminally;
        // after re-add the next spawn succeeds.
        let mut sequence = vec![ScriptedBehavior::unlaunchable("gone"); 4];
        sequence.push(ScriptedBehavior::well_behaved());
        let spawner = Arc::new(ScriptedSpawner::with_sequence(sequence));
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        loop {
            if let InstanceEvent::Crashed { terminal: true, .. } =
                next_event(&mut events_rx).await
            {
                break;
            }
        }

        handle.readd().await.unwrap();
        // Re-add is a fresh placement: back through init, then a clean start.
        assert_eq!(next_state(&mut events_rx).await, InstanceState::Init);
        assert_eq!(next_state(&mut events_rx).await, InstanceState::Starting);
        assert_eq!(next_state(&mut events_rx).await, InstanceState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_configure_send_crashes_as_link_closed() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior {
            reject_sends: true,
            ..ScriptedBehavior::well_behaved()
        }));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        while next_state(&mut events_rx).await != InstanceState::Running {}
        handle.configure(json!({"format": "24h"})).await.unwrap();

        loop {
            if let InstanceEvent::Crashed { reason, .. } = next_event(&mut events_rx).await {
                assert!(matches!(reason, CrashReason::LinkClosed(_)));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn configure_is_acked_and_reported() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::well_behaved()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        while next_state(&mut events_rx).await != InstanceState::Running {}
        handle
            .configure(json!({"format": "24h"}))
            .await
            .unwrap();

        loop {
            if let InstanceEvent::ConfigureAcked { settings } = next_event(&mut events_rx).await {
                assert_eq!(settings, json!({"format": "24h"}));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stored_settings_are_pushed_after_ready() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::well_behaved()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let _handle = spawn_instance(
            spec(),
            spawner.clone(),
            fast_config(),
            Some(json!({"format": "12h"})),
            events_tx,
        );

        while next_state(&mut events_rx).await != InstanceState::Running {}
        // Give the configure round-trip a moment of virtual time.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = spawner.sent_envelopes().await;
        assert!(!sent.is_empty());
        assert_eq!(sent[0].kind, EnvelopeKind::Configure);
        assert_eq!(sent[0].payload, json!({"settings": {"format": "12h"}}));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_sends_shutdown_and_disposes() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::well_behaved()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner.clone(), fast_config(), None, events_tx);

        while next_state(&mut events_rx).await != InstanceState::Running {}
        handle.remove().await.unwrap();

        loop {
            if matches!(next_event(&mut events_rx).await, InstanceEvent::Removed) {
                break;
            }
        }
        let sent = spawner.sent_envelopes().await;
        assert!(sent
            .iter()
            .any(|e| e.kind == EnvelopeKind::ShutdownRequest));
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_worker_is_killed_after_grace() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior {
            ack_shutdown: false,
            ..ScriptedBehavior::well_behaved()
        }));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        while next_state(&mut events_rx).await != InstanceState::Running {}
        handle.remove().await.unwrap();

        // Grace expires in virtual time; the instance still disposes.
        loop {
            if matches!(next_event(&mut events_rx).await, InstanceEvent::Removed) {
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remove_during_startup_abandons_the_ready_wait() {
        // The worker never becomes ready; the remove must not wait out the
        // startup timeout before stopping it.
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::silent()));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        assert_eq!(next_state(&mut events_rx).await, InstanceState::Starting);
        handle.remove().await.unwrap();

        assert_eq!(next_state(&mut events_rx).await, InstanceState::Stopping);
        loop {
            match next_event(&mut events_rx).await {
                InstanceEvent::Removed => break,
                InstanceEvent::Crashed { .. } => panic!("remove counted as a crash"),
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_configure_ack_after_remove_has_no_effect() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior {
            configure_ack_delay_ms: 10_000,
            ..ScriptedBehavior::well_behaved()
        }));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        while next_state(&mut events_rx).await != InstanceState::Running {}
        handle.configure(json!({"format": "24h"})).await.unwrap();
        handle.remove().await.unwrap();

        loop {
            match next_event(&mut events_rx).await {
                InstanceEvent::Removed => break,
                InstanceEvent::ConfigureAcked { .. } => {
                    panic!("ack surfaced after removal")
                }
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_instance_id_crashes_as_protocol_violation() {
        let spawner = Arc::new(ScriptedSpawner::repeating(ScriptedBehavior {
            misreport_instance_id: Some("impostor".into()),
            ..ScriptedBehavior::well_behaved()
        }));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let _handle = spawn_instance(spec(), spawner, fast_config(), None, events_tx);

        loop {
            if let InstanceEvent::Crashed { reason, .. } = next_event(&mut events_rx).await {
                assert!(matches!(reason, CrashReason::ProtocolViolation(_)));
                break;
            }
        }
    }

    #[test]
    fn transition_table_matches_the_lifecycle() {
        use InstanceState::*;
        assert!(Init.can_transition(Starting));
        assert!(Starting.can_transition(Running));
        assert!(Starting.can_transition(Stopping));
        assert!(Running.can_transition(Crashed));
        assert!(Crashed.can_transition(Init));
        assert!(Crashed.can_transition(Starting));
        assert!(Crashed.can_transition(Disposed));
        assert!(Stopping.can_transition(Disposed));

        // Disposed is final; no state is re-enterable from it.
        for to in [Init, Starting, Running, Stopping, Crashed, Disposed] {
            assert!(!Disposed.can_transition(to));
        }
        assert!(!Running.can_transition(Init));
        assert!(!Init.can_transition(Running));
    }

    #[test]
    fn crash_reasons_map_onto_the_error_taxonomy() {
        let config = SupervisorConfig::default();
        assert!(matches!(
            CrashReason::StartupTimeout.to_error(&config),
            TesseraError::StartupTimeout { timeout_ms: 5000 }
        ));
        assert!(matches!(
            CrashReason::RequestTimeout("configure".into()).to_error(&config),
            TesseraError::RequestTimeout { timeout_ms: 5000, .. }
        ));
        assert!(matches!(
            CrashReason::LaunchFailed("gone".into()).to_error(&config),
            TesseraError::ProcessLaunchFailed { .. }
        ));
        assert!(matches!(
            CrashReason::ProtocolViolation("bad".into()).to_error(&config),
            TesseraError::ProtocolViolation { .. }
        ));
        assert!(matches!(
            CrashReason::LinkClosed("configure".into()).to_error(&config),
            TesseraError::Transport { .. }
        ));
        assert!(matches!(
            CrashReason::WorkerExited(Some(9)).to_error(&config),
            TesseraError::Transport { .. }
        ));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut supervisor_config = SupervisorConfig::default();
        supervisor_config.backoff_base = Duration::from_millis(1000);
        supervisor_config.backoff_cap = Duration::from_millis(30_000);

        let mut sup = InstanceSupervisor {
            spec: spec(),
            spawner: Arc::new(ScriptedSpawner::repeating(ScriptedBehavior::well_behaved())),
            config: supervisor_config,
            commands: mpsc::channel(1).1,
            events: mpsc::channel(1).0,
            state: InstanceState::Init,
            settings: None,
            restart_count: 1,
        };
        assert_eq!(sup.backoff_delay(), Duration::from_millis(1000));
        sup.restart_count = 2;
        assert_eq!(sup.backoff_delay(), Duration::from_millis(2000));
        sup.restart_count = 3;
        assert_eq!(sup.backoff_delay(), Duration::from_millis(4000));
        sup.restart_count = 10;
        assert_eq!(sup.backoff_delay(), Duration::from_millis(30_000));
    }
}
