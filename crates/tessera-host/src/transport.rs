// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS-process implementation of the worker transport.
//!
//! Each spawned worker gets four background tasks: a writer feeding stdin,
//! a line-framed stdout reader, a stderr drain, and an exit watcher that
//! owns the child handle. The link hands out events through one mpsc
//! channel, so a stuck consumer backpressures the reader rather than
//! buffering unboundedly.

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use tessera_core::types::InstanceId;
use tessera_core::TesseraError;
use tessera_proto::{
    decode_line, encode_line, Envelope, LinkEvent, SpawnSpec, WorkerLink, WorkerSpawner,
    MAX_ENVELOPE_BYTES,
};

const EVENT_BUFFER: usize = 64;

/// Spawns real worker processes with piped stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Box<dyn WorkerLink>, TesseraError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .arg(&spec.instance_id.0)
            .current_dir(&spec.current_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TesseraError::ProcessLaunchFailed {
                    message: format!("worker executable not found: {}", spec.program.display()),
                    source: None,
                }
            } else {
                TesseraError::ProcessLaunchFailed {
                    message: format!("failed to spawn {}", spec.program.display()),
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TesseraError::transport("worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TesseraError::transport("worker stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TesseraError::transport("worker stderr unavailable"))?;

        let (events_tx, events_rx) = mpsc::channel::<LinkEvent>(EVENT_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(EVENT_BUFFER);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        // Writer: serializes queued envelopes onto stdin, in order.
        let writer_instance = spec.instance_id.clone();
        let mut stdin = stdin;
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                let line = match encode_line(&envelope) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(instance = %writer_instance, error = %e, "dropping unencodable envelope");
                        continue;
                    }
                };
                if stdin.write_all(line.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    debug!(instance = %writer_instance, "worker stdin closed");
                    break;
                }
            }
        });

        // Reader: one envelope per stdout line, size-capped by the codec.
        let reader_tx = events_tx.clone();
        tokio::spawn(async move {
            let mut lines =
                FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_ENVELOPE_BYTES));
            while let Some(item) = lines.next().await {
                let event = match item {
                    Ok(line) => match decode_line(&line) {
                        Ok(envelope) => LinkEvent::Envelope(envelope),
                        Err(e) => LinkEvent::Malformed(e.to_string()),
                    },
                    Err(e) => {
                        // The framing state is unrecoverable after this.
                        let _ = reader_tx
                            .send(LinkEvent::Malformed(format!("stdout framing error: {e}")))
                            .await;
                        break;
                    }
                };
                if reader_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        // Stderr drain: free-form worker text goes to debug logging.
        let stderr_instance = spec.instance_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(instance = %stderr_instance, "worker stderr: {line}");
            }
        });

        // Exit watcher: owns the child, reports the exit code, and performs
        // the force-kill when asked.
        let exit_tx = events_tx;
        let exit_instance = spec.instance_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    debug!(instance = %exit_instance, code = ?code, "worker exited");
                    let _ = exit_tx.send(LinkEvent::Exited(code)).await;
                }
                _ = &mut kill_rx => {
                    if let Err(e) = child.kill().await {
                        debug!(instance = %exit_instance, error = %e, "kill raced with exit");
                    }
                    let _ = exit_tx.send(LinkEvent::Exited(None)).await;
                }
            }
        });

        Ok(Box::new(ProcessLink {
            instance_id: spec.instance_id.clone(),
            outbound_tx,
            events_rx,
            kill_tx: Some(kill_tx),
        }))
    }
}

/// A live link to one worker process.
pub struct ProcessLink {
    instance_id: InstanceId,
    outbound_tx: mpsc::Sender<Envelope>,
    events_rx: mpsc::Receiver<LinkEvent>,
    kill_tx: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl WorkerLink for ProcessLink {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TesseraError> {
        self.outbound_tx
            .send(envelope)
            .await
            .map_err(|_| TesseraError::transport("worker stdin writer gone"))
    }

    async fn recv(&mut self) -> Option<LinkEvent> {
        self.events_rx.recv().await
    }

    async fn kill(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            debug!(instance = %self.instance_id, "force-killing worker");
            let _ = kill.send(());
        }
    }
}

impl Drop for ProcessLink {
    // The child must never outlive its link.
    fn drop(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
    }
}
