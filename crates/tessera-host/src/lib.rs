// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker process transport, lifecycle supervision, and the tile bridge.
//!
//! The pieces compose bottom-up: [`transport::ProcessSpawner`] launches
//! workers as OS processes, [`channel::InstanceChannel`] adds correlation
//! bookkeeping, one [`supervisor`] task per instance drives the lifecycle
//! state machine, and the [`bridge::TileBridge`] routes everything to the
//! tile sink, log sink, and settings store.

pub mod bridge;
pub mod channel;
pub mod pacer;
pub mod shutdown;
pub mod supervisor;
pub mod transport;

pub use bridge::{BridgeHandle, TileBridge};
pub use channel::{ChannelEvent, InstanceChannel};
pub use pacer::UpdatePacer;
pub use supervisor::{
    prepare_instance, spawn_instance, CrashReason, InstanceCommand, InstanceEvent, InstanceHandle,
    InstanceState, PendingInstance, SupervisorConfig,
};
pub use transport::{ProcessLink, ProcessSpawner};

use std::path::PathBuf;

use tessera_core::types::InstanceId;
use tessera_plugin::RegistryEntry;
use tessera_proto::SpawnSpec;

/// Builds the spawn spec for one placement of a discovered plugin.
///
/// The worker runs with the plugin's directory as its working directory
/// and receives the instance id as its final argument.
pub fn spawn_spec_for(entry: &RegistryEntry, instance_id: InstanceId) -> SpawnSpec {
    SpawnSpec {
        instance_id,
        program: entry.source_dir.join(&entry.manifest.entrypoint),
        args: entry.manifest.args.clone(),
        current_dir: PathBuf::from(&entry.source_dir),
    }
}
