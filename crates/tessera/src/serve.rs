// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tessera serve` command implementation.
//!
//! Starts the full plugin runtime: scans the configured plugin directories,
//! restores persisted pages and instance settings, launches one supervised
//! worker per placement, and runs the tile bridge until a shutdown signal
//! drains everything gracefully.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use tessera_config::model::TesseraConfig;
use tessera_core::types::InstanceId;
use tessera_core::{traits::TracingLogSink, SettingsStore, TesseraError, TileSink};
use tessera_host::shutdown;
use tessera_host::{
    spawn_spec_for, ProcessSpawner, SupervisorConfig, TileBridge,
};
use tessera_plugin::PluginRegistry;
use tessera_proto::WorkerSpawner;

use crate::state::JsonStateStore;

/// A `TileSink` that reports renders through `tracing`.
///
/// Stand-in display surface until a UI adapter connects; every payload is
/// visible in the host log.
struct TracingTileSink;

#[async_trait]
impl TileSink for TracingTileSink {
    async fn render(&self, id: &InstanceId, payload: &Value) {
        info!(instance = %id, %payload, "tile render");
    }

    async fn render_unavailable(&self, id: &InstanceId, message: &str) {
        warn!(instance = %id, "tile unavailable: {message}");
    }
}

/// Runs the `tessera serve` command.
///
/// Discovers plugins, restores state, launches supervised workers for every
/// persisted placement, and routes traffic until SIGINT/SIGTERM.
pub async fn run_serve(config: TesseraConfig) -> Result<(), TesseraError> {
    // Initialize tracing subscriber.
    init_tracing(&config.host.log_level);

    info!("starting tessera serve");

    // Discover plugins.
    let registry = PluginRegistry::new();
    let catalog = registry.scan(&config.host.plugin_dirs);
    for failure in catalog.report() {
        warn!(path = %failure.path.display(), error = %failure.error, "plugin skipped");
    }
    info!(count = catalog.len(), "plugin catalog ready");

    // Open durable state.
    let store = Arc::new(JsonStateStore::open(&config.host.state_path).await?);

    // Wire the bridge against the real process spawner.
    let supervisor_config = SupervisorConfig::from_lifecycle(&config.lifecycle);
    let drain_timeout = supervisor_config.shutdown_grace + Duration::from_secs(1);
    let tiles: Arc<dyn TileSink> = Arc::new(TracingTileSink);
    let (bridge, bridge_handle, _events) = TileBridge::new(
        tiles.clone(),
        Arc::new(TracingLogSink),
        store.clone(),
        config.updates.clone(),
        drain_timeout,
    );
    let spawner: Arc<dyn WorkerSpawner> = Arc::new(ProcessSpawner);

    // Restore persisted placements.
    let pages = store.load_pages().await?;
    let mut launched = 0usize;
    for page in &pages {
        for placement in &page.placements {
            let Some(entry) = registry.lookup(&placement.plugin_id) else {
                warn!(
                    instance = %placement.instance_id,
                    plugin = %placement.plugin_id,
                    "placement references a plugin that is not installed"
                );
                tiles
                    .render_unavailable(
                        &placement.instance_id,
                        &format!("plugin `{}` is not installed", placement.plugin_id),
                    )
                    .await;
                continue;
            };
            let settings = store.get_settings(&placement.instance_id).await?;
            let spec = spawn_spec_for(&entry, placement.instance_id.clone());
            bridge_handle
                .launch_instance(
                    spec,
                    spawner.clone(),
                    supervisor_config.clone(),
                    settings,
                    &entry.manifest,
                )
                .await?;
            launched += 1;
        }
    }
    info!(pages = pages.len(), instances = launched, "placements restored");

    // Run until a shutdown signal; the bridge drains its workers.
    let cancel = shutdown::install_signal_handler();
    bridge.run(cancel).await;

    info!("tessera serve stopped");
    Ok(())
}

/// Initializes the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
