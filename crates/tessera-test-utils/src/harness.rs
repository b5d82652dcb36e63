// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete runtime stack with scripted workers,
//! a temp plugin directory, in-memory settings store, and recording sinks.
//! Tests install manifests, launch instances, and assert on captured tile
//! and log traffic without touching real processes.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tessera_config::model::UpdatesConfig;
use tessera_core::types::{InstanceId, PluginId};
use tessera_core::TesseraError;
use tessera_host::{spawn_spec_for, BridgeHandle, InstanceHandle, SupervisorConfig, TileBridge};
use tessera_plugin::{CatalogSnapshot, PluginRegistry, MANIFEST_FILE};

use crate::memory_store::MemoryStore;
use crate::scripted_worker::{ScriptedBehavior, ScriptedSpawner};
use crate::sinks::{RecordingLogSink, RecordingTileSink};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    plugins: Vec<(String, String)>,
    behaviors: Vec<ScriptedBehavior>,
    supervisor_config: SupervisorConfig,
    updates: UpdatesConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            plugins: Vec::new(),
            behaviors: Vec::new(),
            supervisor_config: SupervisorConfig::default(),
            updates: UpdatesConfig::default(),
        }
    }

    /// Install a plugin manifest under `<plugin_root>/<dir_name>/plugin.toml`.
    pub fn with_plugin(mut self, dir_name: &str, manifest_toml: &str) -> Self {
        self.plugins
            .push((dir_name.to_string(), manifest_toml.to_string()));
        self
    }

    /// Append a scripted worker behavior; spawns consume them in order and
    /// the final one repeats.
    pub fn with_behavior(mut self, behavior: ScriptedBehavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Override the lifecycle tuning used for launched instances.
    pub fn with_supervisor_config(mut self, config: SupervisorConfig) -> Self {
        self.supervisor_config = config;
        self
    }

    /// Override the render pacing configuration.
    pub fn with_updates(mut self, updates: UpdatesConfig) -> Self {
        self.updates = updates;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub fn build(self) -> Result<TestHarness, TesseraError> {
        let plugin_root = tempfile::TempDir::new()
            .map_err(|e| TesseraError::Storage { source: e.into() })?;
        for (dir_name, manifest_toml) in &self.plugins {
            let dir = plugin_root.path().join(dir_name);
            std::fs::create_dir_all(&dir)
                .map_err(|e| TesseraError::Storage { source: e.into() })?;
            std::fs::write(dir.join(MANIFEST_FILE), manifest_toml)
                .map_err(|e| TesseraError::Storage { source: e.into() })?;
        }

        let registry = PluginRegistry::new();
        registry.scan(&[plugin_root.path().to_path_buf()]);

        let behaviors = if self.behaviors.is_empty() {
            vec![ScriptedBehavior::well_behaved()]
        } else {
            self.behaviors
        };
        let spawner = Arc::new(ScriptedSpawner::with_sequence(behaviors));

        let store = Arc::new(MemoryStore::new());
        let tiles = Arc::new(RecordingTileSink::new());
        let logs = Arc::new(RecordingLogSink::new());
        let (bridge, bridge_handle, _events) = TileBridge::new(
            tiles.clone(),
            logs.clone(),
            store.clone(),
            self.updates,
            self.supervisor_config.shutdown_grace * 2,
        );
        let cancel = CancellationToken::new();
        tokio::spawn(bridge.run(cancel.clone()));

        Ok(TestHarness {
            plugin_root,
            registry,
            spawner,
            store,
            tiles,
            logs,
            bridge: bridge_handle,
            supervisor_config: self.supervisor_config,
            cancel,
        })
    }
}

/// A complete runtime stack wired against scripted workers.
pub struct TestHarness {
    /// Temp directory scanned as the plugin root; dropped with the harness.
    pub plugin_root: tempfile::TempDir,
    pub registry: PluginRegistry,
    pub spawner: Arc<ScriptedSpawner>,
    pub store: Arc<MemoryStore>,
    pub tiles: Arc<RecordingTileSink>,
    pub logs: Arc<RecordingLogSink>,
    pub bridge: BridgeHandle,
    supervisor_config: SupervisorConfig,
    cancel: CancellationToken,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The catalog from the most recent scan.
    pub fn catalog(&self) -> Arc<CatalogSnapshot> {
        self.registry.snapshot()
    }

    /// Launch one instance of a discovered plugin through the bridge.
    pub async fn launch(
        &self,
        plugin_id: &str,
        instance_id: &str,
        initial_settings: Option<Value>,
    ) -> Result<InstanceHandle, TesseraError> {
        let plugin_id = PluginId(plugin_id.to_string());
        let entry = self.registry.lookup(&plugin_id).ok_or_else(|| {
            TesseraError::Internal(format!("plugin `{plugin_id}` not in catalog"))
        })?;
        let spec = spawn_spec_for(&entry, InstanceId(instance_id.to_string()));
        self.bridge
            .launch_instance(
                spec,
                self.spawner.clone(),
                self.supervisor_config.clone(),
                initial_settings,
                &entry.manifest,
            )
            .await
    }

    /// Signal shutdown; the bridge drains its instances gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK_MANIFEST: &str = r#"
[plugin]
id = "clock"
version = "1.0.0"
entrypoint = "worker"
"#;

    #[tokio::test(start_paused = true)]
    async fn harness_discovers_and_launches_plugins() {
        let harness = TestHarness::builder()
            .with_plugin("clock", CLOCK_MANIFEST)
            .build()
            .unwrap();

        assert_eq!(harness.catalog().len(), 1);
        let handle = harness.launch("clock", "i-1", None).await.unwrap();
        assert_eq!(handle.instance_id, InstanceId("i-1".into()));
        harness.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn launching_an_unknown_plugin_fails() {
        let harness = TestHarness::builder().build().unwrap();
        assert!(harness.launch("ghost", "i-1", None).await.is_err());
        harness.shutdown();
    }
}
