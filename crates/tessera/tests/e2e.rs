// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the assembled runtime stack.
//!
//! The scripted tests drive the full discovery -> supervision -> bridge
//! pipeline with in-memory workers; the unix-only test spawns a real shell
//! script worker through `ProcessSpawner` and exercises the stdio protocol
//! for real.

use std::time::Duration;

use serde_json::json;

use tessera_core::SettingsStore;
use tessera_test_utils::{ScriptedBehavior, TestHarness};

const CLOCK_MANIFEST: &str = r#"
[plugin]
id = "clock"
version = "1.0.0"
entrypoint = "worker"
update_interval_hint_ms = 1000

[settings_schema]
type = "object"

[settings_schema.properties.format]
type = "string"
"#;

#[tokio::test(start_paused = true)]
async fn scripted_stack_renders_and_persists_settings() {
    let harness = TestHarness::builder()
        .with_plugin("clock", CLOCK_MANIFEST)
        .with_behavior(ScriptedBehavior {
            updates: vec![json!({"text": "12:00"})],
            ..ScriptedBehavior::well_behaved()
        })
        .build()
        .unwrap();

    harness.launch("clock", "i-1", None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let id = tessera_core::types::InstanceId("i-1".into());
    assert_eq!(
        harness.tiles.renders_for(&id).await,
        vec![json!({"text": "12:00"})]
    );

    // A valid settings edit is forwarded, acked, and persisted.
    harness
        .bridge
        .apply_settings(id.clone(), json!({"format": "24h"}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        harness.store.get_settings(&id).await.unwrap(),
        Some(json!({"format": "24h"}))
    );

    // An invalid one is rejected and the stored blob is untouched.
    let err = harness
        .bridge
        .apply_settings(id.clone(), json!({"format": 24}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        tessera_core::TesseraError::SettingsValidationFailed { .. }
    ));
    assert_eq!(
        harness.store.get_settings(&id).await.unwrap(),
        Some(json!({"format": "24h"}))
    );

    harness.shutdown();
}

#[tokio::test(start_paused = true)]
async fn concurrent_instances_keep_payloads_attributed() {
    let harness = TestHarness::builder()
        .with_plugin("clock", CLOCK_MANIFEST)
        .with_behavior(ScriptedBehavior {
            updates: vec![json!({"owner": "first"})],
            ..ScriptedBehavior::well_behaved()
        })
        .with_behavior(ScriptedBehavior {
            updates: vec![json!({"owner": "second"})],
            ..ScriptedBehavior::well_behaved()
        })
        .build()
        .unwrap();

    harness.launch("clock", "i-1", None).await.unwrap();
    harness.launch("clock", "i-2", None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Whole payloads, each attributed to exactly one instance.
    let first = tessera_core::types::InstanceId("i-1".into());
    let second = tessera_core::types::InstanceId("i-2".into());
    assert_eq!(
        harness.tiles.renders_for(&first).await,
        vec![json!({"owner": "first"})]
    );
    assert_eq!(
        harness.tiles.renders_for(&second).await,
        vec![json!({"owner": "second"})]
    );

    harness.shutdown();
}

#[tokio::test(start_paused = true)]
async fn crash_looping_plugin_goes_unavailable() {
    let harness = TestHarness::builder()
        .with_plugin("clock", CLOCK_MANIFEST)
        .with_behavior(ScriptedBehavior::crashing_after(vec![], 1))
        .build()
        .unwrap();

    harness.launch("clock", "i-1", None).await.unwrap();
    // Enough virtual time for every restart and backoff to run out.
    tokio::time::sleep(Duration::from_secs(120)).await;

    let unavailable = harness.tiles.unavailable().await;
    assert_eq!(unavailable.len(), 1);
    assert!(unavailable[0].1.contains("plugin unavailable"));
    // Four spawn attempts: the original plus three restarts.
    assert_eq!(harness.spawner.spawn_count(), 4);

    harness.shutdown();
}

#[cfg(unix)]
mod real_workers {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use tessera_config::model::UpdatesConfig;
    use tessera_core::types::{InstanceId, PluginId};
    use tessera_host::{spawn_spec_for, ProcessSpawner, SupervisorConfig, TileBridge};
    use tessera_plugin::PluginRegistry;
    use tessera_proto::WorkerSpawner;
    use tessera_test_utils::{MemoryStore, RecordingLogSink, RecordingTileSink};

    const WORKER_MANIFEST: &str = r#"
[plugin]
id = "shell-clock"
version = "0.1.0"
entrypoint = "worker.sh"
"#;

    /// Emits ready and one update, then waits for the shutdown request and
    /// acknowledges it with a bare event.
    const WORKER_SCRIPT: &str = r#"#!/bin/sh
id="$1"
printf '{"kind":"ready","instanceId":"%s","payload":{},"timestampMonotonic":0}\n' "$id"
printf '{"kind":"update","instanceId":"%s","payload":{"text":"hello"},"timestampMonotonic":1}\n' "$id"
read _request
printf '{"kind":"shutdownAck","instanceId":"%s","payload":{},"timestampMonotonic":2}\n' "$id"
exit 0
"#;

    fn install_worker(root: &Path) {
        let dir = root.join("shell-clock");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("plugin.toml"), WORKER_MANIFEST).unwrap();
        let script = dir.join("worker.sh");
        std::fs::write(&script, WORKER_SCRIPT).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn real_worker_round_trip() {
        let plugin_root = tempfile::tempdir().unwrap();
        install_worker(plugin_root.path());

        let registry = PluginRegistry::new();
        registry.scan(&[plugin_root.path().to_path_buf()]);
        let entry = registry.lookup(&PluginId("shell-clock".into())).unwrap();

        let tiles = Arc::new(RecordingTileSink::new());
        let logs = Arc::new(RecordingLogSink::new());
        let store = Arc::new(MemoryStore::new());
        let (bridge, bridge_handle, _events) = TileBridge::new(
            tiles.clone(),
            logs,
            store,
            UpdatesConfig {
                min_interval_ms: 50,
                coalesce_window_ms: 10,
            },
            Duration::from_secs(5),
        );
        let cancel = CancellationToken::new();
        let bridge_task = tokio::spawn(bridge.run(cancel.clone()));

        let instance_id = InstanceId("real-1".into());
        let spawner: Arc<dyn WorkerSpawner> = Arc::new(ProcessSpawner);
        bridge_handle
            .launch_instance(
                spawn_spec_for(&entry, instance_id.clone()),
                spawner,
                SupervisorConfig::default(),
                None,
                &entry.manifest,
            )
            .await
            .unwrap();

        // Wait for the paced render to land.
        let mut renders = Vec::new();
        for _ in 0..100 {
            renders = tiles.renders_for(&instance_id).await;
            if !renders.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(renders, vec![json!({"text": "hello"})]);

        // Graceful drain: the worker acks the shutdown request and exits.
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(10), bridge_task)
            .await
            .expect("bridge did not drain in time")
            .unwrap();
    }
}
