// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tessera plugins` command implementation.
//!
//! Scans the configured plugin directories and lists what was found,
//! including per-candidate failures, without starting any workers.

use tessera_config::model::TesseraConfig;
use tessera_plugin::PluginRegistry;

/// Runs the `tessera plugins` command. Returns the process exit code.
pub fn run_plugins(config: &TesseraConfig) -> i32 {
    let registry = PluginRegistry::new();
    let catalog = registry.scan(&config.host.plugin_dirs);

    if catalog.is_empty() {
        println!("no plugins found");
    }
    for entry in catalog.entries() {
        let manifest = &entry.manifest;
        let capabilities = if manifest.capabilities.is_empty() {
            String::new()
        } else {
            let tags: Vec<String> = manifest
                .capabilities
                .iter()
                .map(|c| c.to_string())
                .collect();
            format!(" [{}]", tags.join(", "))
        };
        println!(
            "{} {}{} ({})",
            manifest.id,
            manifest.version,
            capabilities,
            entry.source_dir.display()
        );
    }
    for failure in catalog.report() {
        eprintln!("warning: {}: {}", failure.path.display(), failure.error);
    }
    0
}
