// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery over configured plugin directories.
//!
//! Traversal policy: for each directory in the order given, its immediate
//! children are enumerated and sorted by file name; each child directory
//! containing a `plugin.toml` is one candidate. Not recursive beyond that
//! one level. The deterministic order makes duplicate-id rejection
//! reproducible across rescans.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use tessera_core::types::PluginId;
use tessera_core::TesseraError;

use crate::catalog::{CatalogSnapshot, DiscoveryError, RegistryEntry};
use crate::manifest::parse_manifest;

/// File name of a plugin declaration inside its directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Registry of discovered plugin types.
///
/// `scan` builds a complete [`CatalogSnapshot`] and swaps it in atomically;
/// readers via `lookup`/`snapshot` always see one fully-formed scan.
pub struct PluginRegistry {
    catalog: ArcSwap<CatalogSnapshot>,
}

impl PluginRegistry {
    /// Creates a registry with an empty catalog.
    pub fn new() -> Self {
        PluginRegistry {
            catalog: ArcSwap::from_pointee(CatalogSnapshot::default()),
        }
    }

    /// Scans the given directories and replaces the catalog wholesale.
    ///
    /// Per-candidate failures (unreadable file, invalid manifest,
    /// duplicate id) are recorded in the snapshot's report and never abort
    /// discovery of the remaining candidates.
    pub fn scan(&self, dirs: &[PathBuf]) -> Arc<CatalogSnapshot> {
        let mut entries: BTreeMap<PluginId, Arc<RegistryEntry>> = BTreeMap::new();
        let mut report = Vec::new();
        let scanned_at = chrono::Utc::now();

        for dir in dirs {
            for candidate in sorted_candidates(dir, &mut report) {
                match load_candidate(&candidate) {
                    Ok(entry) => {
                        if let Some(existing) = entries.get(&entry.manifest.id) {
                            let err = TesseraError::DuplicatePluginId {
                                id: entry.manifest.id.0.clone(),
                                first_path: existing.source_dir.display().to_string(),
                            };
                            warn!(
                                plugin = %entry.manifest.id,
                                path = %candidate.display(),
                                "rejecting duplicate plugin id"
                            );
                            report.push(DiscoveryError {
                                path: candidate,
                                error: err.to_string(),
                            });
                        } else {
                            debug!(
                                plugin = %entry.manifest.id,
                                version = %entry.manifest.version,
                                path = %candidate.display(),
                                "discovered plugin"
                            );
                            entries.insert(entry.manifest.id.clone(), Arc::new(entry));
                        }
                    }
                    Err(e) => {
                        warn!(path = %candidate.display(), error = %e, "skipping invalid plugin");
                        report.push(DiscoveryError {
                            path: candidate,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            plugins = entries.len(),
            errors = report.len(),
            "plugin scan complete"
        );
        let snapshot = Arc::new(CatalogSnapshot::new(entries, report, scanned_at));
        self.catalog.store(snapshot.clone());
        snapshot
    }

    /// Looks up a plugin type in the current catalog.
    pub fn lookup(&self, id: &PluginId) -> Option<Arc<RegistryEntry>> {
        self.catalog.load().get(id).cloned()
    }

    /// The current catalog snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog.load_full()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Immediate child directories of `dir` that contain a `plugin.toml`,
/// sorted by file name. An unreadable directory is one report entry, not
/// a fatal error.
fn sorted_candidates(dir: &Path, report: &mut Vec<DiscoveryError>) -> Vec<PathBuf> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "plugin directory unreadable");
            report.push(DiscoveryError {
                path: dir.to_path_buf(),
                error: format!("directory unreadable: {e}"),
            });
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = read
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).is_file())
        .collect();
    candidates.sort_by_key(|p| p.file_name().map(|n| n.to_owned()));
    candidates
}

fn load_candidate(plugin_dir: &Path) -> Result<RegistryEntry, TesseraError> {
    let manifest_path = plugin_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| TesseraError::manifest(format!("declaration unreadable: {e}")))?;
    let manifest = parse_manifest(&content)?;
    Ok(RegistryEntry {
        manifest,
        source_dir: plugin_dir.to_path_buf(),
        discovered_at: chrono::Utc::now(),
    })
}
