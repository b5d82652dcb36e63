// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The catalog: one complete, immutable result of a discovery scan.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use tessera_core::types::PluginId;

use crate::manifest::PluginManifest;

/// A valid manifest plus discovery metadata. Entries are replaced
/// wholesale on rescan, never edited in place.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub manifest: PluginManifest,
    /// Directory the `plugin.toml` was found in; the worker entrypoint is
    /// resolved beneath it.
    pub source_dir: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

/// A per-candidate discovery failure, surfaced in the scan report.
#[derive(Debug, Clone)]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub error: String,
}

/// One fully-formed scan result. Readers always observe a snapshot from a
/// single scan; two scans are never mixed.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    entries: BTreeMap<PluginId, Arc<RegistryEntry>>,
    report: Vec<DiscoveryError>,
    scanned_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    pub(crate) fn new(
        entries: BTreeMap<PluginId, Arc<RegistryEntry>>,
        report: Vec<DiscoveryError>,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        CatalogSnapshot {
            entries,
            report,
            scanned_at: Some(scanned_at),
        }
    }

    pub fn get(&self, id: &PluginId) -> Option<&Arc<RegistryEntry>> {
        self.entries.get(id)
    }

    /// All entries, ordered by plugin id.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<RegistryEntry>> {
        self.entries.values()
    }

    /// The per-candidate failures recorded during the scan.
    pub fn report(&self) -> &[DiscoveryError] {
        &self.report
    }

    pub fn scanned_at(&self) -> Option<DateTime<Utc>> {
        self.scanned_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
