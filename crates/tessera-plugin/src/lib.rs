// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery for the Tessera runtime: manifest validation, directory
//! scanning, and the atomically swapped catalog of available plugin types.

pub mod catalog;
pub mod manifest;
pub mod registry;

pub use catalog::{CatalogSnapshot, DiscoveryError, RegistryEntry};
pub use manifest::{parse_manifest, PluginManifest};
pub use registry::{PluginRegistry, MANIFEST_FILE};
