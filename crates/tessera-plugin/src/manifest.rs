// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifest parsing from `plugin.toml` declarations.
//!
//! Parsing is a pure function over the declaration text: no I/O, no side
//! effects, deterministic across repeated applications.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use tessera_core::types::{Capability, PluginId};
use tessera_core::TesseraError;

/// Validated, immutable description of a plugin type.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    /// Unique id of the plugin type (e.g. "clock").
    pub id: PluginId,
    /// Semantic version of the plugin.
    pub version: semver::Version,
    /// Worker executable, relative to the plugin's directory.
    pub entrypoint: String,
    /// Arguments passed to the worker before the appended instance id.
    pub args: Vec<String>,
    /// Declared permission tags, checked against the closed allow-list.
    pub capabilities: Vec<Capability>,
    /// JSON Schema for the instance settings blob, if the plugin has
    /// settings. Guaranteed to compile as a schema.
    pub settings_schema: Option<Value>,
    /// Advisory render cadence hint; never enforced against the worker.
    pub update_interval_hint_ms: Option<u64>,
}

/// Intermediate TOML deserialization struct for `plugin.toml`.
#[derive(Debug, Deserialize)]
struct ManifestFile {
    plugin: PluginSection,
    settings_schema: Option<toml::Table>,
}

/// The `[plugin]` table of a `plugin.toml` file.
#[derive(Debug, Deserialize)]
struct PluginSection {
    id: String,
    version: String,
    entrypoint: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    update_interval_hint_ms: Option<u64>,
}

/// Parse and validate a plugin manifest from TOML content.
///
/// Field-specific failure reasons: malformed TOML; empty `id` or
/// `entrypoint`; non-semver `version`; an entrypoint that is absolute or
/// escapes the plugin directory; an unknown capability tag; a
/// `settings_schema` that does not compile as a JSON Schema.
pub fn parse_manifest(toml_content: &str) -> Result<PluginManifest, TesseraError> {
    let file: ManifestFile = toml::from_str(toml_content)
        .map_err(|e| TesseraError::manifest(format!("malformed declaration: {e}")))?;

    let section = file.plugin;

    if section.id.trim().is_empty() {
        return Err(TesseraError::manifest("id must not be empty"));
    }

    let version = semver::Version::parse(&section.version).map_err(|e| {
        TesseraError::manifest(format!("version `{}` is not semver: {e}", section.version))
    })?;

    validate_entrypoint(&section.entrypoint)?;

    let mut capabilities = Vec::with_capacity(section.capabilities.len());
    for tag in &section.capabilities {
        let cap = Capability::from_str(tag).map_err(|_| {
            TesseraError::manifest(format!(
                "unknown capability `{tag}`. Expected one of: network, filesystem, system-info, notifications"
            ))
        })?;
        capabilities.push(cap);
    }

    let settings_schema = match file.settings_schema {
        Some(table) => Some(compile_schema(table)?),
        None => None,
    };

    Ok(PluginManifest {
        id: PluginId(section.id),
        version,
        entrypoint: section.entrypoint,
        args: section.args,
        capabilities,
        settings_schema,
        update_interval_hint_ms: section.update_interval_hint_ms,
    })
}

/// The entrypoint must stay inside the plugin's directory: relative, with
/// no parent components.
fn validate_entrypoint(entrypoint: &str) -> Result<(), TesseraError> {
    if entrypoint.trim().is_empty() {
        return Err(TesseraError::manifest("entrypoint must not be empty"));
    }
    let path = Path::new(entrypoint);
    if path.is_absolute() {
        return Err(TesseraError::manifest(format!(
            "entrypoint `{entrypoint}` must be relative to the plugin directory"
        )));
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(TesseraError::manifest(format!(
            "entrypoint `{entrypoint}` must not escape the plugin directory"
        )));
    }
    Ok(())
}

/// Converts the TOML schema table to JSON and checks that it compiles as a
/// JSON Schema document.
fn compile_schema(table: toml::Table) -> Result<Value, TesseraError> {
    let schema = serde_json::to_value(table)
        .map_err(|e| TesseraError::manifest(format!("settings_schema is not valid JSON: {e}")))?;
    jsonschema::validator_for(&schema)
        .map_err(|e| TesseraError::manifest(format!("settings_schema does not compile: {e}")))?;
    Ok(schema)
}
