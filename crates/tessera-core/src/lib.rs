// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tessera dashboard plugin runtime.
//!
//! This crate provides the error taxonomy, id newtypes, capability tags,
//! and the collaborator traits (settings store, tile sink, log sink) used
//! throughout the Tessera workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TesseraError;
pub use types::{Capability, CorrelationId, InstanceId, LogLevel, Page, PluginId, TilePlacement};

pub use traits::{LogSink, SettingsStore, TileSink};
