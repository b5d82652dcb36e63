// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the runtime's external boundaries.
//!
//! The plugin runtime does not render tiles, persist layouts, or own a
//! logging pipeline itself; it talks to those collaborators through the
//! traits defined here.

pub mod log_sink;
pub mod settings_store;
pub mod tile_sink;

pub use log_sink::{LogSink, TracingLogSink};
pub use settings_store::SettingsStore;
pub use tile_sink::TileSink;
