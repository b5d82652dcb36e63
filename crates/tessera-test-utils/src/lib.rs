// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tessera integration tests.
//!
//! Provides scripted workers and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without real worker processes.
//!
//! # Components
//!
//! - [`ScriptedSpawner`] / [`ScriptedBehavior`] - in-memory workers driven
//!   by declarative scripts, with spawn and traffic capture
//! - [`MemoryStore`] - in-memory settings store
//! - [`RecordingTileSink`] / [`RecordingLogSink`] - capture sinks
//! - [`TestHarness`] - a fully wired runtime stack over temp plugin dirs

pub mod harness;
pub mod memory_store;
pub mod scripted_worker;
pub mod sinks;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryStore;
pub use scripted_worker::{ScriptedBehavior, ScriptedSpawner, ScriptedWorker};
pub use sinks::{RecordingLogSink, RecordingTileSink};
