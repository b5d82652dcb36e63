// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message protocol for the Tessera plugin runtime.
//!
//! Defines the wire [`Envelope`], its line framing, the monotonic
//! timestamp clock, and the [`WorkerLink`]/[`WorkerSpawner`] seam through
//! which the supervisor talks to worker processes.
//!
//! # Wire format
//!
//! One camelCase JSON object per `\n`-terminated line over the worker's
//! stdin/stdout:
//!
//! ```json
//! {"correlationId":"...","kind":"configure","instanceId":"...","payload":{},"timestampMonotonic":123}
//! ```
//!
//! `correlationId` is present only on request/response envelopes. Lines
//! over [`MAX_ENVELOPE_BYTES`] are protocol violations. The worker's
//! stderr is free-form text, drained into host logging.

pub mod clock;
pub mod codec;
pub mod envelope;
pub mod link;

pub use clock::MonotonicClock;
pub use codec::{decode_line, encode_line, MAX_ENVELOPE_BYTES};
pub use envelope::{Envelope, EnvelopeKind};
pub use link::{LinkEvent, SpawnSpec, WorkerLink, WorkerSpawner};
