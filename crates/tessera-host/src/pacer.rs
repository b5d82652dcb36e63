// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Render pacing per instance.
//!
//! Workers may emit updates as fast as they like; the tile only repaints
//! at the configured floor. Bursts within the coalesce window collapse to
//! one repaint, and while throttled the latest payload always wins.

use std::cmp::max;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use tessera_config::model::UpdatesConfig;

/// Rate limiter and coalescer for one instance's render stream.
#[derive(Debug)]
pub struct UpdatePacer {
    min_interval: Duration,
    coalesce_window: Duration,
    last_emit: Option<Instant>,
    pending: Option<Value>,
    deadline: Option<Instant>,
}

impl UpdatePacer {
    /// The manifest hint can only widen the interval, never shrink it
    /// below the configured floor.
    pub fn new(config: &UpdatesConfig, hint_ms: Option<u64>) -> Self {
        let floor = Duration::from_millis(config.min_interval_ms);
        let min_interval = match hint_ms {
            Some(hint) => max(floor, Duration::from_millis(hint)),
            None => floor,
        };
        Self {
            min_interval,
            coalesce_window: Duration::from_millis(config.coalesce_window_ms),
            last_emit: None,
            pending: None,
            deadline: None,
        }
    }

    /// Queue a payload. Later submissions overwrite earlier ones that have
    /// not flushed yet.
    pub fn submit(&mut self, now: Instant, payload: Value) {
        self.pending = Some(payload);
        if self.deadline.is_none() {
            let earliest = match self.last_emit {
                Some(last) => max(last + self.min_interval, now),
                None => now,
            };
            self.deadline = Some(max(earliest, now + self.coalesce_window));
        }
    }

    /// When the pending payload becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take the pending payload if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<Value> {
        let deadline = self.deadline?;
        if deadline > now {
            return None;
        }
        self.deadline = None;
        self.last_emit = Some(now);
        self.pending.take()
    }
}
