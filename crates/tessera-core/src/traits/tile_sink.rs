// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UI tile adapter boundary.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::InstanceId;

/// Receives render output for display. Delivery is best-effort; each call
/// carries one complete payload attributable to exactly one instance.
#[async_trait]
pub trait TileSink: Send + Sync {
    /// Displays a render payload for the given instance's tile.
    async fn render(&self, id: &InstanceId, payload: &Value);

    /// Displays the "plugin unavailable" placeholder for an instance whose
    /// worker has failed permanently.
    async fn render_unavailable(&self, id: &InstanceId, message: &str);
}
