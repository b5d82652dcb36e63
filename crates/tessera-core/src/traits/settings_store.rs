// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator for instance settings and page layouts.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TesseraError;
use crate::types::{InstanceId, Page};

/// Key-value persistence for `instance id -> settings blob` pairs plus the
/// ordered list of live placements per page.
///
/// The store never sees the plugin protocol; settings blobs reaching
/// `put_settings` have already been validated against the instance's
/// manifest schema.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the stored settings blob for an instance, if any.
    async fn get_settings(&self, id: &InstanceId) -> Result<Option<Value>, TesseraError>;

    /// Stores a settings blob for an instance, replacing any prior value.
    async fn put_settings(&self, id: &InstanceId, value: &Value) -> Result<(), TesseraError>;

    /// Removes an instance's settings blob. Removing an absent key is not
    /// an error.
    async fn delete_settings(&self, id: &InstanceId) -> Result<(), TesseraError>;

    /// Loads the persisted pages with their ordered placements.
    async fn load_pages(&self) -> Result<Vec<Page>, TesseraError>;

    /// Replaces the persisted pages wholesale.
    async fn save_pages(&self, pages: &[Page]) -> Result<(), TesseraError>;
}
