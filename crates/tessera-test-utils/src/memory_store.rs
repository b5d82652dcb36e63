// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `SettingsStore` for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use tessera_core::types::{InstanceId, Page};
use tessera_core::{SettingsStore, TesseraError};

/// A `SettingsStore` backed by in-process maps. Contents vanish with the
/// store; no durability, no I/O.
#[derive(Default)]
pub struct MemoryStore {
    settings: Mutex<HashMap<InstanceId, Value>>,
    pages: Mutex<Vec<Page>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored settings blobs.
    pub async fn settings_count(&self) -> usize {
        self.settings.lock().await.len()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self, id: &InstanceId) -> Result<Option<Value>, TesseraError> {
        Ok(self.settings.lock().await.get(id).cloned())
    }

    async fn put_settings(&self, id: &InstanceId, value: &Value) -> Result<(), TesseraError> {
        self.settings.lock().await.insert(id.clone(), value.clone());
        Ok(())
    }

    async fn delete_settings(&self, id: &InstanceId) -> Result<(), TesseraError> {
        self.settings.lock().await.remove(id);
        Ok(())
    }

    async fn load_pages(&self) -> Result<Vec<Page>, TesseraError> {
        Ok(self.pages.lock().await.clone())
    }

    async fn save_pages(&self, pages: &[Page]) -> Result<(), TesseraError> {
        *self.pages.lock().await = pages.to_vec();
        Ok(())
    }
}
