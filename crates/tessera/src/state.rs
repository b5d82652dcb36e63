// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable JSON state: pages and per-instance settings in one file.
//!
//! The whole state is kept in memory and rewritten on every mutation via a
//! temp file in the same directory followed by a rename, so a crash mid-write
//! leaves the previous state intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use tessera_core::types::{InstanceId, Page};
use tessera_core::{SettingsStore, TesseraError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    pages: Vec<Page>,
    #[serde(default)]
    settings: BTreeMap<String, Value>,
}

/// A [`SettingsStore`] persisting to a single JSON file.
pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl JsonStateStore {
    /// Opens the store, loading existing state if the file is present.
    pub async fn open(path: &Path) -> Result<Self, TesseraError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| TesseraError::Storage { source: e.into() })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                StateFile::default()
            }
            Err(e) => return Err(TesseraError::Storage { source: e.into() }),
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &StateFile) -> Result<(), TesseraError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TesseraError::Storage { source: e.into() })?;
        }
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| TesseraError::Storage { source: e.into() })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| TesseraError::Storage { source: e.into() })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| TesseraError::Storage { source: e.into() })
    }
}

#[async_trait]
impl SettingsStore for JsonStateStore {
    async fn get_settings(&self, id: &InstanceId) -> Result<Option<Value>, TesseraError> {
        Ok(self.state.lock().await.settings.get(&id.0).cloned())
    }

    async fn put_settings(&self, id: &InstanceId, value: &Value) -> Result<(), TesseraError> {
        let mut state = self.state.lock().await;
        state.settings.insert(id.0.clone(), value.clone());
        self.persist(&state).await
    }

    async fn delete_settings(&self, id: &InstanceId) -> Result<(), TesseraError> {
        let mut state = self.state.lock().await;
        state.settings.remove(&id.0);
        self.persist(&state).await
    }

    async fn load_pages(&self) -> Result<Vec<Page>, TesseraError> {
        Ok(self.state.lock().await.pages.clone())
    }

    async fn save_pages(&self, pages: &[Page]) -> Result<(), TesseraError> {
        let mut state = self.state.lock().await;
        state.pages = pages.to_vec();
        self.persist(&state).await
    }
}
