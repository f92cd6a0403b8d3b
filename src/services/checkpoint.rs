//! Optional run checkpointing.
//!
//! A checkpoint is just the serialized [`WorkflowState`] plus identity and a
//! timestamp; the engine saves one after every decide step when a
//! checkpointer is configured. Checkpoint failures are warned about and
//! ignored, resumability is best effort.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::state::WorkflowState;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub id: String,
    pub correlation_id: String,
    pub state: WorkflowState,
    pub created_at: String,
}

impl WorkflowCheckpoint {
    pub fn new(state: &WorkflowState) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: state.correlation_id.clone(),
            state: state.clone(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), CheckpointError>;

    /// The most recent checkpoint for a correlation id, if any.
    async fn load_latest(
        &self,
        correlation_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, CheckpointError>;
}

/// Keeps every checkpoint of the process lifetime; mainly for tests.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    store: RwLock<HashMap<String, Vec<WorkflowCheckpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), CheckpointError> {
        let mut store = self.store.write().await;
        store
            .entry(checkpoint.correlation_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(
        &self,
        correlation_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, CheckpointError> {
        let store = self.store.read().await;
        Ok(store
            .get(correlation_id)
            .and_then(|checkpoints| checkpoints.last())
            .cloned())
    }
}

/// One JSON file per correlation id; each save replaces the previous one.
pub struct JsonFileCheckpointer {
    dir: PathBuf,
}

impl JsonFileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, correlation_id: &str) -> PathBuf {
        self.dir.join(format!("{correlation_id}.json"))
    }
}

#[async_trait]
impl Checkpointer for JsonFileCheckpointer {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let serialized = serde_json::to_string_pretty(&checkpoint)?;
        tokio::fs::write(self.file_path(&checkpoint.correlation_id), serialized).await?;
        Ok(())
    }

    async fn load_latest(
        &self,
        correlation_id: &str,
    ) -> Result<Option<WorkflowCheckpoint>, CheckpointError> {
        let path = self.file_path(correlation_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
