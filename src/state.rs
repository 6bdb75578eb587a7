//! File-backed checkpoint of the loop's mutable state.
//!
//! The position (and in test mode the ledger) is snapshotted after every
//! transition so a restarted process resumes with the held instrument
//! instead of orphaning it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::Position;
use crate::error::{QuarterdeckError, Result};
use crate::ledger::SimLedger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub position: Position,
    /// Present only when running in test mode
    pub ledger: Option<SimLedger>,
    pub updated_at: DateTime<Utc>,
}

/// JSON-file state store
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the last snapshot, or None on first start
    pub async fn load(&self) -> Result<Option<StateSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot: StateSnapshot = serde_json::from_slice(&bytes)?;
                info!(path = %self.path.display(), "recovered state snapshot");
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QuarterdeckError::Persistence(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Write a snapshot atomically (write temp file, then rename)
    pub async fn save(&self, position: &Position, ledger: Option<&SimLedger>) -> Result<()> {
        let snapshot = StateSnapshot {
            position: position.clone(),
            ledger: ledger.cloned(),
            updated_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            QuarterdeckError::Persistence(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            QuarterdeckError::Persistence(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "checkpointed state");
        Ok(())
    }
}
