//! Durable scan checkpoints.
//!
//! On disk a checkpoint is a JSON envelope `{schema_version, checksum, payload}`
//! where `checksum` is the hex SHA-256 of the serialized payload. Saves go to a
//! temporary file in the same directory which is synced and then renamed over
//! the previous checkpoint.

use crate::error::{Result, ScanError};
use crate::state::ScanState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use signalwatch_core::{ScanConfig, Timestamp};
use signalwatch_registry::RateBudgetSnapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current checkpoint layout version.
pub const SCHEMA_VERSION: u32 = 1;

/// How the scan stood when the checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPhase {
    /// Written between companies of a running scan
    Running,
    /// Written on an explicit pause
    Paused,
    /// Final checkpoint of a finished scan
    Completed,
}

/// Snapshot of a scan's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    /// Layout version
    pub schema_version: u32,
    /// Scan identity, stable across resumes
    pub scan_id: Uuid,
    /// When the snapshot was taken
    pub timestamp: Timestamp,
    /// Scan phase at write time
    pub phase: CheckpointPhase,
    /// Scan options (the API key is never written)
    pub config: ScanConfig,
    /// Visited set, frontier, per-company state, findings and graph
    pub state: ScanState,
    /// Calls still inside the rate window
    pub rate_budget: RateBudgetSnapshot,
}

impl ScanCheckpoint {
    /// Build a checkpoint stamped now.
    #[must_use]
    pub fn new(
        scan_id: Uuid,
        phase: CheckpointPhase,
        config: ScanConfig,
        state: ScanState,
        rate_budget: RateBudgetSnapshot,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            scan_id,
            timestamp: Timestamp::now(),
            phase,
            config,
            state,
            rate_budget,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    checksum: String,
    payload: Value,
}

/// File-backed checkpoint persistence.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the checkpoint.
    pub fn save(&self, checkpoint: &ScanCheckpoint) -> Result<()> {
        let payload = serde_json::to_value(checkpoint)?;
        let envelope = Envelope {
            schema_version: checkpoint.schema_version,
            checksum: checksum(&payload)?,
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(
            path = %self.path.display(),
            visited = checkpoint.state.visited.len(),
            frontier = checkpoint.state.frontier.len(),
            phase = ?checkpoint.phase,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Load the checkpoint, or `None` if there is none.
    ///
    /// Version mismatches, checksum failures, undecodable payloads and
    /// inconsistent frontier/visited state are all `CorruptCheckpoint`.
    pub fn load(&self) -> Result<Option<ScanCheckpoint>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(format!("unreadable envelope: {e}")))?;
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(self.corrupt(format!(
                "schema version {} (expected {SCHEMA_VERSION})",
                envelope.schema_version
            )));
        }
        if checksum(&envelope.payload)? != envelope.checksum {
            return Err(self.corrupt("checksum mismatch".to_string()));
        }

        let checkpoint: ScanCheckpoint = serde_json::from_value(envelope.payload)
            .map_err(|e| self.corrupt(format!("invalid payload: {e}")))?;
        if checkpoint.schema_version != SCHEMA_VERSION {
            return Err(self.corrupt(format!(
                "payload schema version {}",
                checkpoint.schema_version
            )));
        }
        checkpoint
            .state
            .validate(checkpoint.config.max_depth)
            .map_err(|reason| self.corrupt(reason))?;

        Ok(Some(checkpoint))
    }

    /// Delete the checkpoint. Returns whether a file was removed.
    pub fn reset(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "checkpoint reset");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn corrupt(&self, reason: String) -> ScanError {
        ScanError::CorruptCheckpoint {
            path: self.path.clone(),
            reason,
        }
    }
}

fn checksum(payload: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
