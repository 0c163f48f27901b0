use signalwatch_core::{CompanyNumber, ConfigError};
use signalwatch_registry::RegistryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the scan engine.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Corrupt checkpoint at {path}: {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("Checkpoint {path} is locked by another scan (pid {pid})")]
    CheckpointLocked { path: PathBuf, pid: u32 },

    #[error("Checkpoint lock {path} has no readable owner; remove it if no scan is running")]
    LockUnreadable { path: PathBuf },

    #[error("OCR failed for filing {filing_id}: {reason}")]
    OcrFailure { filing_id: String, reason: String },

    #[error("Processing failed for company {company}: {reason}")]
    PartialScanFailure {
        company: CompanyNumber,
        reason: String,
    },

    #[error("Invalid scan state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] signalwatch_db::DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    /// Whether this error ends the scan rather than one company.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_fatal(),
            Self::CorruptCheckpoint { .. }
            | Self::CheckpointLocked { .. }
            | Self::LockUnreadable { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => true,
            Self::OcrFailure { .. }
            | Self::PartialScanFailure { .. }
            | Self::InvalidState(_)
            | Self::Database(_) => false,
        }
    }

    /// Whether the company should go back on the frontier rather than be
    /// recorded as failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Registry(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
