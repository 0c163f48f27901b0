//! SignalWatch Scanner - resumable company-registry scans.
//!
//! Walks a set of seed companies and, optionally, the network reachable
//! through their directors. For each company it reads recent filing documents,
//! extracts the name and dates they state, and flags values that disagree with
//! the official record.
//!
//! # Features
//!
//! - Bounded concurrent workers sharing one rate-limited registry client
//! - Label-proximity extraction with OCR confidence scoring
//! - Two-gate mismatch detection with corroboration across filings
//! - Breadth-first director-network expansion with depth and size caps
//! - Atomic, checksummed checkpoints after every processed company
//! - Pause, resume across process restarts, and lock-protected checkpoint files
//!
//! # Example
//!
//! ```rust,ignore
//! use signalwatch_core::{AppConfig, ScanConfig};
//! use signalwatch_scanner::ScanOrchestrator;
//!
//! let orchestrator = ScanOrchestrator::new(AppConfig::load()?);
//! let scan_id = orchestrator
//!     .start_scan(ScanConfig {
//!         company_numbers: vec!["01234567".into()],
//!         ..ScanConfig::default()
//!     })
//!     .await?;
//!
//! let state = orchestrator.wait().await;
//! let results = orchestrator.results().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod checkpoint;
pub mod detector;
#[allow(missing_docs)]
pub mod error;
pub mod extractor;
/// Selection of filings worth verifying.
pub mod filter;
pub mod lock;
pub mod network;
pub mod normalize;
pub mod ocr;
pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use checkpoint::{CheckpointPhase, CheckpointStore, ScanCheckpoint, SCHEMA_VERSION};
pub use detector::{FindingKind, MismatchDetector, MismatchFinding, RecordValue, SourcedCandidate};
pub use error::{Result, ScanError};
pub use extractor::{ExtractedCandidate, ExtractionResult, Field, TextExtractor};
pub use filter::{FilingFilter, VERIFIABLE_CATEGORIES};
pub use lock::CheckpointLock;
pub use network::{
    Director, DirectorGraph, DirectorLinks, ExpansionLimits, Frontier, FrontierEntry, GraphEdge,
    NetworkExpander,
};
pub use ocr::{CommandOcr, OcrEngine, PlainTextOcr};
pub use orchestrator::{RunState, ScanOrchestrator, ScanResults, ScanStatus};
pub use state::{CompanyState, ScanState, VisitedSet};
