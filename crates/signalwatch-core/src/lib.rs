//! SignalWatch Core - Foundation crate for the registry scan engine.
//!
//! This crate provides shared identifier types, error handling and
//! configuration management that all other SignalWatch crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Normalized newtypes (`CompanyNumber`, `DirectorId`, `FilingId`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use signalwatch_core::{AppConfig, CompanyNumber};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AppConfig::default();
//! config.scan.company_numbers = vec!["1234567".to_string()];
//! config.validate()?;
//!
//! let seed = CompanyNumber::new("1234567")?;
//! assert_eq!(seed.as_str(), "01234567");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, CircuitConfig, ExtractionConfig, FilterCriteria, MatchingConfig, RegistryConfig,
    RetryConfig, ScanConfig, ScanMode,
};
pub use error::{ConfigError, ConfigResult, Result, SignalError};
pub use types::{CompanyNumber, DirectorId, FilingId, Timestamp};
