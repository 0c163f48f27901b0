//! SignalWatch Registry - rate-governed access to the company registry.
//!
//! # Features
//!
//! - **Rate budget**: sliding window of issued calls (600 per 5 minutes by default);
//!   every attempt consumes quota
//! - **Retry policy**: exponential backoff with jitter on 429/5xx/timeouts,
//!   honouring `Retry-After`
//! - **Circuit breaker**: fails fast after repeated failures until a cool-down elapses
//! - **Transport seam**: [`RegistryTransport`] decouples the client from HTTP
//! - **Typed fetcher**: profiles, officers, filing history, documents,
//!   director appointments and company search
//!
//! # Example
//!
//! ```rust,no_run
//! use signalwatch_core::{AppConfig, CompanyNumber};
//! use signalwatch_registry::{DocumentFetcher, RateLimitedClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load_with_env(None)?;
//! let client = Arc::new(RateLimitedClient::from_config(&config)?);
//! let fetcher = DocumentFetcher::new(client);
//!
//! let record = fetcher.fetch_profile(&CompanyNumber::new("01234567")?).await?;
//! println!("{} has {} directors", record.name, record.directors.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod budget;
pub mod circuit;
pub mod client;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod transport;

pub use budget::{RateBudget, RateBudgetSnapshot, RateStatus};
pub use circuit::CircuitBreaker;
pub use client::{RateLimitedClient, RequestMode};
pub use error::{RegistryError, Result};
pub use fetcher::{DocumentFetcher, MAX_SEARCH_RESULTS};
pub use models::{
    Appointment, CompanyRecord, CompanySummary, DirectorRef, Filing, OcrStatus, PreviousName,
};
pub use transport::{ApiRequest, ApiResponse, Endpoint, HttpTransport, RegistryTransport, Service};
