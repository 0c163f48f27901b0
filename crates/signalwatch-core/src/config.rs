//! Configuration management for SignalWatch.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Heuristic knobs (label vocabularies,
//! legal suffixes, tolerances) live here rather than in code so they can be
//! tuned against a labeled corpus.

use crate::error::{ConfigError, ConfigResult};
use crate::types::CompanyNumber;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// Loaded from `~/.config/signalwatch/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Registry endpoints and transport settings
    pub registry: RegistryConfig,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// Circuit breaker settings
    pub circuit: CircuitConfig,
    /// Scan options
    pub scan: ScanConfig,
    /// OCR field extraction heuristics
    pub extraction: ExtractionConfig,
    /// Normalization and comparison rules
    pub matching: MatchingConfig,
}

impl AppConfig {
    /// Load configuration from the XDG config path, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if not found.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `SIGNALWATCH_API_KEY`: registry API key
    /// - `SIGNALWATCH_RATE_LIMIT_CAP`: calls allowed per window
    /// - `SIGNALWATCH_RATE_LIMIT_WINDOW_SECONDS`: window length
    /// - `SIGNALWATCH_CHECKPOINT_PATH`: checkpoint file location
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SIGNALWATCH_API_KEY") {
            self.scan.api_key = key;
            tracing::debug!("Override scan.api_key from env");
        }

        if let Some(cap) = lookup("SIGNALWATCH_RATE_LIMIT_CAP").and_then(|v| v.parse().ok()) {
            self.scan.rate_limit_cap = cap;
            tracing::debug!("Override scan.rate_limit_cap from env: {}", cap);
        }

        if let Some(window) =
            lookup("SIGNALWATCH_RATE_LIMIT_WINDOW_SECONDS").and_then(|v| v.parse().ok())
        {
            self.scan.rate_limit_window_seconds = window;
            tracing::debug!("Override scan.rate_limit_window_seconds from env: {}", window);
        }

        if let Some(path) = lookup("SIGNALWATCH_CHECKPOINT_PATH") {
            tracing::debug!("Override scan.checkpoint_path from env: {}", path);
            self.scan.checkpoint_path = PathBuf::from(path);
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;
        self.circuit.validate()?;
        self.scan.validate()?;
        self.extraction.validate()?;
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the parent directory if it doesn't exist. The API key is never written.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path.parent().ok_or_else(|| {
            ConfigError::invalid("config_path", "no parent directory")
        })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/signalwatch/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "signalwatch", "signalwatch")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/signalwatch`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "signalwatch", "signalwatch")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Registry endpoints and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry REST API
    pub base_url: String,
    /// Base URL of the document download API
    pub document_url: String,
    /// Optional secondary public-data API
    pub public_data_url: Option<String>,
    /// Per-call timeout in seconds; a stalled call counts as a retryable network error
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.company-information.service.gov.uk".to_string(),
            document_url: "https://document-api.company-information.service.gov.uk".to_string(),
            public_data_url: None,
            timeout_secs: 30,
            user_agent: "SignalWatch/0.1.0".to_string(),
        }
    }
}

/// Retry policy for 429/5xx and transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (doubled per attempt)
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay
    pub jitter_ms: u64,
    /// Times a company is put back on the frontier after a network failure
    /// before the scan checkpoints and stops
    pub max_company_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            jitter_ms: 500,
            max_company_attempts: 5,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.max_company_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_company_attempts",
                "must be at least 1",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failed calls (after retries) that open the circuit
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a trial call is allowed
    pub cooldown_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl CircuitConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit.failure_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// How the initial frontier is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Explicit list of company numbers
    #[default]
    Specific,
    /// Result of a registry company search
    Filtered,
}

/// Registry search criteria for `filtered` mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Free-text query (name or number)
    pub query: Option<String>,
    /// Company status, e.g. `active`
    pub company_status: Option<String>,
    /// Company type, e.g. `ltd`
    pub company_type: Option<String>,
    /// Maximum number of seeds taken from the search (0 = registry cap)
    pub limit: usize,
}

impl FilterCriteria {
    fn is_empty(&self) -> bool {
        self.query.as_deref().map_or(true, |q| q.trim().is_empty())
            && self.company_status.is_none()
            && self.company_type.is_none()
    }
}

/// Scan options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// `specific` or `filtered`
    pub scan_mode: ScanMode,
    /// Seed company numbers (required for `specific`)
    pub company_numbers: Vec<String>,
    /// Search criteria (required for `filtered`)
    pub filter_criteria: Option<FilterCriteria>,
    /// Maximum director-network depth from a seed
    pub max_depth: u32,
    /// Maximum number of companies discovered (visited + queued)
    pub max_companies: usize,
    /// Registry API key; read from config or env, never serialized
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Minimum confidence for a finding to be recorded
    pub ocr_confidence_threshold: f64,
    /// Rate window length in seconds
    pub rate_limit_window_seconds: u64,
    /// Calls allowed within one rate window
    pub rate_limit_cap: usize,
    /// Checkpoint file location
    pub checkpoint_path: PathBuf,
    /// Upper bound on concurrent company fetches
    pub max_workers: usize,
    /// Documents fetched per company
    pub max_documents_per_company: usize,
    /// Skip resigned appointments and non-active companies when expanding
    pub active_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::Specific,
            company_numbers: Vec::new(),
            filter_criteria: None,
            max_depth: 2,
            max_companies: 100,
            api_key: String::new(),
            ocr_confidence_threshold: 0.8,
            rate_limit_window_seconds: 300,
            rate_limit_cap: 600,
            checkpoint_path: PathBuf::from("signalwatch-checkpoint.json"),
            max_workers: 4,
            max_documents_per_company: 10,
            active_only: true,
        }
    }
}

impl ScanConfig {
    /// Validate scan options.
    pub fn validate(&self) -> ConfigResult<()> {
        match self.scan_mode {
            ScanMode::Specific => {
                if self.company_numbers.is_empty() {
                    return Err(ConfigError::invalid(
                        "scan.company_numbers",
                        "required when scan_mode is 'specific'",
                    ));
                }
                self.seed_numbers()?;
            }
            ScanMode::Filtered => {
                if self.filter_criteria.as_ref().map_or(true, FilterCriteria::is_empty) {
                    return Err(ConfigError::invalid(
                        "scan.filter_criteria",
                        "required when scan_mode is 'filtered'",
                    ));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.ocr_confidence_threshold) {
            return Err(ConfigError::invalid(
                "scan.ocr_confidence_threshold",
                format!("must be within [0, 1], got {}", self.ocr_confidence_threshold),
            ));
        }
        if self.rate_limit_cap == 0 {
            return Err(ConfigError::invalid("scan.rate_limit_cap", "must be positive"));
        }
        if self.rate_limit_window_seconds == 0 {
            return Err(ConfigError::invalid(
                "scan.rate_limit_window_seconds",
                "must be positive",
            ));
        }
        if self.max_companies == 0 {
            return Err(ConfigError::invalid("scan.max_companies", "must be positive"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("scan.max_workers", "must be positive"));
        }
        if self.checkpoint_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("scan.checkpoint_path", "must not be empty"));
        }
        Ok(())
    }

    /// Parse the configured seed numbers, deduplicated in their given order.
    pub fn seed_numbers(&self) -> ConfigResult<Vec<CompanyNumber>> {
        let mut seeds: Vec<CompanyNumber> = Vec::with_capacity(self.company_numbers.len());
        for raw in &self.company_numbers {
            let number = CompanyNumber::new(raw)
                .map_err(|e| ConfigError::invalid("scan.company_numbers", e.to_string()))?;
            if !seeds.contains(&number) {
                seeds.push(number);
            }
        }
        Ok(seeds)
    }
}

/// OCR field extraction heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Labels that anchor a company name value
    pub name_labels: Vec<String>,
    /// Labels that anchor an incorporation date value
    pub date_labels: Vec<String>,
    /// Labels that anchor the effective date of a change of name
    pub change_date_labels: Vec<String>,
    /// Maximum edit distance between a line prefix and a label
    pub max_label_edits: usize,
    /// Maximum number of lines between a label and its value
    pub max_anchor_distance: usize,
    /// Confidence lost per edit in the matched label
    pub label_edit_penalty: f64,
    /// Confidence lost per line between label and value
    pub anchor_distance_penalty: f64,
    /// Confidence lost in proportion to the share of OCR noise characters in the value
    pub noise_penalty: f64,
    /// Minimum share of readable characters for a document to count as readable
    pub min_readable_ratio: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            name_labels: [
                "company name",
                "name of company",
                "corporate name",
                "new name",
                "changed its name to",
            ]
            .map(String::from)
            .to_vec(),
            date_labels: [
                "date of incorporation",
                "incorporated on",
                "incorporation date",
            ]
            .map(String::from)
            .to_vec(),
            change_date_labels: [
                "date of change of name",
                "name changed on",
                "effective date of change",
            ]
            .map(String::from)
            .to_vec(),
            max_label_edits: 2,
            max_anchor_distance: 2,
            label_edit_penalty: 0.04,
            anchor_distance_penalty: 0.1,
            noise_penalty: 0.6,
            min_readable_ratio: 0.3,
        }
    }
}

impl ExtractionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.name_labels.is_empty()
            && self.date_labels.is_empty()
            && self.change_date_labels.is_empty()
        {
            return Err(ConfigError::invalid(
                "extraction",
                "at least one label vocabulary must be non-empty",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_readable_ratio) {
            return Err(ConfigError::invalid(
                "extraction.min_readable_ratio",
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Normalization and comparison rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Legal suffixes removed from the end of names before comparison
    pub legal_suffixes: Vec<String>,
    /// Edit distance at or below which two normalized names are the same
    pub name_edit_tolerance: usize,
    /// Day difference at or below which two dates are the same
    pub date_tolerance_days: i64,
    /// Day difference allowed between a change-of-name document and the
    /// date the registry says the previous name ceased
    pub name_change_date_tolerance_days: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            legal_suffixes: [
                "public limited company",
                "limited liability partnership",
                "limited partnership",
                "community interest company",
                "charitable incorporated organisation",
                "limited",
                "unlimited",
                "ltd",
                "plc",
                "llp",
                "lp",
                "cic",
                "cio",
                "unltd",
            ]
            .map(String::from)
            .to_vec(),
            name_edit_tolerance: 0,
            date_tolerance_days: 0,
            name_change_date_tolerance_days: 1,
        }
    }
}
