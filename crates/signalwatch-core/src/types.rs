//! Shared types used across the SignalWatch scan engine.
//!
//! Identifiers are normalized on construction so they can be used directly as
//! map keys in the scan state (visited set, frontier, director graph).

use crate::error::SignalError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for registry company numbers.
///
/// Company numbers are eight uppercase alphanumerics (`01234567`, `SC123456`).
/// Purely numeric input shorter than eight digits is left-padded with zeros,
/// matching how the registry itself canonicalises them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyNumber(String);

impl CompanyNumber {
    /// Create a new `CompanyNumber`, normalizing case, whitespace and zero padding.
    ///
    /// # Errors
    /// Returns error if the normalized value is not eight uppercase alphanumerics.
    pub fn new(number: impl AsRef<str>) -> Result<Self, SignalError> {
        let trimmed: String = number
            .as_ref()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        let normalized = if !trimmed.is_empty()
            && trimmed.len() < 8
            && trimmed.chars().all(|c| c.is_ascii_digit())
        {
            format!("{trimmed:0>8}")
        } else {
            trimmed
        };

        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(number: &str) -> Result<(), SignalError> {
        static NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = NUMBER_REGEX.get_or_init(|| Regex::new(r"^[A-Z0-9]{8}$").expect("valid regex"));

        if regex.is_match(number) {
            Ok(())
        } else {
            Err(SignalError::Validation(format!(
                "invalid company number: must be 8 alphanumeric characters, got '{number}'"
            )))
        }
    }
}

impl fmt::Display for CompanyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CompanyNumber {
    type Error = SignalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompanyNumber> for String {
    fn from(number: CompanyNumber) -> Self {
        number.0
    }
}

/// Newtype for registry officer (director) identifiers.
///
/// These are the opaque ids found in `/officers/{id}/appointments` links.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DirectorId(String);

impl DirectorId {
    /// Create a new `DirectorId`.
    ///
    /// # Errors
    /// Returns error if the id is empty, longer than 64 characters, or contains
    /// anything other than ASCII alphanumerics, `-` and `_`.
    pub fn new(id: impl Into<String>) -> Result<Self, SignalError> {
        let id = id.into().trim().to_string();
        static DIRECTOR_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = DIRECTOR_REGEX
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

        if regex.is_match(&id) {
            Ok(Self(id))
        } else {
            Err(SignalError::Validation(format!(
                "invalid director ID: '{id}'"
            )))
        }
    }

    /// Extract the id from an appointments link such as
    /// `/officers/AbC123/appointments`.
    ///
    /// # Errors
    /// Returns error if the link has no officer segment.
    pub fn from_appointments_link(link: &str) -> Result<Self, SignalError> {
        let mut segments = link.trim_matches('/').split('/');
        match (segments.next(), segments.next()) {
            (Some("officers"), Some(id)) => Self::new(id),
            _ => Err(SignalError::Validation(format!(
                "not an officer appointments link: '{link}'"
            ))),
        }
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DirectorId {
    type Error = SignalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DirectorId> for String {
    fn from(id: DirectorId) -> Self {
        id.0
    }
}

/// Newtype for filing transaction identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilingId(String);

impl FilingId {
    /// Create a new `FilingId`.
    ///
    /// # Errors
    /// Returns error if the id is blank.
    pub fn new(id: impl Into<String>) -> Result<Self, SignalError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(SignalError::Validation(
                "invalid filing ID: must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FilingId {
    type Error = SignalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FilingId> for String {
    fn from(id: FilingId) -> Self {
        id.0
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, SignalError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| SignalError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_number_valid() {
        for number in ["01234567", "SC123456", "OC301540", "NI000001"] {
            let parsed = CompanyNumber::new(number).expect("valid company number");
            assert_eq!(parsed.as_str(), number);
        }
    }

    #[test]
    fn test_company_number_normalization() {
        let padded = CompanyNumber::new("1234567").expect("numeric input is padded");
        assert_eq!(padded.as_str(), "01234567");

        let upper = CompanyNumber::new(" sc123456 ").expect("case and whitespace folded");
        assert_eq!(upper.as_str(), "SC123456");
    }

    #[test]
    fn test_company_number_invalid() {
        for number in ["", "SC12345", "SC1234567", "SC12-456", "ABCDEFGHI"] {
            assert!(CompanyNumber::new(number).is_err(), "Should fail for: {number}");
        }
    }

    #[test]
    fn test_company_number_serde_validates() {
        let parsed: CompanyNumber = serde_json::from_str("\"123\"").expect("deserialize");
        assert_eq!(parsed.as_str(), "00000123");

        let invalid: Result<CompanyNumber, _> = serde_json::from_str("\"not a number\"");
        assert!(invalid.is_err());
    }

    #[test]
    fn test_director_id_from_link() {
        let id = DirectorId::from_appointments_link("/officers/x4Kj9-Qq_Z/appointments")
            .expect("parse appointments link");
        assert_eq!(id.as_str(), "x4Kj9-Qq_Z");

        assert!(DirectorId::from_appointments_link("/company/01234567/officers").is_err());
        assert!(DirectorId::new("has space").is_err());
    }

    #[test]
    fn test_filing_id_rejects_blank() {
        assert!(FilingId::new("   ").is_err());
        assert_eq!(FilingId::new(" MzA1 ").expect("valid").as_str(), "MzA1");
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Timestamp::now();
        let parsed = Timestamp::from_rfc3339(&ts.to_rfc3339()).expect("parse RFC3339 timestamp");
        assert_eq!(ts.as_datetime().timestamp(), parsed.as_datetime().timestamp());
    }

    #[test]
    fn test_ids_order_deterministically() {
        let mut numbers = vec![
            CompanyNumber::new("SC000002").expect("valid"),
            CompanyNumber::new("00000009").expect("valid"),
            CompanyNumber::new("OC000001").expect("valid"),
        ];
        numbers.sort();
        let sorted: Vec<&str> = numbers.iter().map(CompanyNumber::as_str).collect();
        assert_eq!(sorted, vec!["00000009", "OC000001", "SC000002"]);
    }
}
