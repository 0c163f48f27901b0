//! Mismatch detection between official records and extracted document values.
//!
//! Values the record explains (the current name, a previous name, the
//! registered date) are set aside first. A finding then needs two gates: the
//! best remaining candidate must exist, and its (possibly corroborated)
//! confidence must reach the threshold. Unexplained candidates that disagree
//! among themselves produce an `Ambiguous` finding instead of a firm mismatch.

use crate::extractor::{ExtractionResult, Field};
use crate::filter::FilingFilter;
use crate::normalize::{canonical_date, name_distance, normalize_name, parse_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use signalwatch_core::{CompanyNumber, FilingId, MatchingConfig};
use signalwatch_registry::{CompanyRecord, OcrStatus};
use std::collections::BTreeSet;

/// What kind of discrepancy a finding reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Document value differs from the record
    Mismatch,
    /// Documents disagree among themselves
    Ambiguous,
    /// One change-of-name document names more than one change
    MultipleNameChanges,
}

impl FindingKind {
    /// Storage key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mismatch => "mismatch",
            Self::Ambiguous => "ambiguous",
            Self::MultipleNameChanges => "multiple_name_changes",
        }
    }
}

/// A discrepancy between a record field and a filing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchFinding {
    /// Company the finding is about
    pub company_number: CompanyNumber,
    /// Filing the best candidate came from
    pub filing_id: FilingId,
    /// Mismatched field
    pub field: Field,
    /// Value on the record
    pub expected: String,
    /// Value extracted from the document
    pub extracted: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Firm mismatch, ambiguous, or a name-change flag
    pub kind: FindingKind,
    /// Other filings whose documents agree with the extracted value
    #[serde(default)]
    pub corroborating_filings: Vec<FilingId>,
}

/// Official value of a field. Names may carry former names as aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordValue {
    /// Current value, reported as `expected`
    pub primary: String,
    /// Other values that also count as official
    pub aliases: Vec<String>,
}

impl RecordValue {
    /// A value without aliases.
    #[must_use]
    pub fn single(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            aliases: Vec::new(),
        }
    }
}

/// A candidate value together with the filing it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedCandidate {
    /// Source filing
    pub filing_id: FilingId,
    /// Extracted value
    pub value: String,
    /// Extraction confidence
    pub confidence: f64,
}

/// Normalized comparison key for a value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Name(String),
    Date(NaiveDate),
}

/// Compares extracted candidates against the official record.
#[derive(Debug, Clone)]
pub struct MismatchDetector {
    matching: MatchingConfig,
    threshold: f64,
}

impl MismatchDetector {
    /// Create a detector with normalization rules and a confidence threshold.
    #[must_use]
    pub fn new(matching: MatchingConfig, threshold: f64) -> Self {
        Self {
            matching,
            threshold,
        }
    }

    /// Compare one field. Deterministic for identical inputs regardless of
    /// candidate order.
    #[must_use]
    pub fn compare(
        &self,
        company: &CompanyNumber,
        field: Field,
        record: &RecordValue,
        candidates: &[SourcedCandidate],
    ) -> Option<MismatchFinding> {
        let official: Vec<(Key, &String)> = std::iter::once(&record.primary)
            .chain(record.aliases.iter())
            .filter_map(|v| self.key(field, v).map(|k| (k, v)))
            .collect();
        if official.is_empty() {
            return None;
        }

        let mut unexplained: Vec<(Key, &SourcedCandidate)> = candidates
            .iter()
            .filter_map(|c| self.key(field, &c.value).map(|k| (k, c)))
            .filter(|(k, _)| !official.iter().any(|(o, _)| self.equivalent(field, o, k)))
            .collect();
        unexplained.sort_by(|(_, a), (_, b)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.filing_id.cmp(&b.filing_id))
                .then_with(|| a.value.cmp(&b.value))
        });

        let (best_key, best) = unexplained.first()?;
        let ambiguous = unexplained
            .iter()
            .skip(1)
            .any(|(key, _)| !self.equivalent(field, key, best_key));

        let mut per_filing: Vec<(&FilingId, f64)> = Vec::new();
        for (key, candidate) in &unexplained {
            if !self.equivalent(field, key, best_key) {
                continue;
            }
            match per_filing.iter_mut().find(|(id, _)| *id == &candidate.filing_id) {
                Some((_, confidence)) => *confidence = confidence.max(candidate.confidence),
                None => per_filing.push((&candidate.filing_id, candidate.confidence)),
            }
        }

        let confidence = if !ambiguous && per_filing.len() >= 2 {
            let miss: f64 = per_filing.iter().map(|(_, c)| 1.0 - c.clamp(0.0, 1.0)).product();
            round(1.0 - miss)
        } else {
            round(best.confidence.clamp(0.0, 1.0))
        };

        if confidence < self.threshold {
            tracing::debug!(
                company = %company,
                field = %field,
                confidence,
                threshold = self.threshold,
                "candidate below threshold"
            );
            return None;
        }

        let corroborating_filings: Vec<FilingId> = per_filing
            .iter()
            .map(|(id, _)| (*id).clone())
            .filter(|id| id != &best.filing_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Dates report the official value nearest the document's.
        let expected = match best_key {
            Key::Date(found) => official
                .iter()
                .filter_map(|(k, v)| match k {
                    Key::Date(d) => Some(((*d - *found).num_days().abs(), *v)),
                    Key::Name(_) => None,
                })
                .min_by_key(|(days, _)| *days)
                .map_or(record.primary.as_str(), |(_, v)| v.as_str()),
            Key::Name(_) => record.primary.as_str(),
        };

        Some(MismatchFinding {
            company_number: company.clone(),
            filing_id: best.filing_id.clone(),
            field,
            expected: self.display(field, expected),
            extracted: self.display(field, &best.value),
            confidence,
            kind: if ambiguous {
                FindingKind::Ambiguous
            } else {
                FindingKind::Mismatch
            },
            corroborating_filings,
        })
    }

    /// Check a record against every extracted document: the name (previous
    /// names count as official), the incorporation date, change-of-name dates
    /// against the dates previous names ceased, and change-of-name documents
    /// naming more than one change.
    #[must_use]
    pub fn check_record(
        &self,
        record: &CompanyRecord,
        extractions: &[(FilingId, ExtractionResult)],
    ) -> Vec<MismatchFinding> {
        let mut findings = Vec::new();

        let gather = |field: Field, accept: &dyn Fn(&FilingId) -> bool| -> Vec<SourcedCandidate> {
            extractions
                .iter()
                .filter(|(id, e)| e.status == OcrStatus::Extracted && accept(id))
                .flat_map(|(filing_id, e)| {
                    e.for_field(field).map(move |c| SourcedCandidate {
                        filing_id: filing_id.clone(),
                        value: c.value.clone(),
                        confidence: c.confidence,
                    })
                })
                .collect()
        };
        let any = |_: &FilingId| true;
        let name_change = |id: &FilingId| is_name_change(record, id);

        let names = RecordValue {
            primary: record.name.clone(),
            aliases: record.previous_names.iter().map(|p| p.name.clone()).collect(),
        };
        findings.extend(self.compare(&record.number, Field::Name, &names, &gather(Field::Name, &any)));

        if let Some(date) = record.incorporation_date {
            let dates = RecordValue::single(canonical_date(date));
            findings.extend(self.compare(&record.number, Field::Date, &dates, &gather(Field::Date, &any)));
        }

        let mut ceased = record.previous_names.iter().filter_map(|p| p.ceased_on).map(canonical_date);
        if let Some(primary) = ceased.next() {
            let dates = RecordValue {
                primary,
                aliases: ceased.collect(),
            };
            findings.extend(self.compare(
                &record.number,
                Field::ChangeDate,
                &dates,
                &gather(Field::ChangeDate, &name_change),
            ));
        }

        findings.extend(self.multiple_name_changes(record, extractions));
        findings
    }

    /// A change of name document reads as an old and a new name. More than two
    /// distinct confident names in one such document is flagged, once per
    /// company, for the document naming the most.
    fn multiple_name_changes(
        &self,
        record: &CompanyRecord,
        extractions: &[(FilingId, ExtractionResult)],
    ) -> Option<MismatchFinding> {
        let mut flagged: Option<(&FilingId, Vec<(Key, &str, f64)>)> = None;

        for (filing_id, extraction) in extractions {
            if extraction.status != OcrStatus::Extracted || !is_name_change(record, filing_id) {
                continue;
            }
            let mut distinct: Vec<(Key, &str, f64)> = Vec::new();
            for candidate in extraction.for_field(Field::Name) {
                if candidate.confidence < self.threshold {
                    continue;
                }
                let Some(key) = self.key(Field::Name, &candidate.value) else {
                    continue;
                };
                if !distinct.iter().any(|(k, _, _)| self.equivalent(Field::Name, k, &key)) {
                    distinct.push((key, candidate.value.as_str(), candidate.confidence));
                }
            }
            if distinct.len() <= 2 {
                continue;
            }
            let more = flagged.as_ref().map_or(true, |(id, names)| {
                distinct.len() > names.len() || (distinct.len() == names.len() && filing_id < *id)
            });
            if more {
                flagged = Some((filing_id, distinct));
            }
        }

        let (filing_id, names) = flagged?;
        tracing::debug!(company = %record.number, filing = %filing_id, names = names.len(), "multiple name changes in one document");
        Some(MismatchFinding {
            company_number: record.number.clone(),
            filing_id: filing_id.clone(),
            field: Field::Name,
            expected: record.name.trim().to_string(),
            extracted: names.iter().map(|(_, v, _)| *v).collect::<Vec<_>>().join("; "),
            confidence: round(names.iter().map(|(_, _, c)| *c).fold(1.0, f64::min)),
            kind: FindingKind::MultipleNameChanges,
            corroborating_filings: Vec::new(),
        })
    }

    fn key(&self, field: Field, value: &str) -> Option<Key> {
        match field {
            Field::Name => {
                let normalized = normalize_name(value, &self.matching.legal_suffixes);
                (!normalized.is_empty()).then_some(Key::Name(normalized))
            }
            Field::Date | Field::ChangeDate => parse_date(value).map(Key::Date),
        }
    }

    fn equivalent(&self, field: Field, a: &Key, b: &Key) -> bool {
        match (a, b) {
            (Key::Name(a), Key::Name(b)) => name_distance(a, b) <= self.matching.name_edit_tolerance,
            (Key::Date(a), Key::Date(b)) => {
                let tolerance = if field == Field::ChangeDate {
                    self.matching.name_change_date_tolerance_days
                } else {
                    self.matching.date_tolerance_days
                };
                (*a - *b).num_days().abs() <= tolerance
            }
            _ => false,
        }
    }

    fn display(&self, field: Field, value: &str) -> String {
        if field.is_date() {
            parse_date(value).map_or_else(|| value.trim().to_string(), canonical_date)
        } else {
            value.trim().to_string()
        }
    }
}

/// Whether the filing is a change of name on this record. Unknown filings are not.
fn is_name_change(record: &CompanyRecord, filing_id: &FilingId) -> bool {
    record
        .filings
        .iter()
        .find(|f| &f.id == filing_id)
        .is_some_and(FilingFilter::is_name_change)
}

fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
