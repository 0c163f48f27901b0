//! Field extraction from OCR text.
//!
//! Values are located by label proximity: a line containing something close
//! to a known label (within a bounded edit distance) anchors a value on the
//! same line, or on one of the next few lines. Confidence starts at 1.0 and
//! is reduced by label edits, anchor distance and OCR noise in the value.

use crate::normalize::{canonical_date, find_date};
use serde::{Deserialize, Serialize};
use signalwatch_core::ExtractionConfig;
use signalwatch_registry::OcrStatus;
use std::fmt;

/// Characters that OCR engines emit for glyphs they could not read.
const NOISE_MARKERS: &[char] = &['?', '~', '|', '#', '*', '_', '^', '\u{FFFD}'];

/// A record field that can be checked against a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Registered name
    Name,
    /// Incorporation date
    Date,
    /// Effective date of a change of name
    #[serde(rename = "name_change_date")]
    ChangeDate,
}

impl Field {
    /// Whether values of this field are calendar dates.
    #[must_use]
    pub fn is_date(self) -> bool {
        matches!(self, Self::Date | Self::ChangeDate)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Date => write!(f, "date"),
            Self::ChangeDate => write!(f, "name_change_date"),
        }
    }
}

/// One extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCandidate {
    /// Field the value belongs to
    pub field: Field,
    /// Raw value for names, canonical `YYYY-MM-DD` for dates
    pub value: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Outcome of extracting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// `Extracted` (possibly with zero candidates) or `Failed` if unreadable
    pub status: OcrStatus,
    /// Candidates ordered by field, then confidence (highest first), then value
    pub candidates: Vec<ExtractedCandidate>,
}

impl ExtractionResult {
    /// Candidates for one field.
    pub fn for_field(&self, field: Field) -> impl Iterator<Item = &ExtractedCandidate> {
        self.candidates.iter().filter(move |c| c.field == field)
    }
}

/// Turns OCR text into name/date candidates.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    config: ExtractionConfig,
    labels: Vec<(Field, String)>,
}

struct Word<'a> {
    end: usize,
    text: &'a str,
}

struct LabelHit {
    field: Field,
    edits: usize,
    value_start: usize,
}

impl TextExtractor {
    /// Create an extractor from label vocabularies and penalty weights.
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        let labels = config
            .name_labels
            .iter()
            .map(|l| (Field::Name, normalize_label(l)))
            .chain(config.date_labels.iter().map(|l| (Field::Date, normalize_label(l))))
            .chain(
                config
                    .change_date_labels
                    .iter()
                    .map(|l| (Field::ChangeDate, normalize_label(l))),
            )
            .filter(|(_, l)| !l.is_empty())
            .collect();
        Self { config, labels }
    }

    /// Extract candidates. Never fails: malformed input yields no candidates,
    /// and only entirely unreadable text yields `Failed`.
    #[must_use]
    pub fn extract(&self, text: &str) -> ExtractionResult {
        if !self.is_readable(text) {
            return ExtractionResult {
                status: OcrStatus::Failed,
                candidates: Vec::new(),
            };
        }

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut candidates: Vec<ExtractedCandidate> = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            for hit in self.label_hits(line) {
                let Some((raw, distance)) = self.locate_value(&lines, index, &line[hit.value_start..])
                else {
                    continue;
                };
                let Some(value) = parse_value(hit.field, raw) else {
                    continue;
                };
                let confidence = self.score(hit.edits, distance, raw);
                push_best(&mut candidates, hit.field, value, confidence);
            }
        }

        candidates.sort_by(|a, b| {
            a.field
                .cmp(&b.field)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.value.cmp(&b.value))
        });

        ExtractionResult {
            status: OcrStatus::Extracted,
            candidates,
        }
    }

    fn is_readable(&self, text: &str) -> bool {
        let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if visible.is_empty() {
            return false;
        }
        let readable = visible.iter().filter(|c| c.is_alphanumeric()).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = readable as f64 / visible.len() as f64;
        ratio >= self.config.min_readable_ratio
    }

    /// Best label match per field on a line.
    fn label_hits(&self, line: &str) -> Vec<LabelHit> {
        let words = split_words(line);
        let mut best: Vec<LabelHit> = Vec::new();

        for (field, label) in &self.labels {
            let label_len = label.split(' ').count();
            if label_len == 0 || words.len() < label_len {
                continue;
            }
            let allowed = self.config.max_label_edits.min(label.chars().count() / 3);

            for start in 0..=words.len() - label_len {
                let window = words[start..start + label_len]
                    .iter()
                    .map(|w| normalize_label(w.text))
                    .collect::<Vec<_>>()
                    .join(" ");
                let edits = strsim::levenshtein(&window, label);
                if edits > allowed {
                    continue;
                }
                let hit = LabelHit {
                    field: *field,
                    edits,
                    value_start: words[start + label_len - 1].end,
                };
                match best.iter_mut().find(|h| h.field == *field) {
                    Some(existing) if existing.edits <= hit.edits => {}
                    Some(existing) => *existing = hit,
                    None => best.push(hit),
                }
            }
        }

        best
    }

    /// Find the value text: the remainder of the anchor line, or the first
    /// non-empty following line within `max_anchor_distance` that is not
    /// itself a label.
    fn locate_value<'a>(
        &self,
        lines: &[&'a str],
        index: usize,
        remainder: &'a str,
    ) -> Option<(&'a str, usize)> {
        let same_line = trim_separators(remainder);
        if same_line.chars().any(char::is_alphanumeric) {
            return Some((same_line, 0));
        }

        for distance in 1..=self.config.max_anchor_distance {
            let line = lines.get(index + distance)?;
            if line.is_empty() {
                continue;
            }
            if !self.label_hits(line).is_empty() {
                return None;
            }
            let candidate = trim_separators(line);
            if candidate.chars().any(char::is_alphanumeric) {
                return Some((candidate, distance));
            }
        }
        None
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, edits: usize, distance: usize, raw: &str) -> f64 {
        let total = raw.chars().filter(|c| !c.is_whitespace()).count().max(1);
        let noisy = raw.chars().filter(|c| NOISE_MARKERS.contains(c)).count();
        let noise_ratio = noisy as f64 / total as f64;

        let confidence = 1.0
            - edits as f64 * self.config.label_edit_penalty
            - distance as f64 * self.config.anchor_distance_penalty
            - noise_ratio * self.config.noise_penalty;
        // Rounded so repeated runs compare equal at the threshold.
        (confidence.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
    }
}

fn push_best(candidates: &mut Vec<ExtractedCandidate>, field: Field, value: String, confidence: f64) {
    match candidates
        .iter_mut()
        .find(|c| c.field == field && c.value == value)
    {
        Some(existing) => existing.confidence = existing.confidence.max(confidence),
        None => candidates.push(ExtractedCandidate {
            field,
            value,
            confidence,
        }),
    }
}

fn parse_value(field: Field, raw: &str) -> Option<String> {
    match field {
        Field::Date | Field::ChangeDate => find_date(raw).map(canonical_date),
        Field::Name => {
            let value = raw
                .trim_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != '&')
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let letters = value.chars().filter(|c| c.is_alphabetic()).count();
            (letters >= 2).then_some(value)
        }
    }
}

fn normalize_label(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn trim_separators(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '=' | '.'))
        .trim()
}

fn split_words(line: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                words.push(Word {
                    end: i,
                    text: &line[s..i],
                });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push(Word {
            end: line.len(),
            text: &line[s..],
        });
    }
    words.into_iter().map(strip_colon).collect()
}

/// A word like `name:` ends before its colon so the value starts after it.
fn strip_colon(word: Word<'_>) -> Word<'_> {
    match word.text.find(':') {
        Some(pos) if pos > 0 => Word {
            end: word.end - (word.text.len() - pos),
            text: &word.text[..pos],
        },
        _ => word,
    }
}
