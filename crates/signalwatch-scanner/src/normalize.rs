//! Name and date normalization shared by the extractor and the detector.
//!
//! Names are case-folded, stripped of punctuation and trailing legal
//! suffixes. Dates are parsed from the formats seen on registry documents and
//! rendered canonically as `YYYY-MM-DD`.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// Normalize a company or person name for comparison.
///
/// `suffixes` are matched as whole trailing words, longest first, and removed
/// repeatedly (`Acme Holdings Ltd Limited` → `acme holdings`). A name that
/// consists only of a suffix keeps it.
#[must_use]
pub fn normalize_name(name: &str, suffixes: &[String]) -> String {
    let folded: String = name
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .filter(|c| !matches!(c, '.' | '\'' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = folded.split_whitespace().collect();

    let mut suffix_words: Vec<Vec<String>> = suffixes
        .iter()
        .map(|s| normalize_words(s))
        .filter(|w| !w.is_empty())
        .collect();
    suffix_words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    loop {
        let stripped = suffix_words.iter().find(|suffix| {
            suffix.len() < words.len()
                && words[words.len() - suffix.len()..]
                    .iter()
                    .zip(suffix.iter())
                    .all(|(w, s)| *w == s)
        });
        match stripped {
            Some(suffix) => words.truncate(words.len() - suffix.len()),
            None => break,
        }
    }

    words.join(" ")
}

fn normalize_words(text: &str) -> Vec<String> {
    normalize_name(text, &[])
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whether the name ends with one of the legal suffixes, i.e. names a body
/// corporate rather than a person.
#[must_use]
pub fn has_legal_suffix(name: &str, suffixes: &[String]) -> bool {
    let plain = normalize_name(name, &[]);
    let stripped = normalize_name(name, suffixes);
    plain != stripped
}

/// Edit distance between two already-normalized names.
#[must_use]
pub fn name_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Render a date canonically.
#[must_use]
pub fn canonical_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a date as it appears on a filing document.
///
/// Accepts ISO dates, day-first numeric dates (`/`, `-`, `.` or space
/// separated), `1st January 2020`, `January 1, 2020` and two-digit years.
/// Common OCR digit confusions inside numeric groups are repaired first.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let cleaned = repair_ocr_digits(&strip_ordinals(text.trim()));
    let cleaned = cleaned
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        return None;
    }

    // Two-digit-year forms go first so `%Y` never reads `15` as year 15.
    const FORMATS: &[&str] = &[
        "%d/%m/%y",
        "%d-%m-%y",
        "%d.%m.%y",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
        "%d %m %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%b %d, %Y",
    ];

    FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&cleaned, fmt)
            .ok()
            .filter(|d| (1800..=2100).contains(&d.year()))
    })
}

/// Find the first parseable date inside a longer line.
#[must_use]
pub fn find_date(text: &str) -> Option<NaiveDate> {
    static DATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DATE_REGEX.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \b(
                [0-9OolI]{4}-[0-9OolI]{1,2}-[0-9OolI]{1,2}
              | [0-9OolI]{1,2}[/.\-][0-9OolI]{1,2}[/.\-][0-9OolI]{2,4}
              | [0-9]{1,2}(?:st|nd|rd|th)?\s+[a-z]{3,9}\.?\s+[0-9]{4}
              | [a-z]{3,9}\.?\s+[0-9]{1,2}(?:st|nd|rd|th)?,?\s+[0-9]{4}
            )\b",
        )
        .expect("valid regex")
    });

    regex
        .find_iter(text)
        .find_map(|m| parse_date(m.as_str()))
}

fn strip_ordinals(text: &str) -> String {
    static ORDINAL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = ORDINAL_REGEX
        .get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));
    regex.replace_all(text, "$1").into_owned()
}

/// Replace letters OCR commonly confuses with digits, but only inside tokens
/// that are otherwise mostly digits so month names survive.
fn repair_ocr_digits(text: &str) -> String {
    text.split_inclusive(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | '.' | ','))
        .map(|token| {
            let digits = token.chars().filter(char::is_ascii_digit).count();
            let letters = token.chars().filter(|c| c.is_alphabetic()).count();
            if digits > 0 && digits >= letters {
                token
                    .chars()
                    .map(|c| match c {
                        'O' | 'o' => '0',
                        'l' | 'I' => '1',
                        'S' => '5',
                        'B' => '8',
                        other => other,
                    })
                    .collect()
            } else {
                token.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes() -> Vec<String> {
        signalwatch_core::MatchingConfig::default().legal_suffixes
    }

    #[test]
    fn test_normalize_name_strips_suffix_and_punctuation() {
        let s = suffixes();
        assert_eq!(normalize_name("ACME Widgets Ltd.", &s), "acme widgets");
        assert_eq!(normalize_name("Acme  Widgets LIMITED", &s), "acme widgets");
        assert_eq!(normalize_name("Smith & Sons P.L.C.", &s), "smith and sons");
        assert_eq!(
            normalize_name("O'Brien Holdings Public Limited Company", &s),
            "obrien holdings"
        );
        assert_eq!(normalize_name("Foo Ltd Limited", &s), "foo");
    }

    #[test]
    fn test_suffix_only_name_kept() {
        assert_eq!(normalize_name("Limited", &suffixes()), "limited");
    }

    #[test]
    fn test_suffix_must_be_whole_word() {
        assert_eq!(normalize_name("Clip", &suffixes()), "clip");
        assert_eq!(normalize_name("Blue Help", &suffixes()), "blue help");
    }

    #[test]
    fn test_has_legal_suffix() {
        let s = suffixes();
        assert!(has_legal_suffix("NOMINEE SERVICES LIMITED", &s));
        assert!(!has_legal_suffix("SMITH, John", &s));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2015, 3, 2);
        for text in [
            "2015-03-02",
            "02/03/2015",
            "2-3-2015",
            "02.03.2015",
            "2nd March 2015",
            "2 Mar 2015",
            "March 2, 2015",
            "02/03/15",
        ] {
            assert_eq!(parse_date(text), expected, "failed for {text}");
        }
    }

    #[test]
    fn test_parse_date_repairs_ocr_digits() {
        assert_eq!(parse_date("O2/O3/2Ol5"), NaiveDate::from_ymd_opt(2015, 3, 2));
        assert_eq!(parse_date("1 October 2O2O"), NaiveDate::from_ymd_opt(2020, 10, 1));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("31/02/2020"), None);
    }

    #[test]
    fn test_find_date_in_line() {
        assert_eq!(
            find_date("was incorporated on 14th June 2011 under the Act"),
            NaiveDate::from_ymd_opt(2011, 6, 14)
        );
        assert_eq!(find_date("no dates here"), None);
    }

    #[test]
    fn test_canonical_date() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 9).expect("valid date");
        assert_eq!(canonical_date(date), "2001-01-09");
    }
}
