#![allow(clippy::must_use_candidate)]

use signalwatch_registry::Filing;

/// Filing categories whose documents state the company name or incorporation date.
pub const VERIFIABLE_CATEGORIES: &[&str] = &[
    "incorporation",
    "change-of-name",
    "reregistration",
    "resolution",
];

/// Selects which filings of a company have their documents fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilingFilter {
    max_documents: usize,
}

impl FilingFilter {
    /// Fetch at most `max_documents` documents per company.
    pub fn new(max_documents: usize) -> Self {
        Self { max_documents }
    }

    /// Whether the filing declares a name or date worth checking and has a document.
    pub fn needs_verification(filing: &Filing) -> bool {
        if filing.document_id.is_none() {
            return false;
        }
        let category = filing.category.to_ascii_lowercase();
        VERIFIABLE_CATEGORIES.contains(&category.as_str()) || Self::is_name_change(filing)
    }

    /// Whether the filing records a change of name.
    pub fn is_name_change(filing: &Filing) -> bool {
        if filing.category.eq_ignore_ascii_case("change-of-name") {
            return true;
        }
        // Description keys look like `change-of-name-by-resolution`.
        let description = filing.description.to_ascii_lowercase().replace(['-', '_'], " ");
        description.contains("change of name") || description.contains("name change")
    }

    /// Filings to verify, in registry order, at most `max_documents` of them.
    pub fn select<'a>(&self, filings: &'a [Filing]) -> Vec<&'a Filing> {
        filings
            .iter()
            .filter(|f| Self::needs_verification(f))
            .take(self.max_documents)
            .collect()
    }
}
