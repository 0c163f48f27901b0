//! Scan-scoped traversal state.
//!
//! One [`ScanState`] is owned by the orchestrator's commit step for the
//! lifetime of a scan and is what the checkpoint persists.

use crate::detector::MismatchFinding;
use crate::network::{DirectorGraph, Frontier, FrontierEntry};
use serde::{Deserialize, Serialize};
use signalwatch_core::CompanyNumber;
use std::collections::{BTreeMap, HashSet};

/// Companies fully processed, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CompanyNumber>", into = "Vec<CompanyNumber>")]
pub struct VisitedSet {
    order: Vec<CompanyNumber>,
    index: HashSet<CompanyNumber>,
}

impl VisitedSet {
    /// Mark a company visited. Returns `false` if it already was.
    pub fn insert(&mut self, number: CompanyNumber) -> bool {
        if !self.index.insert(number.clone()) {
            return false;
        }
        self.order.push(number);
        true
    }

    /// Whether the company has been visited.
    #[must_use]
    pub fn contains(&self, number: &CompanyNumber) -> bool {
        self.index.contains(number)
    }

    /// Number of visited companies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has been visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Visited companies in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &CompanyNumber> {
        self.order.iter()
    }
}

impl TryFrom<Vec<CompanyNumber>> for VisitedSet {
    type Error = String;

    fn try_from(numbers: Vec<CompanyNumber>) -> Result<Self, Self::Error> {
        let mut visited = Self::default();
        for number in numbers {
            if !visited.insert(number.clone()) {
                return Err(format!("duplicate visited entry {number}"));
            }
        }
        Ok(visited)
    }
}

impl From<VisitedSet> for Vec<CompanyNumber> {
    fn from(visited: VisitedSet) -> Self {
        visited.order
    }
}

/// How processing of a single company ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CompanyState {
    /// Record, filings and documents processed
    Completed {
        /// Documents run through extraction
        documents: usize,
        /// Findings raised for this company
        findings: usize,
    },
    /// Registry has no such company
    NotFound,
    /// Processing failed and the company was skipped
    Failed {
        /// Error description
        reason: String,
    },
}

/// Everything a scan needs to continue from where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    /// Processed companies
    pub visited: VisitedSet,
    /// Pending companies with discovery depth
    pub frontier: Frontier,
    /// Outcome per processed company
    pub company_states: BTreeMap<CompanyNumber, CompanyState>,
    /// Findings raised so far, in commit order
    pub findings: Vec<MismatchFinding>,
    /// Director/company links seen so far
    pub graph: DirectorGraph,
}

impl ScanState {
    /// Fresh state with the seeds queued at depth 0, at most `max_companies` of them.
    #[must_use]
    pub fn seeded(seeds: Vec<CompanyNumber>, max_companies: usize) -> Self {
        let mut state = Self::default();
        for seed in seeds.into_iter().take(max_companies) {
            state.frontier.push(FrontierEntry::new(seed, 0));
        }
        state
    }

    /// Visited plus queued companies.
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.visited.len() + self.frontier.len()
    }

    /// Whether the company is visited or queued.
    #[must_use]
    pub fn is_known(&self, number: &CompanyNumber) -> bool {
        self.visited.contains(number) || self.frontier.contains(number)
    }

    /// Record a finished company: leaves the frontier, joins the visited set.
    pub fn mark_visited(&mut self, number: &CompanyNumber, outcome: CompanyState) {
        self.frontier.complete(number);
        self.visited.insert(number.clone());
        self.company_states.insert(number.clone(), outcome);
    }

    /// Whether nothing is left to process.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Cross-structure consistency checks for state loaded from disk.
    pub fn validate(&self, max_depth: u32) -> Result<(), String> {
        if let Some(entry) = self.frontier.entries().find(|e| self.visited.contains(&e.company_number)) {
            return Err(format!(
                "company {} is both visited and queued",
                entry.company_number
            ));
        }
        if let Some(entry) = self.frontier.entries().find(|e| e.depth > max_depth) {
            return Err(format!(
                "company {} queued at depth {} beyond max depth {max_depth}",
                entry.company_number, entry.depth
            ));
        }
        if let Some(number) = self.visited.iter().find(|n| !self.company_states.contains_key(*n)) {
            return Err(format!("visited company {number} has no recorded state"));
        }
        Ok(())
    }
}
