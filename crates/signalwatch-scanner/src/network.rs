//! Director-network expansion.
//!
//! The director/company graph is cyclic by nature. It is kept as arena-style
//! maps keyed by normalized identifiers, and traversal correctness rests on
//! the visited/frontier dedup in [`ScanState`], never on acyclicity.

use crate::normalize::has_legal_suffix;
use crate::state::ScanState;
use serde::{Deserialize, Serialize};
use signalwatch_core::{CompanyNumber, DirectorId};
use signalwatch_registry::{Appointment, CompanyRecord, DirectorRef};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// A pending company and the depth it was discovered at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// Company to process
    pub company_number: CompanyNumber,
    /// Distance from the nearest seed
    pub depth: u32,
}

impl FrontierEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(company_number: CompanyNumber, depth: u32) -> Self {
        Self {
            company_number,
            depth,
        }
    }
}

/// Ordered queue of pending companies without duplicates.
///
/// Entries handed to workers move to `in_flight` but still count as frontier
/// members (and are persisted first) until their completion is committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FrontierEntry>", into = "Vec<FrontierEntry>")]
pub struct Frontier {
    in_flight: Vec<FrontierEntry>,
    pending: VecDeque<FrontierEntry>,
    members: HashSet<CompanyNumber>,
}

impl Frontier {
    /// Append an entry. Returns `false` if the company is already queued.
    pub fn push(&mut self, entry: FrontierEntry) -> bool {
        if !self.members.insert(entry.company_number.clone()) {
            return false;
        }
        self.pending.push_back(entry);
        true
    }

    /// Hand the next pending entry to a worker.
    pub fn reserve(&mut self) -> Option<FrontierEntry> {
        let entry = self.pending.pop_front()?;
        self.in_flight.push(entry.clone());
        Some(entry)
    }

    /// Remove a finished entry.
    pub fn complete(&mut self, number: &CompanyNumber) -> Option<FrontierEntry> {
        let pos = self
            .in_flight
            .iter()
            .position(|e| &e.company_number == number)?;
        self.members.remove(number);
        Some(self.in_flight.remove(pos))
    }

    /// Put an in-flight entry back at the head of the queue. Returns `false`
    /// if the company is not in flight.
    pub fn requeue(&mut self, number: &CompanyNumber) -> bool {
        let Some(pos) = self
            .in_flight
            .iter()
            .position(|e| &e.company_number == number)
        else {
            return false;
        };
        let entry = self.in_flight.remove(pos);
        self.pending.push_front(entry);
        true
    }

    /// Whether the company is pending or in flight.
    #[must_use]
    pub fn contains(&self, number: &CompanyNumber) -> bool {
        self.members.contains(number)
    }

    /// Pending plus in-flight entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nothing is pending or in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Entries handed out and not yet committed.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// All entries in persistence order: in-flight first, then pending.
    pub fn entries(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.in_flight.iter().chain(self.pending.iter())
    }
}

impl TryFrom<Vec<FrontierEntry>> for Frontier {
    type Error = String;

    fn try_from(entries: Vec<FrontierEntry>) -> Result<Self, Self::Error> {
        let mut frontier = Self::default();
        for entry in entries {
            let number = entry.company_number.clone();
            if !frontier.push(entry) {
                return Err(format!("duplicate frontier entry {number}"));
            }
        }
        Ok(frontier)
    }
}

impl From<Frontier> for Vec<FrontierEntry> {
    fn from(frontier: Frontier) -> Self {
        frontier.entries().cloned().collect()
    }
}

/// A director and the companies linked to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Director {
    /// Registry officer id
    pub id: DirectorId,
    /// Display name
    pub name: String,
    /// Linked companies
    pub companies: BTreeSet<CompanyNumber>,
}

/// Director → company link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Director end
    pub director: DirectorId,
    /// Company end
    pub company: CompanyNumber,
}

/// Bipartite director/company graph held as maps keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorGraph {
    directors: BTreeMap<DirectorId, Director>,
    companies: BTreeMap<CompanyNumber, BTreeSet<DirectorId>>,
}

impl DirectorGraph {
    /// Record that a director is linked to a company. Returns `true` if the edge is new.
    pub fn link(&mut self, director: &DirectorId, name: &str, company: &CompanyNumber) -> bool {
        let node = self
            .directors
            .entry(director.clone())
            .or_insert_with(|| Director {
                id: director.clone(),
                name: name.to_string(),
                companies: BTreeSet::new(),
            });
        let added = node.companies.insert(company.clone());
        self.companies
            .entry(company.clone())
            .or_default()
            .insert(director.clone());
        added
    }

    /// Look up a director.
    #[must_use]
    pub fn director(&self, id: &DirectorId) -> Option<&Director> {
        self.directors.get(id)
    }

    /// Directors linked to a company.
    pub fn directors_of(&self, company: &CompanyNumber) -> impl Iterator<Item = &DirectorId> {
        self.companies.get(company).into_iter().flatten()
    }

    /// All edges, ordered by director then company.
    #[must_use]
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.directors
            .values()
            .flat_map(|d| {
                d.companies.iter().map(move |c| GraphEdge {
                    director: d.id.clone(),
                    company: c.clone(),
                })
            })
            .collect()
    }

    /// Directors linked to more than one company, most connected first.
    #[must_use]
    pub fn shared_directors(&self) -> Vec<&Director> {
        let mut shared: Vec<&Director> = self
            .directors
            .values()
            .filter(|d| d.companies.len() > 1)
            .collect();
        shared.sort_by(|a, b| {
            b.companies
                .len()
                .cmp(&a.companies.len())
                .then_with(|| a.id.cmp(&b.id))
        });
        shared
    }

    /// Groups of two or more companies connected through directors,
    /// largest first. Each group is sorted.
    #[must_use]
    pub fn clusters(&self) -> Vec<Vec<CompanyNumber>> {
        let mut seen: BTreeSet<&CompanyNumber> = BTreeSet::new();
        let mut clusters = Vec::new();

        for start in self.companies.keys() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start.clone()];
            let mut queue = VecDeque::from([start]);

            while let Some(company) = queue.pop_front() {
                for director in self.companies.get(company).into_iter().flatten() {
                    let Some(node) = self.directors.get(director) else {
                        continue;
                    };
                    for linked in &node.companies {
                        if seen.insert(linked) {
                            component.push(linked.clone());
                            queue.push_back(linked);
                        }
                    }
                }
            }

            if component.len() > 1 {
                component.sort();
                clusters.push(component);
            }
        }

        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        clusters
    }
}

/// A director and the appointments fetched for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorLinks {
    /// Director as listed on the parent company
    pub director: DirectorRef,
    /// Appointments in registry order
    pub appointments: Vec<Appointment>,
}

/// Traversal bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionLimits {
    /// Companies at this depth are processed but not expanded
    pub max_depth: u32,
    /// Cap on visited plus queued companies
    pub max_companies: usize,
    /// Skip resigned appointments and non-active companies
    pub active_only: bool,
}

/// Breadth-first expansion over the director/company graph.
#[derive(Debug, Clone)]
pub struct NetworkExpander {
    limits: ExpansionLimits,
    legal_suffixes: Vec<String>,
}

impl NetworkExpander {
    /// Create an expander. `legal_suffixes` identify corporate officers.
    #[must_use]
    pub fn new(limits: ExpansionLimits, legal_suffixes: Vec<String>) -> Self {
        Self {
            limits,
            legal_suffixes,
        }
    }

    /// Whether a company at `depth` may enqueue neighbours.
    #[must_use]
    pub fn should_expand(&self, depth: u32) -> bool {
        depth < self.limits.max_depth
    }

    /// Whether the discovered-company cap has been reached.
    #[must_use]
    pub fn at_capacity(&self, state: &ScanState) -> bool {
        state.discovered() >= self.limits.max_companies
    }

    /// Directors of a record worth following: natural persons with a live
    /// appointment (when `active_only`).
    #[must_use]
    pub fn expandable_directors<'a>(&self, record: &'a CompanyRecord) -> Vec<&'a DirectorRef> {
        record
            .directors
            .iter()
            .filter(|d| !(self.limits.active_only && d.resigned))
            .filter(|d| !self.is_corporate(d))
            .collect()
    }

    fn is_corporate(&self, director: &DirectorRef) -> bool {
        director
            .role
            .as_deref()
            .is_some_and(|r| r.to_ascii_lowercase().contains("corporate"))
            || has_legal_suffix(&director.name, &self.legal_suffixes)
    }

    fn follows(&self, appointment: &Appointment) -> bool {
        !self.limits.active_only || (!appointment.resigned && appointment.company_active())
    }

    /// Record the company's board in the graph and enqueue newly discovered
    /// companies at `parent.depth + 1`.
    ///
    /// Returns the newly enqueued company numbers in discovery order. Nothing
    /// is enqueued past `max_depth` or once `max_companies` is reached, and a
    /// company already visited or queued is never enqueued again.
    pub fn expand(
        &self,
        state: &mut ScanState,
        parent: &FrontierEntry,
        record: &CompanyRecord,
        links: &[DirectorLinks],
    ) -> Vec<CompanyNumber> {
        for director in &record.directors {
            if !(self.limits.active_only && director.resigned) {
                state.graph.link(&director.id, &director.name, &record.number);
            }
        }

        let mut discovered = Vec::new();
        if !self.should_expand(parent.depth) {
            return discovered;
        }
        let depth = parent.depth + 1;

        for link in links {
            if self.is_corporate(&link.director) {
                continue;
            }
            for appointment in link.appointments.iter().filter(|a| self.follows(a)) {
                let number = &appointment.company_number;
                state.graph.link(&link.director.id, &link.director.name, number);

                if state.is_known(number) || self.at_capacity(state) {
                    continue;
                }
                if state.frontier.push(FrontierEntry::new(number.clone(), depth)) {
                    tracing::debug!(company = %number, depth, via = %link.director.id, "discovered");
                    discovered.push(number.clone());
                }
            }
        }

        discovered
    }
}
