//! Scan orchestrator.
//!
//! [`ScanOrchestrator`] drives one scan at a time through
//! `Idle → Running → {Completed, Failed}`, with `Running → Checkpointed →
//! Running` on pause and resume. Companies are fetched by a bounded set of
//! concurrent workers; their results are folded into the scan state by a
//! single commit step, which then writes the checkpoint. Workers never touch
//! the shared state.
//!
//! A company whose fetch fails on the network goes back to the head of the
//! frontier. While the registry circuit is open no new work is started. A
//! company that keeps failing on the network ends the run as `Checkpointed`
//! so a later resume picks it up again.

use crate::checkpoint::{CheckpointPhase, CheckpointStore, ScanCheckpoint};
use crate::detector::{FindingKind, MismatchDetector, MismatchFinding};
use crate::error::{Result, ScanError};
use crate::extractor::{ExtractionResult, TextExtractor};
use crate::filter::FilingFilter;
use crate::lock::CheckpointLock;
use crate::network::{Director, DirectorLinks, ExpansionLimits, FrontierEntry, GraphEdge, NetworkExpander};
use crate::ocr::{OcrEngine, PlainTextOcr};
use crate::state::{CompanyState, ScanState};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use signalwatch_core::{AppConfig, CompanyNumber, FilingId, ScanConfig, ScanMode};
use signalwatch_db::{findings, graph_edges, scan_jobs, Database, NewFinding, ScanJobStatus, ScanProgress};
use signalwatch_registry::{
    CompanyRecord, DocumentFetcher, Filing, OcrStatus, RateLimitedClient, RegistryError,
    RegistryTransport,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No scan active
    #[default]
    Idle,
    /// Processing companies
    Running,
    /// Paused with progress captured in the checkpoint
    Checkpointed,
    /// Frontier exhausted
    Completed,
    /// Stopped on a fatal error
    Failed,
}

impl RunState {
    /// Whether the scan can no longer continue in this orchestrator.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    /// Lifecycle state
    pub state: RunState,
    /// Current or last scan
    pub scan_id: Option<Uuid>,
    /// Companies processed
    pub visited_count: usize,
    /// Companies pending (including in flight)
    pub frontier_size: usize,
    /// Firm mismatch findings
    pub findings_count: usize,
    /// Findings needing human review
    pub ambiguous_count: usize,
    /// Change-of-name documents naming more than one change
    pub name_change_flags: usize,
    /// Companies skipped after a processing error
    pub failed_companies: usize,
    /// Fatal error, if the scan failed
    pub error: Option<String>,
}

/// Findings and the director network of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResults {
    /// All findings, in commit order
    pub findings: Vec<MismatchFinding>,
    /// Director → company edges
    pub edges: Vec<GraphEdge>,
    /// Directors linked to more than one company
    pub shared_directors: Vec<Director>,
    /// Connected company groups
    pub clusters: Vec<Vec<CompanyNumber>>,
}

#[derive(Debug, Default)]
struct Shared {
    run_state: RunState,
    scan_id: Option<Uuid>,
    checkpoint_path: Option<PathBuf>,
    error: Option<String>,
    state: ScanState,
}

#[derive(Default)]
struct Control {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Everything one scan needs, shared read-only with its workers.
struct ScanContext {
    scan_id: Uuid,
    config: ScanConfig,
    fetcher: DocumentFetcher,
    ocr: Arc<dyn OcrEngine>,
    extractor: TextExtractor,
    detector: MismatchDetector,
    filter: FilingFilter,
    expander: NetworkExpander,
    store: CheckpointStore,
    db: Option<Database>,
    max_company_attempts: u32,
}

/// What a worker brings back for one company.
struct CompanyWork {
    record: CompanyRecord,
    extractions: Vec<(FilingId, ExtractionResult)>,
    links: Vec<DirectorLinks>,
}

/// Drives scans over the registry.
pub struct ScanOrchestrator {
    config: AppConfig,
    transport: Option<Arc<dyn RegistryTransport>>,
    ocr: Arc<dyn OcrEngine>,
    db: Option<Database>,
    shared: Arc<RwLock<Shared>>,
    control: Mutex<Control>,
}

impl ScanOrchestrator {
    /// Create an orchestrator that talks to the registry over HTTP.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            transport: None,
            ocr: Arc::new(PlainTextOcr),
            db: None,
            shared: Arc::new(RwLock::new(Shared::default())),
            control: Mutex::new(Control::default()),
        }
    }

    /// Create an orchestrator over a custom transport.
    #[must_use]
    pub fn with_transport(config: AppConfig, transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new(config)
        }
    }

    /// Use a different OCR engine.
    #[must_use]
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    /// Record scan jobs and findings in a results database.
    #[must_use]
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Start a new scan and return its id.
    ///
    /// Validates the config, takes the checkpoint lock and seeds the frontier
    /// (the explicit list, or the registry search result in `filtered` mode).
    /// Refuses to overwrite an unfinished checkpoint; resume or reset it first.
    /// A seeding failure (e.g. the search rejected the API key) leaves the
    /// orchestrator `Failed`.
    pub async fn start_scan(&self, mut config: ScanConfig) -> Result<Uuid> {
        self.ensure_idle().await?;

        if config.api_key.is_empty() {
            config.api_key.clone_from(&self.config.scan.api_key);
        }
        config.validate()?;

        let store = CheckpointStore::new(&config.checkpoint_path);
        let lock = CheckpointLock::acquire(store.path())?;
        if let Some(existing) = store.load()? {
            if existing.phase != CheckpointPhase::Completed {
                return Err(ScanError::InvalidState(format!(
                    "checkpoint {} holds unfinished scan {}; resume or reset it",
                    store.path().display(),
                    existing.scan_id
                )));
            }
        }

        let scan_id = Uuid::new_v4();
        let ctx = self.context(config, scan_id, store)?;

        let seeds = match seed(&ctx).await {
            Ok(seeds) => seeds,
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "cannot seed scan");
                let mut shared = self.shared.write().await;
                shared.run_state = RunState::Failed;
                shared.scan_id = Some(scan_id);
                shared.error = Some(e.to_string());
                return Err(e);
            }
        };

        let state = ScanState::seeded(seeds, ctx.config.max_companies);
        tracing::info!(
            scan_id = %scan_id,
            mode = ?ctx.config.scan_mode,
            seeds = state.frontier.len(),
            max_depth = ctx.config.max_depth,
            max_companies = ctx.config.max_companies,
            "starting scan"
        );

        self.launch(ctx, state, lock).await?;
        Ok(scan_id)
    }

    /// Resume the scan held in the checkpoint.
    ///
    /// Uses the checkpoint of the last scan run by this orchestrator, or the
    /// configured checkpoint path. The API key comes from this orchestrator's
    /// config since checkpoints never store it.
    pub async fn resume(&self) -> Result<Uuid> {
        self.ensure_idle().await?;

        let path = self.checkpoint_path().await;
        let store = CheckpointStore::new(&path);
        let lock = CheckpointLock::acquire(store.path())?;

        let checkpoint = match store.load() {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                return Err(ScanError::InvalidState(format!(
                    "no checkpoint at {}",
                    path.display()
                )))
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot resume scan");
                let mut shared = self.shared.write().await;
                shared.run_state = RunState::Failed;
                shared.error = Some(e.to_string());
                return Err(e);
            }
        };
        if checkpoint.phase == CheckpointPhase::Completed {
            return Err(ScanError::InvalidState(format!(
                "scan {} already completed",
                checkpoint.scan_id
            )));
        }

        let ScanCheckpoint {
            scan_id,
            mut config,
            state,
            rate_budget,
            ..
        } = checkpoint;
        config.api_key.clone_from(&self.config.scan.api_key);
        config.checkpoint_path.clone_from(&path);

        let ctx = self.context(config, scan_id, store)?;
        ctx.fetcher.client().restore_budget(&rate_budget).await;

        tracing::info!(
            scan_id = %scan_id,
            visited = state.visited.len(),
            frontier = state.frontier.len(),
            "resuming scan"
        );

        self.launch(ctx, state, lock).await?;
        Ok(scan_id)
    }

    /// Ask the running scan to stop at the next checkpoint boundary.
    ///
    /// In-flight companies finish and are committed; nothing new is started.
    /// Use [`Self::wait`] to block until the scan is `Checkpointed`.
    pub async fn pause(&self) -> Result<()> {
        if self.shared.read().await.run_state != RunState::Running {
            return Err(ScanError::InvalidState("no running scan to pause".to_string()));
        }
        if let Some(cancel) = &self.control.lock().await.cancel {
            tracing::info!("pause requested");
            cancel.cancel();
        }
        Ok(())
    }

    /// Wait for the background scan to stop and return the resulting state.
    pub async fn wait(&self) -> RunState {
        let task = self.control.lock().await.task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "scan task aborted");
                let mut shared = self.shared.write().await;
                shared.run_state = RunState::Failed;
                shared.error = Some(format!("scan task aborted: {e}"));
            }
        }
        self.shared.read().await.run_state
    }

    /// Current progress.
    pub async fn status(&self) -> ScanStatus {
        let shared = self.shared.read().await;
        let count = |kind: FindingKind| shared.state.findings.iter().filter(|f| f.kind == kind).count();

        ScanStatus {
            state: shared.run_state,
            scan_id: shared.scan_id,
            visited_count: shared.state.visited.len(),
            frontier_size: shared.state.frontier.len(),
            findings_count: count(FindingKind::Mismatch),
            ambiguous_count: count(FindingKind::Ambiguous),
            name_change_flags: count(FindingKind::MultipleNameChanges),
            failed_companies: shared
                .state
                .company_states
                .values()
                .filter(|s| matches!(s, CompanyState::Failed { .. }))
                .count(),
            error: shared.error.clone(),
        }
    }

    /// Findings and the director network gathered so far.
    pub async fn results(&self) -> ScanResults {
        let shared = self.shared.read().await;
        let graph = &shared.state.graph;
        ScanResults {
            findings: shared.state.findings.clone(),
            edges: graph.edges(),
            shared_directors: graph.shared_directors().into_iter().cloned().collect(),
            clusters: graph.clusters(),
        }
    }

    /// Delete the checkpoint so a fresh scan can start. Returns whether one existed.
    pub async fn reset(&self) -> Result<bool> {
        self.ensure_idle().await?;
        let path = self.checkpoint_path().await;
        let _lock = CheckpointLock::acquire(&path)?;
        let removed = CheckpointStore::new(&path).reset()?;

        let mut shared = self.shared.write().await;
        *shared = Shared::default();
        Ok(removed)
    }

    async fn ensure_idle(&self) -> Result<()> {
        let state = self.shared.read().await.run_state;
        if state == RunState::Running {
            return Err(ScanError::InvalidState("a scan is already running".to_string()));
        }
        Ok(())
    }

    async fn checkpoint_path(&self) -> PathBuf {
        self.shared
            .read()
            .await
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| self.config.scan.checkpoint_path.clone())
    }

    /// Build the per-scan context: a fresh client (and so a fresh rate budget)
    /// configured from the scan's own options.
    fn context(&self, config: ScanConfig, scan_id: Uuid, store: CheckpointStore) -> Result<ScanContext> {
        let app = AppConfig {
            scan: config.clone(),
            ..self.config.clone()
        };
        let client = match &self.transport {
            Some(transport) => RateLimitedClient::with_transport(Arc::clone(transport), &app),
            None => RateLimitedClient::from_config(&app)?,
        };

        let expander = NetworkExpander::new(
            ExpansionLimits {
                max_depth: config.max_depth,
                max_companies: config.max_companies,
                active_only: config.active_only,
            },
            app.matching.legal_suffixes.clone(),
        );

        Ok(ScanContext {
            scan_id,
            fetcher: DocumentFetcher::new(Arc::new(client)),
            ocr: Arc::clone(&self.ocr),
            extractor: TextExtractor::new(app.extraction.clone()),
            detector: MismatchDetector::new(app.matching.clone(), config.ocr_confidence_threshold),
            filter: FilingFilter::new(config.max_documents_per_company),
            expander,
            store,
            db: self.db.clone(),
            max_company_attempts: app.retry.max_company_attempts,
            config,
        })
    }

    async fn launch(&self, ctx: ScanContext, state: ScanState, lock: CheckpointLock) -> Result<()> {
        if let Some(db) = &ctx.db {
            if let Err(e) = scan_jobs::start_scan_job(db.pool(), &ctx.scan_id.to_string(), progress(&state)).await {
                tracing::warn!(scan_id = %ctx.scan_id, error = %e, "failed to record scan job");
            }
        }

        {
            let mut shared = self.shared.write().await;
            *shared = Shared {
                run_state: RunState::Running,
                scan_id: Some(ctx.scan_id),
                checkpoint_path: Some(ctx.store.path().to_path_buf()),
                error: None,
                state,
            };
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(
            Arc::clone(&self.shared),
            Arc::new(ctx),
            cancel.clone(),
            lock,
        ));

        let mut control = self.control.lock().await;
        control.cancel = Some(cancel);
        control.task = Some(task);
        Ok(())
    }
}

/// Initial frontier: the explicit list, or the registry search result.
async fn seed(ctx: &ScanContext) -> Result<Vec<CompanyNumber>> {
    match ctx.config.scan_mode {
        ScanMode::Specific => Ok(ctx.config.seed_numbers()?),
        ScanMode::Filtered => {
            let criteria = ctx.config.filter_criteria.clone().unwrap_or_default();
            Ok(ctx
                .fetcher
                .search_companies(&criteria)
                .await?
                .into_iter()
                .map(|c| c.number)
                .collect())
        }
    }
}

/// Background task body: run the scan, publish the end state, release the lock.
async fn drive(
    shared: Arc<RwLock<Shared>>,
    ctx: Arc<ScanContext>,
    cancel: CancellationToken,
    lock: CheckpointLock,
) {
    let outcome = run(&shared, &ctx, &cancel).await;
    let scan_id = ctx.scan_id.to_string();

    let counts = {
        let mut guard = shared.write().await;
        match &outcome {
            Ok(state) => guard.run_state = *state,
            Err(e) => {
                guard.run_state = RunState::Failed;
                guard.error = Some(e.to_string());
            }
        }
        progress(&guard.state)
    };
    drop(lock);

    let recorded = match outcome {
        Ok(state) => {
            tracing::info!(
                scan_id = %scan_id,
                state = ?state,
                visited = counts.visited,
                frontier = counts.frontier,
                findings = counts.findings,
                "scan stopped"
            );
            match (&ctx.db, state) {
                (Some(db), RunState::Completed) => {
                    scan_jobs::complete_scan_job(db.pool(), &scan_id, counts).await
                }
                (Some(db), _) => {
                    scan_jobs::update_progress(db.pool(), &scan_id, ScanJobStatus::Checkpointed, counts)
                        .await
                }
                (None, _) => Ok(()),
            }
        }
        Err(e) => {
            tracing::error!(scan_id = %scan_id, error = %e, "scan failed");
            match &ctx.db {
                Some(db) => scan_jobs::fail_scan_job(db.pool(), &scan_id, &e.to_string()).await,
                None => Ok(()),
            }
        }
    };
    if let Err(e) = recorded {
        tracing::warn!(error = %e, "failed to record scan job status");
    }
}

/// Worker loop. Returns `Completed` when the frontier is exhausted,
/// `Checkpointed` after a pause or when the registry stays unreachable, or
/// the fatal error that stopped the scan. A fatal error leaves the last good
/// checkpoint untouched.
async fn run(shared: &RwLock<Shared>, ctx: &Arc<ScanContext>, cancel: &CancellationToken) -> Result<RunState> {
    save_checkpoint(shared, ctx, CheckpointPhase::Running).await?;

    let mut in_flight = FuturesUnordered::new();
    let mut network_failures: HashMap<CompanyNumber, u32> = HashMap::new();
    let mut unavailable: Option<String> = None;
    loop {
        if !cancel.is_cancelled() && unavailable.is_none() {
            if let Some(wait) = ctx.fetcher.client().circuit_wait().await {
                if in_flight.is_empty() {
                    tracing::info!(wait = ?wait, "registry circuit open, waiting");
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = cancel.cancelled() => {}
                    }
                    continue;
                }
            } else {
                let limit = worker_limit(ctx).await;
                while in_flight.len() < limit {
                    let next = {
                        let mut guard = shared.write().await;
                        let room = !ctx.expander.at_capacity(&guard.state);
                        guard.state.frontier.reserve().map(|entry| {
                            let expand = room && ctx.expander.should_expand(entry.depth);
                            (entry, expand)
                        })
                    };
                    let Some((entry, expand)) = next else {
                        break;
                    };
                    in_flight.push(process_company(Arc::clone(ctx), entry, expand));
                }
            }
        }

        let Some((entry, outcome)) = in_flight.next().await else {
            break;
        };
        match outcome {
            Err(e) if e.is_retryable() => {
                let number = &entry.company_number;
                let failures = network_failures.entry(number.clone()).or_insert(0);
                *failures += 1;
                shared.write().await.state.frontier.requeue(number);
                tracing::warn!(company = %number, attempt = *failures, error = %e, "network failure, company requeued");
                if *failures >= ctx.max_company_attempts && unavailable.is_none() {
                    unavailable = Some(format!(
                        "registry unavailable: company {number} failed {failures} times: {e}"
                    ));
                }
            }
            outcome => commit(shared, ctx, &entry, outcome).await?,
        }
    }

    if let Some(reason) = unavailable {
        tracing::warn!(scan_id = %ctx.scan_id, %reason, "stopping scan at checkpoint");
        shared.write().await.error = Some(reason);
    }

    let exhausted = shared.read().await.state.is_exhausted();
    if exhausted {
        save_checkpoint(shared, ctx, CheckpointPhase::Completed).await?;
        Ok(RunState::Completed)
    } else {
        save_checkpoint(shared, ctx, CheckpointPhase::Paused).await?;
        Ok(RunState::Checkpointed)
    }
}

/// Concurrent companies allowed right now: `max_workers`, throttled to the
/// remaining rate headroom, never below one.
async fn worker_limit(ctx: &ScanContext) -> usize {
    let headroom = ctx.fetcher.client().headroom().await;
    ctx.config.max_workers.min(headroom).max(1)
}

async fn process_company(
    ctx: Arc<ScanContext>,
    entry: FrontierEntry,
    expand: bool,
) -> (FrontierEntry, Result<CompanyWork>) {
    let outcome = fetch_company(&ctx, &entry, expand).await;
    (entry, outcome)
}

/// Fetch → extract for one company, plus director appointments when expanding.
async fn fetch_company(ctx: &ScanContext, entry: &FrontierEntry, expand: bool) -> Result<CompanyWork> {
    let number = &entry.company_number;
    tracing::debug!(company = %number, depth = entry.depth, "processing company");

    let mut record = ctx.fetcher.fetch_profile(number).await?;
    record.filings = ctx.fetcher.fetch_filings(number).await?;

    let selected: Vec<FilingId> = ctx
        .filter
        .select(&record.filings)
        .into_iter()
        .map(|f| f.id.clone())
        .collect();

    let mut extractions = Vec::with_capacity(selected.len());
    for filing in record.filings.iter_mut().filter(|f| selected.contains(&f.id)) {
        let Some(result) = read_document(ctx, filing).await? else {
            continue;
        };
        filing.ocr_status = result.status;
        extractions.push((filing.id.clone(), result));
    }

    let mut links = Vec::new();
    if expand {
        for director in ctx.expander.expandable_directors(&record) {
            match ctx.fetcher.fetch_director_appointments(&director.id).await {
                Ok(appointments) => links.push(DirectorLinks {
                    director: director.clone(),
                    appointments,
                }),
                Err(RegistryError::NotFound(_)) => {
                    tracing::info!(company = %number, director = %director.id, "director appointments not found, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(CompanyWork {
        record,
        extractions,
        links,
    })
}

/// Fetch and read one filing document. `None` when the document is gone.
async fn read_document(ctx: &ScanContext, filing: &Filing) -> Result<Option<ExtractionResult>> {
    let document = match ctx.fetcher.fetch_document(filing).await {
        Ok(document) => document,
        Err(RegistryError::NotFound(_)) => {
            tracing::info!(filing = %filing.id, "document not found, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    match ctx.ocr.recognize(filing, &document).await {
        Ok(text) => Ok(Some(ctx.extractor.extract(&text))),
        Err(e @ ScanError::OcrFailure { .. }) => {
            tracing::warn!(filing = %filing.id, error = %e, "OCR failed");
            Ok(Some(ExtractionResult {
                status: OcrStatus::Failed,
                candidates: Vec::new(),
            }))
        }
        Err(e) => Err(e),
    }
}

/// The only place scan state changes after seeding, apart from requeueing:
/// detect, expand, mark visited, then checkpoint.
async fn commit(
    shared: &RwLock<Shared>,
    ctx: &ScanContext,
    entry: &FrontierEntry,
    outcome: Result<CompanyWork>,
) -> Result<()> {
    let number = &entry.company_number;

    let (findings, edges) = {
        let mut guard = shared.write().await;
        let state = &mut guard.state;

        let findings = match outcome {
            Ok(work) => {
                let findings = ctx.detector.check_record(&work.record, &work.extractions);
                let discovered = ctx.expander.expand(state, entry, &work.record, &work.links);
                tracing::info!(
                    company = %number,
                    depth = entry.depth,
                    documents = work.extractions.len(),
                    findings = findings.len(),
                    discovered = discovered.len(),
                    "company processed"
                );
                state.findings.extend(findings.iter().cloned());
                state.mark_visited(
                    number,
                    CompanyState::Completed {
                        documents: work.extractions.len(),
                        findings: findings.len(),
                    },
                );
                findings
            }
            Err(ScanError::Registry(RegistryError::NotFound(message))) => {
                tracing::info!(company = %number, %message, "company not found, skipping");
                state.mark_visited(number, CompanyState::NotFound);
                Vec::new()
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let failure = ScanError::PartialScanFailure {
                    company: number.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %failure, "company skipped");
                state.mark_visited(
                    number,
                    CompanyState::Failed {
                        reason: e.to_string(),
                    },
                );
                Vec::new()
            }
        };

        let edges: Vec<(String, String)> = state
            .graph
            .directors_of(number)
            .filter_map(|id| state.graph.director(id))
            .flat_map(|d| {
                d.companies
                    .iter()
                    .map(move |c| (d.id.to_string(), c.to_string()))
            })
            .collect();
        (findings, edges)
    };

    save_checkpoint(shared, ctx, CheckpointPhase::Running).await?;
    record_commit(shared, ctx, &findings, &edges).await;
    Ok(())
}

/// Snapshot the state and write it on the blocking pool.
async fn save_checkpoint(shared: &RwLock<Shared>, ctx: &ScanContext, phase: CheckpointPhase) -> Result<()> {
    let rate_budget = ctx.fetcher.client().budget_snapshot().await;
    let checkpoint = {
        let guard = shared.read().await;
        ScanCheckpoint::new(ctx.scan_id, phase, ctx.config.clone(), guard.state.clone(), rate_budget)
    };
    let store = ctx.store.clone();
    tokio::task::spawn_blocking(move || store.save(&checkpoint))
        .await
        .map_err(|e| ScanError::Io(std::io::Error::other(format!("checkpoint writer stopped: {e}"))))?
}

/// Mirror a commit into the results database. Failures are logged, never fatal.
async fn record_commit(
    shared: &RwLock<Shared>,
    ctx: &ScanContext,
    new_findings: &[MismatchFinding],
    edges: &[(String, String)],
) {
    let Some(db) = &ctx.db else {
        return;
    };
    let scan_id = ctx.scan_id.to_string();

    for finding in new_findings {
        if let Err(e) = findings::upsert_finding(db.pool(), &scan_id, &to_new_finding(finding)).await {
            tracing::warn!(company = %finding.company_number, error = %e, "failed to store finding");
        }
    }
    if let Err(e) = graph_edges::insert_edges(db.pool(), &scan_id, edges).await {
        tracing::warn!(error = %e, "failed to store graph edges");
    }

    let counts = progress(&shared.read().await.state);
    if let Err(e) = scan_jobs::update_progress(db.pool(), &scan_id, ScanJobStatus::Running, counts).await {
        tracing::warn!(error = %e, "failed to record scan progress");
    }
}

fn to_new_finding(finding: &MismatchFinding) -> NewFinding {
    NewFinding {
        company_number: finding.company_number.to_string(),
        filing_id: finding.filing_id.to_string(),
        field: finding.field.to_string(),
        expected: finding.expected.clone(),
        extracted: finding.extracted.clone(),
        confidence: finding.confidence,
        kind: finding.kind.as_str().to_string(),
        corroborating_filings: finding
            .corroborating_filings
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

fn progress(state: &ScanState) -> ScanProgress {
    let count = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);
    ScanProgress {
        visited: count(state.visited.len()),
        frontier: count(state.frontier.len()),
        findings: count(state.findings.len()),
    }
}
