//! End-to-end scans against an in-memory registry.

use async_trait::async_trait;
use serde_json::{json, Value};
use signalwatch_core::{
    AppConfig, CircuitConfig, CompanyNumber, FilterCriteria, RetryConfig, ScanConfig, ScanMode,
};
use signalwatch_db::{findings, graph_edges, scan_jobs, Database, ScanJobStatus};
use signalwatch_registry::{ApiRequest, ApiResponse, Endpoint, RegistryTransport};
use signalwatch_scanner::{
    CheckpointLock, CheckpointPhase, CheckpointStore, Field, FindingKind, RunState, ScanError,
    ScanOrchestrator,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;

#[derive(Clone, Default)]
struct FakeCompany {
    name: String,
    incorporated: Option<String>,
    officers: Vec<(String, String)>,
    filings: Vec<FakeFiling>,
    /// Former names with the date each ceased
    previous_names: Vec<(String, String)>,
}

#[derive(Clone)]
struct FakeFiling {
    transaction_id: String,
    category: String,
    document: Option<String>,
}

/// Serves companies, officers, filings, documents and appointments from maps
/// and logs every request it receives.
#[derive(Default)]
struct FakeRegistry {
    companies: HashMap<String, FakeCompany>,
    documents: HashMap<String, String>,
    appointments: HashMap<String, Vec<String>>,
    /// 1-based profile request that answers 401
    fail_profile_at: Option<usize>,
    /// When set, every profile request takes one permit first
    gate: Option<Arc<Semaphore>>,
    /// Requests up to this count (1-based, any endpoint) answer 503
    unavailable_calls: usize,
    /// Company searches answer 401
    reject_search: bool,
    profiles_served: AtomicUsize,
    calls: AtomicUsize,
    log: Mutex<Vec<Endpoint>>,
    times: Mutex<Vec<Instant>>,
}

impl FakeRegistry {
    fn company(mut self, number: &str, company: FakeCompany) -> Self {
        self.companies.insert(number.to_string(), company);
        self
    }

    fn document(mut self, id: &str, text: &str) -> Self {
        self.documents.insert(id.to_string(), text.to_string());
        self
    }

    fn appointments(mut self, director: &str, companies: &[&str]) -> Self {
        self.appointments
            .insert(director.to_string(), companies.iter().map(ToString::to_string).collect());
        self
    }

    fn requests(&self) -> Vec<Endpoint> {
        self.log.lock().expect("log lock").clone()
    }

    fn profile_requests(&self) -> Vec<CompanyNumber> {
        self.requests()
            .into_iter()
            .filter_map(|e| match e {
                Endpoint::CompanyProfile(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn request_times(&self) -> Vec<Instant> {
        self.times.lock().expect("times lock").clone()
    }

    fn profile(&self, number: &CompanyNumber) -> ApiResponse {
        let served = self.profiles_served.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_profile_at == Some(served) {
            return ApiResponse::status(401);
        }
        match self.companies.get(number.as_str()) {
            Some(c) => ApiResponse::json_body(&json!({
                "company_number": number.as_str(),
                "company_name": c.name,
                "date_of_creation": c.incorporated,
                "company_status": "active",
                "type": "ltd",
                "previous_company_names": c
                    .previous_names
                    .iter()
                    .map(|(name, ceased_on)| json!({ "name": name, "ceased_on": ceased_on }))
                    .collect::<Vec<_>>(),
            })),
            None => ApiResponse::status(404),
        }
    }

    fn officers(&self, number: &CompanyNumber) -> ApiResponse {
        let Some(company) = self.companies.get(number.as_str()) else {
            return ApiResponse::status(404);
        };
        let items: Vec<Value> = company
            .officers
            .iter()
            .map(|(id, name)| {
                json!({
                    "name": name,
                    "officer_role": "director",
                    "links": { "officer": { "appointments": format!("/officers/{id}/appointments") } },
                })
            })
            .collect();
        ApiResponse::json_body(&json!({ "total_results": items.len(), "items": items }))
    }

    fn filing_history(&self, number: &CompanyNumber) -> ApiResponse {
        let Some(company) = self.companies.get(number.as_str()) else {
            return ApiResponse::status(404);
        };
        let items: Vec<Value> = company
            .filings
            .iter()
            .map(|f| {
                let mut item = json!({
                    "transaction_id": f.transaction_id,
                    "category": f.category,
                    "description": f.category,
                    "date": "2020-01-01",
                });
                if let Some(doc) = &f.document {
                    item["links"] = json!({
                        "document_metadata": format!("https://document-api.example/document/{doc}")
                    });
                }
                item
            })
            .collect();
        ApiResponse::json_body(&json!({ "total_count": items.len(), "items": items }))
    }

    fn director_appointments(&self, director: &str) -> ApiResponse {
        let Some(companies) = self.appointments.get(director) else {
            return ApiResponse::status(404);
        };
        let items: Vec<Value> = companies
            .iter()
            .map(|n| json!({ "appointed_to": { "company_number": n, "company_status": "active" } }))
            .collect();
        ApiResponse::json_body(&json!({ "total_results": items.len(), "items": items }))
    }
}

#[async_trait]
impl RegistryTransport for FakeRegistry {
    async fn send(&self, request: &ApiRequest) -> signalwatch_registry::Result<ApiResponse> {
        self.log.lock().expect("log lock").push(request.endpoint.clone());
        self.times.lock().expect("times lock").push(Instant::now());
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.unavailable_calls {
            return Ok(ApiResponse::status(503));
        }

        let response = match &request.endpoint {
            Endpoint::CompanyProfile(number) => {
                if let Some(gate) = &self.gate {
                    gate.acquire().await.expect("gate open").forget();
                }
                self.profile(number)
            }
            Endpoint::Officers(number) => self.officers(number),
            Endpoint::FilingHistory(number) => self.filing_history(number),
            Endpoint::DocumentContent(id) => match self.documents.get(id) {
                Some(text) => ApiResponse {
                    status: 200,
                    body: text.clone().into_bytes(),
                    retry_after: None,
                },
                None => ApiResponse::status(404),
            },
            Endpoint::OfficerAppointments(id) => self.director_appointments(id.as_str()),
            Endpoint::SearchCompanies | Endpoint::AdvancedSearch if self.reject_search => {
                ApiResponse::status(401)
            }
            _ => ApiResponse::status(404),
        };
        Ok(response)
    }
}

fn number(n: &str) -> CompanyNumber {
    CompanyNumber::new(n).expect("valid company number")
}

fn seeds(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{i:08}")).collect()
}

fn plain_company(name: &str) -> FakeCompany {
    FakeCompany {
        name: name.to_string(),
        incorporated: Some("2015-03-02".to_string()),
        ..FakeCompany::default()
    }
}

fn with_directors(name: &str, directors: &[&str]) -> FakeCompany {
    FakeCompany {
        officers: directors
            .iter()
            .map(|d| ((*d).to_string(), format!("Director {d}")))
            .collect(),
        ..plain_company(name)
    }
}

fn scan_config(dir: &Path, company_numbers: Vec<String>) -> ScanConfig {
    ScanConfig {
        company_numbers,
        max_depth: 0,
        max_companies: 1000,
        api_key: "test-key".to_string(),
        rate_limit_cap: 10_000,
        checkpoint_path: dir.join("checkpoint.json"),
        max_workers: 1,
        ..ScanConfig::default()
    }
}

fn app_config(scan: ScanConfig) -> AppConfig {
    AppConfig {
        scan,
        retry: RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            jitter_ms: 0,
            ..RetryConfig::default()
        },
        ..AppConfig::default()
    }
}

fn orchestrator(registry: &Arc<FakeRegistry>, scan: &ScanConfig) -> ScanOrchestrator {
    orchestrator_with(registry, app_config(scan.clone()))
}

fn orchestrator_with(registry: &Arc<FakeRegistry>, config: AppConfig) -> ScanOrchestrator {
    let transport: Arc<dyn RegistryTransport> = registry.clone();
    ScanOrchestrator::with_transport(config, transport)
}

fn with_cooldown(scan: &ScanConfig, cooldown_secs: u64) -> AppConfig {
    AppConfig {
        circuit: CircuitConfig {
            cooldown_secs,
            ..CircuitConfig::default()
        },
        ..app_config(scan.clone())
    }
}

fn numbered_registry(numbers: &[String]) -> FakeRegistry {
    numbers.iter().fold(FakeRegistry::default(), |r, n| {
        r.company(n, plain_company(&format!("COMPANY {n} LIMITED")))
    })
}

fn filing(transaction_id: &str, category: &str, document: &str) -> FakeFiling {
    FakeFiling {
        transaction_id: transaction_id.to_string(),
        category: category.to_string(),
        document: Some(document.to_string()),
    }
}

async fn wait_for_profiles(registry: &FakeRegistry, count: usize) {
    for _ in 0..500 {
        if registry.profile_requests().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never saw {count} profile requests");
}

#[tokio::test]
async fn test_no_relevant_filings_completes_without_findings() {
    let temp = TempDir::new().expect("tempdir");
    let company = FakeCompany {
        filings: vec![FakeFiling {
            transaction_id: "acc-1".to_string(),
            category: "accounts".to_string(),
            document: Some("doc-acc".to_string()),
        }],
        ..plain_company("ACME WIDGETS LIMITED")
    };
    let registry = Arc::new(
        FakeRegistry::default()
            .company("00000001", company)
            .document("doc-acc", "Company name: SOMETHING ELSE LIMITED"),
    );
    let config = scan_config(temp.path(), seeds(1));
    let orchestrator = orchestrator(&registry, &config);

    orchestrator.start_scan(config.clone()).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let status = orchestrator.status().await;
    assert_eq!(status.visited_count, 1);
    assert_eq!(status.frontier_size, 0);
    assert_eq!(status.findings_count, 0);
    assert!(orchestrator.results().await.findings.is_empty());
    assert!(!registry
        .requests()
        .iter()
        .any(|e| matches!(e, Endpoint::DocumentContent(_))));

    let checkpoint = CheckpointStore::new(&config.checkpoint_path)
        .load()
        .expect("load")
        .expect("checkpoint kept");
    assert_eq!(checkpoint.phase, CheckpointPhase::Completed);
    assert!(!CheckpointLock::lock_path(&config.checkpoint_path).exists());
}

#[tokio::test]
async fn test_misspelled_name_in_document_is_reported() {
    let temp = TempDir::new().expect("tempdir");
    let company = FakeCompany {
        filings: vec![FakeFiling {
            transaction_id: "inc-1".to_string(),
            category: "incorporation".to_string(),
            document: Some("doc-inc".to_string()),
        }],
        ..plain_company("John Smith")
    };
    let registry = Arc::new(
        FakeRegistry::default()
            .company("00000001", company)
            .document("doc-inc", "Compny nme: Jon Smith"),
    );
    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");

    let config = scan_config(temp.path(), seeds(1));
    let orchestrator = orchestrator(&registry, &config).with_database(db.clone());
    let scan_id = orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let results = orchestrator.results().await;
    assert_eq!(results.findings.len(), 1);
    let finding = &results.findings[0];
    assert_eq!(finding.field, Field::Name);
    assert_eq!(finding.expected, "John Smith");
    assert_eq!(finding.extracted, "Jon Smith");
    assert_eq!(finding.kind, FindingKind::Mismatch);
    assert!((finding.confidence - 0.92).abs() < 1e-9);
    assert_eq!(orchestrator.status().await.findings_count, 1);

    let stored = findings::get_by_scan(db.pool(), &scan_id.to_string())
        .await
        .expect("stored findings");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].field, "name");
    assert_eq!(stored[0].kind, "mismatch");

    let job = scan_jobs::get_scan_job(db.pool(), &scan_id.to_string())
        .await
        .expect("get job")
        .expect("job recorded");
    assert_eq!(job.status, ScanJobStatus::Completed);
    assert_eq!(job.visited_count, 1);
}

#[tokio::test]
async fn test_fatal_error_keeps_last_checkpoint_and_resume_continues() {
    let temp = TempDir::new().expect("tempdir");
    let numbers = seeds(200);
    let build = |fail_at: Option<usize>| {
        let mut registry = numbers.iter().fold(FakeRegistry::default(), |r, n| {
            r.company(n, plain_company(&format!("COMPANY {n} LIMITED")))
        });
        registry.fail_profile_at = fail_at;
        Arc::new(registry)
    };
    let config = scan_config(temp.path(), numbers.clone());

    let failing = build(Some(51));
    let first = orchestrator(&failing, &config);
    let scan_id = first.start_scan(config.clone()).await.expect("start");
    assert_eq!(first.wait().await, RunState::Failed);

    let status = first.status().await;
    assert_eq!(status.visited_count, 50);
    assert!(status.error.is_some());

    let saved = CheckpointStore::new(&config.checkpoint_path)
        .load()
        .expect("load")
        .expect("checkpoint kept");
    assert_eq!(saved.scan_id, scan_id);
    assert_eq!(saved.state.visited.len(), 50);
    assert_eq!(saved.state.frontier.len(), 150);
    assert!(!CheckpointLock::lock_path(&config.checkpoint_path).exists());

    let healthy = build(None);
    let second = orchestrator(&healthy, &config);
    assert_eq!(second.resume().await.expect("resume"), scan_id);
    assert_eq!(second.wait().await, RunState::Completed);

    let profiles = healthy.profile_requests();
    assert_eq!(profiles.first(), Some(&number(&numbers[50])));
    assert_eq!(profiles.len(), 150);

    let status = second.status().await;
    assert_eq!(status.visited_count, 200);
    assert_eq!(status.frontier_size, 0);
}

#[tokio::test]
async fn test_director_network_expansion_stops_at_max_depth() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(
        FakeRegistry::default()
            .company("10000001", with_directors("ALPHA LIMITED", &["d-shared"]))
            .company("10000002", with_directors("BRAVO LIMITED", &["d-shared", "e-bravo"]))
            .company("10000003", with_directors("CHARLIE LIMITED", &["d-shared"]))
            .company("10000004", with_directors("XRAY LIMITED", &["f-xray"]))
            .company("10000005", with_directors("YANKEE LIMITED", &["f-xray"]))
            .appointments("d-shared", &["10000001", "10000002", "10000003"])
            .appointments("e-bravo", &["10000002", "10000004"])
            .appointments("f-xray", &["10000004", "10000005"]),
    );
    let config = ScanConfig {
        max_depth: 2,
        ..scan_config(temp.path(), vec!["10000001".to_string()])
    };
    let orchestrator = orchestrator(&registry, &config);
    orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let mut visited = registry.profile_requests();
    visited.sort();
    assert_eq!(
        visited,
        vec![number("10000001"), number("10000002"), number("10000003"), number("10000004")]
    );
    assert!(!registry
        .requests()
        .iter()
        .any(|e| matches!(e, Endpoint::OfficerAppointments(id) if id.as_str() == "f-xray")));

    let results = orchestrator.results().await;
    let shared: Vec<&str> = results.shared_directors.iter().map(|d| d.id.as_str()).collect();
    assert!(shared.contains(&"d-shared"));
    assert!(shared.contains(&"e-bravo"));
    assert_eq!(results.clusters.len(), 1);
}

#[tokio::test]
async fn test_pause_checkpoints_and_resume_finishes() {
    let temp = TempDir::new().expect("tempdir");
    let gate = Arc::new(Semaphore::new(2));
    let numbers = seeds(10);
    let mut registry = numbers.iter().fold(FakeRegistry::default(), |r, n| {
        r.company(n, plain_company(&format!("COMPANY {n} LIMITED")))
    });
    registry.gate = Some(gate.clone());
    let registry = Arc::new(registry);

    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");
    let config = scan_config(temp.path(), numbers);
    let orchestrator = orchestrator(&registry, &config).with_database(db.clone());

    let scan_id = orchestrator.start_scan(config).await.expect("start");
    wait_for_profiles(&registry, 3).await;
    orchestrator.pause().await.expect("pause");
    gate.add_permits(1);
    assert_eq!(orchestrator.wait().await, RunState::Checkpointed);

    let status = orchestrator.status().await;
    assert_eq!(status.visited_count, 3);
    assert_eq!(status.frontier_size, 7);

    let job = scan_jobs::get_scan_job(db.pool(), &scan_id.to_string())
        .await
        .expect("get job")
        .expect("job recorded");
    assert_eq!(job.status, ScanJobStatus::Checkpointed);

    assert!(matches!(
        orchestrator.pause().await,
        Err(ScanError::InvalidState(_))
    ));

    gate.add_permits(100);
    assert_eq!(orchestrator.resume().await.expect("resume"), scan_id);
    assert_eq!(orchestrator.wait().await, RunState::Completed);
    assert_eq!(orchestrator.status().await.visited_count, 10);

    let mut profiles = registry.profile_requests();
    let total = profiles.len();
    profiles.dedup();
    assert_eq!(total, 10);
    assert_eq!(profiles.len(), 10);
}

#[tokio::test]
async fn test_unfinished_checkpoint_blocks_new_scan_until_reset() {
    let temp = TempDir::new().expect("tempdir");
    let gate = Arc::new(Semaphore::new(1));
    let numbers = seeds(3);
    let mut registry = numbers.iter().fold(FakeRegistry::default(), |r, n| {
        r.company(n, plain_company(&format!("COMPANY {n} LIMITED")))
    });
    registry.gate = Some(gate.clone());
    let registry = Arc::new(registry);
    let config = scan_config(temp.path(), numbers);

    let first = orchestrator(&registry, &config);
    first.start_scan(config.clone()).await.expect("start");
    wait_for_profiles(&registry, 2).await;
    first.pause().await.expect("pause");
    gate.add_permits(1);
    assert_eq!(first.wait().await, RunState::Checkpointed);

    let second = orchestrator(&registry, &config);
    assert!(matches!(
        second.start_scan(config.clone()).await,
        Err(ScanError::InvalidState(_))
    ));

    assert!(second.reset().await.expect("reset"));
    assert!(!config.checkpoint_path.exists());
    gate.add_permits(100);
    second.start_scan(config).await.expect("start after reset");
    assert_eq!(second.wait().await, RunState::Completed);
}

#[tokio::test]
async fn test_locked_checkpoint_is_refused() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(FakeRegistry::default().company("00000001", plain_company("ACME LIMITED")));
    let config = scan_config(temp.path(), seeds(1));
    let _held = CheckpointLock::acquire(&config.checkpoint_path).expect("lock");

    let orchestrator = orchestrator(&registry, &config);
    let err = orchestrator
        .start_scan(config)
        .await
        .expect_err("checkpoint is locked");
    assert!(matches!(err, ScanError::CheckpointLocked { .. }));
    assert!(registry.requests().is_empty());
}

#[tokio::test]
async fn test_resume_without_checkpoint_is_invalid() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(FakeRegistry::default());
    let config = scan_config(temp.path(), seeds(1));

    let orchestrator = orchestrator(&registry, &config);
    assert!(matches!(
        orchestrator.resume().await,
        Err(ScanError::InvalidState(_))
    ));
    assert_eq!(orchestrator.status().await.state, RunState::Idle);
}

#[tokio::test]
async fn test_corrupt_checkpoint_fails_resume() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(FakeRegistry::default());
    let config = scan_config(temp.path(), seeds(1));
    std::fs::write(&config.checkpoint_path, b"{\"schema_version\": 1, \"checks").expect("write");

    let orchestrator = orchestrator(&registry, &config);
    assert!(matches!(
        orchestrator.resume().await,
        Err(ScanError::CorruptCheckpoint { .. })
    ));
    let status = orchestrator.status().await;
    assert_eq!(status.state, RunState::Failed);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_missing_company_is_skipped() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(
        FakeRegistry::default()
            .company("00000001", with_directors("ALPHA LIMITED", &["d-1"]))
            .appointments("d-1", &["00000001"]),
    );
    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");
    let config = scan_config(temp.path(), seeds(2));
    let orchestrator = orchestrator(&registry, &config).with_database(db.clone());

    let scan_id = orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let status = orchestrator.status().await;
    assert_eq!(status.visited_count, 2);
    assert_eq!(status.failed_companies, 0);

    let edges = graph_edges::get_by_scan(db.pool(), &scan_id.to_string())
        .await
        .expect("edges");
    assert_eq!(edges, vec![("d-1".to_string(), "00000001".to_string())]);
}

#[tokio::test]
async fn test_brief_outage_requeues_instead_of_failing() {
    let temp = TempDir::new().expect("tempdir");
    let numbers = seeds(10);
    let mut registry = numbered_registry(&numbers);
    registry.unavailable_calls = 3;
    let registry = Arc::new(registry);
    let config = scan_config(temp.path(), numbers);

    let orchestrator = orchestrator_with(&registry, with_cooldown(&config, 1));
    orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let status = orchestrator.status().await;
    assert_eq!(status.visited_count, 10);
    assert_eq!(status.failed_companies, 0);
    assert!(status.error.is_none());

    // Three failed attempts open the circuit; the fourth is the trial call.
    let profiles = registry.profile_requests();
    assert_eq!(profiles.len(), 13);
    assert!(profiles[..4].iter().all(|n| n == &number("00000001")));
    let times = registry.request_times();
    assert!(times[3].duration_since(times[2]) >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_persistent_outage_checkpoints_and_resume_recovers() {
    let temp = TempDir::new().expect("tempdir");
    let numbers = seeds(10);
    let mut down = numbered_registry(&numbers);
    down.unavailable_calls = usize::MAX;
    let down = Arc::new(down);
    let config = scan_config(temp.path(), numbers.clone());

    let first = orchestrator_with(&down, with_cooldown(&config, 0));
    let scan_id = first.start_scan(config.clone()).await.expect("start");
    assert_eq!(first.wait().await, RunState::Checkpointed);

    let status = first.status().await;
    assert_eq!(status.visited_count, 0);
    assert_eq!(status.frontier_size, 10);
    assert_eq!(status.failed_companies, 0);
    assert!(status.error.as_deref().is_some_and(|e| e.contains("registry unavailable")));
    assert_eq!(
        down.profile_requests().len(),
        usize::try_from(RetryConfig::default().max_company_attempts).expect("fits")
    );

    let saved = CheckpointStore::new(&config.checkpoint_path)
        .load()
        .expect("load")
        .expect("checkpoint kept");
    assert_eq!(saved.phase, CheckpointPhase::Paused);
    assert_eq!(saved.state.frontier.len(), 10);
    assert!(saved.state.visited.is_empty());

    let healthy = Arc::new(numbered_registry(&numbers));
    let second = orchestrator(&healthy, &config);
    assert_eq!(second.resume().await.expect("resume"), scan_id);
    assert_eq!(second.wait().await, RunState::Completed);
    assert_eq!(healthy.profile_requests().first(), Some(&number("00000001")));
    assert_eq!(second.status().await.visited_count, 10);
}

#[tokio::test]
async fn test_weak_documents_corroborate_into_finding() {
    let temp = TempDir::new().expect("tempdir");
    let company = FakeCompany {
        filings: vec![
            filing("inc-1", "incorporation", "doc-inc"),
            filing("res-1", "resolution", "doc-res"),
        ],
        ..plain_company("John Smith")
    };
    let registry = Arc::new(
        FakeRegistry::default()
            .company("00000001", company)
            .document("doc-inc", "Name of company\n\nJon Smith")
            .document("doc-res", "Name of company\n\nJon Smith"),
    );
    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");
    let config = ScanConfig {
        ocr_confidence_threshold: 0.85,
        ..scan_config(temp.path(), seeds(1))
    };

    let orchestrator = orchestrator(&registry, &config).with_database(db.clone());
    let scan_id = orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let results = orchestrator.results().await;
    assert_eq!(results.findings.len(), 1);
    let finding = &results.findings[0];
    assert_eq!(finding.kind, FindingKind::Mismatch);
    assert_eq!(finding.filing_id.as_str(), "inc-1");
    assert_eq!(finding.extracted, "Jon Smith");
    // 1 - (0.2 * 0.2)
    assert!((finding.confidence - 0.96).abs() < 1e-9);
    assert_eq!(finding.corroborating_filings.len(), 1);
    assert_eq!(finding.corroborating_filings[0].as_str(), "res-1");

    let stored = findings::get_by_scan(db.pool(), &scan_id.to_string())
        .await
        .expect("stored findings");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].corroborating_filings, vec!["res-1".to_string()]);
}

#[tokio::test]
async fn test_conflicting_documents_are_ambiguous() {
    let temp = TempDir::new().expect("tempdir");
    let company = FakeCompany {
        filings: vec![
            filing("inc-1", "incorporation", "doc-inc"),
            filing("res-1", "resolution", "doc-res"),
        ],
        ..plain_company("John Smith")
    };
    let registry = Arc::new(
        FakeRegistry::default()
            .company("00000001", company)
            .document("doc-inc", "Company name: Jon Smith")
            .document("doc-res", "Company name: Joan Smythe"),
    );
    let config = scan_config(temp.path(), seeds(1));

    let orchestrator = orchestrator(&registry, &config);
    orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let status = orchestrator.status().await;
    assert_eq!(status.findings_count, 0);
    assert_eq!(status.ambiguous_count, 1);

    let results = orchestrator.results().await;
    assert_eq!(results.findings[0].kind, FindingKind::Ambiguous);
    assert_eq!(results.findings[0].filing_id.as_str(), "inc-1");
    assert_eq!(results.findings[0].extracted, "Jon Smith");
}

#[tokio::test]
async fn test_change_of_name_document_checked_against_previous_name() {
    let temp = TempDir::new().expect("tempdir");
    let company = FakeCompany {
        filings: vec![filing("cn-1", "change-of-name", "doc-cn")],
        previous_names: vec![("OLD LIMITED".to_string(), "2019-06-14".to_string())],
        ..plain_company("NEW LIMITED")
    };
    let registry = Arc::new(
        FakeRegistry::default().company("00000001", company).document(
            "doc-cn",
            "Company name: OLD LIMITED\nNew name: FAKE LIMITED\nDate of change of name: 20 June 2019",
        ),
    );
    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");
    let config = scan_config(temp.path(), seeds(1));

    let orchestrator = orchestrator(&registry, &config).with_database(db.clone());
    let scan_id = orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);

    let results = orchestrator.results().await;
    assert_eq!(results.findings.len(), 2);
    let name = results
        .findings
        .iter()
        .find(|f| f.field == Field::Name)
        .expect("name finding");
    assert_eq!(name.kind, FindingKind::Mismatch);
    assert_eq!(name.expected, "NEW LIMITED");
    assert_eq!(name.extracted, "FAKE LIMITED");

    let change = results
        .findings
        .iter()
        .find(|f| f.field == Field::ChangeDate)
        .expect("change date finding");
    assert_eq!(change.expected, "2019-06-14");
    assert_eq!(change.extracted, "2019-06-20");

    let mut fields: Vec<String> = findings::get_by_scan(db.pool(), &scan_id.to_string())
        .await
        .expect("stored findings")
        .into_iter()
        .map(|f| f.field)
        .collect();
    fields.sort();
    assert_eq!(fields, vec!["name".to_string(), "name_change_date".to_string()]);
}

#[tokio::test]
async fn test_workers_share_one_rate_budget() {
    let temp = TempDir::new().expect("tempdir");
    let numbers = seeds(4);
    let registry = Arc::new(numbered_registry(&numbers));
    let config = ScanConfig {
        max_workers: 4,
        rate_limit_cap: 5,
        rate_limit_window_seconds: 1,
        ..scan_config(temp.path(), numbers)
    };

    let orchestrator = orchestrator(&registry, &config);
    orchestrator.start_scan(config).await.expect("start");
    assert_eq!(orchestrator.wait().await, RunState::Completed);
    assert_eq!(orchestrator.status().await.visited_count, 4);

    // Profile, officers and filing history per company.
    let times = registry.request_times();
    assert_eq!(times.len(), 12);
    let window = Duration::from_millis(950);
    for (i, start) in times.iter().enumerate() {
        let in_window = times[i..]
            .iter()
            .take_while(|t| t.duration_since(*start) < window)
            .count();
        assert!(in_window <= 5, "{in_window} calls within one window from call {i}");
    }
}

#[tokio::test]
async fn test_rejected_search_fails_filtered_scan() {
    let temp = TempDir::new().expect("tempdir");
    let registry = Arc::new(FakeRegistry {
        reject_search: true,
        ..FakeRegistry::default()
    });
    let config = ScanConfig {
        scan_mode: ScanMode::Filtered,
        filter_criteria: Some(FilterCriteria {
            query: Some("widgets".to_string()),
            ..FilterCriteria::default()
        }),
        ..scan_config(temp.path(), Vec::new())
    };

    let orchestrator = orchestrator(&registry, &config);
    let err = orchestrator.start_scan(config.clone()).await.expect_err("search rejected");
    assert!(err.is_fatal());

    let status = orchestrator.status().await;
    assert_eq!(status.state, RunState::Failed);
    assert!(status.error.is_some());
    assert!(!CheckpointLock::lock_path(&config.checkpoint_path).exists());
}
