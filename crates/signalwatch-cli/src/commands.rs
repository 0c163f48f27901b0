use crate::cli::StartArgs;
use anyhow::{bail, Context};
use serde::Serialize;
use signalwatch_core::{AppConfig, FilterCriteria, ScanMode};
use signalwatch_db::Database;
use signalwatch_scanner::{
    CheckpointPhase, CheckpointStore, CompanyState, FindingKind, RunState, ScanCheckpoint,
    ScanOrchestrator, ScanResults, ScanStatus,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct RunReport {
    status: ScanStatus,
    results: ScanResults,
}

/// Checkpoint contents as shown by `status`.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub scan_id: Uuid,
    pub phase: CheckpointPhase,
    pub written_at: String,
    pub visited_count: usize,
    pub frontier_size: usize,
    pub in_flight: usize,
    pub findings_count: usize,
    pub ambiguous_count: usize,
    pub name_change_flags: usize,
    pub failed_companies: usize,
    pub calls_in_window: usize,
}

impl From<&ScanCheckpoint> for CheckpointSummary {
    fn from(checkpoint: &ScanCheckpoint) -> Self {
        let state = &checkpoint.state;
        let count = |kind: FindingKind| state.findings.iter().filter(|f| f.kind == kind).count();
        Self {
            scan_id: checkpoint.scan_id,
            phase: checkpoint.phase,
            written_at: checkpoint.timestamp.to_rfc3339(),
            visited_count: state.visited.len(),
            frontier_size: state.frontier.len(),
            in_flight: state.frontier.in_flight_len(),
            findings_count: count(FindingKind::Mismatch),
            ambiguous_count: count(FindingKind::Ambiguous),
            name_change_flags: count(FindingKind::MultipleNameChanges),
            failed_companies: state
                .company_states
                .values()
                .filter(|s| matches!(s, CompanyState::Failed { .. }))
                .count(),
            calls_in_window: checkpoint.rate_budget.calls.len(),
        }
    }
}

/// Fold command-line overrides into the scan config.
pub fn apply_start_args(config: &mut AppConfig, args: &StartArgs) {
    let scan = &mut config.scan;
    if !args.companies.is_empty() {
        scan.scan_mode = ScanMode::Specific;
        scan.company_numbers.clone_from(&args.companies);
    }
    if let Some(query) = &args.query {
        scan.scan_mode = ScanMode::Filtered;
        scan.filter_criteria = Some(FilterCriteria {
            query: Some(query.clone()),
            ..scan.filter_criteria.clone().unwrap_or_default()
        });
    }
    if let Some(depth) = args.max_depth {
        scan.max_depth = depth;
    }
    if let Some(max) = args.max_companies {
        scan.max_companies = max;
    }
    if let Some(workers) = args.workers {
        scan.max_workers = workers;
    }
}

pub async fn start(config: AppConfig, database: Option<&Path>) -> anyhow::Result<()> {
    let scan = config.scan.clone();
    let orchestrator = build_orchestrator(config, database).await?;
    let scan_id = orchestrator.start_scan(scan).await?;
    println!("started scan {scan_id}");
    run_to_stop(orchestrator).await
}

pub async fn resume(config: AppConfig, database: Option<&Path>) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, database).await?;
    let scan_id = orchestrator.resume().await?;
    println!("resumed scan {scan_id}");
    run_to_stop(orchestrator).await
}

pub fn status(config: &AppConfig) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&config.scan.checkpoint_path);
    let Some(checkpoint) = store.load()? else {
        println!("no checkpoint at {}", store.path().display());
        return Ok(());
    };
    let summary = CheckpointSummary::from(&checkpoint);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn reset(config: AppConfig) -> anyhow::Result<()> {
    let path = config.scan.checkpoint_path.clone();
    if ScanOrchestrator::new(config).reset().await? {
        println!("removed checkpoint {}", path.display());
    } else {
        println!("no checkpoint at {}", path.display());
    }
    Ok(())
}

async fn build_orchestrator(
    config: AppConfig,
    database: Option<&Path>,
) -> anyhow::Result<ScanOrchestrator> {
    let mut orchestrator = ScanOrchestrator::new(config);
    if let Some(path) = database {
        let db = Database::new(path)
            .await
            .with_context(|| format!("failed to open results database {}", path.display()))?;
        db.run_migrations().await?;
        orchestrator = orchestrator.with_database(db);
    }
    Ok(orchestrator)
}

/// Wait for the scan to stop, pausing it on Ctrl-C, then print the report.
async fn run_to_stop(orchestrator: ScanOrchestrator) -> anyhow::Result<()> {
    let orchestrator = Arc::new(orchestrator);

    let pauser = Arc::clone(&orchestrator);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, pausing at the next checkpoint");
            if let Err(e) = pauser.pause().await {
                tracing::debug!(error = %e, "nothing to pause");
            }
        }
    });

    let state = orchestrator.wait().await;
    interrupt.abort();

    let report = RunReport {
        status: orchestrator.status().await,
        results: orchestrator.results().await,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    match state {
        RunState::Failed => bail!(
            "scan failed: {}",
            report.status.error.as_deref().unwrap_or("unknown error")
        ),
        RunState::Checkpointed => {
            println!("scan paused; run `signalwatch resume` to continue");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalwatch_core::CompanyNumber;

    #[test]
    fn test_start_args_override_seeds() {
        let mut config = AppConfig::default();
        config.scan.company_numbers = vec!["00000001".to_string()];
        let args = StartArgs {
            companies: vec!["01234567".to_string()],
            max_depth: Some(0),
            workers: Some(2),
            ..StartArgs::default()
        };

        apply_start_args(&mut config, &args);
        assert_eq!(config.scan.scan_mode, ScanMode::Specific);
        assert_eq!(config.scan.company_numbers, vec!["01234567"]);
        assert_eq!(config.scan.max_depth, 0);
        assert_eq!(config.scan.max_workers, 2);
        assert_eq!(config.scan.max_companies, 100);
    }

    #[test]
    fn test_query_switches_to_filtered() {
        let mut config = AppConfig::default();
        let args = StartArgs {
            query: Some("holdings".to_string()),
            ..StartArgs::default()
        };

        apply_start_args(&mut config, &args);
        assert_eq!(config.scan.scan_mode, ScanMode::Filtered);
        assert_eq!(
            config.scan.filter_criteria.and_then(|c| c.query).as_deref(),
            Some("holdings")
        );
    }

    #[test]
    fn test_summary_counts() {
        let state = signalwatch_scanner::ScanState::seeded(
            vec![
                CompanyNumber::new("1").expect("valid"),
                CompanyNumber::new("2").expect("valid"),
            ],
            10,
        );
        let checkpoint = ScanCheckpoint::new(
            Uuid::new_v4(),
            CheckpointPhase::Paused,
            signalwatch_core::ScanConfig::default(),
            state,
            Default::default(),
        );

        let summary = CheckpointSummary::from(&checkpoint);
        assert_eq!(summary.phase, CheckpointPhase::Paused);
        assert_eq!(summary.visited_count, 0);
        assert_eq!(summary.frontier_size, 2);
        assert_eq!(summary.findings_count, 0);
    }
}
