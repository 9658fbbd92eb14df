//! Top-level control loop: probe stores, partition repositories, and run the
//! pipeline phases as synchronized batches of per-backend lanes.
//!
//! Phases of one cycle:
//! 1. primary collection: `[Collect, IdentityLoad]` per backend
//! 2. identity unification: `[IdentityUnify]` per backend
//! 3. enrichment: `[Enrich]` per backend
//!
//! Each phase is a barrier: every lane is joined before the next phase starts.
//! A fourth, timer-bounded steady-state phase (`[Collect, Enrich]`) exists as
//! [`Orchestrator::steady_state`] but a cycle stops after enrichment.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use quarry_backends::BackendRegistry;
use quarry_shared::{Config, CycleId, Phase, PhaseSettings, Result, load_config_from};

use crate::lane::{LaneReport, TaskLane};
use crate::partition::Partition;
use crate::services::Services;
use crate::signal::StopSignal;
use crate::store::{check_stores, probe_client};
use crate::task::{Task, TaskContext, TaskKind, TaskOutcome};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one phase.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub phase: Phase,
    /// One report per lane, in partition order.
    pub lanes: Vec<LaneReport>,
    pub duration: Duration,
    /// Whether the phase timer raised the stop signal.
    pub timed_out: bool,
}

impl PhaseReport {
    /// Tallies summed over every lane.
    pub fn outcome(&self) -> TaskOutcome {
        let mut total = TaskOutcome::default();
        for lane in &self.lanes {
            total.absorb(lane.outcome);
        }
        total
    }
}

/// Summary of one orchestration cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    /// Phases that ran, in order. Phases with no enabled task are absent.
    pub phases: Vec<PhaseReport>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

// ---------------------------------------------------------------------------
// Phase task lists
// ---------------------------------------------------------------------------

fn primary_collection_tasks(phases: &PhaseSettings) -> Vec<TaskKind> {
    let mut kinds = Vec::new();
    if phases.collection {
        kinds.push(TaskKind::Collect);
    }
    if phases.identities {
        kinds.push(TaskKind::IdentityLoad);
    }
    kinds
}

fn identity_unification_tasks(phases: &PhaseSettings) -> Vec<TaskKind> {
    if phases.identities {
        vec![TaskKind::IdentityUnify {
            affiliate: true,
            autoprofile: false,
        }]
    } else {
        Vec::new()
    }
}

fn enrichment_tasks(phases: &PhaseSettings) -> Vec<TaskKind> {
    if phases.enrichment {
        vec![TaskKind::Enrich {
            only_identities: false,
        }]
    } else {
        Vec::new()
    }
}

fn steady_state_tasks(phases: &PhaseSettings) -> Vec<TaskKind> {
    let mut kinds = Vec::new();
    if phases.collection {
        kinds.push(TaskKind::Collect);
    }
    if phases.enrichment {
        kinds.push(TaskKind::Enrich {
            only_identities: false,
        });
    }
    kinds
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the pipeline phases over the configured repositories.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    services: Services,
}

impl Orchestrator {
    /// Create an orchestrator with the built-in backends.
    pub fn new(services: Services) -> Self {
        Self {
            registry: Arc::new(BackendRegistry::new()),
            services,
        }
    }

    /// Replace the backend registry.
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Load the configuration at `path` and run one cycle with it.
    pub async fn run_from_file(&self, path: &Path) -> Result<CycleReport> {
        let config = load_config_from(path)?;
        self.run(Arc::new(config)).await
    }

    /// Run one cycle against a configuration snapshot.
    ///
    /// Fails only when a required data store is unreachable, before any lane
    /// is built. Every other problem is logged and the cycle continues.
    pub async fn run(&self, config: Arc<Config>) -> Result<CycleReport> {
        let cycle_id = CycleId::new();
        let span = info_span!("cycle", cycle = %cycle_id);
        self.run_cycle(cycle_id, config).instrument(span).await
    }

    async fn run_cycle(&self, cycle_id: CycleId, config: Arc<Config>) -> Result<CycleReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("starting orchestration cycle");

        let client = probe_client(config.general.verify_tls)?;
        check_stores(&client, &config).await?;

        debug!("organisation tables feeding not implemented");

        let partition = Partition::build(&config, &self.registry);
        if partition.is_empty() {
            warn!("no repositories to process for the enabled backends");
        }

        let mut phases = Vec::new();

        let kinds = primary_collection_tasks(&config.phases);
        if let Some(report) = self
            .launch_phase(Phase::PrimaryCollection, &config, &partition, &kinds, None)
            .await
        {
            phases.push(report);
        }

        let kinds = identity_unification_tasks(&config.phases);
        if let Some(report) = self
            .launch_phase(Phase::IdentityUnification, &config, &partition, &kinds, None)
            .await
        {
            phases.push(report);
        }

        let kinds = enrichment_tasks(&config.phases);
        if let Some(report) = self
            .launch_phase(Phase::Enrichment, &config, &partition, &kinds, None)
            .await
        {
            phases.push(report);
        }

        if config.phases.studies {
            info!("studies not implemented as a separate phase; flag forwarded to enrichment");
        }

        let report = CycleReport {
            cycle_id,
            started_at,
            phases,
            duration: started.elapsed(),
        };

        info!(
            phases = report.phases.len(),
            duration_ms = report.duration.as_millis() as u64,
            "orchestration cycle finished"
        );

        Ok(report)
    }

    /// Re-collect and re-enrich for at most `general.steady_state_secs`, then
    /// stop every lane.
    ///
    /// The stop signal is raised when the window elapses regardless of round
    /// progress; lanes finish the round they are in and are joined.
    pub async fn steady_state(&self, config: Arc<Config>) -> PhaseReport {
        let window = config.general.steady_state_window();
        let partition = Partition::build(&config, &self.registry);
        let kinds = steady_state_tasks(&config.phases);

        let report = self
            .launch_phase(Phase::SteadyState, &config, &partition, &kinds, Some(window))
            .await
            .unwrap_or_else(|| PhaseReport {
                phase: Phase::SteadyState,
                lanes: Vec::new(),
                duration: Duration::ZERO,
                timed_out: false,
            });

        debug!("index alias rotation not implemented");
        report
    }

    /// Start one lane per backend running `kinds`, then join them all.
    ///
    /// Without a timer the stop signal is raised as soon as every lane is
    /// launched, so each lane completes exactly its first round. With a
    /// timer the signal is raised when it elapses, unless every lane has
    /// already finished on its round limit.
    #[instrument(skip_all, fields(phase = %phase))]
    async fn launch_phase(
        &self,
        phase: Phase,
        config: &Arc<Config>,
        partition: &Partition,
        kinds: &[TaskKind],
        timer: Option<Duration>,
    ) -> Option<PhaseReport> {
        if kinds.is_empty() {
            debug!("no task enabled for this phase, skipping");
            return None;
        }

        let started = Instant::now();
        let stop = StopSignal::new();
        let deadline = timer
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map(|t| Utc::now() + t);

        let ctx = TaskContext {
            config: Arc::clone(config),
            registry: Arc::clone(&self.registry),
            services: self.services.clone(),
            deadline,
        };

        info!(lanes = partition.len(), tasks = kinds.len(), "task manager starting");

        let mut lanes = JoinSet::new();
        for (backend, repos) in partition.iter() {
            let mut lane = TaskLane::new(backend.clone(), stop.clone(), config.general.round_limit);
            for kind in kinds {
                lane.push(Box::new(Task::new(
                    *kind,
                    backend.clone(),
                    Arc::clone(repos),
                    ctx.clone(),
                )));
            }
            let span = info_span!("lane", backend = %backend);
            lanes.spawn(lane.run().instrument(span));
        }

        info!("waiting for all lanes to complete");

        let mut reports = Vec::with_capacity(lanes.len());
        let mut timed_out = false;

        match timer {
            None => stop.raise(),
            Some(window) => {
                info!(window_secs = window.as_secs(), "lanes bounded by timer");
                let elapsed = tokio::time::sleep(window);
                tokio::pin!(elapsed);
                loop {
                    tokio::select! {
                        _ = &mut elapsed => {
                            info!("phase timer elapsed, raising stop signal");
                            timed_out = true;
                            stop.raise();
                            break;
                        }
                        joined = lanes.join_next() => match joined {
                            Some(joined) => collect_lane(joined, &mut reports),
                            None => break,
                        },
                    }
                }
            }
        }

        while let Some(joined) = lanes.join_next().await {
            collect_lane(joined, &mut reports);
        }

        reports.sort_by_key(|r| partition.backends().position(|b| b == &r.backend));

        let report = PhaseReport {
            phase,
            lanes: reports,
            duration: started.elapsed(),
            timed_out,
        };

        let outcome = report.outcome();
        info!(
            duration_ms = report.duration.as_millis() as u64,
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "task manager and all its lanes finished"
        );

        Some(report)
    }
}

/// Record a joined lane; a panicked lane is logged and does not abort the phase.
fn collect_lane(
    joined: std::result::Result<LaneReport, tokio::task::JoinError>,
    reports: &mut Vec<LaneReport>,
) {
    match joined {
        Ok(report) => reports.push(report),
        Err(e) => error!(error = %e, "lane terminated abnormally"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::testing::{Call, RecordingServices, config_with_catalog};
    use quarry_backends::ParameterBuilder;
    use quarry_shared::{BackendName, BackendSettings, QuarryError, RepositoryRef};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    fn write_config(store_url: &str, phases: &str, projects: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("quarry-orch-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let settings = format!(
            r#"
[general]
task_jitter_secs = 0

[es_collection]
url = "{store_url}"

[es_enrichment]
url = "{store_url}"

[projects]
projects_file = "projects.json"

[sortinghat]
database = "sh"
host = "localhost"
user = "root"

[phases]
{phases}

[git]
raw_index = "git_raw"
enriched_index = "git_enriched"

[github]
raw_index = "github_raw"
enriched_index = "github_enriched"
token = "T"
"#
        );
        std::fs::write(dir.join("quarry.toml"), settings).unwrap();
        std::fs::write(dir.join("projects.json"), projects).unwrap();
        dir.join("quarry.toml")
    }

    fn cleanup(config_path: &Path) {
        if let Some(dir) = config_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    fn all_phases() -> PhaseSettings {
        PhaseSettings {
            collection: true,
            identities: true,
            enrichment: true,
            studies: false,
        }
    }

    const TWO_BACKENDS: &str = r#"{
        "proj1": {
            "git": ["https://example.org/repo.git"],
            "github": ["https://github.com/acme/widgets"]
        }
    }"#;

    #[tokio::test]
    async fn single_git_repository_is_collected_once() {
        let server = store(200).await;
        let path = write_config(
            &server.uri(),
            "collection = true\nidentities = false\nenrichment = false\nstudies = false",
            r#"{ "proj1": {"git": ["https://example.org/repo.git"]}}"#,
        );
        let services = Arc::new(RecordingServices::new());
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.run_from_file(&path).await.expect("cycle");

        assert_eq!(report.phases.len(), 1);
        let primary = report.phase(Phase::PrimaryCollection).unwrap();
        assert_eq!(primary.lanes.len(), 1);
        assert_eq!(primary.lanes[0].backend.as_str(), "git");
        assert_eq!(primary.lanes[0].rounds, 1);

        assert_eq!(
            services.calls(),
            vec![Call::Fetch {
                backend: "git".into(),
                args: vec!["https://example.org/repo.git".into()],
                repository: "https://example.org/repo.git".into(),
                has_deadline: false,
            }]
        );

        cleanup(&path);
    }

    #[tokio::test]
    async fn unavailable_store_aborts_before_any_task() {
        let server = store(503).await;
        let path = write_config(
            &server.uri(),
            "collection = true\nidentities = true\nenrichment = true\nstudies = false",
            TWO_BACKENDS,
        );
        let services = Arc::new(RecordingServices::new());
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let err = orchestrator.run_from_file(&path).await.unwrap_err();

        assert!(matches!(err, QuarryError::StoreUnavailable { .. }));
        assert!(services.calls().is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn phases_run_in_order_with_barriers() {
        let server = store(200).await;
        let mut config = config_with_catalog(TWO_BACKENDS, all_phases());
        config.collection_store = server.uri().parse().unwrap();
        config.enrichment_store = server.uri().parse().unwrap();

        let services = Arc::new(RecordingServices::new());
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.run(Arc::new(config)).await.expect("cycle");

        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::PrimaryCollection,
                Phase::IdentityUnification,
                Phase::Enrichment
            ]
        );
        for phase in &report.phases {
            assert_eq!(phase.lanes.len(), 2);
            assert!(phase.lanes.iter().all(|l| l.rounds == 1));
            assert!(!phase.timed_out);
        }

        let calls = services.calls();
        assert_eq!(calls.len(), 8);
        let stage = |c: &Call| match c {
            Call::Fetch { .. } | Call::Load { .. } => 0,
            Call::Unify { .. } => 1,
            Call::Transform { .. } => 2,
        };
        let stages: Vec<u8> = calls.iter().map(stage).collect();
        let mut sorted = stages.clone();
        sorted.sort();
        assert_eq!(stages, sorted, "a phase started before the previous one was joined");
        assert!(calls
            .iter()
            .all(|c| !matches!(c, Call::Unify { affiliate: false, .. })));
    }

    #[tokio::test]
    async fn lane_errors_do_not_cross_the_phase_barrier() {
        let server = store(200).await;
        let mut config = config_with_catalog(TWO_BACKENDS, all_phases());
        config.collection_store = server.uri().parse().unwrap();
        config.enrichment_store = server.uri().parse().unwrap();

        let services = Arc::new(RecordingServices::failing_on(&["https://example.org/repo.git"]));
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.run(Arc::new(config)).await.expect("cycle");

        assert_eq!(report.phases.len(), 3);
        let primary = report.phase(Phase::PrimaryCollection).unwrap().outcome();
        assert_eq!(primary.failed, 2);
        assert_eq!(primary.succeeded, 2);
        assert!(services
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Transform { .. })));
    }

    #[tokio::test]
    async fn disabled_phases_are_skipped() {
        let server = store(200).await;
        let mut config = config_with_catalog(
            TWO_BACKENDS,
            PhaseSettings {
                enrichment: true,
                ..Default::default()
            },
        );
        config.collection_store = server.uri().parse().unwrap();
        config.enrichment_store = server.uri().parse().unwrap();

        let services = Arc::new(RecordingServices::new());
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.run(Arc::new(config)).await.expect("cycle");

        assert_eq!(report.phases.len(), 1);
        assert!(report.phase(Phase::Enrichment).is_some());
        assert!(services
            .calls()
            .iter()
            .all(|c| matches!(c, Call::Transform { .. })));
    }

    #[tokio::test]
    async fn steady_state_stops_on_timer() {
        let mut config = config_with_catalog(TWO_BACKENDS, all_phases());
        config.general.round_limit = u32::MAX;
        config.general.steady_state_secs = 1;

        let services = Arc::new(RecordingServices::with_delay(Duration::from_millis(5)));
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.steady_state(Arc::new(config)).await;

        assert!(report.timed_out);
        assert!(report.duration >= Duration::from_secs(1));
        // The window bounds the phase up to the round in flight.
        assert!(report.duration < Duration::from_secs(5));
        assert_eq!(report.lanes.len(), 2);
        assert!(report.lanes.iter().all(|l| l.rounds >= 1));

        let fetches = services.fetches();
        assert!(!fetches.is_empty());
        assert!(fetches
            .iter()
            .all(|c| matches!(c, Call::Fetch { has_deadline: true, .. })));
    }

    #[tokio::test]
    async fn steady_state_ends_early_on_round_limit() {
        let mut config = config_with_catalog(TWO_BACKENDS, all_phases());
        config.general.round_limit = 0;
        config.general.steady_state_secs = 3600;

        let services = Arc::new(RecordingServices::new());
        let orchestrator = Orchestrator::new(Services::from_shared(services.clone()));

        let report = orchestrator.steady_state(Arc::new(config)).await;

        assert!(!report.timed_out);
        assert!(report.lanes.iter().all(|l| l.rounds == 1));
        // One fetch and one transform per backend.
        assert_eq!(services.calls().len(), 4);
    }

    /// Mailing-list archives: the reference is a path, passed with its index name.
    struct MboxBackend;

    impl ParameterBuilder for MboxBackend {
        fn name(&self) -> &str {
            "mbox"
        }

        fn build(&self, repo: &RepositoryRef, settings: &BackendSettings) -> Result<Vec<String>> {
            Ok(vec![
                repo.reference.clone(),
                "--index".into(),
                settings.raw_index.clone(),
            ])
        }
    }

    #[tokio::test]
    async fn registered_backend_gets_its_own_lane() {
        let server = store(200).await;
        let mut config = config_with_catalog(
            r#"{
                "proj1": {
                    "git": ["https://example.org/repo.git"],
                    "mbox": ["/archives/dev.mbox"]
                }
            }"#,
            PhaseSettings {
                collection: true,
                ..Default::default()
            },
        );
        config.collection_store = server.uri().parse().unwrap();
        config.backends.insert(
            BackendName::from("mbox"),
            BackendSettings {
                raw_index: "mbox_raw".into(),
                enriched_index: "mbox_enriched".into(),
                token: None,
            },
        );

        let mut registry = BackendRegistry::new();
        registry.register(Box::new(MboxBackend));
        let services = Arc::new(RecordingServices::new());
        let orchestrator =
            Orchestrator::new(Services::from_shared(services.clone())).with_registry(registry);

        let report = orchestrator.run(Arc::new(config)).await.expect("cycle");

        let primary = report.phase(Phase::PrimaryCollection).unwrap();
        let lanes: Vec<&str> = primary.lanes.iter().map(|l| l.backend.as_str()).collect();
        assert_eq!(lanes, vec!["git", "mbox"]);
        assert!(services.fetches().contains(&Call::Fetch {
            backend: "mbox".into(),
            args: vec![
                "/archives/dev.mbox".into(),
                "--index".into(),
                "mbox_raw".into()
            ],
            repository: "/archives/dev.mbox".into(),
            has_deadline: false,
        }));
    }

    #[test]
    fn phase_task_lists_follow_settings() {
        let only_collection = PhaseSettings {
            collection: true,
            ..Default::default()
        };
        assert_eq!(primary_collection_tasks(&only_collection), vec![TaskKind::Collect]);
        assert!(identity_unification_tasks(&only_collection).is_empty());
        assert!(enrichment_tasks(&only_collection).is_empty());

        assert_eq!(
            primary_collection_tasks(&all_phases()),
            vec![TaskKind::Collect, TaskKind::IdentityLoad]
        );
        assert_eq!(
            steady_state_tasks(&all_phases()),
            vec![
                TaskKind::Collect,
                TaskKind::Enrich {
                    only_identities: false
                }
            ]
        );
    }
}
