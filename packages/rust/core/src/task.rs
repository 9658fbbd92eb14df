//! Units of work run by a lane: collect, enrich, and identity tasks.
//!
//! A Task is bound to one backend and its repositories. Running it fans out
//! over the repositories in catalog order; a problem with one repository is
//! logged and never stops the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{error, info, warn};

use quarry_backends::BackendRegistry;
use quarry_shared::{BackendName, Config, RepositoryRef, Result};

use crate::lane::Runnable;
use crate::services::{
    EnrichRequest, FetchRequest, IdentityLoadRequest, IdentityUnifyRequest, Services,
};

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// What a Task does for each repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Fetch raw items into the collection store.
    Collect,
    /// Enrich raw items, or only extract their identities.
    Enrich { only_identities: bool },
    /// Load identities into the identity store.
    IdentityLoad,
    /// Merge identities, optionally affiliating them.
    IdentityUnify { affiliate: bool, autoprofile: bool },
}

impl TaskKind {
    /// Human-readable phase name used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Collect => "data collection",
            Self::Enrich {
                only_identities: true,
            } => "identities collection",
            Self::Enrich {
                only_identities: false,
            } => "data enrichment",
            Self::IdentityLoad => "identities load",
            Self::IdentityUnify { .. } => "identities unification",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskContext / TaskOutcome
// ---------------------------------------------------------------------------

/// Everything a Task needs besides its backend and repositories.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub config: Arc<Config>,
    pub registry: Arc<BackendRegistry>,
    pub services: Services,
    /// Deadline of the enclosing phase, forwarded to collaborators.
    pub deadline: Option<DateTime<Utc>>,
}

/// Per-repository tallies of one Task pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TaskOutcome {
    pub fn absorb(&mut self, other: TaskOutcome) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A Task bound to one backend and its repository set.
#[derive(Debug)]
pub struct Task {
    kind: TaskKind,
    backend: BackendName,
    repos: Arc<[RepositoryRef]>,
    ctx: TaskContext,
}

impl Task {
    pub fn new(
        kind: TaskKind,
        backend: BackendName,
        repos: Arc<[RepositoryRef]>,
        ctx: TaskContext,
    ) -> Self {
        Self {
            kind,
            backend,
            repos,
            ctx,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn backend(&self) -> &BackendName {
        &self.backend
    }

    /// One pass over every repository, followed by a random pause.
    pub async fn run(&self) -> TaskOutcome {
        let started = Instant::now();
        let label = self.kind.label();
        info!(backend = %self.backend, repos = self.repos.len(), "{label} starts");

        let mut outcome = TaskOutcome::default();
        for repo in self.repos.iter() {
            match self.run_repository(repo).await {
                Ok(()) => outcome.succeeded += 1,
                Err(e) if e.is_repository_skip() => {
                    warn!(
                        backend = %self.backend,
                        repository = %repo,
                        error = %e,
                        "skipping repository"
                    );
                    outcome.skipped += 1;
                }
                Err(e) => {
                    error!(
                        backend = %self.backend,
                        repository = %repo,
                        error = %e,
                        "{label} failed for repository"
                    );
                    outcome.failed += 1;
                }
            }
        }

        jitter(self.ctx.config.general.task_jitter()).await;

        info!(
            backend = %self.backend,
            duration_ms = started.elapsed().as_millis() as u64,
            succeeded = outcome.succeeded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "{label} finished"
        );

        outcome
    }

    async fn run_repository(&self, repo: &RepositoryRef) -> Result<()> {
        let config = &self.ctx.config;
        let services = &self.ctx.services;
        let settings = config.backend(&self.backend)?;

        match self.kind {
            TaskKind::Collect => {
                let backend_args = self.ctx.registry.build_params(repo, settings)?;
                services
                    .collection
                    .fetch(FetchRequest {
                        store_url: config.collection_store.to_string(),
                        clean: false,
                        fetch_cache: false,
                        backend: self.backend.clone(),
                        backend_args,
                        raw_index: settings.raw_index.clone(),
                        enriched_index: settings.enriched_index.clone(),
                        repository: repo.reference.clone(),
                        deadline: self.ctx.deadline,
                    })
                    .await
            }
            TaskKind::Enrich { only_identities } => {
                let backend_args = self.ctx.registry.build_params(repo, settings)?;
                services
                    .enrichment
                    .transform(EnrichRequest {
                        collection_store_url: config.collection_store.to_string(),
                        clean: false,
                        backend: self.backend.clone(),
                        backend_args,
                        raw_index: settings.raw_index.clone(),
                        enriched_index: settings.enriched_index.clone(),
                        projects_file: config.projects_file.clone(),
                        identity_store: config.identity_store.clone(),
                        no_incremental: false,
                        only_identities,
                        studies_enabled: config.phases.studies,
                        only_studies: false,
                        enrichment_store_url: config.enrichment_store.to_string(),
                        deadline: self.ctx.deadline,
                    })
                    .await
            }
            TaskKind::IdentityLoad => {
                services
                    .identities
                    .load(IdentityLoadRequest {
                        backend: self.backend.clone(),
                        repository: repo.reference.clone(),
                        raw_index: settings.raw_index.clone(),
                        collection_store_url: config.collection_store.to_string(),
                        identity_store: config.identity_store.clone(),
                        deadline: self.ctx.deadline,
                    })
                    .await
            }
            TaskKind::IdentityUnify {
                affiliate,
                autoprofile,
            } => {
                services
                    .identities
                    .unify(IdentityUnifyRequest {
                        backend: self.backend.clone(),
                        repository: repo.reference.clone(),
                        affiliate,
                        autoprofile,
                        identity_store: config.identity_store.clone(),
                        deadline: self.ctx.deadline,
                    })
                    .await
            }
        }
    }
}

#[async_trait]
impl Runnable for Task {
    fn name(&self) -> &str {
        self.kind.label()
    }

    async fn run(&self) -> TaskOutcome {
        Task::run(self).await
    }
}

/// Sleep a uniformly random duration in `[0, max]`.
async fn jitter(max: Duration) {
    if max.is_zero() {
        return;
    }
    let millis = rand::rng().random_range(0..=max.as_millis() as u64);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
