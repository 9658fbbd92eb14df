//! Test doubles shared by the unit tests of this crate.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use quarry_shared::{
    BackendName, BackendSettings, BridgeSettings, Config, GeneralSettings, IdentityStoreSettings,
    PhaseSettings, ProjectCatalog, QuarryError, Result,
};

use crate::services::{
    CollectionService, EnrichRequest, EnrichmentService, FetchRequest, IdentityLoadRequest,
    IdentityService, IdentityUnifyRequest,
};

/// One collaborator invocation as seen by [`RecordingServices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Fetch {
        backend: String,
        args: Vec<String>,
        repository: String,
        has_deadline: bool,
    },
    Transform {
        backend: String,
        args: Vec<String>,
        only_identities: bool,
        studies_enabled: bool,
    },
    Load {
        backend: String,
        repository: String,
    },
    Unify {
        backend: String,
        repository: String,
        affiliate: bool,
    },
}

/// Collaborator double that records every call and fails on chosen repositories.
#[derive(Debug, Default)]
pub(crate) struct RecordingServices {
    calls: Mutex<Vec<Call>>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

impl RecordingServices {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail every call made for one of these repository references.
    pub(crate) fn failing_on(repositories: &[&str]) -> Self {
        Self {
            failing: repositories.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Make every call take `delay` before it is recorded.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn fetches(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Fetch { .. }))
            .collect()
    }

    async fn record(&self, call: Call, repository: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().expect("calls lock").push(call);
        if self.failing.iter().any(|r| r == repository) {
            return Err(QuarryError::Collaborator(format!("{repository} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionService for RecordingServices {
    async fn fetch(&self, request: FetchRequest) -> Result<()> {
        let call = Call::Fetch {
            backend: request.backend.to_string(),
            args: request.backend_args.clone(),
            repository: request.repository.clone(),
            has_deadline: request.deadline.is_some(),
        };
        self.record(call, &request.repository).await
    }
}

#[async_trait]
impl EnrichmentService for RecordingServices {
    async fn transform(&self, request: EnrichRequest) -> Result<()> {
        // Enrichment receives the repository only through its arguments.
        let repository = request.backend_args.first().cloned().unwrap_or_default();
        let call = Call::Transform {
            backend: request.backend.to_string(),
            args: request.backend_args.clone(),
            only_identities: request.only_identities,
            studies_enabled: request.studies_enabled,
        };
        self.record(call, &repository).await
    }
}

#[async_trait]
impl IdentityService for RecordingServices {
    async fn load(&self, request: IdentityLoadRequest) -> Result<()> {
        let call = Call::Load {
            backend: request.backend.to_string(),
            repository: request.repository.clone(),
        };
        self.record(call, &request.repository).await
    }

    async fn unify(&self, request: IdentityUnifyRequest) -> Result<()> {
        let call = Call::Unify {
            backend: request.backend.to_string(),
            repository: request.repository.clone(),
            affiliate: request.affiliate,
        };
        self.record(call, &request.repository).await
    }
}

fn backend_settings(name: &str, token: Option<&str>) -> BackendSettings {
    BackendSettings {
        raw_index: format!("{name}_raw"),
        enriched_index: format!("{name}_enriched"),
        token: token.map(String::from),
    }
}

/// A config with `git` and `github` (token `T`) sections, no jitter and an empty catalog.
pub(crate) fn config_with_stores(
    collection: &str,
    enrichment: &str,
    phases: PhaseSettings,
) -> Config {
    let mut backends = BTreeMap::new();
    backends.insert(BackendName::from("git"), backend_settings("git", None));
    backends.insert(BackendName::from("github"), backend_settings("github", Some("T")));

    Config {
        general: GeneralSettings {
            task_jitter_secs: 0,
            ..Default::default()
        },
        collection_store: Url::parse(collection).expect("collection url"),
        enrichment_store: Url::parse(enrichment).expect("enrichment url"),
        phases,
        identity_store: IdentityStoreSettings {
            database: "sh".into(),
            host: "localhost".into(),
            user: "root".into(),
            password: String::new(),
        },
        bridge: BridgeSettings::default(),
        backends,
        projects_file: PathBuf::from("projects.json"),
        catalog: ProjectCatalog::default(),
    }
}

/// Same as [`config_with_stores`] with the given JSON catalog.
pub(crate) fn config_with_catalog(catalog: &str, phases: PhaseSettings) -> Config {
    let mut config = config_with_stores("http://127.0.0.1:9/", "http://127.0.0.1:9/", phases);
    config.catalog = ProjectCatalog::from_json(catalog).expect("catalog");
    config
}
