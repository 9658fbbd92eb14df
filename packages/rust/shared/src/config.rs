//! Orchestrator configuration.
//!
//! The settings file is TOML; the project catalog it points at is JSON
//! (project name → backend name → list of repository references).
//! [`load_config_from`] turns both into one immutable [`Config`] snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{QuarryError, Result};
use crate::types::{BackendName, RepositoryRef};

// ---------------------------------------------------------------------------
// Config file structs (matching the TOML schema)
// ---------------------------------------------------------------------------

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralSettings,
    es_collection: StoreSection,
    es_enrichment: StoreSection,
    projects: ProjectsSection,
    sortinghat: IdentityStoreSettings,
    phases: PhaseSettings,
    #[serde(default)]
    bridge: BridgeSettings,
    /// Every other table is a backend section.
    #[serde(flatten)]
    backends: BTreeMap<String, BackendSettings>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoreSection {
    url: Url,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectsSection {
    projects_file: PathBuf,
}

/// `[general]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Seconds to pause between steady-state windows. Parsed but not acted on.
    #[serde(default)]
    pub sleep: u64,

    /// Lanes stop once their round counter exceeds this value.
    #[serde(default = "default_round_limit")]
    pub round_limit: u32,

    /// Upper bound of the random pause after each Task pass.
    #[serde(default = "default_task_jitter_secs")]
    pub task_jitter_secs: u64,

    /// Length of the steady-state window.
    #[serde(default = "default_steady_state_secs")]
    pub steady_state_secs: u64,

    /// Verify TLS certificates when probing data stores.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            sleep: 0,
            round_limit: default_round_limit(),
            task_jitter_secs: default_task_jitter_secs(),
            steady_state_secs: default_steady_state_secs(),
            verify_tls: true,
        }
    }
}

impl GeneralSettings {
    pub fn task_jitter(&self) -> Duration {
        Duration::from_secs(self.task_jitter_secs)
    }

    pub fn steady_state_window(&self) -> Duration {
        Duration::from_secs(self.steady_state_secs)
    }
}

fn default_round_limit() -> u32 {
    1
}
fn default_task_jitter_secs() -> u64 {
    20
}
fn default_steady_state_secs() -> u64 {
    86_400
}
fn default_true() -> bool {
    true
}

/// `[phases]` section: which pipeline phases are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSettings {
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub identities: bool,
    #[serde(default)]
    pub enrichment: bool,
    #[serde(default)]
    pub studies: bool,
}

impl PhaseSettings {
    /// Whether any enabled phase writes to or reads from the collection store.
    pub fn needs_collection_store(&self) -> bool {
        self.collection || self.enrichment || self.studies
    }

    /// Whether any enabled phase writes to the enrichment store.
    pub fn needs_enrichment_store(&self) -> bool {
        self.enrichment || self.studies
    }
}

/// `[sortinghat]` section: connection to the identity store.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityStoreSettings {
    pub database: String,
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for IdentityStoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStoreSettings")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `[bridge]` section: the external command implementing the collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_bridge_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Optional bound on a single collaborator call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: Vec::new(),
            timeout_secs: None,
        }
    }
}

fn default_bridge_command() -> String {
    "quarry-bridge".into()
}

/// Per-backend section (`[git]`, `[github]`, ...).
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub raw_index: String,
    pub enriched_index: String,
    /// API credential for forge backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("raw_index", &self.raw_index)
            .field("enriched_index", &self.enriched_index)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Project catalog
// ---------------------------------------------------------------------------

/// One project from the catalog with its repositories grouped by backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    /// Backends in the order they appear in the catalog file.
    pub backends: Vec<(BackendName, Vec<RepositoryRef>)>,
}

/// The repository catalog, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
}

impl ProjectCatalog {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    /// Parse the JSON catalog, keeping project and backend order as written.
    pub fn from_json(content: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| QuarryError::config(format!("invalid projects file: {e}")))?;

        let serde_json::Value::Object(root) = root else {
            return Err(QuarryError::config(
                "projects file must be a JSON object keyed by project name",
            ));
        };

        let mut projects = Vec::with_capacity(root.len());
        for (project_name, backends) in root {
            let serde_json::Value::Object(backends) = backends else {
                return Err(QuarryError::config(format!(
                    "project '{project_name}' must map backend names to repository lists"
                )));
            };

            let mut grouped = Vec::with_capacity(backends.len());
            for (backend, repos) in backends {
                let repos: Vec<String> = serde_json::from_value(repos).map_err(|e| {
                    QuarryError::config(format!(
                        "project '{project_name}', backend '{backend}': \
                         expected a list of strings ({e})"
                    ))
                })?;
                let backend = BackendName::new(backend);
                let repos = repos
                    .into_iter()
                    .map(|r| RepositoryRef::new(backend.clone(), r))
                    .collect();
                grouped.push((backend, repos));
            }

            projects.push(Project {
                name: project_name,
                backends: grouped,
            });
        }

        Ok(Self { projects })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// All repositories of one backend, across projects, in catalog order.
    pub fn repositories<'a>(
        &'a self,
        backend: &'a BackendName,
    ) -> impl Iterator<Item = &'a RepositoryRef> + 'a {
        self.projects
            .iter()
            .flat_map(|p| p.backends.iter())
            .filter(move |(name, _)| name == backend)
            .flat_map(|(_, repos)| repos.iter())
    }

    /// Distinct backend names mentioned anywhere in the catalog, first-seen order.
    pub fn backend_names(&self) -> Vec<&BackendName> {
        let mut seen: Vec<&BackendName> = Vec::new();
        for (name, _) in self.projects.iter().flat_map(|p| p.backends.iter()) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Config snapshot
// ---------------------------------------------------------------------------

/// Immutable configuration snapshot for one orchestration cycle.
#[derive(Debug, Clone)]
pub struct Config {
    pub general: GeneralSettings,
    /// Data store receiving raw items.
    pub collection_store: Url,
    /// Data store receiving enriched items.
    pub enrichment_store: Url,
    pub phases: PhaseSettings,
    pub identity_store: IdentityStoreSettings,
    pub bridge: BridgeSettings,
    /// Backend sections present in the settings file.
    pub backends: BTreeMap<BackendName, BackendSettings>,
    /// Location of the project catalog, passed on to enrichment.
    pub projects_file: PathBuf,
    pub catalog: ProjectCatalog,
}

impl Config {
    /// Settings of one backend, or a skip-worthy error if the section is missing.
    pub fn backend(&self, name: &BackendName) -> Result<&BackendSettings> {
        self.backends
            .get(name)
            .ok_or_else(|| QuarryError::missing_setting(name.as_str(), "raw_index"))
    }

    pub fn has_backend(&self, name: &BackendName) -> bool {
        self.backends.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the settings file and the project catalog it references.
///
/// A relative `projects_file` resolves against the settings file's directory.
pub fn load_config_from(path: &Path) -> Result<Config> {
    tracing::debug!(?path, "reading configuration");
    let content = std::fs::read_to_string(path).map_err(|e| QuarryError::io(path, e))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let config = parse_config(&content, base_dir)?;

    tracing::debug!(
        backends = ?config.backends.keys().map(BackendName::as_str).collect::<Vec<_>>(),
        projects = config.catalog.projects().len(),
        "configuration loaded"
    );

    Ok(config)
}

/// Parse settings from a TOML string, reading the catalog relative to `base_dir`.
pub fn parse_config(content: &str, base_dir: &Path) -> Result<Config> {
    let file: ConfigFile = toml::from_str(content)
        .map_err(|e| QuarryError::config(format!("failed to parse settings: {e}")))?;

    let projects_file = if file.projects.projects_file.is_absolute() {
        file.projects.projects_file
    } else {
        base_dir.join(file.projects.projects_file)
    };

    let catalog_content = std::fs::read_to_string(&projects_file)
        .map_err(|e| QuarryError::io(&projects_file, e))?;
    let catalog = ProjectCatalog::from_json(&catalog_content)?;

    let backends = file
        .backends
        .into_iter()
        .map(|(name, settings)| (BackendName::new(name), settings))
        .collect();

    Ok(Config {
        general: file.general,
        collection_store: file.es_collection.url,
        enrichment_store: file.es_enrichment.url,
        phases: file.phases,
        identity_store: file.sortinghat,
        bridge: file.bridge,
        backends,
        projects_file,
        catalog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
[general]
sleep = 5
round_limit = 3

[es_collection]
url = "http://localhost:9200"

[es_enrichment]
url = "http://localhost:9201"

[projects]
projects_file = "projects.json"

[sortinghat]
database = "sh"
host = "localhost"
user = "root"
password = "secret"

[phases]
collection = true
identities = false
enrichment = true
studies = false

[git]
raw_index = "git_raw"
enriched_index = "git_enriched"

[github]
raw_index = "github_raw"
enriched_index = "github_enriched"
token = "T"
"#;

    const PROJECTS: &str = r#"{
        "zeta": {"git": ["https://example.org/z.git"]},
        "alpha": {
            "github": ["https://github.com/acme/widgets"],
            "git": ["https://example.org/a.git", "https://example.org/b.git"]
        }
    }"#;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quarry-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn loads_settings_and_catalog() {
        let dir = temp_dir();
        std::fs::write(dir.join("quarry.toml"), SETTINGS).expect("write settings");
        std::fs::write(dir.join("projects.json"), PROJECTS).expect("write projects");

        let config = load_config_from(&dir.join("quarry.toml")).expect("load");

        assert_eq!(config.general.sleep, 5);
        assert_eq!(config.general.round_limit, 3);
        assert_eq!(config.general.task_jitter_secs, 20);
        assert_eq!(config.collection_store.as_str(), "http://localhost:9200/");
        assert!(config.phases.collection);
        assert!(!config.phases.identities);
        assert_eq!(config.identity_store.database, "sh");
        assert_eq!(config.projects_file, dir.join("projects.json"));
        assert_eq!(config.backends.len(), 2);

        let github = config.backend(&BackendName::from("github")).expect("github section");
        assert_eq!(github.token.as_deref(), Some("T"));
        assert_eq!(config.bridge.command, "quarry-bridge");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn catalog_preserves_file_order() {
        let catalog = ProjectCatalog::from_json(PROJECTS).expect("parse");
        let names: Vec<&str> = catalog.projects().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let git = BackendName::from("git");
        let repos: Vec<&str> = catalog
            .repositories(&git)
            .map(|r| r.reference.as_str())
            .collect();
        assert_eq!(
            repos,
            vec![
                "https://example.org/z.git",
                "https://example.org/a.git",
                "https://example.org/b.git"
            ]
        );

        let backends: Vec<&str> = catalog.backend_names().iter().map(|b| b.as_str()).collect();
        assert_eq!(backends, vec!["git", "github"]);
    }

    #[test]
    fn catalog_rejects_non_list_repositories() {
        let err = ProjectCatalog::from_json(r#"{"p": {"git": "https://example.org/r.git"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("expected a list of strings"));
    }

    #[test]
    fn missing_backend_section_is_a_skip() {
        let dir = temp_dir();
        std::fs::write(dir.join("projects.json"), "{}").expect("write projects");
        let config = parse_config(SETTINGS, &dir).expect("parse");

        let err = config.backend(&BackendName::from("gerrit")).unwrap_err();
        assert!(err.is_repository_skip());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_store_section_fails() {
        let dir = temp_dir();
        let broken = SETTINGS.replace("[es_enrichment]\nurl = \"http://localhost:9201\"\n", "");
        let err = parse_config(&broken, &dir).unwrap_err();
        assert!(err.to_string().contains("es_enrichment"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let settings = BackendSettings {
            raw_index: "r".into(),
            enriched_index: "e".into(),
            token: Some("super-secret".into()),
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn store_requirements_follow_phases() {
        let collection_only = PhaseSettings {
            collection: true,
            ..Default::default()
        };
        assert!(collection_only.needs_collection_store());
        assert!(!collection_only.needs_enrichment_store());

        let studies = PhaseSettings {
            studies: true,
            ..Default::default()
        };
        assert!(studies.needs_collection_store());
        assert!(studies.needs_enrichment_store());
    }
}
