//! Backend parameter builders and the backend registry.
//!
//! Each backend knows how to turn a catalog reference into the argument list
//! its external fetch/enrich adapter expects. The [`BackendRegistry`] is the
//! set of valid backend names; adding a backend means registering a
//! [`ParameterBuilder`] here and giving it a section in the settings file.

mod git;
mod github;

use quarry_shared::{BackendName, BackendSettings, QuarryError, RepositoryRef, Result};

pub use git::GitBackend;
pub use github::GitHubBackend;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Translates a repository reference into backend-specific invocation arguments.
///
/// Implementations must be deterministic: the same reference and settings
/// always yield the same arguments.
pub trait ParameterBuilder: Send + Sync {
    /// Backend name this builder answers for.
    fn name(&self) -> &str;

    /// Build the ordered argument list for one repository.
    fn build(&self, repo: &RepositoryRef, settings: &BackendSettings) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered backends in registration order.
pub struct BackendRegistry {
    builders: Vec<Box<dyn ParameterBuilder>>,
}

impl BackendRegistry {
    /// Create a registry with the built-in backends.
    pub fn new() -> Self {
        Self {
            builders: vec![Box::new(GitBackend), Box::new(GitHubBackend)],
        }
    }

    /// Create a registry with no backends.
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// Register a backend. A later registration with the same name replaces the earlier one.
    pub fn register(&mut self, builder: Box<dyn ParameterBuilder>) {
        if let Some(slot) = self.builders.iter_mut().find(|b| b.name() == builder.name()) {
            *slot = builder;
        } else {
            self.builders.push(builder);
        }
    }

    /// Look up the builder for a backend name.
    pub fn get(&self, name: &BackendName) -> Option<&dyn ParameterBuilder> {
        self.builders
            .iter()
            .find(|b| b.name() == name.as_str())
            .map(|b| b.as_ref())
    }

    pub fn contains(&self, name: &BackendName) -> bool {
        self.get(name).is_some()
    }

    /// Registered backend names, in registration order.
    pub fn names(&self) -> Vec<BackendName> {
        self.builders.iter().map(|b| BackendName::new(b.name())).collect()
    }

    /// Build invocation arguments for `repo` using its backend's builder.
    pub fn build_params(
        &self,
        repo: &RepositoryRef,
        settings: &BackendSettings,
    ) -> Result<Vec<String>> {
        let builder = self
            .get(&repo.backend)
            .ok_or_else(|| QuarryError::UnknownBackend(repo.backend.to_string()))?;
        let params = builder.build(repo, settings)?;
        tracing::trace!(
            backend = %repo.backend,
            repository = %repo,
            args = params.len(),
            "built backend parameters"
        );
        Ok(params)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.builders.iter().map(|b| b.name()))
            .finish()
    }
}
