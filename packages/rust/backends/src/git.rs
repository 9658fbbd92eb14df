//! Plain version-control backend.

use quarry_shared::{BackendSettings, RepositoryRef, Result};

use super::ParameterBuilder;

/// Git repositories: the reference itself is the only argument.
pub struct GitBackend;

impl ParameterBuilder for GitBackend {
    fn name(&self) -> &str {
        "git"
    }

    fn build(&self, repo: &RepositoryRef, _settings: &BackendSettings) -> Result<Vec<String>> {
        Ok(vec![repo.reference.clone()])
    }
}
