//! Forge-API backend for GitHub.
//!
//! References are either full URLs (`https://github.com/owner/name`) or the
//! `owner/name` shorthand. The API token comes from the `[github]` section.

use quarry_shared::{BackendSettings, QuarryError, RepositoryRef, Result};
use url::Url;

use super::ParameterBuilder;

/// Flag asking the fetch adapter to sleep when the API rate limit is exhausted.
const SLEEP_FOR_RATE_FLAG: &str = "--sleep-for-rate";

/// GitHub issues/pull requests backend.
pub struct GitHubBackend;

impl ParameterBuilder for GitHubBackend {
    fn name(&self) -> &str {
        "github"
    }

    fn build(&self, repo: &RepositoryRef, settings: &BackendSettings) -> Result<Vec<String>> {
        let (owner, name) = split_owner_repo(&repo.reference)?;
        let token = settings
            .token
            .as_deref()
            .ok_or_else(|| QuarryError::missing_setting(self.name(), "token"))?;

        Ok(vec![
            "--owner".into(),
            owner,
            "--repository".into(),
            name,
            SLEEP_FOR_RATE_FLAG.into(),
            "-t".into(),
            token.into(),
        ])
    }
}

/// Split a forge reference into `(owner, repository)`.
///
/// Exactly two non-empty path segments are required; a trailing `.git` is dropped.
fn split_owner_repo(reference: &str) -> Result<(String, String)> {
    let path = match Url::parse(reference) {
        Ok(url) => url.path().to_string(),
        // Not a URL: treat the whole reference as `owner/name`.
        Err(_) => reference.to_string(),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [owner, name] => {
            let name = name.strip_suffix(".git").unwrap_or(name);
            if name.is_empty() {
                return Err(QuarryError::malformed_reference(
                    reference,
                    "repository name is empty",
                ));
            }
            Ok(((*owner).to_string(), name.to_string()))
        }
        _ => Err(QuarryError::malformed_reference(
            reference,
            format!("expected owner/repository, found {} path segment(s)", segments.len()),
        )),
    }
}
