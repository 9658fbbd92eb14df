//! Grouping of catalog repositories by backend.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use quarry_backends::BackendRegistry;
use quarry_shared::{BackendName, Config, RepositoryRef};

/// Repositories grouped by backend; each entry becomes one lane.
///
/// Built once per cycle before any lane starts and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    lanes: Vec<(BackendName, Arc<[RepositoryRef]>)>,
}

impl Partition {
    /// Group the catalog by backend.
    ///
    /// Only backends that are registered, present in the catalog and have a
    /// settings section are kept. Backends follow registry order; repositories
    /// follow catalog order with exact duplicates removed.
    pub fn build(config: &Config, registry: &BackendRegistry) -> Self {
        let mut lanes: Vec<(BackendName, Arc<[RepositoryRef]>)> = Vec::new();

        for backend in registry.names() {
            let mut seen = HashSet::new();
            let repos: Vec<RepositoryRef> = config
                .catalog
                .repositories(&backend)
                .filter(|r| seen.insert(r.reference.as_str()))
                .cloned()
                .collect();

            if repos.is_empty() {
                continue;
            }

            if !config.has_backend(&backend) {
                debug!(
                    %backend,
                    repos = repos.len(),
                    "backend in catalog but not enabled in settings"
                );
                continue;
            }

            lanes.push((backend, Arc::from(repos)));
        }

        for backend in config.catalog.backend_names() {
            if !registry.contains(backend) {
                warn!(%backend, "backend in catalog is not registered, ignoring its repositories");
            }
        }

        debug!(
            backends = lanes.len(),
            repos = lanes.iter().map(|(_, r)| r.len()).sum::<usize>(),
            "repositories partitioned by backend"
        );

        Self { lanes }
    }

    /// `(backend, repositories)` pairs in lane order.
    pub fn iter(&self) -> impl Iterator<Item = (&BackendName, &Arc<[RepositoryRef]>)> {
        self.lanes.iter().map(|(b, r)| (b, r))
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendName> {
        self.lanes.iter().map(|(b, _)| b)
    }

    pub fn get(&self, backend: &BackendName) -> Option<&[RepositoryRef]> {
        self.lanes
            .iter()
            .find(|(b, _)| b == backend)
            .map(|(_, r)| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn repository_count(&self) -> usize {
        self.lanes.iter().map(|(_, r)| r.len()).sum()
    }
}
