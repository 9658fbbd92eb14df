//! Collaborator interfaces the Tasks call into.
//!
//! Fetching raw items, enriching them and managing identities are done by
//! external services. Each call carries one request struct with everything
//! the collaborator needs for one repository.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use quarry_shared::{BackendName, IdentityStoreSettings, Result};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Fetch raw items of one repository into the collection store.
#[derive(Debug, Clone, Serialize)]
pub struct FetchRequest {
    pub store_url: String,
    pub clean: bool,
    pub fetch_cache: bool,
    pub backend: BackendName,
    pub backend_args: Vec<String>,
    pub raw_index: String,
    pub enriched_index: String,
    pub repository: String,
    /// Wall-clock bound of the phase this call belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Turn raw items of one repository into enriched items.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichRequest {
    pub collection_store_url: String,
    pub clean: bool,
    pub backend: BackendName,
    pub backend_args: Vec<String>,
    pub raw_index: String,
    pub enriched_index: String,
    pub projects_file: PathBuf,
    pub identity_store: IdentityStoreSettings,
    pub no_incremental: bool,
    /// Only extract identities; do not write enriched items.
    pub only_identities: bool,
    pub studies_enabled: bool,
    pub only_studies: bool,
    pub enrichment_store_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Load identities found in one repository's raw items into the identity store.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityLoadRequest {
    pub backend: BackendName,
    pub repository: String,
    pub raw_index: String,
    pub collection_store_url: String,
    pub identity_store: IdentityStoreSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Merge identities (and optionally affiliate them) for one repository.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityUnifyRequest {
    pub backend: BackendName,
    pub repository: String,
    pub affiliate: bool,
    pub autoprofile: bool,
    pub identity_store: IdentityStoreSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CollectionService: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<()>;
}

#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn transform(&self, request: EnrichRequest) -> Result<()>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn load(&self, request: IdentityLoadRequest) -> Result<()>;
    async fn unify(&self, request: IdentityUnifyRequest) -> Result<()>;
}

/// The collaborators handed to every Task.
#[derive(Clone)]
pub struct Services {
    pub collection: Arc<dyn CollectionService>,
    pub enrichment: Arc<dyn EnrichmentService>,
    pub identities: Arc<dyn IdentityService>,
}

impl Services {
    /// Use one value for all three collaborators.
    pub fn from_shared<S>(service: Arc<S>) -> Self
    where
        S: CollectionService + EnrichmentService + IdentityService + 'static,
    {
        Self {
            collection: service.clone(),
            enrichment: service.clone(),
            identities: service,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
