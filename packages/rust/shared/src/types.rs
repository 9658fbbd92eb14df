//! Core domain types for the orchestration pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BackendName
// ---------------------------------------------------------------------------

/// Identifier of a source backend (`git`, `github`, ...).
///
/// Which names are valid is decided by the backend registry, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendName(String);

impl BackendName {
    /// Wrap a backend name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::borrow::Borrow<str> for BackendName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// RepositoryRef
// ---------------------------------------------------------------------------

/// One source repository as listed in the project catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Backend the repository belongs to.
    pub backend: BackendName,
    /// URL or `owner/name` pair, verbatim from the catalog.
    pub reference: String,
}

impl RepositoryRef {
    pub fn new(backend: impl Into<BackendName>, reference: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reference: reference.into(),
        }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One step of the orchestration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Raw collection plus identity loading.
    PrimaryCollection,
    /// Identity merge and affiliation.
    IdentityUnification,
    /// Raw items + identities into enriched items.
    Enrichment,
    /// Timer-bounded re-collection and re-enrichment.
    SteadyState,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryCollection => "primary_collection",
            Self::IdentityUnification => "identity_unification",
            Self::Enrichment => "enrichment",
            Self::SteadyState => "steady_state",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CycleId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one orchestration cycle (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
