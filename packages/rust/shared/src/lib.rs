//! Shared types, error model, and configuration for Quarry.
//!
//! This crate is the foundation depended on by all other Quarry crates.
//! It provides:
//! - [`QuarryError`], the unified error type
//! - Domain types ([`BackendName`], [`RepositoryRef`], [`Phase`], [`CycleId`])
//! - Configuration ([`Config`], [`ProjectCatalog`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BackendSettings, BridgeSettings, Config, GeneralSettings, IdentityStoreSettings,
    PhaseSettings, Project, ProjectCatalog, load_config_from, parse_config,
};
pub use error::{QuarryError, Result};
pub use types::{BackendName, CycleId, Phase, RepositoryRef};
