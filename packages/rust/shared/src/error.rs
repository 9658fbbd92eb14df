//! Error types for Quarry.
//!
//! Library crates use [`QuarryError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Quarry operations.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Network/HTTP error outside the store probe.
    #[error("network error: {0}")]
    Network(String),

    /// A data store required by the enabled phases did not answer with 200.
    #[error("Is the data store for {store} accessible? {url}: {reason}")]
    StoreUnavailable {
        store: String,
        url: String,
        reason: String,
    },

    /// A repository reference could not be turned into backend arguments.
    #[error("malformed repository reference '{reference}': {reason}")]
    MalformedReference { reference: String, reason: String },

    /// A key the active backend needs is absent from the configuration.
    #[error("missing setting '{key}' for backend '{backend}'")]
    MissingSetting { backend: String, key: String },

    /// The backend name is not present in the backend registry.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// An external collect/enrich/identity collaborator reported a failure.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(
        store: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed-reference error.
    pub fn malformed_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-setting error.
    pub fn missing_setting(backend: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingSetting {
            backend: backend.into(),
            key: key.into(),
        }
    }

    /// Whether this error means "skip this repository" rather than a failed call.
    ///
    /// Skips come from configuration or reference problems detected before any
    /// collaborator is invoked.
    pub fn is_repository_skip(&self) -> bool {
        matches!(
            self,
            Self::MalformedReference { .. } | Self::MissingSetting { .. } | Self::UnknownBackend(_)
        )
    }
}
