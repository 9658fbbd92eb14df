//! Subprocess bridge implementing the collaborators.
//!
//! Every collaborator call spawns the configured bridge command with the
//! operation name as its last argument, writes one JSON request line to its
//! stdin and waits for it to exit. Exit status 0 means success; anything else
//! is reported with the tail of the bridge's stderr.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use quarry_shared::{BridgeSettings, QuarryError, Result};

use crate::services::{
    CollectionService, EnrichRequest, EnrichmentService, FetchRequest, IdentityLoadRequest,
    IdentityService, IdentityUnifyRequest,
};

/// How much of the bridge's stderr is kept in error messages.
const STDERR_TAIL_BYTES: usize = 512;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Request line written to the bridge's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Fetch(&'a FetchRequest),
    Transform(&'a EnrichRequest),
    IdentitiesLoad(&'a IdentityLoadRequest),
    IdentitiesUnify(&'a IdentityUnifyRequest),
}

impl BridgeRequest<'_> {
    fn operation(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Transform(_) => "transform",
            Self::IdentitiesLoad(_) => "identities_load",
            Self::IdentitiesUnify(_) => "identities_unify",
        }
    }
}

// ---------------------------------------------------------------------------
// CommandBridge
// ---------------------------------------------------------------------------

/// Collaborator implementation backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    command: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandBridge {
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }

    #[instrument(skip_all, fields(command = %self.command, operation = request.operation()))]
    async fn call(&self, request: BridgeRequest<'_>) -> Result<()> {
        let operation = request.operation();
        let line = serde_json::to_string(&request).map_err(|e| {
            QuarryError::Collaborator(format!("failed to serialize {operation} request: {e}"))
        })?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                QuarryError::Collaborator(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    self.command
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            QuarryError::Collaborator("failed to capture bridge stdin".into())
        })?;

        // A bridge may exit without reading its input; its exit status decides.
        if let Err(e) = stdin.write_all(format!("{line}\n").as_bytes()).await {
            debug!(error = %e, "bridge did not accept the request line");
        }
        drop(stdin);

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    QuarryError::Collaborator(format!(
                        "{operation} timed out after {}s",
                        limit.as_secs()
                    ))
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited
            .map_err(|e| QuarryError::Collaborator(format!("bridge wait failed: {e}")))?;

        if output.status.success() {
            debug!("bridge call succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(QuarryError::Collaborator(format!(
            "{operation} exited with {}: {}",
            output.status,
            stderr_tail(&stderr)
        )))
    }
}

#[async_trait]
impl CollectionService for CommandBridge {
    async fn fetch(&self, request: FetchRequest) -> Result<()> {
        self.call(BridgeRequest::Fetch(&request)).await
    }
}

#[async_trait]
impl EnrichmentService for CommandBridge {
    async fn transform(&self, request: EnrichRequest) -> Result<()> {
        self.call(BridgeRequest::Transform(&request)).await
    }
}

#[async_trait]
impl IdentityService for CommandBridge {
    async fn load(&self, request: IdentityLoadRequest) -> Result<()> {
        self.call(BridgeRequest::IdentitiesLoad(&request)).await
    }

    async fn unify(&self, request: IdentityUnifyRequest) -> Result<()> {
        self.call(BridgeRequest::IdentitiesUnify(&request)).await
    }
}

/// Last few hundred bytes of stderr, cut on a char boundary.
fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed;
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}
