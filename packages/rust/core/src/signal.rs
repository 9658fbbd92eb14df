//! Cooperative stop signal shared by every lane of a phase.

use tokio_util::sync::CancellationToken;

/// Set-once broadcast telling lanes not to start another round.
///
/// Lanes only consult it between rounds; raising it never interrupts a Task
/// or an in-flight collaborator call.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn raise(&self) {
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has been raised.
    pub async fn raised(&self) {
        self.token.cancelled().await
    }

    /// A signal that is raised with this one but can also be raised on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}
