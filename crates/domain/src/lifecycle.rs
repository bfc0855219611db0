use serde::{Deserialize, Serialize};

/// Status of the shared resource as seen by one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Nothing has been provisioned by this session yet.
    NotStarted,
    /// Provisioning command issued; readiness not yet confirmed.
    Starting,
    /// Resource accepts connections.
    Ready,
    /// Waiting for other workers' connections to close before teardown.
    Draining,
    /// Resource stopped and removed.
    Stopped,
}

impl LifecycleStatus {
    /// Returns stable log value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Returns whether `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Ready)
                | (Self::Ready, Self::Draining)
                | (Self::Ready, Self::Stopped)
                | (Self::Draining, Self::Stopped)
        )
    }
}
