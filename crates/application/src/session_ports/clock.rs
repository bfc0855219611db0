use std::time::Duration;

use async_trait::async_trait;

/// Suspension port used between retry and poll attempts.
#[async_trait]
pub trait SessionClock: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}
