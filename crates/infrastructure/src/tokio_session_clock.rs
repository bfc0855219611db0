use std::time::Duration;

use async_trait::async_trait;
use dbsession_application::SessionClock;

/// Clock that suspends on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSessionClock;

#[async_trait]
impl SessionClock for TokioSessionClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
