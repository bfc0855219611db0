//! Bounded retrying connect against the shared resource.

use std::sync::Arc;
use std::time::Duration;

use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::Endpoint;
use tracing::{debug, error};

use crate::diagnostics::{capture_resource_log, describe};
use crate::session_ports::{ContainerEngine, DatabaseClient, DatabaseConnection, SessionClock};

/// Retry budget for readiness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Total connection attempts, at least one.
    pub max_attempts: u32,
    /// Pause after each failed attempt except the last.
    pub retry_delay: Duration,
}

impl ProbeConfig {
    /// Creates a probe configuration.
    pub fn new(max_attempts: u32, retry_delay: Duration) -> HarnessResult<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::Validation(
                "readiness probe max_attempts must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            retry_delay,
        })
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Connects to the shared resource, retrying until it answers or the budget runs out.
#[derive(Clone)]
pub struct ReadinessProber {
    client: Arc<dyn DatabaseClient>,
    engine: Arc<dyn ContainerEngine>,
    clock: Arc<dyn SessionClock>,
    config: ProbeConfig,
}

impl ReadinessProber {
    /// Creates a prober.
    #[must_use]
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        engine: Arc<dyn ContainerEngine>,
        clock: Arc<dyn SessionClock>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            client,
            engine,
            clock,
            config: ProbeConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
        }
    }

    /// Opens a live connection; the caller owns and closes it.
    ///
    /// After the final failed attempt the resource log of `resource_name` is
    /// captured once and attached to `HarnessError::ResourceUnavailable`.
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        resource_name: &str,
    ) -> HarnessResult<Arc<dyn DatabaseConnection>> {
        for attempt in 1..self.config.max_attempts {
            match self.client.connect(endpoint).await {
                Ok(connection) => return Ok(connection),
                Err(error) => {
                    debug!(
                        endpoint = %endpoint,
                        attempt,
                        error = %error,
                        "database not available yet"
                    );
                    self.clock.sleep(self.config.retry_delay).await;
                }
            }
        }

        match self.client.connect(endpoint).await {
            Ok(connection) => Ok(connection),
            Err(last_error) => {
                error!(
                    endpoint = %endpoint,
                    attempts = self.config.max_attempts,
                    error = %last_error,
                    "timed out while waiting to connect to database"
                );
                let diagnostics = capture_resource_log(self.engine.as_ref(), resource_name).await;
                Err(HarnessError::ResourceUnavailable {
                    message: format!(
                        "failed to connect to database at {endpoint} after {} attempts: {}",
                        self.config.max_attempts,
                        describe(&last_error)
                    ),
                    diagnostics,
                })
            }
        }
    }
}
