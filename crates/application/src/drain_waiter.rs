//! Best-effort wait for other workers to disconnect before teardown.

use std::sync::Arc;
use std::time::Duration;

use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::Endpoint;
use tracing::{debug, info, warn};

use crate::diagnostics::capture_resource_log;
use crate::session_ports::{
    ContainerEngine, DatabaseClient, DatabaseConnection, SessionClock, StatusVariable,
    THREADS_CONNECTED_STATUS,
};

/// Poll budget for the drain wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    /// Number of connection-count polls.
    pub max_attempts: u32,
    /// Pause after each poll.
    pub poll_interval: Duration,
}

impl DrainConfig {
    /// Creates a drain configuration.
    pub fn new(max_attempts: u32, poll_interval: Duration) -> HarnessResult<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::Validation(
                "drain max_attempts must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            poll_interval,
        })
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// What the drain wait observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Polls performed on the heartbeat connection.
    pub polls: u32,
    /// Connection count reported by the last successful poll, heartbeat included.
    pub last_connection_count: Option<u32>,
}

/// Polls the shared resource's connection count for a bounded time.
///
/// Runs the full poll budget and never proves that other workers are gone;
/// teardown latency stays bounded at `max_attempts * poll_interval`.
#[derive(Clone)]
pub struct DrainWaiter {
    client: Arc<dyn DatabaseClient>,
    engine: Arc<dyn ContainerEngine>,
    clock: Arc<dyn SessionClock>,
    config: DrainConfig,
}

impl DrainWaiter {
    /// Creates a drain waiter.
    #[must_use]
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        engine: Arc<dyn ContainerEngine>,
        clock: Arc<dyn SessionClock>,
        config: DrainConfig,
    ) -> Self {
        Self {
            client,
            engine,
            clock,
            config,
        }
    }

    /// Waits on a dedicated heartbeat connection. Failures are logged, never returned.
    pub async fn wait(&self, endpoint: &Endpoint, resource_name: &str) -> DrainOutcome {
        let heartbeat = match self.client.connect(endpoint).await {
            Ok(connection) => connection,
            Err(error) => {
                warn!(
                    endpoint = %endpoint,
                    error = %error,
                    "failed to open heartbeat connection; skipping drain wait"
                );
                capture_resource_log(self.engine.as_ref(), resource_name).await;
                return DrainOutcome {
                    polls: 0,
                    last_connection_count: None,
                };
            }
        };

        let mut outcome = DrainOutcome {
            polls: 0,
            last_connection_count: None,
        };

        for attempt in 0..self.config.max_attempts {
            let connections = open_connections(heartbeat.as_ref()).await;
            outcome.polls += 1;
            if connections.is_some() {
                outcome.last_connection_count = connections;
            }

            match connections {
                Some(count) => debug!(
                    others = count.saturating_sub(1),
                    attempt, "waiting for other connections to close"
                ),
                None => debug!(attempt, "waiting for other connections to close (count unknown)"),
            }
            self.clock.sleep(self.config.poll_interval).await;
        }

        warn!(
            attempts = self.config.max_attempts,
            "timed out while waiting for other connections to close"
        );
        capture_resource_log(self.engine.as_ref(), resource_name).await;

        if let Err(error) = heartbeat.close().await {
            warn!(error = %error, "failed to close heartbeat connection");
        }

        outcome
    }
}

/// Reads the open connection count from the extended status listing.
async fn open_connections(connection: &dyn DatabaseConnection) -> Option<u32> {
    let rows = match connection.fetch_status().await {
        Ok(rows) => rows,
        Err(error) => {
            warn!(error = %error, "failed to read server status");
            return None;
        }
    };

    for row in &rows {
        info!(name = %row.name, value = %row.value, "server status");
    }

    connection_count(&rows)
}

fn connection_count(rows: &[StatusVariable]) -> Option<u32> {
    rows.iter()
        .find(|row| row.name == THREADS_CONNECTED_STATUS)
        .and_then(|row| row.value.trim().parse::<u32>().ok())
}
