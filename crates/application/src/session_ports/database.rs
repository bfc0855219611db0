use std::sync::Arc;

use async_trait::async_trait;
use dbsession_core::HarnessResult;
use dbsession_domain::Endpoint;

/// Status key whose value is the number of open client connections.
pub const THREADS_CONNECTED_STATUS: &str = "Threads_connected";

/// One row of the server status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVariable {
    /// Status variable name.
    pub name: String,
    /// Raw status value.
    pub value: String,
}

impl StatusVariable {
    /// Creates one status row.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Database client port used to open connections to the shared resource.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Opens one connection to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> HarnessResult<Arc<dyn DatabaseConnection>>;
}

/// One open connection to the shared resource.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Executes one statement and returns the number of affected rows.
    async fn execute(&self, statement: &str) -> HarnessResult<u64>;

    /// Returns the extended server status listing.
    async fn fetch_status(&self) -> HarnessResult<Vec<StatusVariable>>;

    /// Returns whether the connection still answers.
    async fn is_alive(&self) -> bool;

    /// Closes the connection. Later calls fail.
    async fn close(&self) -> HarnessResult<()>;
}
