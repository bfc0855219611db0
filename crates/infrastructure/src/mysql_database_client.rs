//! MySQL wire-protocol client for the shared database instance.

use std::sync::Arc;

use async_trait::async_trait;
use dbsession_application::{DatabaseClient, DatabaseConnection, StatusVariable};
use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::Endpoint;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor, Row};
use tokio::sync::Mutex;

const STATUS_QUERY: &str = "SHOW STATUS EXTENDED";

/// Opens single MySQL connections with sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDatabaseClient;

impl MySqlDatabaseClient {
    /// Creates a client.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseClient for MySqlDatabaseClient {
    async fn connect(&self, endpoint: &Endpoint) -> HarnessResult<Arc<dyn DatabaseConnection>> {
        let options = MySqlConnectOptions::new()
            .host(endpoint.host.as_str())
            .port(endpoint.port)
            .username(endpoint.user.as_str())
            .password(endpoint.password.as_str());

        let connection = MySqlConnection::connect_with(&options)
            .await
            .map_err(|error| {
                HarnessError::Internal(format!(
                    "failed to connect to database at {endpoint}: {error}"
                ))
            })?;

        Ok(Arc::new(MySqlDatabaseConnection::new(connection)))
    }
}

/// One sqlx MySQL connection behind an async lock.
///
/// Statements run over the text protocol, so `USE` and DDL work unprepared.
pub struct MySqlDatabaseConnection {
    inner: Mutex<Option<MySqlConnection>>,
}

impl MySqlDatabaseConnection {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(connection: MySqlConnection) -> Self {
        Self {
            inner: Mutex::new(Some(connection)),
        }
    }
}

fn closed() -> HarnessError {
    HarnessError::ConnectionLost("database connection is closed".to_owned())
}

#[async_trait]
impl DatabaseConnection for MySqlDatabaseConnection {
    async fn execute(&self, statement: &str) -> HarnessResult<u64> {
        let mut guard = self.inner.lock().await;
        let connection = guard.as_mut().ok_or_else(closed)?;

        let result = connection.execute(statement).await.map_err(|error| {
            HarnessError::Internal(format!("failed to execute '{statement}': {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn fetch_status(&self) -> HarnessResult<Vec<StatusVariable>> {
        let mut guard = self.inner.lock().await;
        let connection = guard.as_mut().ok_or_else(closed)?;

        let rows = connection.fetch_all(STATUS_QUERY).await.map_err(|error| {
            HarnessError::Internal(format!("failed to read server status: {error}"))
        })?;

        rows.iter()
            .map(|row| {
                let name = row.try_get::<String, _>(0).map_err(|error| {
                    HarnessError::Internal(format!("invalid status variable name: {error}"))
                })?;
                let value = row.try_get::<Option<String>, _>(1).map_err(|error| {
                    HarnessError::Internal(format!("invalid status value for '{name}': {error}"))
                })?;
                Ok(StatusVariable::new(name, value.unwrap_or_default()))
            })
            .collect()
    }

    async fn is_alive(&self) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            Some(connection) => connection.ping().await.is_ok(),
            None => false,
        }
    }

    async fn close(&self) -> HarnessResult<()> {
        let Some(connection) = self.inner.lock().await.take() else {
            return Ok(());
        };

        connection.close().await.map_err(|error| {
            HarnessError::Internal(format!("failed to close database connection: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use dbsession_application::{DatabaseClient, THREADS_CONNECTED_STATUS};
    use dbsession_domain::Endpoint;

    use super::MySqlDatabaseClient;

    fn test_endpoint() -> Option<Endpoint> {
        let password = std::env::var("DBSESSION_TEST_DATABASE_PASSWORD").ok()?;
        Some(Endpoint::local("root", password))
    }

    #[tokio::test]
    async fn live_connection_reports_status_and_closes() {
        let Some(endpoint) = test_endpoint() else {
            return;
        };

        let connection = MySqlDatabaseClient::new().connect(&endpoint).await;
        let connection = match connection {
            Ok(connection) => connection,
            Err(error) => panic!("failed to connect to test database: {error}"),
        };
        assert!(connection.is_alive().await);

        let status = connection.fetch_status().await;
        assert!(status.is_ok());
        let status = status.unwrap_or_default();
        assert!(
            status
                .iter()
                .any(|row| row.name == THREADS_CONNECTED_STATUS)
        );

        assert!(connection.close().await.is_ok());
        assert!(!connection.is_alive().await);
        assert!(connection.execute("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn live_workspace_round_trip() {
        let Some(endpoint) = test_endpoint() else {
            return;
        };

        let connection = match MySqlDatabaseClient::new().connect(&endpoint).await {
            Ok(connection) => connection,
            Err(error) => panic!("failed to connect to test database: {error}"),
        };
        let identity = dbsession_domain::WorkerIdentity::new("live");
        assert!(identity.is_ok());
        let allocator = identity.and_then(|identity| {
            dbsession_domain::NameAllocator::new(
                format!("x_db_{}", std::process::id()),
                identity,
            )
        });
        assert!(allocator.is_ok());
        let mut allocator = allocator.unwrap_or_else(|_| unreachable!());

        let inserted = dbsession_application::with_workspace(
            connection.clone(),
            &mut allocator,
            |workspace| async move {
                workspace
                    .execute("CREATE TABLE t2 (dt BIGINT, str_dt VARCHAR(64))")
                    .await?;
                workspace
                    .execute("INSERT INTO t2 VALUES (1, 'a'), (2, 'b')")
                    .await
            },
        )
        .await;

        assert_eq!(inserted.ok(), Some(2));
        assert!(connection.close().await.is_ok());
    }
}
