//! In-memory fakes for the session ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::{Endpoint, ResourceSpec, SecretEnv};
use tokio::sync::Mutex;

use crate::session_ports::{
    ContainerEngine, DatabaseClient, DatabaseConnection, SessionClock, StatusVariable,
};

pub(crate) fn test_endpoint() -> Endpoint {
    Endpoint::local("root", "test-password")
}

pub(crate) fn test_resource_spec(license: Option<&str>) -> ResourceSpec {
    ResourceSpec {
        name: "db-container".to_owned(),
        image: "ghcr.io/singlestore-labs/singlestoredb-dev".to_owned(),
        env: vec![("ROOT_PASSWORD".to_owned(), "test-password".to_owned())],
        secrets: vec![SecretEnv::new(
            "SINGLESTORE_LICENSE",
            license.map(str::to_owned),
        )],
        ports: ResourceSpec::default_ports(),
    }
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    calls: Mutex<Vec<String>>,
    log_requests: Mutex<u32>,
    log: Option<String>,
    start_error: Option<fn() -> HarnessError>,
    stop_error: Option<fn() -> HarnessError>,
}

impl FakeEngine {
    pub(crate) fn with_log(log: &str) -> Self {
        Self {
            log: Some(log.to_owned()),
            ..Self::default()
        }
    }

    pub(crate) fn failing_start(error: fn() -> HarnessError) -> Self {
        Self {
            start_error: Some(error),
            log: Some("container log".to_owned()),
            ..Self::default()
        }
    }

    pub(crate) fn failing_stop(error: fn() -> HarnessError) -> Self {
        Self {
            stop_error: Some(error),
            log: Some("container log".to_owned()),
            ..Self::default()
        }
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn log_requests(&self) -> u32 {
        *self.log_requests.lock().await
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn start(&self, spec: &ResourceSpec) -> HarnessResult<()> {
        self.calls.lock().await.push(format!("start:{}", spec.name));
        match self.start_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn stop(&self, name: &str) -> HarnessResult<()> {
        self.calls.lock().await.push(format!("stop:{name}"));
        match self.stop_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn remove(&self, name: &str) -> HarnessResult<()> {
        self.calls.lock().await.push(format!("remove:{name}"));
        Ok(())
    }

    async fn logs(&self, _name: &str) -> HarnessResult<String> {
        *self.log_requests.lock().await += 1;
        self.log
            .clone()
            .ok_or_else(|| HarnessError::Internal("no such container".to_owned()))
    }
}

pub(crate) struct FakeClient {
    failures_before_success: u32,
    attempts: Mutex<u32>,
    status: Vec<StatusVariable>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeClient {
    pub(crate) fn healthy() -> Self {
        Self::failing_first(0)
    }

    pub(crate) fn failing_first(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            attempts: Mutex::new(0),
            status: Vec::new(),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_status(status: Vec<StatusVariable>) -> Self {
        Self {
            status,
            ..Self::healthy()
        }
    }

    pub(crate) async fn connect_attempts(&self) -> u32 {
        *self.attempts.lock().await
    }

    pub(crate) async fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().await.clone()
    }
}

#[async_trait]
impl DatabaseClient for FakeClient {
    async fn connect(&self, _endpoint: &Endpoint) -> HarnessResult<Arc<dyn DatabaseConnection>> {
        let mut attempts = self.attempts.lock().await;
        *attempts += 1;
        if *attempts <= self.failures_before_success {
            return Err(HarnessError::Internal("connection refused".to_owned()));
        }

        let connection = Arc::new(FakeConnection::with_status(self.status.clone()));
        self.connections.lock().await.push(connection.clone());
        Ok(connection)
    }
}

#[derive(Default)]
pub(crate) struct FakeConnection {
    statements: Mutex<Vec<String>>,
    status: Vec<StatusVariable>,
    status_queries: Mutex<u32>,
    closed: Mutex<bool>,
    failing_statement_prefix: Option<&'static str>,
}

impl FakeConnection {
    pub(crate) fn with_status(status: Vec<StatusVariable>) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub(crate) fn failing_on(prefix: &'static str) -> Self {
        Self {
            failing_statement_prefix: Some(prefix),
            ..Self::default()
        }
    }

    pub(crate) async fn statements(&self) -> Vec<String> {
        self.statements.lock().await.clone()
    }

    pub(crate) async fn status_queries(&self) -> u32 {
        *self.status_queries.lock().await
    }

    pub(crate) async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }

    pub(crate) async fn kill(&self) {
        *self.closed.lock().await = true;
    }
}

#[async_trait]
impl DatabaseConnection for FakeConnection {
    async fn execute(&self, statement: &str) -> HarnessResult<u64> {
        if *self.closed.lock().await {
            return Err(HarnessError::ConnectionLost(
                "connection already closed".to_owned(),
            ));
        }

        self.statements.lock().await.push(statement.to_owned());
        match self.failing_statement_prefix {
            Some(prefix) if statement.starts_with(prefix) => Err(HarnessError::Internal(format!(
                "statement rejected: {statement}"
            ))),
            _ => Ok(0),
        }
    }

    async fn fetch_status(&self) -> HarnessResult<Vec<StatusVariable>> {
        *self.status_queries.lock().await += 1;
        Ok(self.status.clone())
    }

    async fn is_alive(&self) -> bool {
        !*self.closed.lock().await
    }

    async fn close(&self) -> HarnessResult<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub(crate) async fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().await.clone()
    }
}

#[async_trait]
impl SessionClock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().await.push(duration);
    }
}
