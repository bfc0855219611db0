//! Process-scoped test session context.

use std::future::Future;
use std::sync::Arc;

use dbsession_core::HarnessResult;
use dbsession_domain::{
    Endpoint, ExecutionMode, LeaderElection, NameAllocator, ParallelContext, ResourceSpec,
    WorkerIdentity,
};
use tracing::{debug, info};

use crate::drain_waiter::{DrainConfig, DrainWaiter};
use crate::lifecycle_coordinator::{LifecycleHandle, ResourceLifecycleCoordinator};
use crate::readiness_prober::{ProbeConfig, ReadinessProber};
use crate::scoped_workspace::{ScopedWorkspace, Workspace, with_workspace};
use crate::session_ports::{ContainerEngine, DatabaseClient, DatabaseConnection, SessionClock};

/// Everything a session needs to know, read once at process start.
#[derive(Clone)]
pub struct SessionSettings {
    /// Parallel-runner context of this process.
    pub context: ParallelContext,
    /// Leader election rule.
    pub election: Arc<dyn LeaderElection>,
    /// Explicit mode that bypasses resolution, when configured.
    pub mode_override: Option<String>,
    /// Shared resource to provision.
    pub resource: ResourceSpec,
    /// Where the shared resource accepts connections.
    pub endpoint: Endpoint,
    /// Readiness retry budget.
    pub probe: ProbeConfig,
    /// Drain poll budget.
    pub drain: DrainConfig,
    /// Prefix of workspace names.
    pub name_prefix: String,
}

/// Adapters the session drives.
#[derive(Clone)]
pub struct SessionCollaborators {
    /// Container engine.
    pub engine: Arc<dyn ContainerEngine>,
    /// Database client.
    pub client: Arc<dyn DatabaseClient>,
    /// Clock used between retries and polls.
    pub clock: Arc<dyn SessionClock>,
}

/// One test session in one worker process.
///
/// Created once at session start and passed explicitly to whatever needs the
/// shared resource; the execution mode is resolved here and never again.
pub struct SessionContext {
    identity: WorkerIdentity,
    coordinator: ResourceLifecycleCoordinator,
    allocator: NameAllocator,
    connection: Arc<dyn DatabaseConnection>,
}

impl SessionContext {
    /// Resolves the execution mode and brings the shared resource to `Ready`.
    pub async fn establish(
        settings: SessionSettings,
        collaborators: SessionCollaborators,
    ) -> HarnessResult<Self> {
        let identity = settings.context.identity()?;
        let mode = resolve_mode(&settings)?;
        info!(worker = %identity, mode = %mode, "test session starting");

        let allocator = NameAllocator::new(settings.name_prefix.clone(), identity.clone())?;
        let prober = ReadinessProber::new(
            collaborators.client.clone(),
            collaborators.engine.clone(),
            collaborators.clock.clone(),
            settings.probe,
        );
        let drain_waiter = DrainWaiter::new(
            collaborators.client,
            collaborators.engine.clone(),
            collaborators.clock,
            settings.drain,
        );
        let mut coordinator = ResourceLifecycleCoordinator::new(
            mode,
            settings.resource,
            settings.endpoint,
            collaborators.engine,
            prober,
            drain_waiter,
        );

        let connection = coordinator.start().await?;
        debug!(worker = %identity, "connected to database");

        Ok(Self {
            identity,
            coordinator,
            allocator,
            connection,
        })
    }

    /// Returns this worker's identity.
    #[must_use]
    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Returns the resolved execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.coordinator.mode()
    }

    /// Returns the shared resource handle.
    #[must_use]
    pub fn handle(&self) -> &LifecycleHandle {
        self.coordinator.handle()
    }

    /// Returns the session connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn DatabaseConnection> {
        &self.connection
    }

    /// Acquires a workspace guard for one test.
    pub async fn workspace(&mut self) -> HarnessResult<ScopedWorkspace> {
        ScopedWorkspace::acquire(self.connection.clone(), &mut self.allocator).await
    }

    /// Runs one test body inside a fresh workspace.
    pub async fn with_workspace<F, Fut, T>(&mut self, body: F) -> HarnessResult<T>
    where
        F: FnOnce(Workspace) -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
    {
        with_workspace(self.connection.clone(), &mut self.allocator, body).await
    }

    /// Ends the session, tearing the resource down when this process owns it.
    pub async fn finish(self) -> HarnessResult<()> {
        let Self {
            identity,
            mut coordinator,
            connection,
            ..
        } = self;
        info!(worker = %identity, mode = %coordinator.mode(), "test session finishing");
        coordinator.finish(connection).await
    }
}

fn resolve_mode(settings: &SessionSettings) -> HarnessResult<ExecutionMode> {
    if let Some(value) = settings.mode_override.as_deref() {
        let mode = ExecutionMode::parse(value)?;
        debug!(mode = %mode, "execution mode set explicitly");
        return Ok(mode);
    }

    match (settings.context.worker(), settings.context.worker_count()) {
        (Some(worker), Some(worker_count)) => {
            debug!(worker, worker_count, "parallel worker context found");
        }
        _ => debug!("parallel worker context not found"),
    }

    Ok(ExecutionMode::resolve(
        &settings.context,
        settings.election.as_ref(),
    ))
}
