//! Provisioning and teardown of the shared resource per execution mode.

use std::sync::Arc;

use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::{Endpoint, ExecutionMode, LifecycleStatus, ResourceSpec};
use tracing::{debug, info, warn};

use crate::diagnostics::{capture_resource_log, describe};
use crate::drain_waiter::DrainWaiter;
use crate::readiness_prober::ReadinessProber;
use crate::session_ports::{ContainerEngine, DatabaseConnection};


/// Snapshot of the shared resource as this session sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleHandle {
    /// Where the resource accepts connections.
    pub endpoint: Endpoint,
    /// Container name identifying the resource.
    pub resource_name: String,
    /// Current lifecycle status.
    pub status: LifecycleStatus,
}

/// Lifecycle state machine for one session in one process.
///
/// Sequential and leader sessions own the resource. Followers assume the
/// leader brought it to `Ready` and never issue engine lifecycle calls.
pub struct ResourceLifecycleCoordinator {
    mode: ExecutionMode,
    spec: ResourceSpec,
    handle: LifecycleHandle,
    history: Vec<LifecycleStatus>,
    started: bool,
    engine: Arc<dyn ContainerEngine>,
    prober: ReadinessProber,
    drain_waiter: DrainWaiter,
}

impl ResourceLifecycleCoordinator {
    /// Creates a coordinator for an already resolved mode.
    #[must_use]
    pub fn new(
        mode: ExecutionMode,
        spec: ResourceSpec,
        endpoint: Endpoint,
        engine: Arc<dyn ContainerEngine>,
        prober: ReadinessProber,
        drain_waiter: DrainWaiter,
    ) -> Self {
        let status = if mode.owns_lifecycle() {
            LifecycleStatus::NotStarted
        } else {
            LifecycleStatus::Ready
        };

        Self {
            mode,
            handle: LifecycleHandle {
                endpoint,
                resource_name: spec.name.clone(),
                status,
            },
            spec,
            history: Vec::new(),
            started: false,
            engine,
            prober,
            drain_waiter,
        }
    }

    /// Returns the mode this coordinator runs in.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the current resource handle.
    #[must_use]
    pub fn handle(&self) -> &LifecycleHandle {
        &self.handle
    }

    /// Returns every status this coordinator has entered, in order.
    #[must_use]
    pub fn history(&self) -> &[LifecycleStatus] {
        &self.history
    }

    /// Brings the session to `Ready` and returns the session's own connection.
    ///
    /// Owners provision the resource first; followers only connect. Every
    /// error returned here aborts the session before any test runs. A
    /// coordinator starts at most once, in every mode.
    pub async fn start(&mut self) -> HarnessResult<Arc<dyn DatabaseConnection>> {
        if self.started {
            return Err(HarnessError::Internal(format!(
                "{} session for '{}' was already started",
                self.mode, self.spec.name
            )));
        }
        self.started = true;
        self.ensure_preconditions()?;

        match self.mode {
            ExecutionMode::Sequential | ExecutionMode::Leader => {
                info!(
                    mode = %self.mode,
                    container = %self.spec.name,
                    "provisioning shared resource"
                );
                self.transition(LifecycleStatus::Starting)?;
                self.provision().await?;
                let connection = self
                    .prober
                    .connect(&self.handle.endpoint, &self.spec.name)
                    .await?;
                self.transition(LifecycleStatus::Ready)?;
                info!(endpoint = %self.handle.endpoint, "shared resource ready");
                Ok(connection)
            }
            ExecutionMode::Follower => {
                debug!(
                    container = %self.spec.name,
                    "follower assumes leader provisioned the resource"
                );
                self.prober
                    .connect(&self.handle.endpoint, &self.spec.name)
                    .await
            }
        }
    }

    /// Closes the session connection and releases the resource per mode.
    ///
    /// A returned `TeardownFailed` is for reporting only; results of tests that
    /// already ran stay as they are.
    pub async fn finish(
        &mut self,
        session_connection: Arc<dyn DatabaseConnection>,
    ) -> HarnessResult<()> {
        debug!("closing session connection");
        if let Err(error) = session_connection.close().await {
            warn!(error = %error, "failed to close session connection");
        }
        drop(session_connection);

        match self.mode {
            ExecutionMode::Sequential => {
                debug!("sequential session tears down immediately");
                self.teardown().await
            }
            ExecutionMode::Leader => {
                debug!("leader waits for followers before teardown");
                self.transition(LifecycleStatus::Draining)?;
                let outcome = self
                    .drain_waiter
                    .wait(&self.handle.endpoint, &self.spec.name)
                    .await;
                debug!(
                    polls = outcome.polls,
                    last_connection_count = ?outcome.last_connection_count,
                    "drain wait finished"
                );
                self.teardown().await
            }
            ExecutionMode::Follower => {
                debug!("follower leaves resource lifecycle to the leader");
                Ok(())
            }
        }
    }

    fn ensure_preconditions(&self) -> HarnessResult<()> {
        let missing = self.spec.missing_secrets();
        if !missing.is_empty() {
            return Err(HarnessError::PreconditionMissing(format!(
                "{} not set",
                missing.join(", ")
            )));
        }

        for secret in &self.spec.secrets {
            let length = secret.value.as_deref().map_or(0, str::len);
            info!(secret = %secret.name, length, "provisioning secret present");
        }

        Ok(())
    }

    async fn provision(&self) -> HarnessResult<()> {
        info!(
            container = %self.spec.name,
            image = %self.spec.image,
            "starting container"
        );
        match self.engine.start(&self.spec).await {
            Ok(()) => {
                debug!(container = %self.spec.name, "container started");
                Ok(())
            }
            Err(HarnessError::Conflict(detail)) => Err(HarnessError::ProvisionFailed {
                message: format!(
                    "container '{}' already exists; is another session running? ({detail})",
                    self.spec.name
                ),
                diagnostics: None,
            }),
            Err(error) => {
                let diagnostics = capture_resource_log(self.engine.as_ref(), &self.spec.name).await;
                Err(HarnessError::ProvisionFailed {
                    message: format!(
                        "failed to start container '{}': {}",
                        self.spec.name,
                        describe(&error)
                    ),
                    diagnostics,
                })
            }
        }
    }

    async fn teardown(&mut self) -> HarnessResult<()> {
        info!(container = %self.spec.name, "cleaning up shared resource");

        debug!(container = %self.spec.name, "stopping container");
        if let Err(error) = self.engine.stop(&self.spec.name).await {
            return Err(self.teardown_failure("stop", &error).await);
        }

        debug!(container = %self.spec.name, "removing container");
        if let Err(error) = self.engine.remove(&self.spec.name).await {
            return Err(self.teardown_failure("remove", &error).await);
        }

        self.transition(LifecycleStatus::Stopped)
    }

    async fn teardown_failure(&self, step: &str, error: &HarnessError) -> HarnessError {
        HarnessError::TeardownFailed {
            message: format!(
                "failed to {step} container '{}': {}",
                self.spec.name,
                describe(error)
            ),
            diagnostics: capture_resource_log(self.engine.as_ref(), &self.spec.name).await,
        }
    }

    fn transition(&mut self, next: LifecycleStatus) -> HarnessResult<()> {
        if !self.handle.status.can_transition_to(next) {
            return Err(HarnessError::Internal(format!(
                "illegal lifecycle transition from {} to {}",
                self.handle.status.as_str(),
                next.as_str()
            )));
        }

        debug!(
            from = self.handle.status.as_str(),
            to = next.as_str(),
            "lifecycle transition"
        );
        self.handle.status = next;
        self.history.push(next);
        Ok(())
    }
}
