//! Session services and ports for coordinating one shared database instance.

#![forbid(unsafe_code)]

mod diagnostics;
mod drain_waiter;
mod lifecycle_coordinator;
mod readiness_prober;
mod scoped_workspace;
mod session_context;
mod session_ports;

#[cfg(test)]
mod test_support;

pub use drain_waiter::{DrainConfig, DrainOutcome, DrainWaiter};
pub use lifecycle_coordinator::{LifecycleHandle, ResourceLifecycleCoordinator};
pub use readiness_prober::{ProbeConfig, ReadinessProber};
pub use scoped_workspace::{ScopedWorkspace, Workspace, with_workspace};
pub use session_context::{SessionCollaborators, SessionContext, SessionSettings};
pub use session_ports::{
    ContainerEngine, DatabaseClient, DatabaseConnection, SessionClock, StatusVariable,
    THREADS_CONNECTED_STATUS,
};
