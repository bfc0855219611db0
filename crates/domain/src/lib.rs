//! Domain types and invariants for shared-resource test sessions.

#![forbid(unsafe_code)]

mod execution_mode;
mod lifecycle;
mod naming;
mod resource;

pub use execution_mode::{
    DEFAULT_LEADER_IDENTITY, ExecutionMode, FirstWorkerElection, LeaderElection, ParallelContext,
};
pub use lifecycle::LifecycleStatus;
pub use naming::{NameAllocator, SEQUENTIAL_WORKER_IDENTITY, WorkerIdentity};
pub use resource::{
    Endpoint, LOCAL_HOST, MANAGEMENT_PORTS, PortBinding, ResourceSpec, SQL_PORT, SecretEnv,
};
