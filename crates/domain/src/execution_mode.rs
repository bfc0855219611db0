//! Execution mode resolution for one worker process.

use std::fmt::{Display, Formatter};

use dbsession_core::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};

use crate::naming::{SEQUENTIAL_WORKER_IDENTITY, WorkerIdentity};

/// Identity the parallel runner assigns to its first worker.
pub const DEFAULT_LEADER_IDENTITY: &str = "gw0";

/// Role one process plays in the shared-resource lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Only process in the session; provisions and tears down immediately.
    Sequential,
    /// Elected parallel worker; provisions, drains, then tears down.
    Leader,
    /// Any other parallel worker; never touches the resource lifecycle.
    Follower,
}

impl ExecutionMode {
    /// Resolves the mode from the parallel-runner context.
    ///
    /// Pure function of its inputs. Callers resolve once per process and keep
    /// the result, since the mode gates mutually exclusive lifecycle branches.
    #[must_use]
    pub fn resolve(context: &ParallelContext, election: &dyn LeaderElection) -> Self {
        let (Some(worker), Some(worker_count)) = (context.worker(), context.worker_count()) else {
            return Self::Sequential;
        };

        if worker_count == 1 {
            Self::Sequential
        } else if election.is_leader(worker) {
            Self::Leader
        } else {
            Self::Follower
        }
    }

    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }

    /// Parses configuration value.
    pub fn parse(value: &str) -> HarnessResult<Self> {
        match value.trim() {
            "sequential" => Ok(Self::Sequential),
            "leader" => Ok(Self::Leader),
            "follower" => Ok(Self::Follower),
            other => Err(HarnessError::InvalidExecutionMode(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }

    /// Returns whether this process provisions and tears down the resource.
    #[must_use]
    pub fn owns_lifecycle(&self) -> bool {
        matches!(self, Self::Sequential | Self::Leader)
    }
}

impl Display for ExecutionMode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Parallel-runner context visible to one process at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelContext {
    worker: Option<String>,
    worker_count: Option<u32>,
}

impl ParallelContext {
    /// Context for a process launched outside any parallel runner.
    #[must_use]
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Context from raw runner values; either may be absent.
    #[must_use]
    pub fn new(worker: Option<String>, worker_count: Option<u32>) -> Self {
        let worker = worker
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        Self {
            worker,
            worker_count,
        }
    }

    /// Returns this worker's runner-assigned name.
    #[must_use]
    pub fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    /// Returns the total number of parallel workers.
    #[must_use]
    pub fn worker_count(&self) -> Option<u32> {
        self.worker_count
    }

    /// Returns the identity used for naming; `master` outside a parallel run.
    pub fn identity(&self) -> HarnessResult<WorkerIdentity> {
        WorkerIdentity::new(
            self.worker
                .clone()
                .unwrap_or_else(|| SEQUENTIAL_WORKER_IDENTITY.to_owned()),
        )
    }
}

/// Decides whether a worker is the distinguished leader.
pub trait LeaderElection: Send + Sync {
    /// Returns true when `worker` should provision and tear down the resource.
    fn is_leader(&self, worker: &str) -> bool;
}

/// Elects the worker whose name equals a fixed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstWorkerElection {
    leader_identity: String,
}

impl FirstWorkerElection {
    /// Creates an election for the given leader identity.
    #[must_use]
    pub fn new(leader_identity: impl Into<String>) -> Self {
        Self {
            leader_identity: leader_identity.into(),
        }
    }
}

impl Default for FirstWorkerElection {
    fn default() -> Self {
        Self::new(DEFAULT_LEADER_IDENTITY)
    }
}

impl LeaderElection for FirstWorkerElection {
    fn is_leader(&self, worker: &str) -> bool {
        worker == self.leader_identity
    }
}
