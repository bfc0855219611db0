//! Worker identities and collision-free sub-resource names.

use std::fmt::{Display, Formatter};

use dbsession_core::{HarnessError, HarnessResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Identity used when the process is not one of several parallel workers.
pub const SEQUENTIAL_WORKER_IDENTITY: &str = "master";

/// Label of the current worker process.
///
/// Restricted to identifier characters so names derived from it are valid
/// database identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity(NonEmptyString);

impl WorkerIdentity {
    /// Creates a validated worker identity.
    pub fn new(value: impl Into<String>) -> HarnessResult<Self> {
        let value = NonEmptyString::new(value.into().trim())?;
        validate_identifier_part("worker identity", value.as_str())?;
        Ok(Self(value))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for WorkerIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Per-process generator of `<prefix>_<worker>_<sequence>` names.
///
/// Not synchronized: one test runs at a time per worker, so allocation is
/// single-threaded by construction. Distinct worker identities never collide.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    prefix: String,
    worker: WorkerIdentity,
    next_sequence: u64,
}

impl NameAllocator {
    /// Creates an allocator starting at sequence zero.
    pub fn new(prefix: impl Into<String>, worker: WorkerIdentity) -> HarnessResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(HarnessError::Validation(
                "name prefix must not be empty".to_owned(),
            ));
        }
        validate_identifier_part("name prefix", prefix.as_str())?;

        Ok(Self {
            prefix,
            worker,
            next_sequence: 0,
        })
    }

    /// Returns the next unused name.
    pub fn allocate(&mut self) -> String {
        let name = format!("{}_{}_{}", self.prefix, self.worker, self.next_sequence);
        self.next_sequence += 1;
        name
    }

    /// Returns the identity this allocator is seeded with.
    #[must_use]
    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }
}

fn validate_identifier_part(label: &str, value: &str) -> HarnessResult<()> {
    if value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_')
    {
        return Ok(());
    }

    Err(HarnessError::Validation(format!(
        "{label} '{value}' may only contain ASCII letters, digits and underscores"
    )))
}
