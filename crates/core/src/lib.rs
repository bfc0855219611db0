//! Shared primitives for all Rust crates in dbsession.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across dbsession crates.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> HarnessResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(HarnessError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Session error categories.
///
/// Variants that can carry a captured resource log render it after the
/// message so fatal failures are debuggable without manual log inspection.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A required secret or setting is absent from the process environment.
    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    /// The container engine failed to provision the shared resource.
    #[error("provision failed: {message}{}", render_diagnostics(.diagnostics))]
    ProvisionFailed {
        /// Failure description.
        message: String,
        /// Captured resource log, when available.
        diagnostics: Option<String>,
    },

    /// The shared resource never accepted a connection within the retry budget.
    #[error("resource unavailable: {message}{}", render_diagnostics(.diagnostics))]
    ResourceUnavailable {
        /// Failure description, including the last connection error.
        message: String,
        /// Captured resource log, when available.
        diagnostics: Option<String>,
    },

    /// Stopping or removing the shared resource failed.
    #[error("teardown failed: {message}{}", render_diagnostics(.diagnostics))]
    TeardownFailed {
        /// Failure description.
        message: String,
        /// Captured resource log, when available.
        diagnostics: Option<String>,
    },

    /// A workspace operation observed a dead connection.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An execution mode value outside the supported set.
    #[error("invalid execution mode: {0}")]
    InvalidExecutionMode(String),

    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// A resource with the requested name already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Returns the captured resource log carried by this error, if any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ProvisionFailed { diagnostics, .. }
            | Self::ResourceUnavailable { diagnostics, .. }
            | Self::TeardownFailed { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }

    /// Returns whether the error aborts the whole session rather than one test.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, Self::ConnectionLost(_) | Self::TeardownFailed { .. })
    }
}

fn render_diagnostics(diagnostics: &Option<String>) -> String {
    match diagnostics {
        Some(log) if !log.trim().is_empty() => format!("\n--- resource log ---\n{log}"),
        _ => String::new(),
    }
}
