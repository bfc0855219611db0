//! Per-test isolated databases inside the shared instance.

use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::NameAllocator;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::session_ports::DatabaseConnection;

#[cfg(test)]
mod tests;

/// Isolated database bound to the connection it was created on.
///
/// Clones share the connection and do not track release: once the owning
/// guard drops the database, statements through any clone fail or land in
/// no database.
#[derive(Clone)]
pub struct Workspace {
    name: String,
    connection: Arc<dyn DatabaseConnection>,
}

impl Workspace {
    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the connection whose active database is this workspace.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn DatabaseConnection> {
        &self.connection
    }

    /// Executes one statement inside the workspace.
    pub async fn execute(&self, statement: &str) -> HarnessResult<u64> {
        self.connection.execute(statement).await
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Workspace")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Acquired workspace that is dropped from the server exactly once.
///
/// `release` drops the database explicitly. If the guard goes out of scope
/// unreleased, the drop statement is spawned onto the current tokio runtime
/// instead; that task is lost if the runtime shuts down first, so scoped test
/// bodies go through [`with_workspace`].
#[derive(Debug)]
pub struct ScopedWorkspace {
    workspace: Workspace,
    released: bool,
}

impl ScopedWorkspace {
    /// Creates a fresh database and makes it the connection's active one.
    pub async fn acquire(
        connection: Arc<dyn DatabaseConnection>,
        allocator: &mut NameAllocator,
    ) -> HarnessResult<Self> {
        if !connection.is_alive().await {
            return Err(HarnessError::ConnectionLost(
                "database is no longer connected".to_owned(),
            ));
        }

        let name = allocator.allocate();
        debug!(workspace = %name, "creating temporary database");
        connection.execute(&create_statement(&name)).await?;

        let scoped = Self {
            workspace: Workspace { name, connection },
            released: false,
        };

        let switched = scoped
            .workspace
            .execute(&use_statement(scoped.name()))
            .await;
        if let Err(error) = switched {
            if let Err(release_error) = scoped.release().await {
                warn!(error = %release_error, "failed to drop workspace after switch failure");
            }
            return Err(error);
        }

        Ok(scoped)
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.workspace.name()
    }

    /// Returns a cloneable handle to the workspace.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Drops the database on the connection it was created on.
    pub async fn release(mut self) -> HarnessResult<()> {
        self.released = true;
        debug!(workspace = %self.workspace.name, "dropping temporary database");
        self.workspace
            .connection
            .execute(&drop_statement(&self.workspace.name))
            .await
            .map(|_| ())
    }
}

impl Drop for ScopedWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let name = self.workspace.name.clone();
        let connection = self.workspace.connection.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(workspace = %name, "dropping temporary database on scope exit");
                runtime.spawn(async move {
                    if let Err(error) = connection.execute(&drop_statement(&name)).await {
                        warn!(workspace = %name, error = %error, "failed to drop temporary database");
                    }
                });
            }
            Err(_) => {
                warn!(workspace = %name, "no runtime available; temporary database left behind");
            }
        }
    }
}

/// Runs `body` inside a fresh workspace and always releases it afterwards.
///
/// The body's error wins over a release error; a release error alone is returned.
/// A panicking body is released first, then the panic resumes.
pub async fn with_workspace<F, Fut, T>(
    connection: Arc<dyn DatabaseConnection>,
    allocator: &mut NameAllocator,
    body: F,
) -> HarnessResult<T>
where
    F: FnOnce(Workspace) -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
{
    let scoped = ScopedWorkspace::acquire(connection, allocator).await?;
    let workspace = scoped.workspace().clone();
    let outcome = AssertUnwindSafe(async move { body(workspace).await })
        .catch_unwind()
        .await;
    let released = scoped.release().await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(panic) => {
            if let Err(release_error) = released {
                warn!(error = %release_error, "failed to drop workspace after test panic");
            }
            resume_unwind(panic);
        }
    };

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_error)) => Err(release_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(release_error)) => {
            warn!(error = %release_error, "failed to drop workspace after test failure");
            Err(error)
        }
    }
}

fn create_statement(name: &str) -> String {
    format!("CREATE DATABASE `{name}`")
}

fn use_statement(name: &str) -> String {
    format!("USE `{name}`")
}

fn drop_statement(name: &str) -> String {
    format!("DROP DATABASE `{name}`")
}
