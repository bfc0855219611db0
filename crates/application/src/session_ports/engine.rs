use async_trait::async_trait;
use dbsession_core::HarnessResult;
use dbsession_domain::ResourceSpec;

/// Container engine port that provisions and destroys the shared resource.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Starts a detached container for `spec`.
    ///
    /// Returns `HarnessError::Conflict` when a container with the same name
    /// already exists, and `HarnessError::Internal` for any other failure.
    async fn start(&self, spec: &ResourceSpec) -> HarnessResult<()>;

    /// Stops the named container.
    async fn stop(&self, name: &str) -> HarnessResult<()>;

    /// Removes the named container.
    async fn remove(&self, name: &str) -> HarnessResult<()>;

    /// Returns the combined log output of the named container.
    async fn logs(&self, name: &str) -> HarnessResult<String>;
}
