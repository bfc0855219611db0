use dbsession_core::HarnessError;
use tracing::{info, warn};

use crate::session_ports::ContainerEngine;

/// Captures the resource's own log output for failure reports.
///
/// Never fails: a log that cannot be read is reported and skipped.
pub(crate) async fn capture_resource_log(
    engine: &dyn ContainerEngine,
    resource_name: &str,
) -> Option<String> {
    info!(container = %resource_name, "capturing resource log");
    match engine.logs(resource_name).await {
        Ok(log) => {
            info!(container = %resource_name, log = %log, "resource log captured");
            Some(log)
        }
        Err(error) => {
            warn!(
                container = %resource_name,
                error = %error,
                "failed to capture resource log"
            );
            None
        }
    }
}

/// Extracts the message of a collaborator error for wrapping.
pub(crate) fn describe(error: &HarnessError) -> String {
    match error {
        HarnessError::Internal(message)
        | HarnessError::Conflict(message)
        | HarnessError::ConnectionLost(message) => message.clone(),
        other => other.to_string(),
    }
}
