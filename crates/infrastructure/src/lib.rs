//! Infrastructure adapters for session ports.

#![forbid(unsafe_code)]

mod docker_container_engine;
mod mysql_database_client;
mod session_config;
mod tokio_session_clock;

pub use docker_container_engine::DockerContainerEngine;
pub use mysql_database_client::{MySqlDatabaseClient, MySqlDatabaseConnection};
pub use session_config::{LICENSE_ENV, SessionConfig, local_collaborators};
pub use tokio_session_clock::TokioSessionClock;
