use std::env;
use std::sync::Arc;
use std::time::Duration;

use dbsession_application::{DrainConfig, ProbeConfig, SessionCollaborators, SessionSettings};
use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::{
    DEFAULT_LEADER_IDENTITY, Endpoint, FirstWorkerElection, ParallelContext, ResourceSpec,
    SecretEnv,
};

use crate::{DockerContainerEngine, MySqlDatabaseClient, TokioSessionClock};

/// Process variable carrying the database license.
pub const LICENSE_ENV: &str = "SINGLESTORE_LICENSE";

const DEFAULT_CONTAINER_NAME: &str = "singlestoredb-test-container";
const DEFAULT_IMAGE: &str = "ghcr.io/singlestore-labs/singlestoredb-dev";
const DEFAULT_ROOT_PASSWORD: &str = "Q8r4D7yXR8oqn";
const DEFAULT_NAME_PREFIX: &str = "x_db";
const ROOT_USER: &str = "root";

/// Session settings plus adapter tuning, read from the environment.
#[derive(Clone)]
pub struct SessionConfig {
    /// Settings handed to `SessionContext::establish`.
    pub settings: SessionSettings,
    /// Upper bound on a single container engine command.
    pub engine_timeout: Duration,
}

impl SessionConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let worker = optional(&lookup, "TEST_WORKER");
        let worker_count = match optional(&lookup, "TEST_WORKER_COUNT") {
            Some(value) => Some(value.parse::<u32>().map_err(|error| {
                HarnessError::Validation(format!(
                    "invalid TEST_WORKER_COUNT value '{value}': {error}"
                ))
            })?),
            None => None,
        };
        let leader = optional(&lookup, "DBSESSION_LEADER_WORKER")
            .unwrap_or_else(|| DEFAULT_LEADER_IDENTITY.to_owned());
        let mode_override = optional(&lookup, "DBSESSION_EXECUTION_MODE");

        let root_password = optional(&lookup, "DBSESSION_ROOT_PASSWORD")
            .unwrap_or_else(|| DEFAULT_ROOT_PASSWORD.to_owned());
        let resource = ResourceSpec {
            name: optional(&lookup, "DBSESSION_CONTAINER_NAME")
                .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_owned()),
            image: optional(&lookup, "DBSESSION_IMAGE")
                .unwrap_or_else(|| DEFAULT_IMAGE.to_owned()),
            env: vec![
                ("ROOT_PASSWORD".to_owned(), root_password.clone()),
                (
                    "SINGLESTORE_SET_GLOBAL_DEFAULT_PARTITIONS_PER_LEAF".to_owned(),
                    "1".to_owned(),
                ),
            ],
            secrets: vec![SecretEnv::new(LICENSE_ENV, lookup(LICENSE_ENV))],
            ports: ResourceSpec::default_ports(),
        };

        let probe = ProbeConfig::new(
            parse_u32(&lookup, "DBSESSION_CONNECT_ATTEMPTS", 10)?,
            Duration::from_millis(parse_u64(&lookup, "DBSESSION_CONNECT_RETRY_MS", 2000)?),
        )?;
        let drain = DrainConfig::new(
            parse_u32(&lookup, "DBSESSION_DRAIN_ATTEMPTS", 20)?,
            Duration::from_millis(parse_u64(&lookup, "DBSESSION_DRAIN_POLL_MS", 2000)?),
        )?;

        let engine_timeout_secs = parse_u64(&lookup, "DBSESSION_ENGINE_TIMEOUT_SECS", 600)?;
        if engine_timeout_secs == 0 {
            return Err(HarnessError::Validation(
                "DBSESSION_ENGINE_TIMEOUT_SECS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            settings: SessionSettings {
                context: ParallelContext::new(worker, worker_count),
                election: Arc::new(FirstWorkerElection::new(leader)),
                mode_override,
                resource,
                endpoint: Endpoint::local(ROOT_USER, root_password),
                probe,
                drain,
                name_prefix: optional(&lookup, "DBSESSION_NAME_PREFIX")
                    .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_owned()),
            },
            engine_timeout: Duration::from_secs(engine_timeout_secs),
        })
    }
}

/// Docker, MySQL and tokio adapters for a session on this machine.
#[must_use]
pub fn local_collaborators(config: &SessionConfig) -> SessionCollaborators {
    SessionCollaborators {
        engine: Arc::new(DockerContainerEngine::new(config.engine_timeout)),
        client: Arc::new(MySqlDatabaseClient::new()),
        clock: Arc::new(TokioSessionClock),
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u32<F>(lookup: &F, name: &str, default: u32) -> HarnessResult<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        Some(value) => value.parse::<u32>().map_err(|error| {
            HarnessError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_u64<F>(lookup: &F, name: &str, default: u64) -> HarnessResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            HarnessError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
