//! Runs one worker's test command inside a shared database session.

#![forbid(unsafe_code)]

use std::env;
use std::process::ExitCode;

use dbsession_application::SessionContext;
use dbsession_core::{HarnessError, HarnessResult};
use dbsession_infrastructure::{SessionConfig, local_collaborators};
use tokio::process::Command;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DATABASE_URL_ENV: &str = "DBSESSION_DATABASE_URL";
const WORKER_ENV: &str = "DBSESSION_WORKER";

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestCommand {
    program: String,
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            error!(error = %error, "test session aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> HarnessResult<ExitCode> {
    let command = TestCommand::parse(env::args().skip(1))?;
    let config = SessionConfig::from_env()?;
    let collaborators = local_collaborators(&config);

    let session = SessionContext::establish(config.settings, collaborators).await?;
    let outcome = run_test_command(&command, &session).await;

    if let Err(error) = session.finish().await {
        warn!(error = %error, "session teardown failed; test results are unaffected");
    }

    outcome
}

async fn run_test_command(
    command: &TestCommand,
    session: &SessionContext,
) -> HarnessResult<ExitCode> {
    info!(
        program = %command.program,
        worker = %session.identity(),
        "running test command"
    );

    let status = Command::new(command.program.as_str())
        .args(&command.args)
        .env(DATABASE_URL_ENV, session.handle().endpoint.url())
        .env(WORKER_ENV, session.identity().as_str())
        .status()
        .await
        .map_err(|error| {
            HarnessError::Internal(format!("failed to run {}: {error}", command.program))
        })?;

    info!(status = %status, "test command finished");
    Ok(ExitCode::from(exit_status_code(status.code())))
}

/// Child exit code as a process exit code; signals and out-of-range codes become 1.
fn exit_status_code(code: Option<i32>) -> u8 {
    code.and_then(|code| u8::try_from(code).ok()).unwrap_or(1)
}

impl TestCommand {
    fn parse(args: impl IntoIterator<Item = String>) -> HarnessResult<Self> {
        let mut args = args.into_iter().peekable();
        if args.peek().map(String::as_str) == Some("--") {
            args.next();
        }

        let program = args.next().ok_or_else(|| {
            HarnessError::Validation("usage: dbsession-runner -- <command> [args...]".to_owned())
        })?;

        Ok(Self {
            program,
            args: args.collect(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
