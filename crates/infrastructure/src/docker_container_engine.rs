//! Docker CLI implementation of the container engine port.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dbsession_application::ContainerEngine;
use dbsession_core::{HarnessError, HarnessResult};
use dbsession_domain::ResourceSpec;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const NAME_CONFLICT_MARKERS: [&str; 2] = ["is already in use", "Conflict."];

/// Container engine that shells out to the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerContainerEngine {
    program: String,
    command_timeout: Duration,
}

struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl DockerContainerEngine {
    /// Creates an engine using `docker` from `PATH`.
    #[must_use]
    pub fn new(command_timeout: Duration) -> Self {
        Self::with_program("docker", command_timeout)
    }

    /// Creates an engine using an explicit CLI program.
    #[must_use]
    pub fn with_program(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            command_timeout,
        }
    }

    async fn run(
        &self,
        args: &[String],
        secrets: &[(&str, &str)],
    ) -> HarnessResult<CommandOutput> {
        debug!(
            program = %self.program,
            args = %args.join(" "),
            "running container engine command"
        );

        let mut command = Command::new(self.program.as_str());
        command.kill_on_drop(true);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        for (name, value) in secrets {
            command.env(name, value);
        }

        let output = timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| {
                HarnessError::Internal(format!(
                    "{} {} timed out after {:?}",
                    self.program,
                    args.join(" "),
                    self.command_timeout
                ))
            })?
            .map_err(|error| {
                HarnessError::Internal(format!("failed to run {}: {error}", self.program))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_checked(&self, args: &[String]) -> HarnessResult<CommandOutput> {
        let output = self.run(args, &[]).await?;
        if output.success {
            return Ok(output);
        }

        Err(HarnessError::Internal(command_failure(
            self.program.as_str(),
            args,
            &output,
        )))
    }
}

#[async_trait]
impl ContainerEngine for DockerContainerEngine {
    async fn start(&self, spec: &ResourceSpec) -> HarnessResult<()> {
        let args = run_arguments(spec);
        let secrets: Vec<(&str, &str)> = spec
            .secrets
            .iter()
            .filter_map(|secret| {
                secret
                    .value
                    .as_deref()
                    .map(|value| (secret.name.as_str(), value))
            })
            .collect();

        let output = self.run(&args, &secrets).await?;
        if output.success {
            return Ok(());
        }

        let failure = command_failure(self.program.as_str(), &args, &output);
        if NAME_CONFLICT_MARKERS
            .iter()
            .any(|marker| output.stderr.contains(marker))
        {
            return Err(HarnessError::Conflict(failure));
        }

        Err(HarnessError::Internal(failure))
    }

    async fn stop(&self, name: &str) -> HarnessResult<()> {
        self.run_checked(&["stop".to_owned(), name.to_owned()])
            .await
            .map(|_| ())
    }

    async fn remove(&self, name: &str) -> HarnessResult<()> {
        self.run_checked(&["rm".to_owned(), name.to_owned()])
            .await
            .map(|_| ())
    }

    async fn logs(&self, name: &str) -> HarnessResult<String> {
        let output = self
            .run_checked(&["logs".to_owned(), name.to_owned()])
            .await?;
        Ok(combine_streams(&output))
    }
}

/// Builds `run -d --name <name> -e ... -p ... <image>`.
///
/// Secrets are passed by name only so their values stay off the command line.
fn run_arguments(spec: &ResourceSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_owned(),
        "-d".to_owned(),
        "--name".to_owned(),
        spec.name.clone(),
    ];

    for secret in &spec.secrets {
        args.push("-e".to_owned());
        args.push(secret.name.clone());
    }

    for (key, value) in &spec.env {
        args.push("-e".to_owned());
        args.push(format!("{key}={value}"));
    }

    for port in &spec.ports {
        args.push("-p".to_owned());
        args.push(port.to_string());
    }

    args.push(spec.image.clone());
    args
}

fn combine_streams(output: &CommandOutput) -> String {
    match (output.stdout.trim().is_empty(), output.stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", output.stdout, output.stderr),
        (false, true) => output.stdout.clone(),
        (true, _) => output.stderr.clone(),
    }
}

fn command_failure(program: &str, args: &[String], output: &CommandOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| "signal".to_owned(), |code| code.to_string());
    format!(
        "{program} {} exited with status {status}: {}",
        args.first().map_or("", String::as_str),
        output.stderr.trim()
    )
}
