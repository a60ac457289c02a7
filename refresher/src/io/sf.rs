//! Thin wrapper around the platform CLI (`sf`).
//!
//! All collaborator traits ([`Scaffolder`](super::project::Scaffolder),
//! [`Authenticator`](super::project::Authenticator),
//! [`OrgIntrospector`](super::org::OrgIntrospector),
//! [`Retriever`](super::retriever::Retriever)) are implemented on [`SfCli`].

use std::path::Path;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::io::config::RefreshConfig;
use crate::io::process::{CommandOutput, run_command_inherit, run_command_with_timeout};

/// Handle for invoking the `sf` executable.
#[derive(Debug, Clone)]
pub struct SfCli {
    pub(crate) bin: String,
    pub(crate) command_timeout: Duration,
    pub(crate) output_limit_bytes: usize,
}

impl SfCli {
    pub fn from_config(cfg: &RefreshConfig) -> Self {
        Self {
            bin: cfg.sf_bin.clone(),
            command_timeout: cfg.command_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    pub(crate) fn command(&self, args: &[&str], workdir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run a `--json` command and return its `result` payload.
    ///
    /// A non-zero exit or a non-zero envelope `status` is an error carrying the
    /// CLI's own message when one is present.
    #[instrument(skip_all, fields(args = %args.join(" ")))]
    pub(crate) fn run_json(&self, args: &[&str], workdir: Option<&Path>) -> Result<Value> {
        let output = run_command_with_timeout(
            self.command(args, workdir),
            self.command_timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {} {}", self.bin, args.join(" ")))?;
        if output.timed_out {
            return Err(anyhow!(
                "{} {} timed out after {:?}",
                self.bin,
                args.join(" "),
                self.command_timeout
            ));
        }
        let envelope = parse_envelope(&output)
            .with_context(|| format!("{} {}", self.bin, args.join(" ")))?;
        debug!("json command succeeded");
        Ok(envelope)
    }

    /// Run a command attached to the terminal and return its exit status.
    pub(crate) fn run_inherit(&self, args: &[&str], workdir: Option<&Path>) -> Result<ExitStatus> {
        run_command_inherit(self.command(args, workdir), self.command_timeout)
            .with_context(|| format!("run {} {}", self.bin, args.join(" ")))
    }
}

/// Decode the `{"status": .., "result": ..}` envelope printed by `--json` commands.
fn parse_envelope(output: &CommandOutput) -> Result<Value> {
    let stdout = output.stdout_lossy();
    let parsed: Option<Value> = serde_json::from_str(stdout.trim()).ok();

    match parsed {
        Some(envelope) => {
            let status = envelope.get("status").and_then(Value::as_i64).unwrap_or(0);
            if status != 0 || !output.status.success() {
                return Err(anyhow!(
                    "failed with status {status}: {}",
                    envelope_message(&envelope)
                ));
            }
            Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
        }
        None => {
            let stderr = output.stderr_lossy();
            warn!(exit_code = ?output.status.code(), "command did not print json");
            Err(anyhow!(
                "expected json output (exit {:?}): {}",
                output.status.code(),
                first_non_empty(&[stderr.trim(), stdout.trim()])
            ))
        }
    }
}

fn envelope_message(envelope: &Value) -> String {
    let name = envelope.get("name").and_then(Value::as_str);
    let message = envelope.get("message").and_then(Value::as_str);
    match (name, message) {
        (Some(name), Some(message)) => format!("{name}: {message}"),
        (None, Some(message)) => message.to_string(),
        _ => envelope.to_string(),
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or("<no output>")
}
