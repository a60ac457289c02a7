//! Retriever abstraction for the bulk metadata download.
//!
//! The [`Retriever`] trait decouples the retry loop from the actual backend
//! (`sf project retrieve start`). Tests use scripted retrievers that return
//! predetermined captures without spawning processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::io::process::run_command_with_timeout;
use crate::io::sf::SfCli;

/// Parameters for one retrieve invocation.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    /// Project directory the retriever runs in.
    pub workdir: PathBuf,
    /// Manifest path, relative to `workdir`.
    pub manifest: PathBuf,
    pub org_alias: String,
    pub timeout: Duration,
}

/// Raw text produced by one retrieve invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveCapture {
    /// JSON on a structured result; otherwise whatever diagnostic was available.
    pub raw: String,
    /// Exit code when the process ran to completion.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl RetrieveCapture {
    pub fn completed(raw: impl Into<String>, exit_code: i32) -> Self {
        Self {
            raw: raw.into(),
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }
}

/// Abstraction over retrieve backends.
pub trait Retriever {
    /// Run one retrieve. Process-level failures (non-zero exit, spawn errors) are
    /// reported through the capture; `Err` is reserved for the caller's own I/O.
    fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveCapture>;
}

impl Retriever for SfCli {
    #[instrument(skip_all, fields(org_alias = %request.org_alias, timeout_secs = request.timeout.as_secs()))]
    fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveCapture> {
        info!(workdir = %request.workdir.display(), "starting retrieve");
        let manifest = request.manifest.to_string_lossy();
        let cmd = self.command(
            &[
                "project",
                "retrieve",
                "start",
                "--manifest",
                &manifest,
                "--target-org",
                &request.org_alias,
                "--json",
            ],
            Some(&request.workdir),
        );

        let output = match run_command_with_timeout(cmd, request.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, "retrieve could not be run");
                return Ok(RetrieveCapture {
                    raw: format!("{err:#}"),
                    exit_code: None,
                    timed_out: false,
                });
            }
        };

        if !output.succeeded() {
            warn!(exit_code = ?output.status.code(), timed_out = output.timed_out, "retrieve failed");
        }
        let stdout = output.stdout_lossy();
        let raw = if output.succeeded() || !stdout.trim().is_empty() {
            stdout
        } else {
            output.stderr_lossy()
        };
        Ok(RetrieveCapture {
            raw,
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            timed_out: output.timed_out,
        })
    }
}
