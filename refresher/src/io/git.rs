//! Git adapter for committing a refreshed snapshot.
//!
//! Committing is a best-effort convenience after a successful refresh, so the
//! wrapper stays small: init when needed, stage everything, commit.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when `workdir` itself holds a `.git` entry.
    pub fn is_repository_root(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        debug!(workdir = %self.workdir.display(), "initializing repository");
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Records a refreshed snapshot in version control.
pub trait Committer {
    /// Returns whether a commit was created (false when nothing changed).
    fn commit_snapshot(&self, message: &str) -> Result<bool>;
}

impl Committer for Git {
    fn commit_snapshot(&self, message: &str) -> Result<bool> {
        commit_snapshot(self, message)
    }
}

/// Commit message recording where and when the snapshot was taken.
pub fn snapshot_commit_message(org_alias: &str, env: &str, at: DateTime<Utc>) -> String {
    format!(
        "Update metadata from {org_alias} ({env}) on {}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Initialize the repository if needed, stage everything, and commit.
///
/// Returns whether a commit was created (false when nothing changed).
#[instrument(skip_all, fields(workdir = %git.workdir().display()))]
pub fn commit_snapshot(git: &Git, message: &str) -> Result<bool> {
    if !git.is_repository_root() {
        info!("initializing git repository");
        git.init()?;
    }
    git.add_all()?;
    git.commit_staged(message)
}
