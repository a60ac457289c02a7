//! Project scaffolding and org authentication.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::io::paths::ProjectPaths;
use crate::io::sf::SfCli;

/// Creates a project skeleton.
pub trait Scaffolder {
    /// Create project `name` as a subdirectory of `parent_dir`.
    fn generate(&self, parent_dir: &Path, name: &str) -> Result<()>;
}

/// Checks and establishes an authenticated session for an org alias.
pub trait Authenticator {
    /// True when `alias` already has a usable session.
    fn probe(&self, alias: &str) -> Result<bool>;
    /// Interactive login against `instance_url`, stored under `alias`.
    fn login(&self, alias: &str, instance_url: &str) -> Result<()>;
}

/// What `ensure_project` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSetup {
    Existing,
    Generated,
}

/// What `ensure_authenticated` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AlreadyAuthenticated,
    LoggedIn,
}

/// Scaffold the project unless its marker file already exists.
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn ensure_project<S: Scaffolder>(scaffolder: &S, paths: &ProjectPaths) -> Result<ProjectSetup> {
    if paths.project_exists() {
        debug!("project marker present");
        return Ok(ProjectSetup::Existing);
    }
    let name = paths
        .root
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid project directory {}", paths.root.display()))?;
    let parent = paths
        .root
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    info!(name, "generating project");
    scaffolder.generate(parent, name)?;
    if !paths.project_exists() {
        return Err(anyhow!(
            "scaffolding finished but {} is missing",
            paths.project_marker_path.display()
        ));
    }
    Ok(ProjectSetup::Generated)
}

/// Probe the alias and log in only when the probe fails.
#[instrument(skip_all, fields(alias))]
pub fn ensure_authenticated<A: Authenticator>(
    auth: &A,
    alias: &str,
    instance_url: &str,
) -> Result<AuthState> {
    if auth.probe(alias)? {
        debug!("alias already authenticated");
        return Ok(AuthState::AlreadyAuthenticated);
    }
    info!(instance_url, "starting interactive login");
    auth.login(alias, instance_url)?;
    Ok(AuthState::LoggedIn)
}

impl Scaffolder for SfCli {
    fn generate(&self, parent_dir: &Path, name: &str) -> Result<()> {
        let parent = parent_dir.to_string_lossy();
        let status = self.run_inherit(
            &["project", "generate", "--name", name, "--output-dir", &parent],
            None,
        )?;
        if !status.success() {
            return Err(anyhow!(
                "{} project generate failed with status {:?}",
                self.bin,
                status.code()
            ));
        }
        Ok(())
    }
}

impl Authenticator for SfCli {
    fn probe(&self, alias: &str) -> Result<bool> {
        let status = self.run_inherit(&["org", "display", "--target-org", alias], None)?;
        Ok(status.success())
    }

    fn login(&self, alias: &str, instance_url: &str) -> Result<()> {
        let status = self.run_inherit(
            &[
                "org",
                "login",
                "web",
                "--alias",
                alias,
                "--instance-url",
                instance_url,
            ],
            None,
        )?;
        if !status.success() {
            return Err(anyhow!(
                "login for alias {alias} failed with status {:?}",
                status.code()
            ));
        }
        Ok(())
    }
}
