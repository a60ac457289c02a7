//! End-to-end refresh of one project snapshot.
//!
//! Setup and discovery run once; the retrieve loop does the narrowing; the optional
//! commit is best-effort and never turns a refreshed snapshot into a failure.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use tracing::{info, instrument, warn};

use crate::discovery::{
    collect_overrides, discover_candidates, override_steps, resolve_api_version,
};
use crate::io::config::RefreshConfig;
use crate::io::git::{Committer, snapshot_commit_message};
use crate::io::org::OrgIntrospector;
use crate::io::paths::ProjectPaths;
use crate::io::project::{
    AuthState, Authenticator, ProjectSetup, Scaffolder, ensure_authenticated, ensure_project,
};
use crate::io::retriever::Retriever;
use crate::retrieve::{RetrieveEvent, RetrievePlan, RetrieveSummary, retrieve_with_retries};

/// Org environment, selecting the login host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OrgEnv {
    #[default]
    Prod,
    Sandbox,
}

impl OrgEnv {
    pub fn login_url(self) -> &'static str {
        match self {
            OrgEnv::Prod => "https://login.salesforce.com",
            OrgEnv::Sandbox => "https://test.salesforce.com",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrgEnv::Prod => "prod",
            OrgEnv::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for OrgEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External collaborators of a refresh, borrowed for its duration.
pub struct Collaborators<'a, S, A, O, R, C> {
    pub scaffolder: &'a S,
    pub authenticator: &'a A,
    pub org: &'a O,
    pub retriever: &'a R,
    pub committer: &'a C,
}

/// What to refresh and how.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub project_dir: PathBuf,
    pub org_alias: String,
    pub env: OrgEnv,
    /// Commit the refreshed tree to git afterwards.
    pub commit: bool,
    pub config: RefreshConfig,
}

/// Result of the optional commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// No commit was requested.
    Skipped,
    Committed,
    /// Requested, but the tree matched the last commit.
    NothingToCommit,
    /// Requested and failed; the refresh itself still succeeded.
    Failed(String),
}

/// Progress notifications emitted by [`run_refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Target {
        org_alias: String,
        env: OrgEnv,
        login_url: String,
    },
    Project(ProjectSetup),
    Auth(AuthState),
    ApiVersion(String),
    CandidatesDiscovered {
        count: usize,
    },
    OverrideReady {
        type_name: String,
        members: usize,
    },
    Retrieve(RetrieveEvent),
    Commit(CommitStatus),
}

/// Summary of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub project: ProjectSetup,
    pub auth: AuthState,
    pub api_version: String,
    pub candidate_count: usize,
    pub retrieve: RetrieveSummary,
    pub commit: CommitStatus,
}

/// Scaffold, authenticate, discover, retrieve with narrowing, then optionally commit.
///
/// Any failure before or during the retrieve loop is returned; loop terminations
/// keep their [`RetrieveAborted`](crate::retrieve::RetrieveAborted) /
/// [`RetriesExhausted`](crate::retrieve::RetriesExhausted) types for `downcast_ref`.
#[instrument(skip_all, fields(project = %options.project_dir.display(), alias = %options.org_alias, env = %options.env))]
pub fn run_refresh<S, A, O, R, C, F>(
    collaborators: &Collaborators<'_, S, A, O, R, C>,
    options: &RefreshOptions,
    mut on_event: F,
) -> Result<RefreshOutcome>
where
    S: Scaffolder,
    A: Authenticator,
    O: OrgIntrospector,
    R: Retriever,
    C: Committer,
    F: FnMut(&RefreshEvent),
{
    let paths = ProjectPaths::new(&options.project_dir);
    let alias = options.org_alias.as_str();
    let config = &options.config;
    let login_url = options.env.login_url();

    on_event(&RefreshEvent::Target {
        org_alias: alias.to_string(),
        env: options.env,
        login_url: login_url.to_string(),
    });

    let project = ensure_project(collaborators.scaffolder, &paths)
        .with_context(|| format!("scaffold project {}", paths.root.display()))?;
    on_event(&RefreshEvent::Project(project));

    let auth = ensure_authenticated(collaborators.authenticator, alias, login_url)
        .with_context(|| format!("authenticate org alias {alias}"))?;
    on_event(&RefreshEvent::Auth(auth));

    let api_version =
        resolve_api_version(collaborators.org, alias, config).context("resolve API version")?;
    on_event(&RefreshEvent::ApiVersion(api_version.clone()));

    let candidates = discover_candidates(
        collaborators.org,
        alias,
        &api_version,
        &config.supplemental_types,
    )
    .context("discover metadata types")?;
    info!(count = candidates.len(), "candidate types ready");
    on_event(&RefreshEvent::CandidatesDiscovered {
        count: candidates.len(),
    });

    let steps = override_steps(&config.overrides);
    let overrides = collect_overrides(collaborators.org, alias, &api_version, &candidates, &steps)
        .context("discover member overrides")?;
    for (type_name, entry) in &overrides {
        on_event(&RefreshEvent::OverrideReady {
            type_name: type_name.clone(),
            members: entry.members.len(),
        });
    }

    let plan = RetrievePlan {
        org_alias: alias.to_string(),
        candidates,
        overrides,
        api_version: api_version.clone(),
        seed_exclusions: config.seed_exclusions.clone(),
        max_attempts: config.max_attempts,
        attempt_timeout: config.retrieve_timeout(),
    };
    let candidate_count = plan.candidates.len();
    let retrieve = retrieve_with_retries(collaborators.retriever, &paths, &plan, |event| {
        on_event(&RefreshEvent::Retrieve(event.clone()));
    })?;

    let commit = if options.commit {
        let message = snapshot_commit_message(alias, options.env.as_str(), Utc::now());
        match collaborators.committer.commit_snapshot(&message) {
            Ok(true) => CommitStatus::Committed,
            Ok(false) => CommitStatus::NothingToCommit,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(error = %reason, "git commit failed; snapshot kept uncommitted");
                CommitStatus::Failed(reason)
            }
        }
    } else {
        CommitStatus::Skipped
    };
    on_event(&RefreshEvent::Commit(commit.clone()));

    Ok(RefreshOutcome {
        project,
        auth,
        api_version,
        candidate_count,
        retrieve,
        commit,
    })
}
