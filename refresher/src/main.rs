//! Refresh a local metadata snapshot of a remote org.
//!
//! `refresher <projectName> [orgAlias] [prod|sandbox] [commit]` scaffolds the
//! project when needed, logs in when needed, and retrieves every metadata type
//! the org's retriever accepts, excluding the ones it rejects.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use refresher::exit_codes;
use refresher::io::config::load_config;
use refresher::io::git::Git;
use refresher::io::paths::ProjectPaths;
use refresher::io::sf::SfCli;
use refresher::logging;
use refresher::refresh::{
    Collaborators, CommitStatus, OrgEnv, RefreshEvent, RefreshOptions, RefreshOutcome, run_refresh,
};
use refresher::retrieve::{RetrieveAborted, RetrieveEvent, RetriesExhausted};

#[derive(Parser, Debug)]
#[command(
    name = "refresher",
    version,
    about = "Refresh a local metadata snapshot, excluding types the retriever rejects"
)]
struct Cli {
    /// Project directory; scaffolded when it has no sfdx-project.json.
    project_name: PathBuf,

    /// Org alias to authenticate and retrieve from.
    #[arg(default_value = "myOrg")]
    org_alias: String,

    /// Org environment; selects the login host.
    #[arg(value_enum, default_value_t = OrgEnv::Prod)]
    env: OrgEnv,

    /// Pass `commit` to commit the refreshed snapshot to git.
    #[arg(value_enum)]
    commit: Option<CommitFlag>,

    /// Config file (default: <project>/refresher.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the retrieve attempt ceiling from the config.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CommitFlag {
    Commit,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::FAILURE
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    logging::init();

    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        if let Some(exclusions) = terminal_exclusions(&err)
            && !exclusions.is_empty()
        {
            eprintln!("Excluded types: {}", exclusions.join(", "));
        }
        std::process::exit(exit_codes::FAILURE);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let project_dir = cwd.join(&cli.project_name);
    let config_path = cli
        .config
        .map(|path| cwd.join(path))
        .unwrap_or_else(|| ProjectPaths::new(&project_dir).config_path);
    let mut config = load_config(&config_path)?;
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }

    let sf = SfCli::from_config(&config);
    let git = Git::new(&project_dir);
    let collaborators = Collaborators {
        scaffolder: &sf,
        authenticator: &sf,
        org: &sf,
        retriever: &sf,
        committer: &git,
    };
    let options = RefreshOptions {
        project_dir,
        org_alias: cli.org_alias,
        env: cli.env,
        commit: cli.commit.is_some(),
        config,
    };

    let outcome = run_refresh(&collaborators, &options, print_event)?;
    print_summary(&outcome);
    Ok(())
}

fn print_event(event: &RefreshEvent) {
    match event {
        RefreshEvent::Target {
            org_alias,
            env,
            login_url,
        } => println!("Target org: {org_alias} ({env}, {login_url})"),
        RefreshEvent::Project(setup) => println!("Project: {setup:?}"),
        RefreshEvent::Auth(state) => println!("Authentication: {state:?}"),
        RefreshEvent::ApiVersion(version) => println!("API version: {version}"),
        RefreshEvent::CandidatesDiscovered { count } => {
            println!("Discovered {count} metadata types");
        }
        RefreshEvent::OverrideReady { type_name, members } => {
            println!("Listed {members} members for {type_name}");
        }
        RefreshEvent::Retrieve(event) => print_retrieve_event(event),
        RefreshEvent::Commit(status) => match status {
            CommitStatus::Skipped => {}
            CommitStatus::Committed => println!("Committed snapshot to git"),
            CommitStatus::NothingToCommit => println!("No changes to commit"),
            CommitStatus::Failed(reason) => eprintln!("Git commit failed: {reason}"),
        },
    }
}

fn print_retrieve_event(event: &RetrieveEvent) {
    match event {
        RetrieveEvent::AttemptStarted {
            attempt,
            max_attempts,
        } => println!("Attempt {attempt}/{max_attempts}"),
        RetrieveEvent::ManifestWritten {
            type_count,
            api_version,
            ..
        } => println!("Wrote manifest/package.xml ({type_count} types, API {api_version})"),
        RetrieveEvent::PreviousOutputRemoved { .. } => {
            println!("Removed previous force-app/main");
        }
        RetrieveEvent::Excluded { types, .. } => {
            println!("Excluding: {}", types.join(", "));
        }
        RetrieveEvent::Succeeded { attempt } => {
            println!("Retrieve succeeded on attempt {attempt}");
        }
    }
}

fn print_summary(outcome: &RefreshOutcome) {
    println!(
        "Refresh complete: {} candidate types, {} attempt(s)",
        outcome.candidate_count, outcome.retrieve.attempts
    );
    if !outcome.retrieve.exclusions.is_empty() {
        println!(
            "Excluded types: {}",
            outcome.retrieve.exclusions.join(", ")
        );
    }
}

fn terminal_exclusions(err: &anyhow::Error) -> Option<&[String]> {
    if let Some(aborted) = err.downcast_ref::<RetrieveAborted>() {
        return Some(&aborted.exclusions);
    }
    err.downcast_ref::<RetriesExhausted>()
        .map(|exhausted| exhausted.exclusions.as_slice())
}
