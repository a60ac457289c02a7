//! I/O adapters for the refresher: processes, files, git, and the platform CLI.

pub mod config;
pub mod git;
pub mod org;
pub mod paths;
pub mod process;
pub mod project;
pub mod retriever;
pub mod sf;
pub mod snapshot;
