//! Test-only scripted collaborators.
//!
//! These stand in for the platform CLI so the retrieve loop and the full
//! pipeline can run without processes or network access.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::io::git::Committer;
use crate::io::org::{OrgCredentials, OrgIntrospector};
use crate::io::project::{Authenticator, Scaffolder};
use crate::io::retriever::{RetrieveCapture, RetrieveRequest, Retriever};

/// JSON printed by a successful retrieve.
pub fn success_json() -> String {
    json!({
        "status": 0,
        "result": { "done": true, "status": "Succeeded", "success": true, "files": [] },
        "warnings": [],
    })
    .to_string()
}

/// JSON printed by a retrieve that trips over types missing from the registry.
pub fn missing_types_failure(types: &[&str]) -> String {
    let messages: Vec<String> = types
        .iter()
        .map(|t| format!("Missing metadata type definition in registry for id '{t}'."))
        .collect();
    json!({
        "status": 1,
        "name": "TypeInferenceError",
        "message": messages.join(" "),
        "exitCode": 1,
        "warnings": [],
    })
    .to_string()
}

/// Retriever that replays queued captures and records every manifest it saw.
///
/// On a capture with status 0 it drops a marker file into `force-app/main` the
/// way a real retrieve populates the tree.
pub struct ScriptedRetriever {
    captures: RefCell<VecDeque<RetrieveCapture>>,
    manifests: RefCell<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn new(captures: Vec<RetrieveCapture>) -> Self {
        Self {
            captures: RefCell::new(captures.into()),
            manifests: RefCell::new(Vec::new()),
        }
    }

    /// Manifest text observed on each call, in call order.
    pub fn manifests(&self) -> Vec<String> {
        self.manifests.borrow().clone()
    }
}

impl Retriever for ScriptedRetriever {
    fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveCapture> {
        let manifest = fs::read_to_string(request.workdir.join(&request.manifest))?;
        self.manifests.borrow_mut().push(manifest);
        let attempt = self.manifests.borrow().len();

        let capture = self
            .captures
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted retriever exhausted"))?;
        if capture.raw.contains("\"status\":0") {
            let dir = request.workdir.join("force-app").join("main").join("default");
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("attempt-{attempt}.txt")), "retrieved")?;
        }
        Ok(capture)
    }
}

/// Org with canned listings.
#[derive(Debug, Default)]
pub struct FakeOrg {
    pub api_versions: Vec<String>,
    pub metadata_types: Vec<String>,
    pub sobjects: Vec<String>,
    /// Keyed by `(metadata type, folder)`; unknown keys list nothing.
    pub listings: HashMap<(String, Option<String>), Vec<String>>,
    /// Makes `metadata_types` fail.
    pub fail_metadata_types: bool,
    pub sobject_calls: Cell<u32>,
}

impl OrgIntrospector for FakeOrg {
    fn credentials(&self, _alias: &str) -> Result<OrgCredentials> {
        Ok(OrgCredentials {
            instance_url: "https://example.my.salesforce.com".to_string(),
            access_token: "token".to_string(),
        })
    }

    fn api_versions(&self, _credentials: &OrgCredentials) -> Result<Vec<String>> {
        Ok(self.api_versions.clone())
    }

    fn metadata_types(&self, _alias: &str, _api_version: &str) -> Result<Vec<String>> {
        if self.fail_metadata_types {
            return Err(anyhow!("describe failed"));
        }
        Ok(self.metadata_types.clone())
    }

    fn sobjects(&self, _alias: &str) -> Result<Vec<String>> {
        self.sobject_calls.set(self.sobject_calls.get() + 1);
        Ok(self.sobjects.clone())
    }

    fn list_metadata(
        &self,
        _alias: &str,
        metadata_type: &str,
        folder: Option<&str>,
        _api_version: &str,
    ) -> Result<Vec<String>> {
        let key = (metadata_type.to_string(), folder.map(str::to_string));
        Ok(self.listings.get(&key).cloned().unwrap_or_default())
    }
}

/// Scaffolder and authenticator that succeed, recording what they were asked.
#[derive(Debug, Default)]
pub struct FakeSetup {
    /// Result of the authentication probe.
    pub authenticated: bool,
    pub generated: RefCell<Vec<String>>,
    pub logins: RefCell<Vec<(String, String)>>,
}

impl Scaffolder for FakeSetup {
    fn generate(&self, parent_dir: &Path, name: &str) -> Result<()> {
        let dir = parent_dir.join(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("sfdx-project.json"), "{}\n")?;
        self.generated.borrow_mut().push(name.to_string());
        Ok(())
    }
}

impl Authenticator for FakeSetup {
    fn probe(&self, _alias: &str) -> Result<bool> {
        Ok(self.authenticated)
    }

    fn login(&self, alias: &str, instance_url: &str) -> Result<()> {
        self.logins
            .borrow_mut()
            .push((alias.to_string(), instance_url.to_string()));
        Ok(())
    }
}

/// Committer that records messages and optionally fails.
#[derive(Debug, Default)]
pub struct FakeCommitter {
    pub fail: bool,
    pub messages: RefCell<Vec<String>>,
}

impl Committer for FakeCommitter {
    fn commit_snapshot(&self, message: &str) -> Result<bool> {
        self.messages.borrow_mut().push(message.to_string());
        if self.fail {
            return Err(anyhow!("author identity unknown"));
        }
        Ok(true)
    }
}

/// Temporary directory that holds one project.
pub struct TestProject {
    _temp: tempfile::TempDir,
    root: std::path::PathBuf,
}

impl TestProject {
    /// Project directory `acme` inside a fresh temp dir (not yet scaffolded).
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("acme");
        Ok(Self { _temp: temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
