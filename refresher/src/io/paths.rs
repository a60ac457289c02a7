//! Canonical file locations inside a refreshed project.

use std::path::{Path, PathBuf};

/// All paths the refresher reads or writes for one project directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    /// Marker whose presence means the project skeleton already exists.
    pub project_marker_path: PathBuf,
    pub manifest_dir: PathBuf,
    pub package_xml_path: PathBuf,
    /// Destination tree of retrieved metadata; reset before every attempt.
    pub main_dir: PathBuf,
    /// Raw retriever output, kept on disk only when it cannot be parsed.
    pub retrieve_result_path: PathBuf,
    pub config_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let manifest_dir = root.join("manifest");
        Self {
            project_marker_path: root.join("sfdx-project.json"),
            package_xml_path: manifest_dir.join("package.xml"),
            manifest_dir,
            main_dir: root.join("force-app").join("main"),
            retrieve_result_path: root.join("retrieve_result.json"),
            config_path: root.join("refresher.toml"),
            root,
        }
    }

    /// Relative manifest path as passed to the retriever (which runs in `root`).
    pub fn manifest_arg(&self) -> &'static Path {
        Path::new("manifest/package.xml")
    }

    pub fn project_exists(&self) -> bool {
        self.project_marker_path.is_file()
    }
}
