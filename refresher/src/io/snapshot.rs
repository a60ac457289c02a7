//! Filesystem steps of a retrieve attempt: manifest, destination tree, capture file.

use std::fs;
use std::io::ErrorKind;

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::paths::ProjectPaths;

/// Write `manifest/package.xml`, creating `manifest/` when needed.
pub fn write_manifest(paths: &ProjectPaths, contents: &str) -> Result<()> {
    fs::create_dir_all(&paths.manifest_dir)
        .with_context(|| format!("create directory {}", paths.manifest_dir.display()))?;
    fs::write(&paths.package_xml_path, contents)
        .with_context(|| format!("write manifest {}", paths.package_xml_path.display()))
}

/// Delete the retrieved tree so a new attempt never merges with an older one.
///
/// Returns whether anything was removed.
pub fn reset_main_dir(paths: &ProjectPaths) -> Result<bool> {
    match fs::remove_dir_all(&paths.main_dir) {
        Ok(()) => {
            debug!(dir = %paths.main_dir.display(), "removed previous retrieve output");
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => {
            Err(err).with_context(|| format!("remove {}", paths.main_dir.display()))
        }
    }
}

/// Persist raw retriever output before parsing it.
pub fn write_capture(paths: &ProjectPaths, raw: &str) -> Result<()> {
    fs::write(&paths.retrieve_result_path, raw).with_context(|| {
        format!(
            "write retrieve capture {}",
            paths.retrieve_result_path.display()
        )
    })
}

/// Remove the capture file once its contents parsed.
pub fn remove_capture(paths: &ProjectPaths) -> Result<()> {
    match fs::remove_file(&paths.retrieve_result_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| {
            format!(
                "remove retrieve capture {}",
                paths.retrieve_result_path.display()
            )
        }),
    }
}
