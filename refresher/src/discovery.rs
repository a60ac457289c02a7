//! Pre-loop discovery: API version, candidate types, and member overrides.
//!
//! Everything here runs once before the retrieve loop. Override steps are
//! independent of one another; each contributes at most one [`MemberOverride`].

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::candidates::{is_standard_object, merge_candidates};
use crate::core::types::{MemberOverride, MemberOverrides, TypeName};
use crate::io::config::{OverrideConfig, RefreshConfig};
use crate::io::org::{OrgIntrospector, latest_version};

/// Type under which standard objects are listed.
pub const CUSTOM_OBJECT_TYPE: &str = "CustomObject";

/// Type whose members are listed explicitly by [`OverrideStep::NotificationTypes`].
pub const NOTIFICATION_TYPE: &str = "CustomNotificationType";

/// One pluggable member enumeration run before the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideStep {
    /// List standard sobjects under `CustomObject`, keeping a trailing wildcard.
    StandardObjects,
    /// List the folders of `folder_type`, then the `item_type` items of each.
    FolderScoped {
        item_type: String,
        folder_type: String,
    },
    /// List `CustomNotificationType` members explicitly.
    NotificationTypes,
}

impl OverrideStep {
    /// Manifest type this step produces members for.
    pub fn type_name(&self) -> &str {
        match self {
            OverrideStep::StandardObjects => CUSTOM_OBJECT_TYPE,
            OverrideStep::FolderScoped { item_type, .. } => item_type,
            OverrideStep::NotificationTypes => NOTIFICATION_TYPE,
        }
    }

    #[instrument(skip_all, fields(type_name = self.type_name()))]
    pub fn fetch<O: OrgIntrospector>(
        &self,
        org: &O,
        alias: &str,
        api_version: &str,
    ) -> Result<MemberOverride> {
        match self {
            OverrideStep::StandardObjects => {
                let names = org.sobjects(alias).context("list sobjects")?;
                let standard: Vec<String> = names
                    .into_iter()
                    .filter(|name| is_standard_object(name))
                    .collect();
                debug!(count = standard.len(), "standard objects listed");
                Ok(MemberOverride::with_wildcard(standard))
            }
            OverrideStep::FolderScoped {
                item_type,
                folder_type,
            } => {
                let folders = org
                    .list_metadata(alias, folder_type, None, api_version)
                    .with_context(|| format!("list {folder_type} folders"))?;
                let mut members = Vec::new();
                for folder in folders {
                    let items = org
                        .list_metadata(alias, item_type, Some(&folder), api_version)
                        .with_context(|| format!("list {item_type} items in folder {folder}"))?;
                    members.push(folder);
                    members.extend(items);
                }
                debug!(count = members.len(), "folder-scoped members listed");
                Ok(MemberOverride::explicit(members))
            }
            OverrideStep::NotificationTypes => {
                let names = org
                    .list_metadata(alias, NOTIFICATION_TYPE, None, api_version)
                    .context("list notification types")?;
                Ok(MemberOverride::explicit(names))
            }
        }
    }
}

/// Override steps enabled by `config`, in a fixed order.
pub fn override_steps(config: &OverrideConfig) -> Vec<OverrideStep> {
    let mut steps = Vec::new();
    if config.standard_objects {
        steps.push(OverrideStep::StandardObjects);
    }
    for folder in &config.folder_types {
        steps.push(OverrideStep::FolderScoped {
            item_type: folder.item_type.clone(),
            folder_type: folder.folder_type.clone(),
        });
    }
    if config.notification_types {
        steps.push(OverrideStep::NotificationTypes);
    }
    steps
}

/// Run every step whose type is a candidate and collect the results.
///
/// Steps for types not among `candidates` are skipped; they could never reach
/// the manifest.
pub fn collect_overrides<O: OrgIntrospector>(
    org: &O,
    alias: &str,
    api_version: &str,
    candidates: &[TypeName],
    steps: &[OverrideStep],
) -> Result<MemberOverrides> {
    let mut overrides = MemberOverrides::new();
    for step in steps {
        let type_name = step.type_name();
        if !candidates.iter().any(|c| c == type_name) {
            debug!(type_name, "override step skipped (not a candidate)");
            continue;
        }
        let entry = step.fetch(org, alias, api_version)?;
        info!(type_name, members = entry.members.len(), "member override ready");
        overrides.insert(type_name.to_string(), entry);
    }
    Ok(overrides)
}

/// Resolve the API version: the configured pin, else the org's newest.
#[instrument(skip_all, fields(alias))]
pub fn resolve_api_version<O: OrgIntrospector>(
    org: &O,
    alias: &str,
    config: &RefreshConfig,
) -> Result<String> {
    if let Some(version) = &config.api_version {
        debug!(version, "using configured api version");
        return Ok(version.clone());
    }
    let credentials = org.credentials(alias).context("read org credentials")?;
    let versions = org.api_versions(&credentials).context("list api versions")?;
    Ok(latest_version(&versions)?.to_string())
}

/// Discovered type names followed by the supplemental list.
#[instrument(skip_all, fields(alias, api_version))]
pub fn discover_candidates<O: OrgIntrospector>(
    org: &O,
    alias: &str,
    api_version: &str,
    supplemental: &[String],
) -> Result<Vec<TypeName>> {
    let discovered = org
        .metadata_types(alias, api_version)
        .context("list metadata types")?;
    debug!(count = discovered.len(), "metadata types discovered");
    Ok(merge_candidates(&discovered, supplemental))
}
