//! Org introspection: credentials, API versions, type catalog, and listings.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::io::sf::SfCli;

/// Session details needed to call the org's REST endpoints directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgCredentials {
    pub instance_url: String,
    pub access_token: String,
}

/// Read-only queries against an authenticated org.
pub trait OrgIntrospector {
    fn credentials(&self, alias: &str) -> Result<OrgCredentials>;

    /// Supported API versions, oldest first (the newest is last).
    fn api_versions(&self, credentials: &OrgCredentials) -> Result<Vec<String>>;

    /// Every retrievable metadata type name at `api_version`.
    fn metadata_types(&self, alias: &str, api_version: &str) -> Result<Vec<String>>;

    /// Names of every sobject visible to the session.
    fn sobjects(&self, alias: &str) -> Result<Vec<String>>;

    /// Full names of the items of `metadata_type`, optionally within `folder`.
    fn list_metadata(
        &self,
        alias: &str,
        metadata_type: &str,
        folder: Option<&str>,
        api_version: &str,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayResult {
    instance_url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

/// Extract credentials from the `result` of `sf org display --json`.
pub fn parse_credentials(result: &Value) -> Result<OrgCredentials> {
    let display: DisplayResult =
        serde_json::from_value(result.clone()).context("parse org display result")?;
    let instance_url = display
        .instance_url
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("org display result has no instanceUrl"))?;
    let access_token = display
        .access_token
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("org display result has no accessToken"))?;
    Ok(OrgCredentials {
        instance_url: instance_url.trim_end_matches('/').to_string(),
        access_token,
    })
}

/// Extract version strings from the `/services/data` listing, preserving order.
pub fn parse_api_versions(body: &Value) -> Result<Vec<String>> {
    let entries: Vec<VersionEntry> =
        serde_json::from_value(body.clone()).context("parse api version listing")?;
    Ok(entries.into_iter().map(|e| e.version).collect())
}

/// Newest version of an oldest-first listing.
pub fn latest_version(versions: &[String]) -> Result<&str> {
    versions
        .last()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("org reported no API versions"))
}

/// Extract `xmlName`s from the `result` of `sf org list metadata-types --json`.
pub fn parse_metadata_types(result: &Value) -> Result<Vec<String>> {
    let objects = result
        .get("metadataObjects")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("metadata type listing has no metadataObjects array"))?;
    Ok(objects
        .iter()
        .filter_map(|obj| obj.get("xmlName").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Extract names from the `result` of `sf sobject list --json`.
pub fn parse_sobjects(result: &Value) -> Result<Vec<String>> {
    let names = result
        .as_array()
        .ok_or_else(|| anyhow!("sobject listing is not an array"))?;
    Ok(names
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

/// Extract `fullName`s from the `result` of `sf org list metadata --json`.
///
/// The listing is an array, but a single item may come back as a bare object and
/// an empty listing as `null`; all three shapes are accepted.
pub fn parse_list_metadata(result: &Value) -> Result<Vec<String>> {
    let items: Vec<&Value> = match result {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![result],
        other => return Err(anyhow!("unexpected metadata listing: {other}")),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| item.get("fullName").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// GET `<instance>/services/data` with the session's bearer token.
#[instrument(skip_all, fields(instance_url = %credentials.instance_url))]
pub fn fetch_api_versions(credentials: &OrgCredentials, timeout: Duration) -> Result<Vec<String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")?;
    let url = format!("{}/services/data", credentials.instance_url);
    let response = client
        .get(&url)
        .bearer_auth(&credentials.access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .with_context(|| format!("GET {url}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("GET {url} returned {status}"));
    }
    let body: Value = response
        .json()
        .with_context(|| format!("decode {url} response"))?;
    let versions = parse_api_versions(&body)?;
    debug!(count = versions.len(), "api versions fetched");
    Ok(versions)
}

impl OrgIntrospector for SfCli {
    fn credentials(&self, alias: &str) -> Result<OrgCredentials> {
        let result = self.run_json(&["org", "display", "--target-org", alias, "--json"], None)?;
        parse_credentials(&result)
    }

    fn api_versions(&self, credentials: &OrgCredentials) -> Result<Vec<String>> {
        fetch_api_versions(credentials, self.command_timeout)
    }

    fn metadata_types(&self, alias: &str, api_version: &str) -> Result<Vec<String>> {
        let result = self.run_json(
            &[
                "org",
                "list",
                "metadata-types",
                "--target-org",
                alias,
                "--api-version",
                api_version,
                "--json",
            ],
            None,
        )?;
        parse_metadata_types(&result)
    }

    fn sobjects(&self, alias: &str) -> Result<Vec<String>> {
        let result = self.run_json(
            &[
                "sobject",
                "list",
                "--sobject",
                "all",
                "--target-org",
                alias,
                "--json",
            ],
            None,
        )?;
        parse_sobjects(&result)
    }

    fn list_metadata(
        &self,
        alias: &str,
        metadata_type: &str,
        folder: Option<&str>,
        api_version: &str,
    ) -> Result<Vec<String>> {
        let mut args = vec![
            "org",
            "list",
            "metadata",
            "--metadata-type",
            metadata_type,
            "--target-org",
            alias,
            "--api-version",
            api_version,
            "--json",
        ];
        if let Some(folder) = folder {
            args.push("--folder");
            args.push(folder);
        }
        let result = self.run_json(&args, None)?;
        parse_list_metadata(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credentials_require_url_and_token() {
        let creds = parse_credentials(&json!({
            "instanceUrl": "https://acme.my.salesforce.com/",
            "accessToken": "00D!token",
            "username": "admin@acme.test",
        }))
        .expect("creds");
        assert_eq!(creds.instance_url, "https://acme.my.salesforce.com");
        assert_eq!(creds.access_token, "00D!token");

        let err = parse_credentials(&json!({ "instanceUrl": "https://x" })).unwrap_err();
        assert!(err.to_string().contains("accessToken"));
    }

    #[test]
    fn latest_version_is_last_entry() {
        let versions = parse_api_versions(&json!([
            { "label": "Winter '24", "url": "/services/data/v59.0", "version": "59.0" },
            { "label": "Spring '24", "url": "/services/data/v60.0", "version": "60.0" },
        ]))
        .expect("versions");
        assert_eq!(latest_version(&versions).expect("latest"), "60.0");
        assert!(latest_version(&[]).is_err());
    }

    #[test]
    fn metadata_types_read_xml_names() {
        let types = parse_metadata_types(&json!({
            "metadataObjects": [
                { "xmlName": "ApexClass", "directoryName": "classes" },
                { "xmlName": "CustomObject", "childXmlNames": ["CustomField"] },
                { "directoryName": "orphan" },
            ],
            "organizationNamespace": "",
        }))
        .expect("types");
        assert_eq!(types, vec!["ApexClass", "CustomObject"]);
    }

    #[test]
    fn list_metadata_accepts_array_object_and_null() {
        let many = parse_list_metadata(&json!([
            { "fullName": "Sales/Pipeline", "type": "Report" },
            { "fullName": "Sales/Forecast", "type": "Report" },
        ]))
        .expect("array");
        assert_eq!(many, vec!["Sales/Pipeline", "Sales/Forecast"]);

        let one = parse_list_metadata(&json!({ "fullName": "Sales", "type": "ReportFolder" }))
            .expect("object");
        assert_eq!(one, vec!["Sales"]);

        assert!(parse_list_metadata(&Value::Null).expect("null").is_empty());
        assert!(parse_list_metadata(&json!("oops")).is_err());
    }

    #[test]
    fn sobjects_are_plain_strings() {
        let names = parse_sobjects(&json!(["Account", "Invoice__c"])).expect("sobjects");
        assert_eq!(names, vec!["Account", "Invoice__c"]);
    }
}
