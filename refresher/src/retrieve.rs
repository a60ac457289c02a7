//! Retry-driven manifest narrowing around the retriever.
//!
//! Each attempt rebuilds the manifest from the candidate list minus the current
//! exclusions, resets the destination tree, runs the retriever, and classifies the
//! result. Types the retriever's registry does not know are excluded and the
//! attempt is repeated; every other failure ends the loop.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::diagnostics::classify_result;
use crate::core::exclusions::ExclusionSet;
use crate::core::manifest::build_manifest;
use crate::core::types::{AttemptOutcome, MemberOverrides, TypeName};
use crate::io::paths::ProjectPaths;
use crate::io::retriever::{RetrieveRequest, Retriever};
use crate::io::snapshot::{remove_capture, reset_main_dir, write_capture, write_manifest};

/// Default ceiling on retrieve attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Inputs for one run of the narrowing loop. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct RetrievePlan {
    pub org_alias: String,
    pub candidates: Vec<TypeName>,
    pub overrides: MemberOverrides,
    pub api_version: String,
    pub seed_exclusions: Vec<TypeName>,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
}

/// Progress notifications emitted by [`retrieve_with_retries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveEvent {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    ManifestWritten {
        attempt: u32,
        type_count: usize,
        api_version: String,
    },
    PreviousOutputRemoved {
        attempt: u32,
    },
    Excluded {
        attempt: u32,
        types: Vec<TypeName>,
    },
    Succeeded {
        attempt: u32,
    },
}

/// Successful end of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveSummary {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Final exclusion set, in exclusion order (seed first).
    pub exclusions: Vec<TypeName>,
}

/// The loop stopped on a failure that narrowing cannot fix.
#[derive(Debug, Clone, Error)]
#[error("retrieve aborted on attempt {attempt}: {reason}")]
pub struct RetrieveAborted {
    pub attempt: u32,
    pub reason: String,
    pub exclusions: Vec<TypeName>,
}

/// Every allowed attempt ended with a retryable failure.
#[derive(Debug, Clone, Error)]
#[error("exceeded maximum retrieve attempts ({max_attempts})")]
pub struct RetriesExhausted {
    pub max_attempts: u32,
    pub exclusions: Vec<TypeName>,
}

/// Run the retriever until it succeeds, fails fatally, or attempts run out.
///
/// Terminal failures are returned as [`RetrieveAborted`] or [`RetriesExhausted`]
/// inside the `anyhow::Error` so callers can `downcast_ref` them; filesystem
/// errors propagate unchanged.
#[instrument(skip_all, fields(org_alias = %plan.org_alias, max_attempts = plan.max_attempts))]
pub fn retrieve_with_retries<R: Retriever, F: FnMut(&RetrieveEvent)>(
    retriever: &R,
    paths: &ProjectPaths,
    plan: &RetrievePlan,
    mut on_event: F,
) -> Result<RetrieveSummary> {
    let mut exclusions = ExclusionSet::seeded(&plan.seed_exclusions);
    let request = RetrieveRequest {
        workdir: paths.root.clone(),
        manifest: paths.manifest_arg().to_path_buf(),
        org_alias: plan.org_alias.clone(),
        timeout: plan.attempt_timeout,
    };

    let mut attempt = 0u32;
    while attempt < plan.max_attempts {
        attempt += 1;
        on_event(&RetrieveEvent::AttemptStarted {
            attempt,
            max_attempts: plan.max_attempts,
        });

        let manifest = build_manifest(
            &plan.candidates,
            &exclusions,
            &plan.overrides,
            &plan.api_version,
        );
        write_manifest(paths, &manifest)?;
        on_event(&RetrieveEvent::ManifestWritten {
            attempt,
            type_count: active_count(&plan.candidates, &exclusions),
            api_version: plan.api_version.clone(),
        });

        if reset_main_dir(paths)? {
            on_event(&RetrieveEvent::PreviousOutputRemoved { attempt });
        }

        let capture = retriever.retrieve(&request)?;
        write_capture(paths, &capture.raw)?;
        debug!(attempt, exit_code = ?capture.exit_code, bytes = capture.raw.len(), "retrieve captured");

        if capture.timed_out {
            return Err(aborted(
                attempt,
                format!(
                    "retrieve timed out after {:?}; output saved to {}",
                    plan.attempt_timeout,
                    paths.retrieve_result_path.display()
                ),
                &exclusions,
            ));
        }

        let result: Value = match serde_json::from_str(capture.raw.trim()) {
            Ok(value) => value,
            Err(err) => {
                return Err(aborted(
                    attempt,
                    format!(
                        "cannot parse retrieve output as JSON ({err}); raw output kept at {}",
                        paths.retrieve_result_path.display()
                    ),
                    &exclusions,
                ));
            }
        };
        remove_capture(paths)?;

        match classify_result(&result, &exclusions) {
            AttemptOutcome::Success => {
                let excluded = exclusions.to_vec();
                info!(attempt, excluded = excluded.len(), "retrieve succeeded");
                on_event(&RetrieveEvent::Succeeded { attempt });
                return Ok(RetrieveSummary {
                    attempts: attempt,
                    exclusions: excluded,
                });
            }
            AttemptOutcome::Retryable(types) => {
                let active_before = active_count(&plan.candidates, &exclusions);
                let added = exclusions.extend_new(&types);
                for name in &added {
                    warn!(attempt, type_name = %name, "excluding type unknown to the retrieve registry");
                }
                if active_count(&plan.candidates, &exclusions) == active_before {
                    // None of the rejected types is in the manifest, so the next
                    // attempt would resend it unchanged.
                    let reason = format!(
                        "retrieve rejected types outside the manifest: {}",
                        added.join(", ")
                    );
                    on_event(&RetrieveEvent::Excluded {
                        attempt,
                        types: added,
                    });
                    return Err(aborted(attempt, reason, &exclusions));
                }
                on_event(&RetrieveEvent::Excluded {
                    attempt,
                    types: added,
                });
            }
            AttemptOutcome::Fatal(reason) => {
                return Err(aborted(attempt, reason, &exclusions));
            }
        }
    }

    warn!(max_attempts = plan.max_attempts, "retrieve attempts exhausted");
    Err(anyhow::Error::new(RetriesExhausted {
        max_attempts: plan.max_attempts,
        exclusions: exclusions.to_vec(),
    }))
}

fn aborted(attempt: u32, reason: String, exclusions: &ExclusionSet) -> anyhow::Error {
    warn!(attempt, reason = %reason, "retrieve aborted");
    anyhow::Error::new(RetrieveAborted {
        attempt,
        reason,
        exclusions: exclusions.to_vec(),
    })
}

fn active_count(candidates: &[TypeName], exclusions: &ExclusionSet) -> usize {
    candidates
        .iter()
        .filter(|name| !exclusions.contains(name))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::retriever::RetrieveCapture;
    use crate::test_support::{ScriptedRetriever, missing_types_failure, success_json};
    use std::fs;

    fn plan(candidates: &[&str], seed: &[&str], max_attempts: u32) -> RetrievePlan {
        RetrievePlan {
            org_alias: "myOrg".to_string(),
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
            overrides: MemberOverrides::new(),
            api_version: "62.0".to_string(),
            seed_exclusions: seed.iter().map(|s| s.to_string()).collect(),
            max_attempts,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn success_on_first_attempt_resets_tree_once_and_clears_capture() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        fs::create_dir_all(paths.main_dir.join("default")).expect("stale tree");
        fs::write(paths.main_dir.join("default").join("Stale.cls"), "old").expect("stale file");

        let retriever = ScriptedRetriever::new(vec![RetrieveCapture::completed(success_json(), 0)]);
        let mut events = Vec::new();
        let summary = retrieve_with_retries(
            &retriever,
            &paths,
            &plan(&["ApexClass"], &[], 3),
            |e| events.push(e.clone()),
        )
        .expect("retrieve");

        assert_eq!(summary.attempts, 1);
        assert!(summary.exclusions.is_empty());
        assert!(!paths.retrieve_result_path.exists());
        assert!(!paths.main_dir.join("default").join("Stale.cls").exists());
        assert!(paths.main_dir.join("default").join("attempt-1.txt").is_file());
        let resets = events
            .iter()
            .filter(|e| matches!(e, RetrieveEvent::PreviousOutputRemoved { .. }))
            .count();
        assert_eq!(resets, 1);
        assert_eq!(retriever.manifests().len(), 1);
    }

    #[test]
    fn seeded_exclusions_shape_the_first_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![RetrieveCapture::completed(success_json(), 0)]);

        retrieve_with_retries(&retriever, &paths, &plan(&["A", "B", "C"], &["B"], 3), |_| {})
            .expect("retrieve");

        let manifest = &retriever.manifests()[0];
        assert!(manifest.contains("<name>A</name>"));
        assert!(!manifest.contains("<name>B</name>"));
        assert!(manifest.contains("<name>C</name>"));
    }

    #[test]
    fn missing_types_are_excluded_and_retried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["Foo", "Bar"]), 1),
            RetrieveCapture::completed(success_json(), 0),
        ]);

        let mut excluded = Vec::new();
        let summary = retrieve_with_retries(
            &retriever,
            &paths,
            &plan(&["Foo", "ApexClass", "Bar"], &[], 5),
            |e| {
                if let RetrieveEvent::Excluded { types, .. } = e {
                    excluded.extend(types.clone());
                }
            },
        )
        .expect("retrieve");

        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.exclusions, vec!["Foo", "Bar"]);
        assert_eq!(excluded, vec!["Foo", "Bar"]);
        let manifests = retriever.manifests();
        assert!(manifests[0].contains("<name>Foo</name>"));
        assert!(!manifests[1].contains("<name>Foo</name>"));
        assert!(!manifests[1].contains("<name>Bar</name>"));
        assert!(manifests[1].contains("<name>ApexClass</name>"));
    }

    #[test]
    fn unparseable_output_aborts_and_keeps_capture() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![RetrieveCapture {
            raw: "Error: socket hang up".to_string(),
            exit_code: Some(1),
            timed_out: false,
        }]);

        let err = retrieve_with_retries(&retriever, &paths, &plan(&["A"], &[], 5), |_| {})
            .unwrap_err();
        let aborted = err.downcast_ref::<RetrieveAborted>().expect("aborted");
        assert_eq!(aborted.attempt, 1);
        assert_eq!(
            fs::read_to_string(&paths.retrieve_result_path).expect("capture"),
            "Error: socket hang up"
        );
    }

    #[test]
    fn structured_failure_without_matches_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![RetrieveCapture::completed(
            r#"{"status":1,"name":"INVALID_SESSION_ID","message":"Session expired"}"#,
            1,
        )]);

        let err = retrieve_with_retries(&retriever, &paths, &plan(&["A"], &[], 5), |_| {})
            .unwrap_err();
        let aborted = err.downcast_ref::<RetrieveAborted>().expect("aborted");
        assert!(aborted.reason.contains("Session expired"));
        assert!(!paths.retrieve_result_path.exists());
        assert_eq!(retriever.manifests().len(), 1);
    }

    #[test]
    fn repeated_already_excluded_type_aborts_without_burning_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["Foo"]), 1),
            RetrieveCapture::completed(missing_types_failure(&["Foo"]), 1),
            RetrieveCapture::completed(missing_types_failure(&["Foo"]), 1),
        ]);

        let err = retrieve_with_retries(&retriever, &paths, &plan(&["Foo", "A"], &[], 3), |_| {})
            .unwrap_err();
        let aborted = err.downcast_ref::<RetrieveAborted>().expect("aborted");
        assert_eq!(aborted.attempt, 2);
        assert_eq!(aborted.exclusions, vec!["Foo"]);
    }

    #[test]
    fn exhausts_after_max_attempts_of_progress() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["T1"]), 1),
            RetrieveCapture::completed(missing_types_failure(&["T2"]), 1),
            RetrieveCapture::completed(missing_types_failure(&["T3"]), 1),
        ]);

        let err = retrieve_with_retries(
            &retriever,
            &paths,
            &plan(&["T1", "T2", "T3", "T4"], &[], 3),
            |_| {},
        )
        .unwrap_err();
        let exhausted = err.downcast_ref::<RetriesExhausted>().expect("exhausted");
        assert_eq!(exhausted.max_attempts, 3);
        assert_eq!(exhausted.exclusions, vec!["T1", "T2", "T3"]);
        assert_eq!(retriever.manifests().len(), 3);
    }

    #[test]
    fn exclusions_only_grow_across_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["B"]), 1),
            RetrieveCapture::completed(missing_types_failure(&["B", "D"]), 1),
            RetrieveCapture::completed(success_json(), 0),
        ]);

        let mut counts = Vec::new();
        retrieve_with_retries(
            &retriever,
            &paths,
            &plan(&["A", "B", "C", "D"], &[], 10),
            |e| {
                if let RetrieveEvent::ManifestWritten { type_count, .. } = e {
                    counts.push(*type_count);
                }
            },
        )
        .expect("retrieve");

        assert_eq!(counts, vec![4, 3, 2]);
    }

    #[test]
    fn rejected_type_outside_the_manifest_aborts_without_resending() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["Ghost"]), 1),
            RetrieveCapture::completed(success_json(), 0),
        ]);

        let err = retrieve_with_retries(&retriever, &paths, &plan(&["A", "B"], &[], 5), |_| {})
            .unwrap_err();
        let aborted = err.downcast_ref::<RetrieveAborted>().expect("aborted");
        assert_eq!(aborted.attempt, 1);
        assert!(aborted.reason.contains("Ghost"));
        assert_eq!(aborted.exclusions, vec!["Ghost"]);
        assert_eq!(retriever.manifests().len(), 1);
    }

    #[test]
    fn mixed_rejection_still_retries_when_the_manifest_shrinks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![
            RetrieveCapture::completed(missing_types_failure(&["Ghost", "B"]), 1),
            RetrieveCapture::completed(success_json(), 0),
        ]);

        let summary =
            retrieve_with_retries(&retriever, &paths, &plan(&["A", "B"], &[], 5), |_| {})
                .expect("retrieve");
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.exclusions, vec!["Ghost", "B"]);
    }

    #[test]
    fn timeout_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        let retriever = ScriptedRetriever::new(vec![RetrieveCapture {
            raw: String::new(),
            exit_code: None,
            timed_out: true,
        }]);

        let err = retrieve_with_retries(&retriever, &paths, &plan(&["A"], &[], 3), |_| {})
            .unwrap_err();
        let aborted = err.downcast_ref::<RetrieveAborted>().expect("aborted");
        assert!(aborted.reason.contains("timed out"));
    }
}
