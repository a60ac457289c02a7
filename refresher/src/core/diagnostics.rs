//! Parser for retriever diagnostics.
//!
//! The retriever reports types missing from its registry only as free text inside
//! its JSON result. This module recognizes exactly one message shape and nothing
//! else; any other failure is left to the caller to treat as fatal.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::exclusions::ExclusionSet;
use crate::core::types::{AttemptOutcome, TypeName};

static MISSING_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Missing metadata type definition in registry for id '([^']+)'").unwrap()
});

/// Extract every type id named by a "missing registry definition" message.
///
/// Ids are returned in order of appearance, duplicates included.
pub fn missing_type_ids(text: &str) -> Vec<TypeName> {
    MISSING_TYPE_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Read the top-level `status` field of a retriever JSON result.
pub fn result_status(result: &Value) -> Option<i64> {
    result.get("status").and_then(Value::as_i64)
}

/// Classify a parsed retriever result against the current exclusions.
///
/// `status == 0` is success. Otherwise the full serialized result is scanned for
/// missing-type messages; ids not yet excluded make the attempt retryable. A
/// failure with no matches, or whose matches are all already excluded, is fatal:
/// retrying would send the same manifest again.
///
/// Does not mutate `exclusions`; the controller applies the returned ids.
pub fn classify_result(result: &Value, exclusions: &ExclusionSet) -> AttemptOutcome {
    if result_status(result) == Some(0) {
        return AttemptOutcome::Success;
    }

    let text = result.to_string();
    let found = missing_type_ids(&text);
    if found.is_empty() {
        return AttemptOutcome::Fatal(format!("unknown retrieve failure: {}", summarize(result)));
    }

    let mut fresh: Vec<TypeName> = Vec::new();
    for id in found {
        if !exclusions.contains(&id) && !fresh.contains(&id) {
            fresh.push(id);
        }
    }
    if fresh.is_empty() {
        return AttemptOutcome::Fatal(format!(
            "retrieve keeps failing on already excluded types: {}",
            summarize(result)
        ));
    }
    AttemptOutcome::Retryable(fresh)
}

/// Short human-readable form of a result for error messages.
fn summarize(result: &Value) -> String {
    if let Some(message) = result.get("message").and_then(Value::as_str) {
        let name = result.get("name").and_then(Value::as_str).unwrap_or("Error");
        return format!("{name}: {message}");
    }
    let mut text = result.to_string();
    if text.len() > 2_000 {
        let mut cut = 2_000;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
