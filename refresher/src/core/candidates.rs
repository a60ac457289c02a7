//! Candidate list assembly.

use std::collections::HashSet;

use crate::core::types::TypeName;

/// Build the ordered candidate list: discovered names first (first occurrence
/// wins), then each supplemental name that is not already present.
pub fn merge_candidates<S: AsRef<str>>(discovered: &[S], supplemental: &[S]) -> Vec<TypeName> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(discovered.len() + supplemental.len());
    for name in discovered.iter().chain(supplemental) {
        let name = name.as_ref();
        if name.trim().is_empty() {
            continue;
        }
        if seen.insert(name) {
            merged.push(name.to_string());
        }
    }
    merged
}

/// True for sobject names that belong to the platform rather than to a package
/// or to the org itself (`Account`, not `Invoice__c` or `ns__Thing__c`).
pub fn is_standard_object(name: &str) -> bool {
    !name.is_empty() && !name.contains("__")
}
