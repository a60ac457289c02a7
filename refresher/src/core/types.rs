//! Shared deterministic types for the refresh core.
//!
//! These types define stable contracts between the manifest builder and the
//! retry controller. They carry no I/O handles and must stay deterministic.

use std::collections::BTreeMap;

/// Name of one metadata category (e.g. `ApexClass`). Compared by exact match.
pub type TypeName = String;

/// Explicit member list for a type that must not be retrieved via wildcard alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberOverride {
    /// Concrete member identifiers, emitted in this order.
    pub members: Vec<String>,
    /// Also emit a trailing `*` after the explicit members.
    ///
    /// Used for standard objects: instances created after the listing was taken
    /// are still covered by the wildcard.
    pub include_wildcard: bool,
}

impl MemberOverride {
    pub fn explicit(members: Vec<String>) -> Self {
        Self {
            members,
            include_wildcard: false,
        }
    }

    pub fn with_wildcard(members: Vec<String>) -> Self {
        Self {
            members,
            include_wildcard: true,
        }
    }
}

/// Per-type member overrides, fetched once before the retrieve loop.
pub type MemberOverrides = BTreeMap<TypeName, MemberOverride>;

/// Classified result of one retrieve attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The retriever reported status 0.
    Success,
    /// The diagnostic named unsupported types that were not yet excluded.
    Retryable(Vec<TypeName>),
    /// Nothing the narrowing loop can fix.
    Fatal(String),
}
