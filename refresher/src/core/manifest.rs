//! Deterministic `package.xml` serialization.
//!
//! The manifest is rebuilt from scratch for every retrieve attempt; nothing here
//! patches a previous document.

use quick_xml::escape::escape;

use crate::core::exclusions::ExclusionSet;
use crate::core::types::{MemberOverrides, TypeName};

/// Namespace of the metadata API manifest format.
pub const MANIFEST_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

/// Member specifier that requests every instance of a type.
pub const WILDCARD: &str = "*";

const INDENT: &str = "    ";

/// Serialize a manifest for `candidates` minus `exclusions`.
///
/// - Candidates are emitted in order; excluded ones produce no element at all.
/// - A candidate with a non-empty override lists its members in override order,
///   followed by `*` when the override asks for a trailing wildcard.
/// - Every other candidate (including empty overrides) gets a single `*`.
///
/// Identical inputs always produce byte-identical output.
pub fn build_manifest(
    candidates: &[TypeName],
    exclusions: &ExclusionSet,
    overrides: &MemberOverrides,
    api_version: &str,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<Package xmlns=\"{MANIFEST_NAMESPACE}\">\n"));

    for name in candidates {
        if exclusions.contains(name) {
            continue;
        }
        out.push_str(INDENT);
        out.push_str("<types>\n");
        for member in members_for(name, overrides) {
            push_element(&mut out, 2, "members", member);
        }
        push_element(&mut out, 2, "name", name);
        out.push_str(INDENT);
        out.push_str("</types>\n");
    }

    push_element(&mut out, 1, "version", api_version);
    out.push_str("</Package>\n");
    out
}

fn members_for<'a>(name: &str, overrides: &'a MemberOverrides) -> Vec<&'a str> {
    match overrides.get(name) {
        Some(entry) if !entry.members.is_empty() => {
            let mut members: Vec<&str> = entry.members.iter().map(String::as_str).collect();
            if entry.include_wildcard {
                members.push(WILDCARD);
            }
            members
        }
        _ => vec![WILDCARD],
    }
}

fn push_element(out: &mut String, depth: usize, tag: &str, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(&format!("<{tag}>{}</{tag}>\n", escape(text)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MemberOverride;
    use pretty_assertions::assert_eq;
    use quick_xml::Reader;
    use quick_xml::events::Event;

    fn names(list: &[&str]) -> Vec<TypeName> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Collect `(type name, members)` pairs and every `version` value.
    fn parse(xml: &str) -> (Vec<(String, Vec<String>)>, Vec<String>) {
        let mut reader = Reader::from_str(xml);
        let mut types = Vec::new();
        let mut versions = Vec::new();
        let mut members = Vec::new();
        let mut text = String::new();
        loop {
            match reader.read_event().expect("xml event") {
                Event::Start(_) => text.clear(),
                Event::Text(e) => text.push_str(&e.unescape().expect("unescape")),
                Event::End(e) => match e.local_name().as_ref() {
                    b"members" => members.push(text.clone()),
                    b"name" => types.push((text.clone(), std::mem::take(&mut members))),
                    b"version" => versions.push(text.clone()),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        (types, versions)
    }

    #[test]
    fn wildcard_entries_in_candidate_order() {
        let xml = build_manifest(
            &names(&["ApexClass", "CustomLabels"]),
            &ExclusionSet::new(),
            &MemberOverrides::new(),
            "62.0",
        );
        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<Package xmlns=\"http://soap.sforce.com/2006/04/metadata\">\n\
\x20   <types>\n\
\x20       <members>*</members>\n\
\x20       <name>ApexClass</name>\n\
\x20   </types>\n\
\x20   <types>\n\
\x20       <members>*</members>\n\
\x20       <name>CustomLabels</name>\n\
\x20   </types>\n\
\x20   <version>62.0</version>\n\
</Package>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn excluded_candidates_are_omitted() {
        let xml = build_manifest(
            &names(&["A", "B", "C"]),
            &ExclusionSet::seeded(["B"]),
            &MemberOverrides::new(),
            "61.0",
        );
        let (types, versions) = parse(&xml);
        let type_names: Vec<&str> = types.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(type_names, vec!["A", "C"]);
        assert_eq!(versions, vec!["61.0"]);
    }

    #[test]
    fn exclusions_not_in_candidates_have_no_effect() {
        let xml = build_manifest(
            &names(&["A"]),
            &ExclusionSet::seeded(["Z"]),
            &MemberOverrides::new(),
            "61.0",
        );
        let (types, _) = parse(&xml);
        assert_eq!(types, vec![("A".to_string(), vec!["*".to_string()])]);
    }

    #[test]
    fn explicit_override_lists_members_in_order() {
        let mut overrides = MemberOverrides::new();
        overrides.insert(
            "Report".to_string(),
            MemberOverride::explicit(names(&["Sales", "Sales/Pipeline", "Ops"])),
        );
        let xml = build_manifest(
            &names(&["Report"]),
            &ExclusionSet::new(),
            &overrides,
            "62.0",
        );
        let (types, _) = parse(&xml);
        assert_eq!(
            types,
            vec![(
                "Report".to_string(),
                names(&["Sales", "Sales/Pipeline", "Ops"])
            )]
        );
    }

    #[test]
    fn wildcard_override_appends_trailing_star() {
        let mut overrides = MemberOverrides::new();
        overrides.insert(
            "CustomObject".to_string(),
            MemberOverride::with_wildcard(names(&["Account", "Contact"])),
        );
        let xml = build_manifest(
            &names(&["CustomObject"]),
            &ExclusionSet::new(),
            &overrides,
            "62.0",
        );
        let (types, _) = parse(&xml);
        assert_eq!(types[0].1, names(&["Account", "Contact", "*"]));
    }

    #[test]
    fn empty_override_falls_back_to_wildcard() {
        let mut overrides = MemberOverrides::new();
        overrides.insert("Dashboard".to_string(), MemberOverride::default());
        let xml = build_manifest(
            &names(&["Dashboard"]),
            &ExclusionSet::new(),
            &overrides,
            "62.0",
        );
        let (types, _) = parse(&xml);
        assert_eq!(types[0].1, names(&["*"]));
    }

    #[test]
    fn override_for_excluded_type_is_dropped() {
        let mut overrides = MemberOverrides::new();
        overrides.insert(
            "Report".to_string(),
            MemberOverride::explicit(names(&["Sales"])),
        );
        let xml = build_manifest(
            &names(&["Report", "ApexClass"]),
            &ExclusionSet::seeded(["Report"]),
            &overrides,
            "62.0",
        );
        assert!(!xml.contains("Sales"));
        let (types, _) = parse(&xml);
        assert_eq!(types.len(), 1);
    }

    #[test]
    fn empty_candidate_list_is_still_a_package() {
        let xml = build_manifest(&[], &ExclusionSet::new(), &MemberOverrides::new(), "60.0");
        let (types, versions) = parse(&xml);
        assert!(types.is_empty());
        assert_eq!(versions, vec!["60.0"]);
        assert!(xml.ends_with("</Package>\n"));
    }

    #[test]
    fn member_text_is_escaped() {
        let mut overrides = MemberOverrides::new();
        overrides.insert(
            "EmailTemplate".to_string(),
            MemberOverride::explicit(names(&["R&D/Welcome<1>"])),
        );
        let xml = build_manifest(
            &names(&["EmailTemplate"]),
            &ExclusionSet::new(),
            &overrides,
            "62.0",
        );
        assert!(xml.contains("R&amp;D/Welcome&lt;1&gt;"));
        let (types, _) = parse(&xml);
        assert_eq!(types[0].1, names(&["R&D/Welcome<1>"]));
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let mut overrides = MemberOverrides::new();
        overrides.insert(
            "CustomObject".to_string(),
            MemberOverride::with_wildcard(names(&["Account"])),
        );
        let candidates = names(&["CustomObject", "Flow", "Layout"]);
        let exclusions = ExclusionSet::seeded(["Flow"]);
        let first = build_manifest(&candidates, &exclusions, &overrides, "62.0");
        let second = build_manifest(&candidates, &exclusions, &overrides, "62.0");
        assert_eq!(first, second);
    }
}
