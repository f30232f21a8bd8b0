//! Classification of `META-INF/` entry names.

use crate::container::META_INF;
use crate::error::AsicError;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Kinds of metadata entry a container may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// `META-INF/ASiCManifest*.xml`
    DetachedManifest,
    /// `META-INF/signature*.p7s`
    DetachedSignature,
    /// `META-INF/signatures*.xml`
    InlineSignatures,
    /// `META-INF/manifest.xml`
    Listing,
}

const PATTERNS: &[(MetadataKind, &str)] = &[
    (MetadataKind::DetachedManifest, r"^META-INF/ASiCManifest(.*)\.xml$"),
    (MetadataKind::DetachedSignature, r"^META-INF/signature(.*)\.p7s$"),
    (MetadataKind::InlineSignatures, r"^META-INF/signatures(.*)\.xml$"),
    (MetadataKind::Listing, r"^META-INF/manifest\.xml$"),
];

static MATCHERS: OnceLock<Result<Vec<(MetadataKind, Regex)>, regex::Error>> = OnceLock::new();

fn matchers() -> Result<&'static [(MetadataKind, Regex)], AsicError> {
    MATCHERS
        .get_or_init(|| {
            PATTERNS
                .iter()
                .map(|(kind, pattern)| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map(|re| (*kind, re))
                })
                .collect()
        })
        .as_deref()
        .map_err(|e| AsicError::Format(format!("metadata name pattern: {e}")))
}

/// True for names under `META-INF/`, compared case-insensitively.
pub fn is_metadata_name(name: &str) -> bool {
    name.get(..META_INF.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(META_INF))
}

/// Kind of a `META-INF/` entry, or `None` for names no pattern claims.
pub fn classify(name: &str) -> Result<Option<MetadataKind>, AsicError> {
    Ok(matchers()?
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map(|(kind, _)| *kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_names() {
        let cases = [
            ("META-INF/ASiCManifest.xml", Some(MetadataKind::DetachedManifest)),
            ("META-INF/ASiCManifest2.xml", Some(MetadataKind::DetachedManifest)),
            ("meta-inf/asicmanifest.XML", Some(MetadataKind::DetachedManifest)),
            ("META-INF/signature.p7s", Some(MetadataKind::DetachedSignature)),
            ("META-INF/signature-3f2a.p7s", Some(MetadataKind::DetachedSignature)),
            ("META-INF/signatures.xml", Some(MetadataKind::InlineSignatures)),
            ("META-INF/signatures1.xml", Some(MetadataKind::InlineSignatures)),
            ("META-INF/manifest.xml", Some(MetadataKind::Listing)),
            ("META-INF/manifest2.xml", None),
            ("META-INF/notes.txt", None),
            ("docs/META-INF/manifest.xml", None),
        ];
        for (name, expected) in cases {
            assert_eq!(classify(name).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn test_metadata_prefix() {
        assert!(is_metadata_name("META-INF/anything"));
        assert!(is_metadata_name("Meta-Inf/x"));
        assert!(!is_metadata_name("META-INF"));
        assert!(!is_metadata_name("a.txt"));
        assert!(!is_metadata_name("é"));
    }
}
