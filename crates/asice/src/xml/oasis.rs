//! OASIS `META-INF/manifest.xml`: the unsigned file listing.
//!
//! Every listing starts with a synthetic `/` entry describing the container
//! itself, followed by one entry per content file.

use super::{Element, Writer, XmlError, NS_OASIS_MANIFEST};

pub const LISTING_ENTRY: &str = "META-INF/manifest.xml";
pub const SELF_ENTRY_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub full_path: String,
    pub media_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OasisManifest {
    entries: Vec<FileEntry>,
}

impl OasisManifest {
    /// New listing holding only the self entry for `container_mime_type`.
    pub fn new(container_mime_type: &str) -> Self {
        Self {
            entries: vec![FileEntry {
                full_path: SELF_ENTRY_PATH.to_string(),
                media_type: container_mime_type.to_string(),
            }],
        }
    }

    pub fn add(&mut self, full_path: impl Into<String>, media_type: impl Into<String>) {
        self.entries.push(FileEntry {
            full_path: full_path.into(),
            media_type: media_type.into(),
        });
    }

    /// Append every entry of `other` except its self entry.
    pub fn merge(&mut self, other: &OasisManifest) {
        self.entries.extend(
            other
                .entries
                .iter()
                .filter(|e| e.full_path != SELF_ENTRY_PATH)
                .cloned(),
        );
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Number of entries, self entry included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, XmlError> {
        let mut w = Writer::new();
        w.declaration()?;
        w.start(
            "manifest:manifest",
            &[("xmlns:manifest", NS_OASIS_MANIFEST)],
        )?;
        for entry in &self.entries {
            w.empty(
                "manifest:file-entry",
                &[
                    ("manifest:full-path", entry.full_path.as_str()),
                    ("manifest:media-type", entry.media_type.as_str()),
                ],
            )?;
        }
        w.end("manifest:manifest")?;
        Ok(w.into_bytes())
    }

    pub fn from_xml(payload: &[u8]) -> Result<Self, XmlError> {
        let root = Element::parse(payload)?;
        root.expect_root("manifest", NS_OASIS_MANIFEST)?;

        let entries = root
            .children_named("file-entry")
            .map(|e| -> Result<FileEntry, XmlError> {
                Ok(FileEntry {
                    full_path: e.required_attr("full-path")?.to_string(),
                    media_type: e.attr("media-type").unwrap_or_default().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }
}
