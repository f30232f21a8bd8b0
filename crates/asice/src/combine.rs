//! Merge several signed containers into one.
//!
//! Entries are raw-copied (no recompression, no digest checks). Detached
//! manifests and inline signature documents are renumbered so documents
//! from different sources cannot collide; detached signature entries keep
//! their uuid-bearing names, which their manifests reference. The
//! `META-INF/manifest.xml` listings are merged.

use crate::config::AsicConfig;
use crate::container::{ContainerReader, ContainerWriter};
use crate::error::AsicError;
use crate::metadata::{self, MetadataKind};
use crate::xml::oasis::LISTING_ENTRY;
use crate::xml::{AsicManifest, OasisManifest};
use std::collections::HashSet;
use std::io::{Read, Seek, Write};

/// Combine `sources` into a new container on `sink` with default settings.
pub fn combine<W, R, I>(sink: W, sources: I) -> Result<W, AsicError>
where
    W: Write + Seek,
    R: Read + Seek,
    I: IntoIterator<Item = R>,
{
    combine_with_config(sink, sources, &AsicConfig::default())
}

pub fn combine_with_config<W, R, I>(
    sink: W,
    sources: I,
    config: &AsicConfig,
) -> Result<W, AsicError>
where
    W: Write + Seek,
    R: Read + Seek,
    I: IntoIterator<Item = R>,
{
    let mut merger = Merger {
        target: ContainerWriter::create(sink, &config.mime_type)?,
        listing: OasisManifest::new(&config.mime_type),
        names: HashSet::new(),
        root: None,
        manifests: 0,
        inline_documents: 0,
        regular_files: 0,
        max_metadata_bytes: config.max_metadata_bytes,
    };

    let mut source_count = 0usize;
    for source in sources {
        source_count += 1;
        let mut reader = ContainerReader::open(source, &config.mime_type)?;
        merger.absorb(&mut reader)?;
    }

    let Merger {
        mut target,
        listing,
        regular_files,
        manifests,
        inline_documents,
        ..
    } = merger;

    if listing.len() == regular_files + 1 {
        let bytes = listing.to_xml().map_err(AsicError::xml(LISTING_ENTRY))?;
        target.write_entry(LISTING_ENTRY, &bytes)?;
    } else {
        tracing::warn!(
            listed = listing.len(),
            regular_files,
            "merged file listing does not match the combined entries; omitting it"
        );
    }

    tracing::info!(
        sources = source_count,
        regular_files,
        manifests,
        inline_documents,
        "containers combined"
    );
    target.finish()
}

struct Merger<W: Write + Seek> {
    target: ContainerWriter<W>,
    listing: OasisManifest,
    names: HashSet<String>,
    root: Option<String>,
    manifests: usize,
    inline_documents: usize,
    regular_files: usize,
    max_metadata_bytes: u64,
}

impl<W: Write + Seek> Merger<W> {
    fn claim(&mut self, name: &str) -> Result<(), AsicError> {
        if !self.names.insert(name.to_string()) {
            return Err(AsicError::Format(format!(
                "entry '{name}' appears in more than one source"
            )));
        }
        Ok(())
    }

    fn copy_as<R: Read + Seek>(
        &mut self,
        reader: &mut ContainerReader<R>,
        index: usize,
        name: &str,
        rename: bool,
    ) -> Result<(), AsicError> {
        self.claim(name)?;
        let rename = rename.then_some(name);
        self.target.copy_raw(reader, index, rename)
    }

    fn absorb<R: Read + Seek>(&mut self, reader: &mut ContainerReader<R>) -> Result<(), AsicError> {
        for index in 1..reader.len() {
            let (name, is_dir) = reader.describe(index)?;
            if is_dir {
                continue;
            }
            if !metadata::is_metadata_name(&name) {
                self.copy_as(reader, index, &name, false)?;
                self.regular_files += 1;
                continue;
            }

            match metadata::classify(&name)? {
                Some(MetadataKind::Listing) => {
                    let payload = reader.read_entry(index, self.max_metadata_bytes)?;
                    let listing =
                        OasisManifest::from_xml(&payload).map_err(AsicError::xml(&name))?;
                    self.listing.merge(&listing);
                }
                Some(MetadataKind::DetachedManifest) => {
                    let payload = reader.read_entry(index, self.max_metadata_bytes)?;
                    let manifest =
                        AsicManifest::from_xml(&payload).map_err(AsicError::xml(&name))?;
                    for root in manifest.root_files() {
                        if let Some(existing) = &self.root {
                            return Err(AsicError::MultipleRootFile {
                                existing: existing.clone(),
                                rejected: root.to_string(),
                            });
                        }
                        self.root = Some(root.to_string());
                    }
                    self.manifests += 1;
                    let renamed = format!("META-INF/ASiCManifest{}.xml", self.manifests);
                    tracing::debug!(from = %name, to = %renamed, "copying detached manifest");
                    self.copy_as(reader, index, &renamed, true)?;
                }
                Some(MetadataKind::InlineSignatures) => {
                    self.inline_documents += 1;
                    let renamed = format!("META-INF/signatures{}.xml", self.inline_documents);
                    tracing::debug!(from = %name, to = %renamed, "copying inline signatures");
                    self.copy_as(reader, index, &renamed, true)?;
                }
                Some(MetadataKind::DetachedSignature) => {
                    self.copy_as(reader, index, &name, false)?;
                }
                None => {
                    tracing::warn!(entry = %name, "copying unrecognised metadata entry as-is");
                    self.copy_as(reader, index, &name, false)?;
                }
            }
        }
        Ok(())
    }
}
