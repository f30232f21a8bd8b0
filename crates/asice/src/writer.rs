//! Streaming container writer.
//!
//! Content entries are digested while they are written; signing turns the
//! accumulated digests into the dialect's metadata artifacts, appends the
//! `META-INF/manifest.xml` listing and finishes the zip.

use crate::config::AsicConfig;
use crate::container::{ContainerWriter, MIMETYPE_ENTRY};
use crate::dialect::{self, DialectKind, ManifestDialect};
use crate::digest::DigestReader;
use crate::error::AsicError;
use crate::metadata;
use crate::mime;
use crate::signing::Signer;
use crate::xml::oasis::LISTING_ENTRY;
use crate::xml::OasisManifest;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::Path;

const CONVENTIONAL_EXTENSIONS: &[&str] = &["asice", "sce"];

pub struct ArchiveWriter<W: Write + Seek> {
    container: Option<ContainerWriter<W>>,
    dialect: Box<dyn ManifestDialect>,
    config: AsicConfig,
    listing: OasisManifest,
    names: HashSet<String>,
    signed: bool,
}

impl<W: Write + Seek> std::fmt::Debug for ArchiveWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("dialect", &self.dialect.kind())
            .field("entries", &self.names.len())
            .field("signed", &self.signed)
            .field("closed", &self.container.is_none())
            .finish_non_exhaustive()
    }
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create a container file at `path`.
    pub fn create_file(path: impl AsRef<Path>, config: &AsicConfig) -> Result<Self, AsicError> {
        let path = path.as_ref();
        let conventional = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                CONVENTIONAL_EXTENSIONS
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(ext))
            });
        if !conventional {
            tracing::warn!(
                path = %path.display(),
                "container file name does not end in .asice or .sce"
            );
        }
        Self::with_config(BufWriter::new(File::create(path)?), config)
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(sink: W, dialect: DialectKind) -> Result<Self, AsicError> {
        Self::with_config(sink, &AsicConfig::default().with_dialect(dialect))
    }

    pub fn with_config(sink: W, config: &AsicConfig) -> Result<Self, AsicError> {
        Ok(Self {
            container: Some(ContainerWriter::create(sink, &config.mime_type)?),
            dialect: dialect::for_kind(config.dialect, config.digest_algorithm),
            config: config.clone(),
            listing: OasisManifest::new(&config.mime_type),
            names: HashSet::new(),
            signed: false,
        })
    }

    pub fn dialect(&self) -> DialectKind {
        self.dialect.kind()
    }

    fn ensure_building(&self) -> Result<(), AsicError> {
        if self.signed {
            return Err(AsicError::AlreadySigned);
        }
        if self.container.is_none() {
            return Err(AsicError::Closed);
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), AsicError> {
        if metadata::is_metadata_name(name) {
            return Err(AsicError::ReservedName(name.to_string()));
        }
        if name.is_empty() || name.ends_with('/') {
            return Err(AsicError::Format(format!("invalid entry name '{name}'")));
        }
        if name == MIMETYPE_ENTRY {
            return Err(AsicError::ReservedName(name.to_string()));
        }
        if self.names.contains(name) {
            return Err(AsicError::Format(format!("duplicate entry name '{name}'")));
        }
        Ok(())
    }

    /// Stream `content` into a new entry.
    pub fn add_entry<Rd: Read>(
        &mut self,
        name: &str,
        mime_type: &str,
        content: Rd,
    ) -> Result<(), AsicError> {
        self.ensure_building()?;
        self.check_name(name)?;

        let (digest, size) = match self.stream_entry(name, content) {
            Ok(written) => written,
            Err(err) => {
                tracing::debug!(entry = name, error = %err, "closing writer after failure");
                self.container = None;
                return Err(err);
            }
        };

        self.names.insert(name.to_string());
        self.dialect.accumulate(name, mime_type, &digest);
        self.listing.add(name, mime_type);
        tracing::debug!(entry = name, mime_type, size, "added entry");
        Ok(())
    }

    fn stream_entry<Rd: Read>(
        &mut self,
        name: &str,
        content: Rd,
    ) -> Result<(Vec<u8>, u64), AsicError> {
        let container = self.container.as_mut().ok_or(AsicError::Closed)?;
        container.put_entry(name)?;
        let mut digesting = DigestReader::new(content, self.config.digest_algorithm);
        io::copy(&mut digesting, container)?;
        container.close_entry();
        Ok(digesting.finish())
    }

    pub fn add_bytes(&mut self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<(), AsicError> {
        self.add_entry(name, mime_type, bytes)
    }

    /// Add a file from disk; the MIME type is guessed from the entry name.
    ///
    /// The entry is named after the file unless `entry_name` is given.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        entry_name: Option<&str>,
    ) -> Result<(), AsicError> {
        let path = path.as_ref();
        let name = match entry_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    AsicError::Format(format!("no usable file name in '{}'", path.display()))
                })?
                .to_string(),
        };
        let mime_type = mime::detect(&name)?;
        self.add_entry(&name, &mime_type, File::open(path)?)
    }

    /// Mark `name` as the root entry (detached dialect only).
    pub fn set_root_entry(&mut self, name: &str) -> Result<(), AsicError> {
        self.ensure_building()?;
        self.dialect.set_root(name)
    }

    /// Sign the container and hand back the finished sink.
    ///
    /// A writer can be signed once, whether or not that attempt succeeds;
    /// afterwards every mutation fails with [`AsicError::AlreadySigned`].
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<W, AsicError> {
        self.ensure_building()?;
        self.signed = true;
        let mut container = self.container.take().ok_or(AsicError::Closed)?;

        let artifacts = self.dialect.materialize(signer)?;
        for artifact in &artifacts {
            container.write_entry(&artifact.name, &artifact.bytes)?;
            tracing::debug!(
                entry = %artifact.name,
                mime_type = %artifact.mime_type,
                size = artifact.bytes.len(),
                "wrote metadata artifact"
            );
        }
        let listing = self
            .listing
            .to_xml()
            .map_err(AsicError::xml(LISTING_ENTRY))?;
        container.write_entry(LISTING_ENTRY, &listing)?;
        let sink = container.finish()?;

        tracing::info!(
            dialect = %self.dialect.kind(),
            entries = self.names.len(),
            signer = %signer.certificate().subject,
            "container signed"
        );
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Ed25519Signer;
    use std::io::Cursor;

    fn writer(dialect: DialectKind) -> ArchiveWriter<Cursor<Vec<u8>>> {
        ArchiveWriter::new(Cursor::new(Vec::new()), dialect).unwrap()
    }

    #[test]
    fn test_reserved_and_invalid_names() {
        let mut w = writer(DialectKind::Detached);
        assert!(matches!(
            w.add_bytes("META-INF/x", "text/plain", b"x"),
            Err(AsicError::ReservedName(_))
        ));
        assert!(matches!(
            w.add_bytes("mimetype", "text/plain", b"x"),
            Err(AsicError::ReservedName(_))
        ));
        assert!(matches!(
            w.add_bytes("dir/", "text/plain", b"x"),
            Err(AsicError::Format(_))
        ));
        assert!(matches!(w.add_bytes("", "text/plain", b"x"), Err(AsicError::Format(_))));

        w.add_bytes("a.txt", "text/plain", b"x").unwrap();
        assert!(matches!(
            w.add_bytes("a.txt", "text/plain", b"y"),
            Err(AsicError::Format(_))
        ));
    }

    #[test]
    fn test_rejections_do_not_close_writer() {
        let mut w = writer(DialectKind::Detached);
        let _ = w.add_bytes("META-INF/x", "text/plain", b"x");
        w.add_bytes("a.txt", "text/plain", b"x").unwrap();
    }

    #[test]
    fn test_failed_read_closes_writer() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("source went away"))
            }
        }

        let mut w = writer(DialectKind::Detached);
        assert!(matches!(
            w.add_entry("a.txt", "text/plain", Broken),
            Err(AsicError::Io(_))
        ));
        assert!(matches!(
            w.add_bytes("b.txt", "text/plain", b"x"),
            Err(AsicError::Closed)
        ));
    }

    #[test]
    fn test_signed_writer_is_terminal() {
        let signer = Ed25519Signer::from_seed(&[3u8; 32], "CN=Writer Test").unwrap();
        let mut w = writer(DialectKind::Inline);
        w.add_bytes("a.txt", "text/plain", b"hello").unwrap();
        w.sign(&signer).unwrap();

        assert!(matches!(
            w.add_bytes("b.txt", "text/plain", b"x"),
            Err(AsicError::AlreadySigned)
        ));
        assert!(matches!(w.sign(&signer), Err(AsicError::AlreadySigned)));
        assert!(matches!(w.set_root_entry("a.txt"), Err(AsicError::AlreadySigned)));
    }
}
