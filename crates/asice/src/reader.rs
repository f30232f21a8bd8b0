//! Streaming container reader.
//!
//! [`ArchiveReader`] hands content entries to the caller one at a time and
//! routes every `META-INF/` entry into the ledger, the fragment table or the
//! auxiliary listing. Each content entry is digested while the caller reads
//! it (or drained when the caller skips it). When the last entry has been
//! seen, every ledger record must be verified and every detached signature
//! half paired.
//!
//! ```text
//! Ready ──next_file──▶ Positioned ──as_stream/write_file──▶ Consumed
//!   ▲                      │                                   │
//!   └──────────────────────┴──────────── next_file ────────────┘
//!                          └─▶ Exhausted (None, verified)
//! ```
//!
//! Any error closes the reader; the ledger stays readable.

use crate::config::AsicConfig;
use crate::container::ContainerReader;
use crate::dialect::{detached, inline};
use crate::digest::{self, DigestAlgorithm, DigestReader};
use crate::error::AsicError;
use crate::fragments::{Fragment, FragmentTable};
use crate::ledger::{CertificateRecord, ManifestLedger};
use crate::metadata::{self, MetadataKind};
use crate::signing::SignatureVerifier;
use crate::xml::OasisManifest;
use std::io::{self, Read, Seek, Write};

/// Position of the reader relative to the current content entry.
#[derive(Debug, Default)]
enum EntryCursor {
    #[default]
    Ready,
    Positioned { index: usize, name: String },
    Consumed { name: String, digest: Vec<u8> },
    Failed { name: String, error: io::Error },
}

pub struct ArchiveReader<R: Read + Seek> {
    container: Option<ContainerReader<R>>,
    verifier: Box<dyn SignatureVerifier + Send + Sync>,
    config: AsicConfig,
    next_index: usize,
    cursor: EntryCursor,
    ledger: ManifestLedger,
    fragments: FragmentTable,
    auxiliary: Option<OasisManifest>,
    exhausted: bool,
}

impl<R: Read + Seek> std::fmt::Debug for ArchiveReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("closed", &self.container.is_none())
            .field("next_index", &self.next_index)
            .field("cursor", &self.cursor)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn open(
        source: R,
        verifier: impl SignatureVerifier + Send + Sync + 'static,
    ) -> Result<Self, AsicError> {
        Self::open_with_config(source, verifier, &AsicConfig::default())
    }

    pub fn open_with_config(
        source: R,
        verifier: impl SignatureVerifier + Send + Sync + 'static,
        config: &AsicConfig,
    ) -> Result<Self, AsicError> {
        let container = ContainerReader::open(source, &config.mime_type)?;
        tracing::debug!(entries = container.len(), "opened container");
        Ok(Self {
            container: Some(container),
            verifier: Box::new(verifier),
            config: config.clone(),
            next_index: 1,
            cursor: EntryCursor::Ready,
            ledger: ManifestLedger::new(Some(config.digest_algorithm.uri())),
            fragments: FragmentTable::new(),
            auxiliary: None,
            exhausted: false,
        })
    }

    /// Advance to the next content entry and return its name.
    ///
    /// Returns `Ok(None)` once every entry has been seen and the container
    /// verified. An unread current entry is drained first.
    pub fn next_file(&mut self) -> Result<Option<String>, AsicError> {
        if self.container.is_none() {
            return Err(AsicError::Closed);
        }
        match self.advance() {
            Ok(next) => Ok(next),
            Err(err) => {
                tracing::debug!(error = %err, "closing reader after failure");
                self.close();
                Err(err)
            }
        }
    }

    /// Reader over the current entry's content.
    ///
    /// The digest is recorded when the stream is dropped; unread bytes are
    /// drained at that point.
    pub fn as_stream(&mut self) -> Result<ContentStream<'_>, AsicError> {
        let container = self.container.as_mut().ok_or(AsicError::Closed)?;
        let EntryCursor::Positioned { index, name } = &self.cursor else {
            return Err(AsicError::NoCurrentEntry);
        };
        let (index, name) = (*index, name.clone());

        let entry: Box<dyn Read + '_> = Box::new(container.open_entry(index)?);
        Ok(ContentStream {
            inner: Some(DigestReader::new(entry, self.config.digest_algorithm)),
            cursor: &mut self.cursor,
            name,
        })
    }

    /// Copy the current entry's content into `sink`.
    pub fn write_file<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64, AsicError> {
        let mut stream = self.as_stream()?;
        let copied = io::copy(&mut stream, sink);
        drop(stream);
        copied.map_err(|err| {
            self.close();
            AsicError::Io(err)
        })
    }

    /// Release the container. Idempotent.
    pub fn close(&mut self) {
        self.container = None;
        self.cursor = EntryCursor::Ready;
    }

    pub fn is_closed(&self) -> bool {
        self.container.is_none()
    }

    pub fn manifest(&self) -> &ManifestLedger {
        &self.ledger
    }

    /// The `META-INF/manifest.xml` listing, once it has been read.
    pub fn auxiliary_manifest(&self) -> Option<&OasisManifest> {
        self.auxiliary.as_ref()
    }

    pub fn certificates(&self) -> &[CertificateRecord] {
        self.ledger.certificates()
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.config.digest_algorithm
    }

    fn advance(&mut self) -> Result<Option<String>, AsicError> {
        self.settle_current()?;
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let container = self.container.as_mut().ok_or(AsicError::Closed)?;
            if self.next_index >= container.len() {
                break;
            }
            let index = self.next_index;
            self.next_index += 1;

            let (name, is_dir) = container.describe(index)?;
            if is_dir {
                tracing::debug!(entry = %name, "skipping directory entry");
                continue;
            }
            if metadata::is_metadata_name(&name) {
                let payload = container.read_entry(index, self.config.max_metadata_bytes)?;
                tracing::debug!(entry = %name, bytes = payload.len(), "metadata entry");
                self.handle_metadata(&name, payload)?;
                continue;
            }

            tracing::debug!(entry = %name, "content entry");
            self.cursor = EntryCursor::Positioned {
                index,
                name: name.clone(),
            };
            return Ok(Some(name));
        }

        self.exhausted = true;
        self.ledger.verify_all_verified()?;
        self.fragments.ensure_empty()?;
        tracing::info!(
            entries = self.ledger.len(),
            certificates = self.ledger.certificates().len(),
            root = ?self.ledger.root_file(),
            "container verified"
        );
        Ok(None)
    }

    /// Record the digest of the entry the caller was positioned on.
    fn settle_current(&mut self) -> Result<(), AsicError> {
        let (name, digest) = match std::mem::take(&mut self.cursor) {
            EntryCursor::Ready => return Ok(()),
            EntryCursor::Positioned { index, name } => {
                let container = self.container.as_mut().ok_or(AsicError::Closed)?;
                let digest = digest::drain(
                    container.open_entry(index)?,
                    self.config.digest_algorithm,
                )?;
                tracing::debug!(entry = %name, "drained unread content");
                (name, digest)
            }
            EntryCursor::Consumed { name, digest } => (name, digest),
            EntryCursor::Failed { name, error } => {
                tracing::debug!(entry = %name, "content stream failed earlier");
                return Err(AsicError::Io(error));
            }
        };
        self.ledger.record_digest(&name, &digest, None, None, None)
    }

    fn handle_metadata(&mut self, name: &str, payload: Vec<u8>) -> Result<(), AsicError> {
        match metadata::classify(name)? {
            Some(MetadataKind::DetachedManifest) => {
                let sig_reference = detached::record_manifest(&mut self.ledger, name, &payload)?;
                self.pair(name, &sig_reference, Fragment::Manifest(payload))
            }
            Some(MetadataKind::DetachedSignature) => {
                self.pair(name, name, Fragment::Signature(payload))
            }
            Some(MetadataKind::InlineSignatures) => inline::verify_document(
                &mut self.ledger,
                self.verifier.as_ref(),
                name,
                &payload,
            ),
            Some(MetadataKind::Listing) => {
                let listing = OasisManifest::from_xml(&payload).map_err(AsicError::xml(name))?;
                self.auxiliary = Some(listing);
                Ok(())
            }
            None => Err(AsicError::Format(format!("unknown metadata entry '{name}'"))),
        }
    }

    /// Offer one detached half; verify once both halves are present.
    fn pair(&mut self, entry: &str, reference: &str, half: Fragment) -> Result<(), AsicError> {
        let Some((manifest, signature)) = self.fragments.offer(reference, half)? else {
            return Ok(());
        };

        let certificate = self
            .verifier
            .verify(&manifest, &signature)
            .map_err(|source| AsicError::SignatureVerification {
                entry: entry.to_string(),
                source,
            })?;
        tracing::debug!(
            entry,
            reference,
            subject = %certificate.subject,
            "detached signature verified"
        );
        self.ledger.add_certificate(CertificateRecord {
            certificate: certificate.encoded,
            subject: certificate.subject,
            source_entry: entry.to_string(),
        });
        Ok(())
    }
}

/// Content of the current entry, digested as it is read.
pub struct ContentStream<'a> {
    inner: Option<DigestReader<Box<dyn Read + 'a>>>,
    cursor: &'a mut EntryCursor,
    name: String,
}

impl std::fmt::Debug for ContentStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ContentStream<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for ContentStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ContentStream<'_> {
    fn drop(&mut self) {
        let Some(mut reader) = self.inner.take() else {
            return;
        };
        let name = std::mem::take(&mut self.name);
        *self.cursor = match io::copy(&mut reader, &mut io::sink()) {
            Ok(_) => EntryCursor::Consumed {
                name,
                digest: reader.finish().0,
            },
            Err(error) => EntryCursor::Failed { name, error },
        };
    }
}
