//! ASiC-E signed containers.
//!
//! A container is a zip archive whose first entry is a STORED `mimetype`
//! marker, followed by content entries and signed metadata under
//! `META-INF/`. [`ArchiveWriter`] produces containers in either manifest
//! dialect, [`ArchiveReader`] streams them back while cross-checking every
//! digest, and [`combine()`] merges signed containers into one.

pub mod combine;
pub mod config;
pub mod container;
pub mod dialect;
pub mod digest;
pub mod error;
pub mod fragments;
pub mod ledger;
pub mod metadata;
pub mod mime;
pub mod reader;
pub mod signing;
pub mod writer;
pub mod xml;

// Convenience re-exports
pub use combine::{combine, combine_with_config};
pub use config::{AsicConfig, AsicConfigOverrides};
pub use container::{ContainerReader, ContainerWriter, ASICE_MIME_TYPE, MIMETYPE_ENTRY};
pub use dialect::{Artifact, DialectKind, ManifestDialect};
pub use digest::DigestAlgorithm;
pub use error::{AsicError, ErrorClass};
pub use ledger::{CertificateRecord, ManifestLedger, ManifestRecord};
pub use reader::{ArchiveReader, ContentStream};
pub use signing::{
    Certificate, Ed25519Signer, Ed25519Verifier, SignatureVerifier, Signer, SigningError,
};
pub use writer::ArchiveWriter;
