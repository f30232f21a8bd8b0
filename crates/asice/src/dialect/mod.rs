//! Manifest dialects.
//!
//! A dialect decides what signed metadata a writer emits. Both variants
//! accumulate `(name, mime type, digest)` for every content entry and turn the
//! result into one or more `META-INF/` artifacts when the container is signed.
//! The read side of each dialect lives next to its builder
//! ([`detached::record_manifest`], [`inline::verify_document`]).

pub mod detached;
pub mod inline;

pub use detached::DetachedDialect;
pub use inline::InlineDialect;

use crate::digest::DigestAlgorithm;
use crate::error::AsicError;
use crate::signing::Signer;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// `ASiCManifest` plus a detached signature entry (CAdES-style).
    #[default]
    #[serde(alias = "cades")]
    Detached,
    /// Self-contained `XAdESSignatures` document.
    #[serde(alias = "xades")]
    Inline,
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detached => f.write_str("detached"),
            Self::Inline => f.write_str("inline"),
        }
    }
}

impl std::str::FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "detached" | "cades" => Ok(Self::Detached),
            "inline" | "xades" => Ok(Self::Inline),
            _ => Err(format!("unknown manifest dialect: {s}")),
        }
    }
}

/// A named metadata payload produced at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub trait ManifestDialect: Send {
    fn kind(&self) -> DialectKind;

    /// Register a content entry with its digest.
    fn accumulate(&mut self, name: &str, mime_type: &str, digest: &[u8]);

    fn supports_root(&self) -> bool;

    /// Designate `name` as the root entry.
    fn set_root(&mut self, name: &str) -> Result<(), AsicError>;

    /// Build and sign the metadata artifacts.
    fn materialize(&mut self, signer: &dyn Signer) -> Result<Vec<Artifact>, AsicError>;
}

pub fn for_kind(kind: DialectKind, algorithm: DigestAlgorithm) -> Box<dyn ManifestDialect> {
    match kind {
        DialectKind::Detached => Box::new(DetachedDialect::new(algorithm)),
        DialectKind::Inline => Box::new(InlineDialect::new(algorithm)),
    }
}
