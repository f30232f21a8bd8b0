//! Manifest cross-reference ledger.
//!
//! Pure bookkeeping: every digest observed for an entry name (streamed from
//! content, or declared by a manifest) lands here. An entry is verified once
//! two independent sources agree on its digest.

use crate::error::AsicError;
use std::collections::{BTreeMap, BTreeSet};

/// Digest bookkeeping for one entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub name: String,
    pub digest: Vec<u8>,
    pub algorithm: Option<String>,
    pub mime_type: Option<String>,
    pub signature_refs: BTreeSet<String>,
    pub verified: bool,
}

/// A signer identity proven by a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub certificate: Vec<u8>,
    pub subject: String,
    /// Metadata entry whose arrival completed the verification.
    pub source_entry: String,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestLedger {
    expected_algorithm: Option<String>,
    records: BTreeMap<String, ManifestRecord>,
    root_file: Option<String>,
    certificates: Vec<CertificateRecord>,
}

impl ManifestLedger {
    /// Ledger that rejects digests declared under any other algorithm URI.
    pub fn new(expected_algorithm: Option<&str>) -> Self {
        Self {
            expected_algorithm: expected_algorithm.map(str::to_string),
            ..Default::default()
        }
    }

    /// Record a digest for `name`.
    ///
    /// # Errors
    ///
    /// - `AlgorithmMismatch` when `algorithm` differs from the expected one
    /// - `DigestMismatch` when a digest is already known and differs
    pub fn record_digest(
        &mut self,
        name: &str,
        digest: &[u8],
        mime_type: Option<&str>,
        algorithm: Option<&str>,
        signature_ref: Option<&str>,
    ) -> Result<(), AsicError> {
        if let (Some(expected), Some(actual)) = (&self.expected_algorithm, algorithm) {
            if expected != actual {
                return Err(AsicError::AlgorithmMismatch {
                    expected: expected.clone(),
                    actual: actual.to_string(),
                });
            }
        }

        let Some(record) = self.records.get_mut(name) else {
            let mut signature_refs = BTreeSet::new();
            if let Some(sig) = signature_ref {
                signature_refs.insert(sig.to_string());
            }
            self.records.insert(
                name.to_string(),
                ManifestRecord {
                    name: name.to_string(),
                    digest: digest.to_vec(),
                    algorithm: algorithm.map(str::to_string),
                    mime_type: mime_type.map(str::to_string),
                    signature_refs,
                    verified: false,
                },
            );
            return Ok(());
        };

        if record.digest != digest {
            return Err(AsicError::DigestMismatch {
                name: name.to_string(),
                expected: hex::encode(&record.digest),
                actual: hex::encode(digest),
            });
        }

        record.verified = true;
        if record.mime_type.is_none() {
            record.mime_type = mime_type.map(str::to_string);
        }
        if record.algorithm.is_none() {
            record.algorithm = algorithm.map(str::to_string);
        }
        if let Some(sig) = signature_ref {
            record.signature_refs.insert(sig.to_string());
        }
        Ok(())
    }

    pub fn set_root_file(&mut self, name: &str) -> Result<(), AsicError> {
        if let Some(existing) = &self.root_file {
            return Err(AsicError::MultipleRootFile {
                existing: existing.clone(),
                rejected: name.to_string(),
            });
        }
        self.root_file = Some(name.to_string());
        Ok(())
    }

    pub fn root_file(&self) -> Option<&str> {
        self.root_file.as_deref()
    }

    pub fn add_certificate(&mut self, record: CertificateRecord) {
        self.certificates.push(record);
    }

    pub fn certificates(&self) -> &[CertificateRecord] {
        &self.certificates
    }

    pub fn record(&self, name: &str) -> Option<&ManifestRecord> {
        self.records.get(name)
    }

    /// Records in name order.
    pub fn records(&self) -> impl Iterator<Item = &ManifestRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fails on the first record (in name order) seen by only one source.
    pub fn verify_all_verified(&self) -> Result<(), AsicError> {
        match self.records.values().find(|r| !r.verified) {
            Some(record) => Err(AsicError::UnverifiedEntry(record.name.clone())),
            None => Ok(()),
        }
    }
}
