//! Detached dialect: `META-INF/ASiCManifest.xml` signed by a separate
//! `META-INF/signature-<uuid>.p7s` entry.

use super::{Artifact, DialectKind, ManifestDialect};
use crate::digest::DigestAlgorithm;
use crate::error::AsicError;
use crate::ledger::ManifestLedger;
use crate::signing::Signer;
use crate::xml::{AsicManifest, DataObjectReference, SigReference};

pub const MANIFEST_ENTRY: &str = "META-INF/ASiCManifest.xml";
pub const SIGNATURE_MIME_TYPE: &str = "application/x-pkcs7-signature";
const MANIFEST_MIME_TYPE: &str = "application/xml";

#[derive(Debug)]
pub struct DetachedDialect {
    algorithm: DigestAlgorithm,
    objects: Vec<DataObjectReference>,
    root: Option<String>,
}

impl DetachedDialect {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            objects: Vec::new(),
            root: None,
        }
    }

    /// Signature entry names carry a uuid so manifests from several
    /// containers can sit side by side after a combine.
    fn signature_entry_name() -> String {
        format!("META-INF/signature-{}.p7s", uuid::Uuid::new_v4())
    }
}

impl ManifestDialect for DetachedDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Detached
    }

    fn accumulate(&mut self, name: &str, mime_type: &str, digest: &[u8]) {
        self.objects.push(DataObjectReference {
            uri: name.to_string(),
            mime_type: Some(mime_type.to_string()),
            rootfile: false,
            digest_method: self.algorithm.uri().to_string(),
            digest_value: digest.to_vec(),
        });
    }

    fn supports_root(&self) -> bool {
        true
    }

    fn set_root(&mut self, name: &str) -> Result<(), AsicError> {
        if let Some(existing) = &self.root {
            return Err(AsicError::MultipleRootFile {
                existing: existing.clone(),
                rejected: name.to_string(),
            });
        }
        self.root = Some(name.to_string());
        Ok(())
    }

    fn materialize(&mut self, signer: &dyn Signer) -> Result<Vec<Artifact>, AsicError> {
        if let Some(root) = &self.root {
            let object = self
                .objects
                .iter_mut()
                .find(|o| &o.uri == root)
                .ok_or_else(|| {
                    AsicError::Format(format!("root entry '{root}' was never added"))
                })?;
            object.rootfile = true;
        }

        let signature_name = Self::signature_entry_name();
        let manifest = AsicManifest {
            sig_reference: Some(SigReference {
                uri: signature_name.clone(),
                mime_type: Some(SIGNATURE_MIME_TYPE.to_string()),
            }),
            data_objects: std::mem::take(&mut self.objects),
        };
        let manifest_bytes = manifest.to_xml().map_err(AsicError::xml(MANIFEST_ENTRY))?;
        let signature = signer.sign(&manifest_bytes).map_err(AsicError::Signing)?;

        tracing::debug!(
            entries = manifest.data_objects.len(),
            signature = %signature_name,
            "materialized detached manifest"
        );

        Ok(vec![
            Artifact {
                name: MANIFEST_ENTRY.to_string(),
                mime_type: MANIFEST_MIME_TYPE.to_string(),
                bytes: manifest_bytes,
            },
            Artifact {
                name: signature_name,
                mime_type: SIGNATURE_MIME_TYPE.to_string(),
                bytes: signature,
            },
        ])
    }
}

/// Feed a parsed `ASiCManifest` into `ledger`.
///
/// Returns the signature reference the manifest pairs with.
pub fn record_manifest(
    ledger: &mut ManifestLedger,
    entry: &str,
    payload: &[u8],
) -> Result<String, AsicError> {
    let manifest = AsicManifest::from_xml(payload).map_err(AsicError::xml(entry))?;
    let sig_reference = manifest.sig_reference_uri().to_string();

    for object in &manifest.data_objects {
        ledger.record_digest(
            &object.uri,
            &object.digest_value,
            object.mime_type.as_deref(),
            Some(&object.digest_method),
            Some(&sig_reference),
        )?;
        if object.rootfile {
            ledger.set_root_file(&object.uri)?;
        }
    }

    Ok(sig_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::SHA256_URI;
    use crate::signing::{Ed25519Signer, Ed25519Verifier, SignatureVerifier};

    fn signer() -> Ed25519Signer {
        Ed25519Signer::from_seed(&[7u8; 32], "CN=Detached Test").unwrap()
    }

    #[test]
    fn test_materialize_signs_manifest_bytes() {
        let mut dialect = DetachedDialect::new(DigestAlgorithm::Sha256);
        dialect.accumulate("a.txt", "text/plain", &[1; 32]);
        dialect.accumulate("b.txt", "text/plain", &[2; 32]);
        dialect.set_root("a.txt").unwrap();

        let artifacts = dialect.materialize(&signer()).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, MANIFEST_ENTRY);
        assert!(artifacts[1].name.starts_with("META-INF/signature-"));
        assert!(artifacts[1].name.ends_with(".p7s"));

        let certificate = Ed25519Verifier::new()
            .verify(&artifacts[0].bytes, &artifacts[1].bytes)
            .unwrap();
        assert_eq!(certificate.subject, "CN=Detached Test");

        let manifest = AsicManifest::from_xml(&artifacts[0].bytes).unwrap();
        assert_eq!(manifest.sig_reference_uri(), artifacts[1].name);
        assert_eq!(manifest.root_files().collect::<Vec<_>>(), vec!["a.txt"]);
    }

    #[test]
    fn test_second_root_rejected() {
        let mut dialect = DetachedDialect::new(DigestAlgorithm::Sha256);
        dialect.set_root("a.txt").unwrap();
        let err = dialect.set_root("b.txt").unwrap_err();
        assert!(matches!(err, AsicError::MultipleRootFile { .. }));
    }

    #[test]
    fn test_root_must_name_an_entry() {
        let mut dialect = DetachedDialect::new(DigestAlgorithm::Sha256);
        dialect.accumulate("a.txt", "text/plain", &[1; 32]);
        dialect.set_root("missing.txt").unwrap();
        let err = dialect.materialize(&signer()).unwrap_err();
        assert!(matches!(err, AsicError::Format(_)));
    }

    #[test]
    fn test_signature_names_are_unique() {
        let first = DetachedDialect::signature_entry_name();
        let second = DetachedDialect::signature_entry_name();
        assert_ne!(first, second);
    }

    #[test]
    fn test_record_manifest_feeds_ledger() {
        let mut dialect = DetachedDialect::new(DigestAlgorithm::Sha256);
        dialect.accumulate("a.txt", "text/plain", &[1; 32]);
        dialect.set_root("a.txt").unwrap();
        let artifacts = dialect.materialize(&signer()).unwrap();

        let mut ledger = ManifestLedger::new(Some(SHA256_URI));
        let sig_ref = record_manifest(&mut ledger, MANIFEST_ENTRY, &artifacts[0].bytes).unwrap();
        assert_eq!(sig_ref, artifacts[1].name);
        assert_eq!(artifacts[0].mime_type, MANIFEST_MIME_TYPE);
        assert_eq!(artifacts[1].mime_type, SIGNATURE_MIME_TYPE);
        assert_eq!(ledger.root_file(), Some("a.txt"));

        let record = ledger.record("a.txt").unwrap();
        assert_eq!(record.mime_type.as_deref(), Some("text/plain"));
        assert!(record.signature_refs.contains(&sig_ref));
        assert!(!record.verified, "a manifest alone is a single source");
    }
}
