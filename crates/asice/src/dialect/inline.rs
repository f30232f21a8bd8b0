//! Inline dialect: one self-contained `META-INF/signatures.xml` document.
//!
//! Each content entry becomes a `ds:Reference`; a further reference covers the
//! `SignedProperties` block (signing time, signer certificate digest, issuer,
//! serial, per-entry MIME types). The signer signs the serialized
//! `SignedInfo`.

use super::{Artifact, DialectKind, ManifestDialect};
use crate::digest::DigestAlgorithm;
use crate::error::AsicError;
use crate::ledger::{CertificateRecord, ManifestLedger};
use crate::signing::{SignatureVerifier, Signer, SigningError};
use crate::xml::xades::{C14N11, SIGNED_PROPERTIES_TYPE};
use crate::xml::{
    DataObjectFormat, Reference, SignedInfo, SignedProperties, XadesSignature, XadesSignatures,
};
use chrono::{SecondsFormat, Utc};

pub const SIGNATURES_ENTRY: &str = "META-INF/signatures.xml";
const SIGNATURES_MIME_TYPE: &str = "application/xml";

#[derive(Debug, Clone)]
struct PendingReference {
    name: String,
    mime_type: String,
    digest: Vec<u8>,
}

#[derive(Debug)]
pub struct InlineDialect {
    algorithm: DigestAlgorithm,
    entries: Vec<PendingReference>,
}

impl InlineDialect {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            entries: Vec::new(),
        }
    }

    fn signed_properties(&self, id: String, signer: &dyn Signer) -> SignedProperties {
        let certificate = signer.certificate();
        SignedProperties {
            id,
            signing_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            cert_digest_method: self.algorithm.uri().to_string(),
            cert_digest: self.algorithm.digest(&certificate.encoded),
            issuer_name: certificate.issuer.clone(),
            serial_number: certificate.serial.clone(),
            data_object_formats: self
                .entries
                .iter()
                .enumerate()
                .map(|(i, entry)| DataObjectFormat {
                    object_reference: format!("#{}", reference_id(i)),
                    mime_type: entry.mime_type.clone(),
                })
                .collect(),
        }
    }
}

fn reference_id(index: usize) -> String {
    format!("ID_{index}")
}

impl ManifestDialect for InlineDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Inline
    }

    fn accumulate(&mut self, name: &str, mime_type: &str, digest: &[u8]) {
        self.entries.push(PendingReference {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            digest: digest.to_vec(),
        });
    }

    fn supports_root(&self) -> bool {
        false
    }

    fn set_root(&mut self, name: &str) -> Result<(), AsicError> {
        Err(AsicError::UnsupportedOperation(format!(
            "inline signatures cannot designate a root entry ('{name}')"
        )))
    }

    fn materialize(&mut self, signer: &dyn Signer) -> Result<Vec<Artifact>, AsicError> {
        let token = uuid::Uuid::new_v4();
        let props = self.signed_properties(format!("SignedProperties-{token}"), signer);
        let props_bytes = props
            .canonical_bytes()
            .map_err(AsicError::xml(SIGNATURES_ENTRY))?;

        let mut references: Vec<Reference> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| Reference {
                id: Some(reference_id(i)),
                uri: entry.name.clone(),
                reference_type: None,
                digest_method: self.algorithm.uri().to_string(),
                digest_value: entry.digest.clone(),
            })
            .collect();
        references.push(Reference {
            id: None,
            uri: format!("#{}", props.id),
            reference_type: Some(SIGNED_PROPERTIES_TYPE.to_string()),
            digest_method: self.algorithm.uri().to_string(),
            digest_value: self.algorithm.digest(&props_bytes),
        });

        let signed_info = SignedInfo {
            canonicalization_method: C14N11.to_string(),
            signature_method: signer.signature_method().to_string(),
            references,
        };
        let signed_bytes = signed_info
            .canonical_bytes()
            .map_err(AsicError::xml(SIGNATURES_ENTRY))?;
        let signature_value = signer.sign(&signed_bytes).map_err(AsicError::Signing)?;

        let document = XadesSignatures {
            signatures: vec![XadesSignature {
                id: Some(format!("Signature-{token}")),
                signed_info,
                signature_value,
                certificate: Some(signer.certificate().encoded.clone()),
                signed_properties: Some(props),
            }],
        };
        let bytes = document
            .to_xml()
            .map_err(AsicError::xml(SIGNATURES_ENTRY))?;

        tracing::debug!(entries = self.entries.len(), "materialized inline signature");
        self.entries.clear();

        Ok(vec![Artifact {
            name: SIGNATURES_ENTRY.to_string(),
            mime_type: SIGNATURES_MIME_TYPE.to_string(),
            bytes,
        }])
    }
}

fn signature_failure(entry: &str, reason: impl Into<String>) -> AsicError {
    AsicError::SignatureVerification {
        entry: entry.to_string(),
        source: SigningError::Malformed {
            reason: reason.into(),
        },
    }
}

/// Feed every signature of an `XAdESSignatures` document into `ledger` and
/// verify it.
///
/// External references are recorded as digests. The `SignedProperties`
/// digest is recomputed and the signature value checked over the serialized
/// `SignedInfo`; each verified signer is recorded as a certificate.
pub fn verify_document(
    ledger: &mut ManifestLedger,
    verifier: &dyn SignatureVerifier,
    entry: &str,
    payload: &[u8],
) -> Result<(), AsicError> {
    let document = XadesSignatures::from_xml(payload).map_err(AsicError::xml(entry))?;

    for signature in &document.signatures {
        record_references(ledger, signature)?;
        check_signed_properties(entry, signature)?;

        let signed_bytes = signature
            .signed_info
            .canonical_bytes()
            .map_err(AsicError::xml(entry))?;
        let certificate = verifier
            .verify(&signed_bytes, &signature.signature_value)
            .map_err(|source| AsicError::SignatureVerification {
                entry: entry.to_string(),
                source,
            })?;

        if let Some(embedded) = &signature.certificate {
            if *embedded != certificate.encoded {
                return Err(signature_failure(
                    entry,
                    "KeyInfo certificate does not match the signing key",
                ));
            }
        }
        if let Some(props) = &signature.signed_properties {
            if let Some(algorithm) = DigestAlgorithm::from_uri(&props.cert_digest_method) {
                if algorithm.digest(&certificate.encoded) != props.cert_digest {
                    return Err(signature_failure(
                        entry,
                        "signing certificate digest does not match the signing key",
                    ));
                }
            }
        }

        ledger.add_certificate(CertificateRecord {
            certificate: certificate.encoded,
            subject: certificate.subject,
            source_entry: entry.to_string(),
        });
    }

    Ok(())
}

fn record_references(
    ledger: &mut ManifestLedger,
    signature: &XadesSignature,
) -> Result<(), AsicError> {
    let formats = signature
        .signed_properties
        .as_ref()
        .map(|p| p.data_object_formats.as_slice())
        .unwrap_or_default();

    for reference in signature
        .signed_info
        .references
        .iter()
        .filter(|r| !r.is_internal())
    {
        let mime_type = reference.id.as_ref().and_then(|id| {
            formats
                .iter()
                .find(|f| f.object_reference.strip_prefix('#') == Some(id.as_str()))
                .map(|f| f.mime_type.as_str())
        });
        ledger.record_digest(
            &reference.uri,
            &reference.digest_value,
            mime_type,
            Some(&reference.digest_method),
            None,
        )?;
    }
    Ok(())
}

fn check_signed_properties(entry: &str, signature: &XadesSignature) -> Result<(), AsicError> {
    let Some((reference, props)) = signature.signed_properties_reference() else {
        return Ok(());
    };
    let algorithm = DigestAlgorithm::from_uri(&reference.digest_method).ok_or_else(|| {
        AsicError::Format(format!(
            "unsupported digest method '{}' in '{entry}'",
            reference.digest_method
        ))
    })?;
    let bytes = props.canonical_bytes().map_err(AsicError::xml(entry))?;
    let actual = algorithm.digest(&bytes);
    if actual != reference.digest_value {
        return Err(AsicError::DigestMismatch {
            name: format!("{entry}{}", reference.uri),
            expected: hex::encode(&reference.digest_value),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}
