//! Signing and verification collaborators.
//!
//! Containers never talk to key material directly: writers receive a
//! [`Signer`], readers receive a [`SignatureVerifier`]. Both are injected per
//! instance; there is no process-wide provider registration.
//!
//! [`Ed25519Signer`] / [`Ed25519Verifier`] are the bundled implementation. A
//! signature produced by them is a JSON envelope:
//!
//! ```text
//! {"version":1,"algorithm":"ed25519","key_id":"sha256:<hex>",
//!  "subject":"CN=...","certificate":"<base64 SPKI DER>","signature":"<base64>"}
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// XML-DSig identifier for Ed25519 signatures.
pub const ED25519_SIGNATURE_METHOD: &str = "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519";

const ENVELOPE_VERSION: u32 = 1;
const ENVELOPE_ALGORITHM: &str = "ed25519";

/// Signer identity as recorded in containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Encoded certificate (SPKI DER for the bundled ed25519 signer).
    pub encoded: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub serial: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    #[error("malformed signature: {reason}")]
    Malformed { reason: String },

    #[error("unsupported signature algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("key not trusted: {key_id}")]
    KeyNotTrusted { key_id: String },

    #[error("key_id mismatch: claimed {claimed}, actual {actual}")]
    KeyIdMismatch { claimed: String, actual: String },

    #[error("key encoding failed: {reason}")]
    KeyEncoding { reason: String },
}

/// Produces signatures over manifest bytes.
pub trait Signer {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError>;

    fn certificate(&self) -> &Certificate;

    /// XML-DSig `SignatureMethod` identifier for inline signatures.
    fn signature_method(&self) -> &str;
}

/// Checks a detached signature and reports who produced it.
pub trait SignatureVerifier {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<Certificate, SigningError>;
}

/// Compute key_id from SPKI-encoded public key bytes.
///
/// Returns `sha256:<lowercase-hex>`.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(spki_bytes)))
}

fn key_to_spki_der(key: &VerifyingKey) -> Result<Vec<u8>, SigningError> {
    let doc = key
        .to_public_key_der()
        .map_err(|e| SigningError::KeyEncoding {
            reason: e.to_string(),
        })?;
    Ok(doc.as_bytes().to_vec())
}

/// Compute key_id from a VerifyingKey.
pub fn compute_key_id_from_verifying_key(key: &VerifyingKey) -> Result<String, SigningError> {
    Ok(compute_key_id(&key_to_spki_der(key)?))
}

#[derive(Debug, Serialize, Deserialize)]
struct SignatureEnvelope {
    version: u32,
    algorithm: String,
    key_id: String,
    subject: String,
    certificate: String,
    signature: String,
}

/// Ed25519 signer with a self-issued identity.
pub struct Ed25519Signer {
    key: SigningKey,
    certificate: Certificate,
    key_id: String,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey, subject: impl Into<String>) -> Result<Self, SigningError> {
        let spki = key_to_spki_der(&key.verifying_key())?;
        let key_id = compute_key_id(&spki);
        let subject = subject.into();
        let certificate = Certificate {
            serial: key_id.trim_start_matches("sha256:")[..16].to_string(),
            issuer: subject.clone(),
            subject,
            encoded: spki,
        };
        Ok(Self {
            key,
            certificate,
            key_id,
        })
    }

    pub fn from_seed(seed: &[u8; 32], subject: impl Into<String>) -> Result<Self, SigningError> {
        Self::new(SigningKey::from_bytes(seed), subject)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        use ed25519_dalek::Signer as _;

        let signature = self.key.sign(data);
        let envelope = SignatureEnvelope {
            version: ENVELOPE_VERSION,
            algorithm: ENVELOPE_ALGORITHM.to_string(),
            key_id: self.key_id.clone(),
            subject: self.certificate.subject.clone(),
            certificate: BASE64.encode(&self.certificate.encoded),
            signature: BASE64.encode(signature.to_bytes()),
        };
        serde_json::to_vec(&envelope).map_err(|e| SigningError::Malformed {
            reason: e.to_string(),
        })
    }

    fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn signature_method(&self) -> &str {
        ED25519_SIGNATURE_METHOD
    }
}

/// Verifier for [`Ed25519Signer`] envelopes.
///
/// With an empty allow-list every correctly signed envelope is accepted.
#[derive(Debug, Clone, Default)]
pub struct Ed25519Verifier {
    trusted_key_ids: HashSet<String>,
}

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusting(key_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trusted_key_ids: key_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_key_trusted(&self, key_id: &str) -> bool {
        self.trusted_key_ids.is_empty() || self.trusted_key_ids.contains(key_id)
    }
}

fn malformed(reason: impl Into<String>) -> SigningError {
    SigningError::Malformed {
        reason: reason.into(),
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<Certificate, SigningError> {
        let envelope: SignatureEnvelope =
            serde_json::from_slice(signature).map_err(|e| malformed(e.to_string()))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(malformed(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        if envelope.algorithm != ENVELOPE_ALGORITHM {
            return Err(SigningError::UnsupportedAlgorithm {
                algorithm: envelope.algorithm,
            });
        }

        let spki = BASE64
            .decode(&envelope.certificate)
            .map_err(|e| malformed(format!("certificate: {e}")))?;
        let actual = compute_key_id(&spki);
        if actual != envelope.key_id {
            return Err(SigningError::KeyIdMismatch {
                claimed: envelope.key_id,
                actual,
            });
        }
        if !self.is_key_trusted(&actual) {
            return Err(SigningError::KeyNotTrusted { key_id: actual });
        }

        let key = VerifyingKey::from_public_key_der(&spki)
            .map_err(|e| malformed(format!("public key: {e}")))?;
        let sig_bytes = BASE64
            .decode(&envelope.signature)
            .map_err(|e| malformed(format!("signature: {e}")))?;
        let sig = ed25519_dalek::Signature::from_slice(&sig_bytes)
            .map_err(|e| malformed(format!("signature: {e}")))?;

        key.verify_strict(data, &sig)
            .map_err(|_| SigningError::SignatureInvalid)?;

        Ok(Certificate {
            serial: actual.trim_start_matches("sha256:")[..16].to_string(),
            issuer: envelope.subject.clone(),
            subject: envelope.subject,
            encoded: spki,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_SEED: [u8; 32] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e,
        0x1f, 0x20,
    ];

    fn signer() -> Ed25519Signer {
        Ed25519Signer::from_seed(&TEST_KEY_SEED, "CN=Test Signer").unwrap()
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = signer();
        let sig = signer.sign(b"manifest bytes").unwrap();

        let cert = Ed25519Verifier::new()
            .verify(b"manifest bytes", &sig)
            .unwrap();
        assert_eq!(cert.subject, "CN=Test Signer");
        assert_eq!(cert.encoded, signer.certificate().encoded);
        assert_eq!(cert.serial, signer.certificate().serial);
    }

    #[test]
    fn test_one_bit_flip_fails() {
        let sig = signer().sign(b"manifest bytes").unwrap();
        let err = Ed25519Verifier::new()
            .verify(b"manifest bytez", &sig)
            .unwrap_err();
        assert!(matches!(err, SigningError::SignatureInvalid));
    }

    #[test]
    fn test_untrusted_key_rejected() {
        let sig = signer().sign(b"data").unwrap();
        let verifier = Ed25519Verifier::trusting(["sha256:0000"]);
        let err = verifier.verify(b"data", &sig).unwrap_err();
        assert!(matches!(err, SigningError::KeyNotTrusted { .. }));
    }

    #[test]
    fn test_trusted_key_accepted() {
        let signer = signer();
        let sig = signer.sign(b"data").unwrap();
        let verifier = Ed25519Verifier::trusting([signer.key_id()]);
        assert!(verifier.verify(b"data", &sig).is_ok());
    }

    #[test]
    fn test_garbage_signature_is_malformed() {
        let err = Ed25519Verifier::new()
            .verify(b"data", b"not json")
            .unwrap_err();
        assert!(matches!(err, SigningError::Malformed { .. }));
    }

    #[test]
    fn test_key_id_format() {
        let key_id = signer().key_id().to_string();
        assert!(key_id.starts_with("sha256:"));
        assert_eq!(key_id.len(), "sha256:".len() + 64);
    }
}
