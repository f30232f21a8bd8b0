//! PEM key loading for signing and trust.

use anyhow::{Context, Result};
use asice::Ed25519Signer;
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fs;
use std::path::Path;

/// Load a public key from an SPKI PEM file.
pub fn load_public_key_pem(path: &Path) -> Result<VerifyingKey> {
    use pkcs8::DecodePublicKey;

    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read public key: {}", path.display()))?;

    VerifyingKey::from_public_key_pem(&pem)
        .with_context(|| format!("failed to parse public key PEM: {}", path.display()))
}

/// Load a private key from a PKCS#8 PEM file.
pub fn load_private_key_pem(path: &Path) -> Result<SigningKey> {
    use pkcs8::DecodePrivateKey;

    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read private key: {}", path.display()))?;

    SigningKey::from_pkcs8_pem(&pem)
        .with_context(|| format!("failed to parse private key PEM: {}", path.display()))
}

pub fn load_signer(path: &Path, subject: &str) -> Result<Ed25519Signer> {
    let key = load_private_key_pem(path)?;
    Ed25519Signer::new(key, subject)
        .with_context(|| format!("failed to build signer from {}", path.display()))
}
