//! Trust policy for container signatures.
//!
//! Lists the signing keys whose signatures `verify` and `extract` accept.
//! An empty policy accepts any correctly signed container.

use anyhow::{Context, Result};
use asice::Ed25519Verifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::keys::load_public_key_pem;
use asice::signing::compute_key_id_from_verifying_key;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustPolicy {
    /// Trusted key IDs (sha256:...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_key_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_keys: Vec<TrustedKey>,
}

/// A trusted key, optionally backed by its public key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustedKey {
    pub key_id: String,

    /// SPKI PEM; when given, its key_id must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TrustPolicy {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read trust policy: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse trust policy YAML")
    }

    /// Load `path`, or start an empty policy when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize trust policy")?;
        fs::write(path, yaml)
            .with_context(|| format!("failed to write trust policy: {}", path.display()))
    }

    /// Add `key`, replacing an entry with the same key_id.
    ///
    /// Returns false when the key_id was already trusted.
    pub fn add_key(&mut self, key: TrustedKey) -> bool {
        let listed = self.trusted_key_ids.len();
        self.trusted_key_ids.retain(|id| id != &key.key_id);
        let mut known = self.trusted_key_ids.len() != listed;
        match self.trusted_keys.iter_mut().find(|k| k.key_id == key.key_id) {
            Some(slot) => {
                *slot = key;
                known = true;
            }
            None => self.trusted_keys.push(key),
        }
        !known
    }

    /// Trust exactly the given public keys.
    pub fn from_public_keys(paths: &[PathBuf]) -> Result<Self> {
        let mut policy = Self::default();
        for path in paths {
            let key = load_public_key_pem(path)?;
            policy
                .trusted_key_ids
                .push(compute_key_id_from_verifying_key(&key)?);
        }
        Ok(policy)
    }

    /// Every trusted key ID, after checking key files against their IDs.
    pub fn resolve_key_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids: BTreeSet<String> = self.trusted_key_ids.iter().cloned().collect();
        for trusted in &self.trusted_keys {
            if let Some(path) = &trusted.public_key_path {
                let key = load_public_key_pem(path)?;
                let actual = compute_key_id_from_verifying_key(&key)?;
                if actual != trusted.key_id {
                    anyhow::bail!(
                        "key_id mismatch for {}: expected {}, got {}",
                        path.display(),
                        trusted.key_id,
                        actual
                    );
                }
            }
            tracing::debug!(key_id = %trusted.key_id, name = ?trusted.name, "trusted key");
            ids.insert(trusted.key_id.clone());
        }
        Ok(ids)
    }

    pub fn verifier(&self) -> Result<Ed25519Verifier> {
        let ids = self.resolve_key_ids()?;
        if ids.is_empty() {
            tracing::warn!("trust policy lists no keys; accepting any valid signature");
        }
        Ok(Ed25519Verifier::trusting(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_yaml() {
        let yaml = r#"
trusted_key_ids:
  - sha256:abc123
trusted_keys:
  - key_id: sha256:def456
    name: release
"#;
        let policy = TrustPolicy::from_yaml(yaml).unwrap();
        let ids = policy.resolve_key_ids().unwrap();
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["sha256:abc123".to_string(), "sha256:def456".to_string()]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(TrustPolicy::from_yaml("require_signed: true\n").is_err());
    }

    #[test]
    fn test_empty_policy_trusts_any_key() {
        let verifier = TrustPolicy::default().verifier().unwrap();
        assert!(verifier.is_key_trusted("sha256:anything"));
    }

    #[test]
    fn test_add_key_replaces_same_id() {
        let mut policy = TrustPolicy::from_yaml("trusted_key_ids:\n  - sha256:abc\n").unwrap();
        let key = |name: &str| TrustedKey {
            key_id: "sha256:abc".into(),
            public_key_path: None,
            name: Some(name.into()),
        };
        assert!(!policy.add_key(key("first")));
        assert!(policy.trusted_key_ids.is_empty());
        assert!(!policy.add_key(key("second")));
        assert_eq!(policy.trusted_keys.len(), 1);
        assert_eq!(policy.trusted_keys[0].name.as_deref(), Some("second"));

        let yaml = serde_yaml::to_string(&policy).unwrap();
        let reparsed = TrustPolicy::from_yaml(&yaml).unwrap();
        assert_eq!(reparsed.resolve_key_ids().unwrap().len(), 1);
        assert!(!yaml.contains("public_key_path"));
    }

    #[test]
    fn test_key_file_must_match_id() {
        use pkcs8::{EncodePublicKey, LineEnding};

        let dir = tempfile::tempdir().unwrap();
        let key = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]).verifying_key();
        let path = dir.path().join("public_key.pem");
        fs::write(&path, key.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();

        let policy = TrustPolicy {
            trusted_key_ids: vec![],
            trusted_keys: vec![TrustedKey {
                key_id: "sha256:0000".into(),
                public_key_path: Some(path.clone()),
                name: None,
            }],
        };
        let err = policy.resolve_key_ids().unwrap_err();
        assert!(err.to_string().contains("key_id mismatch"));

        let from_file = TrustPolicy::from_public_keys(&[path]).unwrap();
        let expected = compute_key_id_from_verifying_key(&key).unwrap();
        assert!(from_file.verifier().unwrap().is_key_trusted(&expected));
        assert!(!from_file.verifier().unwrap().is_key_trusted("sha256:0000"));
    }
}
