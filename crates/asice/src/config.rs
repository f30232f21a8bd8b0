//! Container settings shared by readers, writers and combine.

use crate::container::ASICE_MIME_TYPE;
use crate::dialect::DialectKind;
use crate::digest::DigestAlgorithm;
use serde::Deserialize;

/// Settings for one reader or writer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsicConfig {
    /// Content digest algorithm. Readers reject manifests declaring another.
    pub digest_algorithm: DigestAlgorithm,
    /// Manifest dialect produced by writers.
    pub dialect: DialectKind,
    /// Literal value of the `mimetype` marker entry.
    pub mime_type: String,
    pub max_metadata_bytes: u64,
}

impl Default for AsicConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            dialect: DialectKind::Detached,
            mime_type: ASICE_MIME_TYPE.to_string(),
            max_metadata_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Partial overrides for `AsicConfig`. Used for CLI/config file parsing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsicConfigOverrides {
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub dialect: Option<DialectKind>,
    pub mime_type: Option<String>,
    pub max_metadata_bytes: Option<u64>,
}

impl AsicConfig {
    /// Apply overrides onto these settings. Only `Some` values override.
    pub fn apply(self, overrides: AsicConfigOverrides) -> Self {
        Self {
            digest_algorithm: overrides.digest_algorithm.unwrap_or(self.digest_algorithm),
            dialect: overrides.dialect.unwrap_or(self.dialect),
            mime_type: overrides.mime_type.unwrap_or(self.mime_type),
            max_metadata_bytes: overrides
                .max_metadata_bytes
                .unwrap_or(self.max_metadata_bytes),
        }
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_only_some() {
        let overrides: AsicConfigOverrides =
            serde_json::from_str(r#"{"dialect":"inline","max_metadata_bytes":1024}"#).unwrap();
        let config = AsicConfig::default().apply(overrides);
        assert_eq!(config.dialect, DialectKind::Inline);
        assert_eq!(config.max_metadata_bytes, 1024);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.mime_type, ASICE_MIME_TYPE);
    }

    #[test]
    fn test_dialect_aliases() {
        let overrides: AsicConfigOverrides =
            serde_json::from_str(r#"{"dialect":"xades","digest_algorithm":"sha512"}"#).unwrap();
        assert_eq!(overrides.dialect, Some(DialectKind::Inline));
        assert_eq!(overrides.digest_algorithm, Some(DigestAlgorithm::Sha512));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = serde_json::from_str::<AsicConfigOverrides>(r#"{"max_entries":3}"#);
        assert!(result.is_err());
    }
}
