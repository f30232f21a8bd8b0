//! Error taxonomy for container reading, writing and combining.
//!
//! Every variant aborts the operation in progress. Readers and writers that
//! hit an error are closed; later calls fail with [`AsicError::Closed`].

use crate::signing::SigningError;
use crate::xml::XmlError;

/// Coarse classification used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Container structure violation (marker entry, metadata names, duplicates).
    Format,
    /// Integrity violation (digest or signature mismatch, unverified entries).
    Integrity,
    /// Manifest contract violation (root files, algorithms, unpaired fragments).
    Contract,
    /// API misuse by the caller.
    Usage,
    /// Underlying stream or codec failure.
    Io,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AsicError {
    #[error("format violation: {0}")]
    Format(String),

    #[error("digest mismatch for '{name}': expected {expected}, computed {actual}")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("entry '{0}' is not covered by any manifest")]
    UnverifiedEntry(String),

    #[error("digest algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    #[error("multiple root files: '{existing}' is already the root, rejected '{rejected}'")]
    MultipleRootFile { existing: String, rejected: String },

    #[error("container is already signed")]
    AlreadySigned,

    #[error("entry name '{0}' is reserved for container metadata")]
    ReservedName(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("signature verification failed for '{entry}'")]
    SignatureVerification {
        entry: String,
        #[source]
        source: SigningError,
    },

    #[error("signature fragments never paired: {}", .0.join(", "))]
    UnresolvedSignatureFragment(Vec<String>),

    #[error("no current entry: call next_file() first")]
    NoCurrentEntry,

    #[error("container is closed or unusable after an earlier failure")]
    Closed,

    #[error("entry '{entry}' exceeds limit of {limit} bytes")]
    Limit { entry: String, limit: u64 },

    #[error("cannot determine MIME type of '{0}'")]
    UnknownMimeType(String),

    #[error("signing failed")]
    Signing(#[source] SigningError),

    #[error("malformed XML in '{entry}'")]
    Xml {
        entry: String,
        #[source]
        source: XmlError,
    },

    #[error("zip codec error")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl AsicError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Format(_) | Self::Limit { .. } | Self::Xml { .. } => ErrorClass::Format,
            Self::DigestMismatch { .. }
            | Self::UnverifiedEntry(_)
            | Self::SignatureVerification { .. } => ErrorClass::Integrity,
            Self::AlgorithmMismatch { .. }
            | Self::MultipleRootFile { .. }
            | Self::UnresolvedSignatureFragment(_) => ErrorClass::Contract,
            Self::AlreadySigned
            | Self::ReservedName(_)
            | Self::UnsupportedOperation(_)
            | Self::NoCurrentEntry
            | Self::Closed
            | Self::UnknownMimeType(_) => ErrorClass::Usage,
            Self::Signing(_) | Self::Zip(_) | Self::Io(_) => ErrorClass::Io,
        }
    }

    pub(crate) fn xml(entry: impl Into<String>) -> impl FnOnce(XmlError) -> Self {
        let entry = entry.into();
        move |source| Self::Xml { entry, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            AsicError::Format("bad".into()).class(),
            ErrorClass::Format
        );
        assert_eq!(
            AsicError::UnverifiedEntry("a.txt".into()).class(),
            ErrorClass::Integrity
        );
        assert_eq!(
            AsicError::UnresolvedSignatureFragment(vec!["x".into()]).class(),
            ErrorClass::Contract
        );
        assert_eq!(AsicError::AlreadySigned.class(), ErrorClass::Usage);
    }

    #[test]
    fn test_unresolved_fragment_message_lists_references() {
        let err = AsicError::UnresolvedSignatureFragment(vec![
            "META-INF/signature-a.p7s".into(),
            "META-INF/signature-b.p7s".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "signature fragments never paired: META-INF/signature-a.p7s, META-INF/signature-b.p7s"
        );
    }
}
