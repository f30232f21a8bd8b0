//! Pairing table for detached manifest / signature halves.

use crate::error::AsicError;
use std::collections::BTreeMap;

/// One half of a detached signature pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Manifest(Vec<u8>),
    Signature(Vec<u8>),
}

impl Fragment {
    fn kind(&self) -> &'static str {
        match self {
            Fragment::Manifest(_) => "manifest",
            Fragment::Signature(_) => "signature",
        }
    }
}

/// A completed pair: `(manifest bytes, signature bytes)`.
pub type FragmentPair = (Vec<u8>, Vec<u8>);

#[derive(Debug, Default)]
pub struct FragmentTable {
    pending: BTreeMap<String, Fragment>,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `half` under `reference`, or complete the pair if the other half
    /// is already waiting.
    pub fn offer(
        &mut self,
        reference: &str,
        half: Fragment,
    ) -> Result<Option<FragmentPair>, AsicError> {
        let Some(waiting) = self.pending.remove(reference) else {
            self.pending.insert(reference.to_string(), half);
            return Ok(None);
        };

        match (waiting, half) {
            (Fragment::Manifest(manifest), Fragment::Signature(signature))
            | (Fragment::Signature(signature), Fragment::Manifest(manifest)) => {
                Ok(Some((manifest, signature)))
            }
            (waiting, half) => {
                let kind = half.kind();
                self.pending.insert(reference.to_string(), waiting);
                Err(AsicError::Format(format!(
                    "second {kind} for signature reference '{reference}'"
                )))
            }
        }
    }

    /// References still waiting for their other half, in name order.
    pub fn unresolved(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    pub fn ensure_empty(&self) -> Result<(), AsicError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(AsicError::UnresolvedSignatureFragment(self.unresolved()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_in_either_order() {
        let mut table = FragmentTable::new();
        assert!(table
            .offer("sig-a", Fragment::Signature(b"s".to_vec()))
            .unwrap()
            .is_none());
        let pair = table
            .offer("sig-a", Fragment::Manifest(b"m".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(pair, (b"m".to_vec(), b"s".to_vec()));

        table.offer("sig-b", Fragment::Manifest(b"m2".to_vec())).unwrap();
        let pair = table
            .offer("sig-b", Fragment::Signature(b"s2".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(pair, (b"m2".to_vec(), b"s2".to_vec()));
        table.ensure_empty().unwrap();
    }

    #[test]
    fn test_same_half_twice_is_format_error() {
        let mut table = FragmentTable::new();
        table.offer("sig", Fragment::Manifest(b"1".to_vec())).unwrap();
        let err = table
            .offer("sig", Fragment::Manifest(b"2".to_vec()))
            .unwrap_err();
        assert!(matches!(err, AsicError::Format(_)));
    }

    #[test]
    fn test_unresolved_listed() {
        let mut table = FragmentTable::new();
        table.offer("b", Fragment::Signature(vec![])).unwrap();
        table.offer("a", Fragment::Manifest(vec![])).unwrap();
        match table.ensure_empty().unwrap_err() {
            AsicError::UnresolvedSignatureFragment(refs) => assert_eq!(refs, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
