//! Digest algorithms and streaming digest accumulation.

use serde::Deserialize;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::io::{self, Read};
use std::str::FromStr;

pub const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const SHA384_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
pub const SHA512_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// Digest algorithm used for content entries and manifest references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// XML-DSig algorithm identifier.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => SHA256_URI,
            Self::Sha384 => SHA384_URI,
            Self::Sha512 => SHA512_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            SHA256_URI => Some(Self::Sha256),
            SHA384_URI => Some(Self::Sha384),
            SHA512_URI => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn hasher(&self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha384 => Hasher::Sha384(Sha384::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    /// One-shot digest of an in-memory buffer.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Self::from_uri(s).ok_or_else(|| format!("unknown digest algorithm: {s}")),
        }
    }
}

/// Per-entry digest accumulator.
#[derive(Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Reader adapter that digests every byte passing through it.
pub(crate) struct DigestReader<R> {
    inner: R,
    hasher: Hasher,
    bytes: u64,
}

impl<R: Read> DigestReader<R> {
    pub(crate) fn new(inner: R, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            hasher: algorithm.hasher(),
            bytes: 0,
        }
    }

    pub(crate) fn finish(self) -> (Vec<u8>, u64) {
        (self.hasher.finalize(), self.bytes)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Digest everything left in `reader`.
pub(crate) fn drain<R: Read>(reader: R, algorithm: DigestAlgorithm) -> io::Result<Vec<u8>> {
    let mut digesting = DigestReader::new(reader, algorithm);
    io::copy(&mut digesting, &mut io::sink())?;
    Ok(digesting.finish().0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_mapping() {
        for alg in [
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_uri(alg.uri()), Some(alg));
        }
        assert_eq!(DigestAlgorithm::from_uri("urn:unknown"), None);
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = DigestAlgorithm::Sha256.digest(b"hello");
        assert_eq!(
            hex::encode(digest),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_reader_matches_one_shot() {
        let data = vec![7u8; 20_000];
        let digest = drain(data.as_slice(), DigestAlgorithm::Sha512).unwrap();
        assert_eq!(digest, DigestAlgorithm::Sha512.digest(&data));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("SHA-384".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha384));
        assert_eq!(SHA512_URI.parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha512));
        assert!("md5".parse::<DigestAlgorithm>().is_err());
    }
}
