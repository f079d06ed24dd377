use crate::base32;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;
use thiserror::Error;

/// Hash algorithms the daemon protocol names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgo::Md5 => "md5",
            HashAlgo::Sha1 => "sha1",
            HashAlgo::Sha256 => "sha256",
            HashAlgo::Sha512 => "sha512",
        }
    }

    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgo::Md5 => 16,
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha512 => 64,
        }
    }

    pub fn base16_len(&self) -> usize {
        self.digest_size() * 2
    }

    pub fn base32_len(&self) -> usize {
        base32::encoded_len(self.digest_size())
    }

    pub fn base64_len(&self) -> usize {
        self.digest_size().div_ceil(3) * 4
    }

    pub fn from_name(name: &[u8]) -> Result<Self, ParseHashError> {
        match name {
            b"md5" => Ok(HashAlgo::Md5),
            b"sha1" => Ok(HashAlgo::Sha1),
            b"sha256" => Ok(HashAlgo::Sha256),
            b"sha512" => Ok(HashAlgo::Sha512),
            _ => Err(ParseHashError::UnknownAlgorithm(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest tagged with its algorithm. The digest length always matches the
/// algorithm.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash {
    algo: HashAlgo,
    digest: Vec<u8>,
}

impl Hash {
    pub fn new(algo: HashAlgo, digest: Vec<u8>) -> Result<Self, ParseHashError> {
        if digest.len() != algo.digest_size() {
            return Err(ParseHashError::WrongDigestSize {
                algo,
                expected: algo.digest_size(),
                actual: digest.len(),
            });
        }
        Ok(Hash { algo, digest })
    }

    pub fn algo(&self) -> HashAlgo {
        self.algo
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Decodes a bare nix-base32 digest, as QueryPathInfo delivers the NAR
    /// hash.
    pub fn from_nix_base32(algo: HashAlgo, text: &[u8]) -> Result<Self, ParseHashError> {
        if text.len() != algo.base32_len() {
            return Err(ParseHashError::WrongEncodedLength {
                algo,
                actual: text.len(),
            });
        }
        let digest =
            base32::decode(text).map_err(|e| ParseHashError::Encoding(e.to_string()))?;
        Hash::new(algo, digest)
    }

    /// Parses `algo:digest` where the digest may be base16, nix base32 or
    /// base64; the encoding is determined by its length.
    pub fn parse(s: &[u8]) -> Result<Self, ParseHashError> {
        let colon = s
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| ParseHashError::MissingAlgo(String::from_utf8_lossy(s).into_owned()))?;
        let algo = HashAlgo::from_name(&s[..colon])?;
        let rest = &s[colon + 1..];

        let digest = if rest.len() == algo.base16_len() {
            hex::decode(rest).map_err(|e| ParseHashError::Encoding(e.to_string()))?
        } else if rest.len() == algo.base32_len() {
            base32::decode(rest).map_err(|e| ParseHashError::Encoding(e.to_string()))?
        } else if rest.len() == algo.base64_len() {
            BASE64
                .decode(rest)
                .map_err(|e| ParseHashError::Encoding(e.to_string()))?
        } else {
            return Err(ParseHashError::WrongEncodedLength {
                algo,
                actual: rest.len(),
            });
        };

        Hash::new(algo, digest)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    pub fn to_nix_base32(&self) -> String {
        String::from_utf8(base32::encode(&self.digest)).expect("base32 alphabet is ascii")
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.digest)
    }
}

impl fmt::Display for Hash {
    /// `algo:hex`, the form the canonical derivation encoding consumes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.to_hex())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseHashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("hash '{0}' has no algorithm prefix")]
    MissingAlgo(String),

    #[error("digest for {algo} must be {expected} bytes, got {actual}")]
    WrongDigestSize {
        algo: HashAlgo,
        expected: usize,
        actual: usize,
    },

    #[error("encoded digest length {actual} fits no known encoding of {algo}")]
    WrongEncodedLength { algo: HashAlgo, actual: usize },

    #[error("undecodable digest: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HELLO_HEX: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HELLO_B32: &str = "1sfdxziarxw8j3p80lvswgpq9i7smdyxmmsj5sjhhgjdjfwjfkdr";

    #[test]
    fn renders_all_encodings() {
        let hash = Hash::new(HashAlgo::Sha256, hex::decode(HELLO_HEX).unwrap()).unwrap();
        assert_eq!(hash.to_hex(), HELLO_HEX);
        assert_eq!(hash.to_nix_base32(), HELLO_B32);
        assert_eq!(hash.to_base64(), "uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=");
    }

    #[rstest]
    #[case::base16(format!("sha256:{HELLO_HEX}"))]
    #[case::base32(format!("sha256:{HELLO_B32}"))]
    #[case::base64("sha256:uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=".to_string())]
    fn parse_detects_encoding(#[case] s: String) {
        let hash = Hash::parse(s.as_bytes()).unwrap();
        assert_eq!(hash.algo(), HashAlgo::Sha256);
        assert_eq!(hash.to_hex(), HELLO_HEX);
    }

    #[test]
    fn from_nix_base32_checks_length() {
        let hash = Hash::from_nix_base32(HashAlgo::Sha256, HELLO_B32.as_bytes()).unwrap();
        assert_eq!(hash.to_hex(), HELLO_HEX);
        assert!(Hash::from_nix_base32(HashAlgo::Sha256, b"too-short").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Hash::parse(b"sha256-deadbeef"),
            Err(ParseHashError::MissingAlgo(_))
        ));
        assert!(matches!(
            Hash::parse(b"blake3:00"),
            Err(ParseHashError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            Hash::parse(b"sha256:00"),
            Err(ParseHashError::WrongEncodedLength { .. })
        ));
    }
}
