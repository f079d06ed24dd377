use crate::{FileIngestionMethod, Hash, ParseHashError};
use std::fmt;
use thiserror::Error;

/// Parsed form of the daemon's content-address descriptor strings:
/// `text:<algo>:<digest>`, `fixed:[r:]<algo>:<digest>` or
/// `ipfs:<algo>:<digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentAddress {
    Text(Hash),
    Fixed(FileIngestionMethod, Hash),
    Ipfs(Hash),
}

impl ContentAddress {
    pub fn hash(&self) -> &Hash {
        match self {
            ContentAddress::Text(hash)
            | ContentAddress::Fixed(_, hash)
            | ContentAddress::Ipfs(hash) => hash,
        }
    }

    pub fn parse(s: &[u8]) -> Result<Self, ParseContentAddressError> {
        let bad_form = || ParseContentAddressError::InvalidForm(lossy(s));

        if let Some(rest) = s.strip_prefix(b"text:".as_slice()) {
            Ok(ContentAddress::Text(Hash::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix(b"fixed:r:".as_slice()) {
            Ok(ContentAddress::Fixed(
                FileIngestionMethod::Recursive,
                Hash::parse(rest)?,
            ))
        } else if let Some(rest) = s.strip_prefix(b"fixed:".as_slice()) {
            Ok(ContentAddress::Fixed(
                FileIngestionMethod::Flat,
                Hash::parse(rest)?,
            ))
        } else if let Some(rest) = s.strip_prefix(b"ipfs:".as_slice()) {
            Ok(ContentAddress::Ipfs(Hash::parse(rest)?))
        } else {
            Err(bad_form())
        }
    }
}

fn lossy(s: &[u8]) -> String {
    String::from_utf8_lossy(s).into_owned()
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentAddress::Text(hash) => write!(f, "text:{hash}"),
            ContentAddress::Fixed(method, hash) => {
                write!(f, "fixed:{}{hash}", method.descriptor_infix())
            }
            ContentAddress::Ipfs(hash) => write!(f, "ipfs:{hash}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseContentAddressError {
    #[error("'{0}' has no recognized content-address prefix")]
    InvalidForm(String),

    #[error("bad hash in content address: {0}")]
    InvalidHash(#[from] ParseHashError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashAlgo;
    use rstest::rstest;

    const DIGEST32: &str = "1sfdxziarxw8j3p80lvswgpq9i7smdyxmmsj5sjhhgjdjfwjfkdr";

    #[rstest]
    #[case::text(format!("text:sha256:{DIGEST32}"))]
    #[case::flat(format!("fixed:sha256:{DIGEST32}"))]
    #[case::recursive(format!("fixed:r:sha256:{DIGEST32}"))]
    #[case::ipfs(format!("ipfs:sha256:{DIGEST32}"))]
    fn parses_each_prefix(#[case] s: String) {
        let ca = ContentAddress::parse(s.as_bytes()).unwrap();
        assert_eq!(ca.hash().algo(), HashAlgo::Sha256);
    }

    #[test]
    fn display_uses_hex() {
        let ca = ContentAddress::parse(format!("fixed:r:sha256:{DIGEST32}").as_bytes()).unwrap();
        assert_eq!(
            ca.to_string(),
            format!("fixed:r:sha256:{}", ca.hash().to_hex())
        );
    }

    #[rstest]
    #[case::unknown_prefix("nar:sha256:abcdef")]
    #[case::empty("")]
    #[case::bare_path("/nix/store/abc")]
    fn rejects_unknown_forms(#[case] s: &str) {
        assert!(matches!(
            ContentAddress::parse(s.as_bytes()),
            Err(ParseContentAddressError::InvalidForm(_))
        ));
    }

    #[test]
    fn rejects_bad_hash() {
        assert!(matches!(
            ContentAddress::parse(b"fixed:sha256:zz"),
            Err(ParseContentAddressError::InvalidHash(_))
        ));
    }
}
