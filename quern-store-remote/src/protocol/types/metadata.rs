use quern_store_core::{ContentAddress, Hash, StorePath};
use std::collections::BTreeSet;

/// Whether the daemon vouches for a path as locally built. Mapped from the
/// wire's `ultimate` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    BuiltLocally,
    BuiltElsewhere,
}

impl Trust {
    pub fn from_ultimate(ultimate: bool) -> Self {
        if ultimate {
            Trust::BuiltLocally
        } else {
            Trust::BuiltElsewhere
        }
    }
}

/// Everything QueryPathInfo reports about one valid store path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMetadata {
    /// The derivation that produced the path, when the daemon still knows it.
    pub deriver: Option<StorePath>,
    /// SHA-256 over the path's NAR serialization.
    pub nar_hash: Hash,
    pub references: BTreeSet<StorePath>,
    /// Unix timestamp of registration in the daemon's database.
    pub registration_time: u64,
    /// Size of the NAR serialization in bytes.
    pub nar_bytes: u64,
    pub trust: Trust,
    /// Signature strings exactly as the daemon stores them
    /// (`key-name:base64`). Verification is the caller's concern.
    pub signatures: Vec<Vec<u8>>,
    pub content_address: Option<ContentAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_mapping() {
        assert_eq!(Trust::from_ultimate(true), Trust::BuiltLocally);
        assert_eq!(Trust::from_ultimate(false), Trust::BuiltElsewhere);
    }
}
