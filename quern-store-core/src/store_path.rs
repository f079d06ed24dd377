use crate::base32;
use std::fmt;
use thiserror::Error;

/// Length of the truncated digest in a store path, in bytes.
pub const STORE_PATH_HASH_BYTES: usize = 20;
/// Length of the digest once rendered in nix base32.
pub const STORE_PATH_HASH_CHARS: usize = 32;

const NAME_MAX_LEN: usize = 211;

/// The filesystem prefix all store paths of one store share, e.g.
/// `/nix/store`. Fixed once a connection is open; every path that crosses
/// the wire is rendered relative to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreDir(String);

impl StoreDir {
    pub fn new(dir: impl Into<String>) -> Result<Self, ParseStorePathError> {
        let dir = dir.into();
        if !dir.starts_with('/') || dir.ends_with('/') {
            return Err(ParseStorePathError::BadStoreDir(dir));
        }
        Ok(StoreDir(dir))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders `path` as the absolute string form used on the wire.
    pub fn display_path(&self, path: &StorePath) -> String {
        format!("{}/{}", self.0, path)
    }

    /// Parses an absolute store path, checking it lives under this store
    /// directory.
    pub fn parse_path(&self, s: &[u8]) -> Result<StorePath, ParseStorePathError> {
        let s = std::str::from_utf8(s)
            .map_err(|_| ParseStorePathError::NotUtf8(String::from_utf8_lossy(s).into_owned()))?;
        let rest = s
            .strip_prefix(self.0.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| ParseStorePathError::WrongStoreDir {
                expected: self.0.clone(),
                actual: s.to_string(),
            })?;
        if rest.contains('/') {
            return Err(ParseStorePathError::NotBaseName(rest.to_string()));
        }
        rest.parse()
    }
}

impl Default for StoreDir {
    fn default() -> Self {
        StoreDir("/nix/store".to_string())
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The part of a store path after `<hash>-`. Non-empty, at most 211 bytes,
/// restricted to the characters the daemon accepts, no leading period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePathName(String);

impl StorePathName {
    pub fn new(name: impl Into<String>) -> Result<Self, ParseStorePathError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParseStorePathError::EmptyName);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(ParseStorePathError::NameTooLong(name.len()));
        }
        if name.starts_with('.') {
            return Err(ParseStorePathError::BadName(name));
        }
        let ok = name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'+' | b'-' | b'.' | b'_' | b'?' | b'='));
        if !ok {
            return Err(ParseStorePathError::BadName(name));
        }
        Ok(StorePathName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorePathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StorePathName {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePathName::new(s)
    }
}

/// One element of the store: a 20-byte truncated digest plus a name.
/// Displayed as `<base32 digest>-<name>`; the store directory prefix is
/// deliberately not part of the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    hash: [u8; STORE_PATH_HASH_BYTES],
    name: StorePathName,
}

impl Ord for StorePath {
    /// Orders like the rendered base name. Base32 emits the digest bytes
    /// high-index first, so the digest is compared reversed.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash
            .iter()
            .rev()
            .cmp(other.hash.iter().rev())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for StorePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl StorePath {
    pub fn new(hash: [u8; STORE_PATH_HASH_BYTES], name: StorePathName) -> Self {
        StorePath { hash, name }
    }

    pub fn hash_part(&self) -> &[u8; STORE_PATH_HASH_BYTES] {
        &self.hash
    }

    /// The hash part as the daemon renders it, 32 base32 characters.
    pub fn hash_str(&self) -> String {
        String::from_utf8(base32::encode(&self.hash)).expect("base32 alphabet is ascii")
    }

    pub fn name(&self) -> &StorePathName {
        &self.name
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash_str(), self.name)
    }
}

impl std::str::FromStr for StorePath {
    type Err = ParseStorePathError;

    /// Parses the base-name form `<32 chars>-<name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < STORE_PATH_HASH_CHARS + 1 || s.as_bytes()[STORE_PATH_HASH_CHARS] != b'-' {
            return Err(ParseStorePathError::NotBaseName(s.to_string()));
        }
        let (hash_str, rest) = s.split_at(STORE_PATH_HASH_CHARS);
        let digest = base32::decode(hash_str.as_bytes())
            .map_err(|e| ParseStorePathError::BadHashPart(e.to_string()))?;
        let hash: [u8; STORE_PATH_HASH_BYTES] = digest
            .try_into()
            .map_err(|_| ParseStorePathError::BadHashPart(hash_str.to_string()))?;
        Ok(StorePath {
            hash,
            name: StorePathName::new(&rest[1..])?,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseStorePathError {
    #[error("store directory must be absolute without trailing slash: {0}")]
    BadStoreDir(String),

    #[error("store path is not valid UTF-8: {0}")]
    NotUtf8(String),

    #[error("path is not inside store directory {expected}: {actual}")]
    WrongStoreDir { expected: String, actual: String },

    #[error("'{0}' is not of the form <hash>-<name>")]
    NotBaseName(String),

    #[error("invalid store path hash part: {0}")]
    BadHashPart(String),

    #[error("store path name is empty")]
    EmptyName,

    #[error("store path name is {0} bytes, limit is 211")]
    NameTooLong(usize),

    #[error("store path name contains forbidden characters: {0}")]
    BadName(String),
}
