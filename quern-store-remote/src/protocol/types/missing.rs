use quern_store_core::StorePath;
use std::collections::BTreeSet;

/// Reply of QueryMissing: how the daemon would realize a set of paths.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Missing {
    pub will_build: BTreeSet<StorePath>,
    pub will_substitute: BTreeSet<StorePath>,
    pub unknown: BTreeSet<StorePath>,
    /// Compressed download volume for the substitutions, in bytes.
    pub download_size: u64,
    /// Uncompressed NAR volume for the substitutions, in bytes.
    pub nar_size: u64,
}

impl Missing {
    /// True when every requested path is already present.
    pub fn is_empty(&self) -> bool {
        self.will_build.is_empty() && self.will_substitute.is_empty() && self.unknown.is_empty()
    }
}
