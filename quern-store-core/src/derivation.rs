use crate::{HashAlgo, StorePath};
use std::collections::{BTreeMap, BTreeSet};

/// One output slot of a derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationOutput {
    pub path: StorePath,
    /// Set for fixed-output derivations.
    pub hash_algo: Option<HashAlgo>,
    /// Expected output hash, hex encoded, paired with `hash_algo`.
    pub hash: Option<Vec<u8>>,
}

/// A build recipe in the form the daemon consumes for BuildDerivation.
///
/// All maps and sets are ordered so the wire encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicDerivation {
    /// Output name (e.g. `out`, `dev`) to output descriptor.
    pub outputs: BTreeMap<Vec<u8>, DerivationOutput>,
    /// Input derivation path to the output names consumed from it.
    pub input_derivations: BTreeMap<StorePath, BTreeSet<Vec<u8>>>,
    /// Source paths copied into the build.
    pub input_sources: BTreeSet<StorePath>,
    /// System tuple, e.g. `x86_64-linux`.
    pub platform: Vec<u8>,
    pub builder: Vec<u8>,
    pub args: Vec<Vec<u8>>,
    pub env: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl BasicDerivation {
    /// Name the daemon derives outputs under, taken from the `name`
    /// environment entry when present.
    pub fn name(&self) -> Option<&[u8]> {
        self.env.get(b"name".as_slice()).map(Vec::as_slice)
    }
}
