use quern_store_core::StorePath;
use std::collections::BTreeSet;

/// What CollectGarbage should do, encoded as a wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum GcAction {
    /// Report the paths reachable from roots.
    ReturnLive = 0,
    /// Report the paths no root reaches.
    ReturnDead = 1,
    DeleteDead = 2,
    DeleteSpecific = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcOptions {
    pub action: GcAction,
    /// Treat all paths as dead. Dangerous.
    pub ignore_liveness: bool,
    /// Only meaningful with [`GcAction::DeleteSpecific`].
    pub paths_to_delete: BTreeSet<StorePath>,
    /// Stop after freeing this many bytes; 0 means unlimited.
    pub max_freed: u64,
}

impl GcOptions {
    pub fn delete_dead(max_freed: u64) -> Self {
        GcOptions {
            action: GcAction::DeleteDead,
            ignore_liveness: false,
            paths_to_delete: BTreeSet::new(),
            max_freed,
        }
    }

    pub fn delete_specific(paths: BTreeSet<StorePath>) -> Self {
        GcOptions {
            action: GcAction::DeleteSpecific,
            ignore_liveness: false,
            paths_to_delete: paths,
            max_freed: 0,
        }
    }
}

/// Reply of CollectGarbage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GcResult {
    /// Deleted (or reported, for the Return actions) paths as absolute
    /// strings; dead paths may already be gone and need not parse as live
    /// store paths.
    pub paths: Vec<Vec<u8>>,
    pub bytes_freed: u64,
}
