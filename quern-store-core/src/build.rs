/// Build modes accepted by BuildPaths and BuildDerivation, encoded as a
/// wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum BuildMode {
    #[default]
    Normal = 0,
    /// Rebuild even if already valid.
    Repair = 1,
    /// Verify reproducibility against the existing output.
    Check = 2,
}

/// Outcome codes the daemon reports for a single build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum BuildStatus {
    Built = 0,
    Substituted = 1,
    AlreadyValid = 2,
    PermanentFailure = 3,
    InputRejected = 4,
    OutputRejected = 5,
    TransientFailure = 6,
    TimedOut = 7,
    MiscFailure = 8,
    DependencyFailed = 9,
    LogLimitExceeded = 10,
    NotDeterministic = 11,
    ResolvesToAlreadyValid = 12,
    NoSubstituters = 13,
}

impl BuildStatus {
    pub fn from_wire(value: u64) -> Option<Self> {
        Some(match value {
            0 => BuildStatus::Built,
            1 => BuildStatus::Substituted,
            2 => BuildStatus::AlreadyValid,
            3 => BuildStatus::PermanentFailure,
            4 => BuildStatus::InputRejected,
            5 => BuildStatus::OutputRejected,
            6 => BuildStatus::TransientFailure,
            7 => BuildStatus::TimedOut,
            8 => BuildStatus::MiscFailure,
            9 => BuildStatus::DependencyFailed,
            10 => BuildStatus::LogLimitExceeded,
            11 => BuildStatus::NotDeterministic,
            12 => BuildStatus::ResolvesToAlreadyValid,
            13 => BuildStatus::NoSubstituters,
            _ => return None,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            BuildStatus::Built
                | BuildStatus::Substituted
                | BuildStatus::AlreadyValid
                | BuildStatus::ResolvesToAlreadyValid
        )
    }
}

/// Reply of BuildDerivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub error_msg: Option<Vec<u8>>,
    pub times_built: u64,
    pub is_non_deterministic: bool,
    /// Unix timestamps.
    pub start_time: u64,
    pub stop_time: u64,
}
