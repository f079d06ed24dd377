//! Boolean arguments named for call-site clarity.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairFlag {
    DontRepair,
    Repair,
}

impl RepairFlag {
    pub fn as_bool(self) -> bool {
        self == RepairFlag::Repair
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstituteFlag {
    NoSubstitute,
    Substitute,
}

impl SubstituteFlag {
    pub fn as_bool(self) -> bool {
        self == SubstituteFlag::Substitute
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFlag {
    NoCheck,
    Check,
}

impl CheckFlag {
    pub fn as_bool(self) -> bool {
        self == CheckFlag::Check
    }
}
