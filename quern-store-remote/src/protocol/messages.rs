use crate::error::RemoteStoreError;

/// Frame tags the daemon interleaves with replies. Only `Last` and `Error`
/// terminate the log phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrTag {
    Write = 0x64617416,
    Read = 0x64617461,
    Error = 0x63787470,
    Next = 0x6f6c6d67,
    StartActivity = 0x53545254,
    StopActivity = 0x53544f50,
    Result = 0x52534c54,
    Last = 0x616c7473,
}

impl StderrTag {
    pub fn from_wire(value: u64) -> Result<Self, RemoteStoreError> {
        match value {
            0x64617416 => Ok(StderrTag::Write),
            0x64617461 => Ok(StderrTag::Read),
            0x63787470 => Ok(StderrTag::Error),
            0x6f6c6d67 => Ok(StderrTag::Next),
            0x53545254 => Ok(StderrTag::StartActivity),
            0x53544f50 => Ok(StderrTag::StopActivity),
            0x52534c54 => Ok(StderrTag::Result),
            0x616c7473 => Ok(StderrTag::Last),
            _ => Err(RemoteStoreError::decode(
                "stderr tag",
                format!("unknown frame tag {value:#x}"),
            )),
        }
    }
}

/// One field of a structured activity or result frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityField {
    Int(u64),
    Text(Vec<u8>),
}

/// Structured log traffic surfaced to the caller's log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A plain log line (STDERR_NEXT).
    Line(Vec<u8>),
    StartActivity {
        id: u64,
        level: u64,
        activity_type: u64,
        text: Vec<u8>,
        fields: Vec<ActivityField>,
        parent: u64,
    },
    StopActivity {
        id: u64,
    },
    Result {
        id: u64,
        result_type: u64,
        fields: Vec<ActivityField>,
    },
}

/// Callback receiving [`LogEvent`]s; the default is to discard them.
pub type LogSink = Box<dyn FnMut(LogEvent) + Send>;

/// The structured error body daemons send since protocol 1.26.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StderrError {
    pub kind: String,
    pub level: u64,
    pub name: String,
    pub message: String,
    pub have_pos: u64,
    pub traces: Vec<Trace>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub have_pos: u64,
    pub trace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_codes_match_wire() {
        assert_eq!(StderrTag::from_wire(0x616c7473).unwrap(), StderrTag::Last);
        assert_eq!(StderrTag::from_wire(0x63787470).unwrap(), StderrTag::Error);
        assert_eq!(StderrTag::from_wire(0x6f6c6d67).unwrap(), StderrTag::Next);
        assert_eq!(StderrTag::from_wire(0x64617461).unwrap(), StderrTag::Read);
        assert_eq!(StderrTag::from_wire(0x64617416).unwrap(), StderrTag::Write);
        assert!(StderrTag::from_wire(0xdead).is_err());
    }
}
