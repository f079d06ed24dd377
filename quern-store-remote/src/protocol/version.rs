use std::fmt;

/// A worker-protocol version, packed on the wire as `major << 8 | minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl From<u64> for ProtocolVersion {
    fn from(x: u64) -> Self {
        Self {
            major: ((x >> 8) & 0xff) as u8,
            minor: (x & 0xff) as u8,
        }
    }
}

impl From<ProtocolVersion> for u64 {
    fn from(version: ProtocolVersion) -> Self {
        ((version.major as u64) << 8) | version.minor as u64
    }
}

/// The newest protocol this client speaks (`0x115`). The effective version
/// of a connection is the minimum of this and the server's.
pub const CLIENT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 21,
};

/// Servers older than this cannot complete the handshake placeholders.
pub const MIN_SERVER_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 10,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_packing() {
        assert_eq!(u64::from(CLIENT_PROTOCOL_VERSION), 0x115);
        assert_eq!(ProtocolVersion::from(0x126u64), ProtocolVersion { major: 1, minor: 38 });
        assert!(MIN_SERVER_VERSION < CLIENT_PROTOCOL_VERSION);
    }
}
