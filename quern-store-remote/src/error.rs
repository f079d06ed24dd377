use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteStoreError {
    /// Magic or version exchange failed. The socket is released.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The daemon reported a failure over STDERR_ERROR. The connection
    /// stays usable.
    #[error("daemon error: {message}")]
    DaemonError {
        message: String,
        exit_status: Option<u64>,
    },

    /// A reply could not be decoded. The connection is poisoned because the
    /// stream position is indeterminate.
    #[error("undecodable reply ({location}): {detail}")]
    Decode {
        location: &'static str,
        detail: String,
    },

    /// QueryPathInfo for a path the daemon does not consider valid.
    #[error("path is not valid: {0}")]
    PathNotValid(String),

    /// Repair requests cannot be forwarded to a remote daemon.
    #[error("repairing paths is not supported via a remote store")]
    RepairUnsupported,

    /// Socket EOF or I/O failure.
    #[error("daemon connection lost while {context}")]
    Disconnected {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An earlier failure left the stream framing indeterminate; the
    /// connection refuses further operations.
    #[error("connection poisoned by an earlier protocol failure")]
    ConnectionPoisoned,
}

impl RemoteStoreError {
    pub fn decode(location: &'static str, detail: impl ToString) -> Self {
        RemoteStoreError::Decode {
            location,
            detail: detail.to_string(),
        }
    }

    /// Whether the connection remains usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RemoteStoreError::DaemonError { .. }
                | RemoteStoreError::PathNotValid(_)
                | RemoteStoreError::RepairUnsupported
        )
    }
}

/// Attaches an operation context to raw I/O failures.
pub trait IoErrorContext<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T, RemoteStoreError>;
}

impl<T> IoErrorContext<T> for Result<T, std::io::Error> {
    fn io_context(self, context: impl Into<String>) -> Result<T, RemoteStoreError> {
        self.map_err(|source| RemoteStoreError::Disconnected {
            context: context.into(),
            source,
        })
    }
}
