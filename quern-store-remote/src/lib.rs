pub mod client;
pub mod error;
pub mod protocol;
pub mod serialization;

#[cfg(test)]
mod tests;

pub use client::{DaemonStore, UnixDaemonStore};
pub use error::RemoteStoreError;
pub use protocol::{
    LogEvent, LogSink, ProtocolVersion, WorkerOp, CLIENT_PROTOCOL_VERSION, MIN_SERVER_VERSION,
};
