pub mod messages;
pub mod opcodes;
pub mod types;
pub mod version;

pub use messages::{ActivityField, LogEvent, LogSink, StderrError, StderrTag, Trace};
pub use opcodes::WorkerOp;
pub use version::{ProtocolVersion, CLIENT_PROTOCOL_VERSION, MIN_SERVER_VERSION};

pub const WORKER_MAGIC_1: u64 = 0x6e697863;
pub const WORKER_MAGIC_2: u64 = 0x6478696f;

pub const MAX_STRING_SIZE: u64 = 0x1000000; // 16M
pub const MAX_STRING_LIST_SIZE: u64 = 0x10000; // 64K
