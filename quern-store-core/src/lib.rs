pub mod base32;
pub mod build;
pub mod content_address;
pub mod derivation;
pub mod file_ingestion;
pub mod hash;
pub mod store_path;

pub use build::{BuildMode, BuildResult, BuildStatus};
pub use content_address::{ContentAddress, ParseContentAddressError};
pub use derivation::{BasicDerivation, DerivationOutput};
pub use file_ingestion::FileIngestionMethod;
pub use hash::{Hash, HashAlgo, ParseHashError};
pub use store_path::{ParseStorePathError, StoreDir, StorePath, StorePathName};
