pub mod compound;
pub mod primitives;
pub mod store_requests;
pub mod store_types;

use crate::error::RemoteStoreError;
use crate::protocol::ProtocolVersion;
use quern_store_core::StoreDir;
use tokio::io::{AsyncRead, AsyncWrite};

/// Writes a value in the daemon's wire encoding. Store paths need the
/// connection's store directory, so it is threaded through everything.
#[allow(async_fn_in_trait)]
pub trait Serialize {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError>;
}

#[allow(async_fn_in_trait)]
pub trait Deserialize: Sized {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError>;
}
