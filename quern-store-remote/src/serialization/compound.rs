use crate::error::RemoteStoreError;
use crate::protocol::ProtocolVersion;
use crate::serialization::{Deserialize, Serialize};
use quern_store_core::{StoreDir, StorePath};
use tokio::io::{AsyncRead, AsyncWrite};

// Paths travel as absolute strings rooted at the connection's store
// directory.
impl Serialize for StorePath {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        store_dir
            .display_path(self)
            .serialize(writer, version, store_dir)
            .await
    }
}

impl Deserialize for StorePath {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let bytes = Vec::<u8>::deserialize(reader, version, store_dir).await?;
        store_dir
            .parse_path(&bytes)
            .map_err(|e| RemoteStoreError::decode("store path", e))
    }
}

// An absent path is the empty string.
impl Serialize for Option<StorePath> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        match self {
            Some(path) => path.serialize(writer, version, store_dir).await,
            None => (b"" as &[u8]).serialize(writer, version, store_dir).await,
        }
    }
}

impl Deserialize for Option<StorePath> {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let bytes = Vec::<u8>::deserialize(reader, version, store_dir).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        store_dir
            .parse_path(&bytes)
            .map(Some)
            .map_err(|e| RemoteStoreError::decode("store path", e))
    }
}
