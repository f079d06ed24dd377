use crate::error::RemoteStoreError;
use crate::protocol::types::{CheckFlag, RepairFlag, SubstituteFlag};
use crate::protocol::ProtocolVersion;
use crate::serialization::Serialize;
use quern_store_core::{BasicDerivation, BuildMode, StoreDir, StorePath};
use std::collections::BTreeSet;
use tokio::io::AsyncWrite;

/// Arguments of AddTextToStore. Repair is rejected before a request is ever
/// built, so it does not appear here.
#[derive(Debug)]
pub struct AddTextToStoreRequest<'a> {
    pub name: &'a str,
    pub content: &'a [u8],
    pub references: &'a BTreeSet<StorePath>,
}

impl Serialize for AddTextToStoreRequest<'_> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.name.serialize(writer, version, store_dir).await?;
        self.content.serialize(writer, version, store_dir).await?;
        self.references.serialize(writer, version, store_dir).await
    }
}

/// Arguments of AddSignatures. Signatures are opaque byte strings; nothing
/// here validates them.
#[derive(Debug)]
pub struct AddSignaturesRequest<'a> {
    pub path: &'a StorePath,
    pub signatures: &'a [Vec<u8>],
}

impl Serialize for AddSignaturesRequest<'_> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.path.serialize(writer, version, store_dir).await?;
        self.signatures.serialize(writer, version, store_dir).await
    }
}

#[derive(Debug)]
pub struct BuildPathsRequest<'a> {
    pub paths: &'a BTreeSet<StorePath>,
    pub mode: BuildMode,
}

impl Serialize for BuildPathsRequest<'_> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.paths.serialize(writer, version, store_dir).await?;
        (self.mode as u64).serialize(writer, version, store_dir).await
    }
}

#[derive(Debug)]
pub struct BuildDerivationRequest<'a> {
    pub path: &'a StorePath,
    pub derivation: &'a BasicDerivation,
    pub mode: BuildMode,
}

impl Serialize for BuildDerivationRequest<'_> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.path.serialize(writer, version, store_dir).await?;
        self.derivation.serialize(writer, version, store_dir).await?;
        (self.mode as u64).serialize(writer, version, store_dir).await?;
        // The daemon reads one more word here and blocks without it.
        0u64.serialize(writer, version, store_dir).await
    }
}

#[derive(Debug)]
pub struct QueryValidPathsRequest<'a> {
    pub paths: &'a BTreeSet<StorePath>,
    pub substitute: SubstituteFlag,
}

impl Serialize for QueryValidPathsRequest<'_> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.paths.serialize(writer, version, store_dir).await?;
        // Older daemons never substitute on lookup and take no flag.
        if version.minor >= 27 {
            self.substitute
                .as_bool()
                .serialize(writer, version, store_dir)
                .await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct VerifyStoreRequest {
    pub check_contents: CheckFlag,
    pub repair: RepairFlag,
}

impl Serialize for VerifyStoreRequest {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.check_contents
            .as_bool()
            .serialize(writer, version, store_dir)
            .await?;
        self.repair
            .as_bool()
            .serialize(writer, version, store_dir)
            .await
    }
}
