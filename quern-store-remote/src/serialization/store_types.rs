use crate::error::RemoteStoreError;
use crate::protocol::types::{GcOptions, GcResult, Missing, PathMetadata, Trust};
use crate::protocol::ProtocolVersion;
use crate::serialization::{Deserialize, Serialize};
use quern_store_core::{
    BasicDerivation, BuildResult, BuildStatus, ContentAddress, DerivationOutput, Hash, HashAlgo,
    StoreDir, StorePath,
};
use std::collections::BTreeSet;
use tokio::io::{AsyncRead, AsyncWrite};

// The body of a QueryPathInfo reply, after the leading validity flag.
impl Deserialize for PathMetadata {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let deriver = Option::<StorePath>::deserialize(reader, version, store_dir).await?;

        // The NAR hash arrives as bare base32 text, always SHA-256.
        let hash_text = Vec::<u8>::deserialize(reader, version, store_dir).await?;
        let nar_hash = Hash::from_nix_base32(HashAlgo::Sha256, &hash_text)
            .map_err(|e| RemoteStoreError::decode("nar hash", e))?;

        let references = BTreeSet::<StorePath>::deserialize(reader, version, store_dir).await?;
        let registration_time = u64::deserialize(reader, version, store_dir).await?;
        let nar_bytes = u64::deserialize(reader, version, store_dir).await?;
        let ultimate = bool::deserialize(reader, version, store_dir).await?;
        let signatures = Vec::<Vec<u8>>::deserialize(reader, version, store_dir).await?;

        let ca_text = Vec::<u8>::deserialize(reader, version, store_dir).await?;
        let content_address = if ca_text.is_empty() {
            None
        } else {
            Some(
                ContentAddress::parse(&ca_text)
                    .map_err(|e| RemoteStoreError::decode("content address", e))?,
            )
        };

        Ok(PathMetadata {
            deriver,
            nar_hash,
            references,
            registration_time,
            nar_bytes,
            trust: Trust::from_ultimate(ultimate),
            signatures,
            content_address,
        })
    }
}

impl Deserialize for Missing {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        Ok(Missing {
            will_build: BTreeSet::deserialize(reader, version, store_dir).await?,
            will_substitute: BTreeSet::deserialize(reader, version, store_dir).await?,
            unknown: BTreeSet::deserialize(reader, version, store_dir).await?,
            download_size: u64::deserialize(reader, version, store_dir).await?,
            nar_size: u64::deserialize(reader, version, store_dir).await?,
        })
    }
}

impl Serialize for GcOptions {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        (self.action as u64).serialize(writer, version, store_dir).await?;
        self.paths_to_delete
            .serialize(writer, version, store_dir)
            .await?;
        self.ignore_liveness
            .serialize(writer, version, store_dir)
            .await?;
        self.max_freed.serialize(writer, version, store_dir).await?;
        // Three removed fields the daemon still expects.
        0u64.serialize(writer, version, store_dir).await?;
        0u64.serialize(writer, version, store_dir).await?;
        0u64.serialize(writer, version, store_dir).await
    }
}

impl Deserialize for GcResult {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let paths = Vec::<Vec<u8>>::deserialize(reader, version, store_dir).await?;
        let bytes_freed = u64::deserialize(reader, version, store_dir).await?;
        // Removed field.
        u64::deserialize(reader, version, store_dir).await?;

        Ok(GcResult { paths, bytes_freed })
    }
}

impl Deserialize for BuildStatus {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let value = u64::deserialize(reader, version, store_dir).await?;
        BuildStatus::from_wire(value).ok_or_else(|| {
            RemoteStoreError::decode("build status", format!("unknown status code {value}"))
        })
    }
}

impl Deserialize for BuildResult {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let status = BuildStatus::deserialize(reader, version, store_dir).await?;
        let error_msg = {
            let msg = Vec::<u8>::deserialize(reader, version, store_dir).await?;
            if msg.is_empty() {
                None
            } else {
                Some(msg)
            }
        };
        let times_built = u64::deserialize(reader, version, store_dir).await?;
        let is_non_deterministic = bool::deserialize(reader, version, store_dir).await?;
        let start_time = u64::deserialize(reader, version, store_dir).await?;
        let stop_time = u64::deserialize(reader, version, store_dir).await?;

        Ok(BuildResult {
            status,
            error_msg,
            times_built,
            is_non_deterministic,
            start_time,
            stop_time,
        })
    }
}

impl Serialize for DerivationOutput {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.path.serialize(writer, version, store_dir).await?;

        match &self.hash_algo {
            Some(algo) => algo.name().serialize(writer, version, store_dir).await?,
            None => "".serialize(writer, version, store_dir).await?,
        }
        match &self.hash {
            Some(hash) => hash.serialize(writer, version, store_dir).await?,
            None => (b"" as &[u8]).serialize(writer, version, store_dir).await?,
        }
        Ok(())
    }
}

// The canonical derivation encoding: outputs, input derivations, input
// sources, platform, builder, args, environment — in exactly this order.
impl Serialize for BasicDerivation {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        (self.outputs.len() as u64)
            .serialize(writer, version, store_dir)
            .await?;
        for (name, output) in &self.outputs {
            name.serialize(writer, version, store_dir).await?;
            output.serialize(writer, version, store_dir).await?;
        }

        self.input_derivations
            .serialize(writer, version, store_dir)
            .await?;
        self.input_sources
            .serialize(writer, version, store_dir)
            .await?;
        self.platform.serialize(writer, version, store_dir).await?;
        self.builder.serialize(writer, version, store_dir).await?;
        self.args.serialize(writer, version, store_dir).await?;
        self.env.serialize(writer, version, store_dir).await
    }
}
