pub mod connection;

use crate::error::{IoErrorContext, RemoteStoreError};
use crate::protocol::types::{
    CheckFlag, GcOptions, GcResult, Missing, PathMetadata, RepairFlag, SubstituteFlag,
};
use crate::protocol::{LogSink, ProtocolVersion, WorkerOp};
use crate::serialization::store_requests::{
    AddSignaturesRequest, AddTextToStoreRequest, BuildDerivationRequest, BuildPathsRequest,
    QueryValidPathsRequest, VerifyStoreRequest,
};
use crate::serialization::{Deserialize, Serialize};
use connection::DaemonConnection;
use quern_store_core::{
    BasicDerivation, BuildMode, BuildResult, FileIngestionMethod, HashAlgo, StoreDir, StorePath,
    StorePathName,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// The store client over the usual daemon socket transport.
pub type UnixDaemonStore = DaemonStore<OwnedReadHalf, OwnedWriteHalf>;

/// High-level operations against one daemon connection. Operations run
/// strictly one at a time; each consumes its whole reply before returning,
/// so the next operation starts on a clean frame boundary.
pub struct DaemonStore<R, W> {
    conn: DaemonConnection<R, W>,
}

impl<R, W> std::fmt::Debug for DaemonStore<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonStore").field("conn", &self.conn).finish()
    }
}

impl UnixDaemonStore {
    /// Connects to the daemon's unix socket and negotiates the protocol.
    pub async fn connect(
        socket_path: &Path,
        store_dir: StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .io_context(format!("connecting to {}", socket_path.display()))?;
        let (reader, writer) = stream.into_split();
        Self::handshake(reader, writer, store_dir).await
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> DaemonStore<R, W> {
    /// Negotiates the protocol over an already-established byte stream.
    pub async fn handshake(
        reader: R,
        writer: W,
        store_dir: StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        Ok(DaemonStore {
            conn: DaemonConnection::handshake(reader, writer, store_dir).await?,
        })
    }

    /// The effective protocol version, `min(server, client)`.
    pub fn version(&self) -> ProtocolVersion {
        self.conn.version()
    }

    pub fn store_dir(&self) -> &StoreDir {
        self.conn.store_dir()
    }

    /// Registers a callback for daemon log traffic. Events are discarded
    /// without one.
    pub fn set_log_sink(&mut self, sink: LogSink) {
        self.conn.set_log_sink(sink);
    }

    // Queries

    pub async fn is_valid_path(&mut self, path: &StorePath) -> Result<bool, RemoteStoreError> {
        self.call(WorkerOp::IsValidPath, path).await
    }

    pub async fn query_valid_paths(
        &mut self,
        paths: &BTreeSet<StorePath>,
        substitute: SubstituteFlag,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        let request = QueryValidPathsRequest { paths, substitute };
        self.call(WorkerOp::QueryValidPaths, &request).await
    }

    pub async fn query_all_valid_paths(
        &mut self,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QueryAllValidPaths, &()).await
    }

    pub async fn query_substitutable_paths(
        &mut self,
        paths: &BTreeSet<StorePath>,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QuerySubstitutablePaths, paths).await
    }

    pub async fn query_referrers(
        &mut self,
        path: &StorePath,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QueryReferrers, path).await
    }

    pub async fn query_valid_derivers(
        &mut self,
        path: &StorePath,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QueryValidDerivers, path).await
    }

    pub async fn query_derivation_outputs(
        &mut self,
        drv: &StorePath,
    ) -> Result<BTreeSet<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QueryDerivationOutputs, drv).await
    }

    pub async fn query_derivation_output_names(
        &mut self,
        drv: &StorePath,
    ) -> Result<BTreeSet<Vec<u8>>, RemoteStoreError> {
        self.call(WorkerOp::QueryDerivationOutputNames, drv).await
    }

    /// Looks a path up by the base32 rendering of its hash part. The daemon
    /// answers an empty string when nothing matches.
    pub async fn query_path_from_hash_part(
        &mut self,
        hash_part: &[u8],
    ) -> Result<Option<StorePath>, RemoteStoreError> {
        self.call(WorkerOp::QueryPathFromHashPart, hash_part).await
    }

    /// Full metadata for a valid path; [`RemoteStoreError::PathNotValid`]
    /// when the daemon does not know it.
    pub async fn query_path_info(
        &mut self,
        path: &StorePath,
    ) -> Result<PathMetadata, RemoteStoreError> {
        self.conn.check_ready()?;
        let absolute = self.conn.store_dir().display_path(path);
        let conn = &mut self.conn;
        let result = async {
            conn.send_op(WorkerOp::QueryPathInfo).await?;
            conn.write_value(path).await?;
            conn.flush().await?;
            conn.process_stderr(None).await?;

            let valid = conn.read_value::<bool>().await?;
            if !valid {
                return Err(RemoteStoreError::PathNotValid(absolute));
            }
            conn.read_value::<PathMetadata>().await
        }
        .await;
        self.conn.absorb(result)
    }

    pub async fn query_missing(
        &mut self,
        paths: &BTreeSet<StorePath>,
    ) -> Result<Missing, RemoteStoreError> {
        self.call(WorkerOp::QueryMissing, paths).await
    }

    // Store modification

    /// Adds contents to the store, streaming the NAR from `source`. The
    /// producer runs inside the operation; returning ends the payload.
    pub async fn add_to_store<S: AsyncRead + Unpin>(
        &mut self,
        name: &StorePathName,
        mut source: S,
        method: FileIngestionMethod,
        hash_algo: HashAlgo,
        repair: RepairFlag,
    ) -> Result<StorePath, RemoteStoreError> {
        if repair.as_bool() {
            return Err(RemoteStoreError::RepairUnsupported);
        }
        self.conn.check_ready()?;

        let conn = &mut self.conn;
        let result = async {
            conn.send_op(WorkerOp::AddToStore).await?;
            conn.write_value(name.as_str()).await?;

            // The historical flag pair: `fixed` is an inverted marker that
            // only sha256+recursive may take the content-addressed fast
            // path.
            let fixed =
                !(hash_algo == HashAlgo::Sha256 && method == FileIngestionMethod::Recursive);
            conn.write_value(&fixed).await?;
            conn.write_value(&method.is_recursive()).await?;
            conn.write_value(hash_algo.name()).await?;

            conn.copy_raw(&mut source).await?;
            conn.flush().await?;

            conn.process_stderr(None).await?;
            conn.read_value::<StorePath>().await
        }
        .await;
        self.conn.absorb(result)
    }

    pub async fn add_text_to_store(
        &mut self,
        name: &str,
        content: &[u8],
        references: &BTreeSet<StorePath>,
        repair: RepairFlag,
    ) -> Result<StorePath, RemoteStoreError> {
        if repair.as_bool() {
            return Err(RemoteStoreError::RepairUnsupported);
        }
        let request = AddTextToStoreRequest {
            name,
            content,
            references,
        };
        self.call(WorkerOp::AddTextToStore, &request).await
    }

    pub async fn add_signatures(
        &mut self,
        path: &StorePath,
        signatures: &[Vec<u8>],
    ) -> Result<(), RemoteStoreError> {
        let request = AddSignaturesRequest { path, signatures };
        self.call_status(WorkerOp::AddSignatures, &request).await
    }

    // Roots and maintenance

    pub async fn add_temp_root(&mut self, path: &StorePath) -> Result<(), RemoteStoreError> {
        self.call_status(WorkerOp::AddTempRoot, path).await
    }

    /// Registers a symlink outside the store as an indirect root. The link
    /// path is an arbitrary filesystem path, not a store path.
    pub async fn add_indirect_root(&mut self, link: &Path) -> Result<(), RemoteStoreError> {
        use std::os::unix::ffi::OsStrExt;
        self.call_status(WorkerOp::AddIndirectRoot, link.as_os_str().as_bytes())
            .await
    }

    pub async fn ensure_path(&mut self, path: &StorePath) -> Result<(), RemoteStoreError> {
        self.call_status(WorkerOp::EnsurePath, path).await
    }

    pub async fn sync_with_gc(&mut self) -> Result<(), RemoteStoreError> {
        self.call_status(WorkerOp::SyncWithGC, &()).await
    }

    pub async fn optimise_store(&mut self) -> Result<(), RemoteStoreError> {
        self.call_status(WorkerOp::OptimiseStore, &()).await
    }

    pub async fn find_roots(
        &mut self,
    ) -> Result<BTreeMap<Vec<u8>, StorePath>, RemoteStoreError> {
        self.call(WorkerOp::FindRoots, &()).await
    }

    pub async fn collect_garbage(
        &mut self,
        options: &GcOptions,
    ) -> Result<GcResult, RemoteStoreError> {
        self.call(WorkerOp::CollectGarbage, options).await
    }

    pub async fn verify_store(
        &mut self,
        check_contents: CheckFlag,
        repair: RepairFlag,
    ) -> Result<bool, RemoteStoreError> {
        let request = VerifyStoreRequest {
            check_contents,
            repair,
        };
        self.call(WorkerOp::VerifyStore, &request).await
    }

    // Building

    pub async fn build_paths(
        &mut self,
        paths: &BTreeSet<StorePath>,
        mode: BuildMode,
    ) -> Result<(), RemoteStoreError> {
        let request = BuildPathsRequest { paths, mode };
        self.call_status(WorkerOp::BuildPaths, &request).await
    }

    pub async fn build_derivation(
        &mut self,
        path: &StorePath,
        derivation: &BasicDerivation,
        mode: BuildMode,
    ) -> Result<BuildResult, RemoteStoreError> {
        let request = BuildDerivationRequest {
            path,
            derivation,
            mode,
        };
        self.call(WorkerOp::BuildDerivation, &request).await
    }

    /// One request/reply exchange: opcode, arguments, log phase, decoded
    /// reply. Any non-recoverable failure poisons the connection.
    async fn call<Req, Resp>(&mut self, op: WorkerOp, request: &Req) -> Result<Resp, RemoteStoreError>
    where
        Req: Serialize + ?Sized,
        Resp: Deserialize,
    {
        self.conn.check_ready()?;
        let conn = &mut self.conn;
        let result = async {
            conn.send_op(op).await?;
            conn.write_value(request).await?;
            conn.flush().await?;
            conn.process_stderr(None).await?;
            conn.read_value::<Resp>().await
        }
        .await;
        self.conn.absorb(result)
    }

    /// Like [`Self::call`] for operations whose reply is only the work-done
    /// marker the daemon writes after the log phase.
    async fn call_status<Req>(&mut self, op: WorkerOp, request: &Req) -> Result<(), RemoteStoreError>
    where
        Req: Serialize + ?Sized,
    {
        let _done: u64 = self.call(op, request).await?;
        Ok(())
    }
}
