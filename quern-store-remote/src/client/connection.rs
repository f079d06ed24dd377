use crate::error::{IoErrorContext, RemoteStoreError};
use crate::protocol::{
    ActivityField, LogEvent, LogSink, ProtocolVersion, StderrError, StderrTag, Trace, WorkerOp,
    CLIENT_PROTOCOL_VERSION, MAX_STRING_LIST_SIZE, MIN_SERVER_VERSION, WORKER_MAGIC_1,
    WORKER_MAGIC_2,
};
use crate::serialization::{Deserialize, Serialize};
use quern_store_core::StoreDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Upper bound on one answer to a daemon STDERR_READ request.
const READ_CHUNK: u64 = 8192;

/// One negotiated connection to the daemon. Owns both stream halves; at
/// most one operation can use it at a time because every entry point takes
/// `&mut self`.
pub struct DaemonConnection<R, W> {
    reader: R,
    writer: W,
    version: ProtocolVersion,
    store_dir: StoreDir,
    poisoned: bool,
    log_sink: Option<LogSink>,
}

impl<R, W> std::fmt::Debug for DaemonConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConnection")
            .field("version", &self.version)
            .field("store_dir", &self.store_dir)
            .field("poisoned", &self.poisoned)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> DaemonConnection<R, W> {
    /// Runs the version negotiation and the initial stderr drain, leaving
    /// the connection ready for operations. Any failure here abandons the
    /// stream.
    pub async fn handshake(
        mut reader: R,
        mut writer: W,
        store_dir: StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let hs = CLIENT_PROTOCOL_VERSION;

        WORKER_MAGIC_1.serialize(&mut writer, hs, &store_dir).await?;
        writer.flush().await.io_context("sending magic")?;

        let magic = u64::deserialize(&mut reader, hs, &store_dir).await?;
        if magic != WORKER_MAGIC_2 {
            return Err(RemoteStoreError::ProtocolMismatch(format!(
                "expected magic {WORKER_MAGIC_2:#x}, got {magic:#x}"
            )));
        }

        let server_version =
            ProtocolVersion::from(u64::deserialize(&mut reader, hs, &store_dir).await?);
        if server_version.major != CLIENT_PROTOCOL_VERSION.major
            || server_version < MIN_SERVER_VERSION
        {
            return Err(RemoteStoreError::ProtocolMismatch(format!(
                "server speaks {server_version}, need {}.{} to {}",
                CLIENT_PROTOCOL_VERSION.major, MIN_SERVER_VERSION.minor, CLIENT_PROTOCOL_VERSION
            )));
        }
        u64::from(CLIENT_PROTOCOL_VERSION)
            .serialize(&mut writer, hs, &store_dir)
            .await?;

        let version = server_version.min(CLIENT_PROTOCOL_VERSION);

        // Mandatory placeholders: no CPU affinity, no reserved space.
        if version.minor >= 14 {
            0u64.serialize(&mut writer, version, &store_dir).await?;
        }
        if version.minor >= 11 {
            false.serialize(&mut writer, version, &store_dir).await?;
        }
        writer.flush().await.io_context("finishing handshake")?;

        if version.minor >= 33 {
            let daemon_version = Vec::<u8>::deserialize(&mut reader, version, &store_dir).await?;
            debug!(
                daemon_version = %String::from_utf8_lossy(&daemon_version),
                "daemon identified itself"
            );
        }

        debug!(%server_version, effective = %version, "handshake complete");

        let mut conn = DaemonConnection {
            reader,
            writer,
            version,
            store_dir,
            poisoned: false,
            log_sink: None,
        };
        conn.process_stderr(None).await?;
        Ok(conn)
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn store_dir(&self) -> &StoreDir {
        &self.store_dir
    }

    pub fn set_log_sink(&mut self, sink: LogSink) {
        self.log_sink = Some(sink);
    }

    /// Fails with [`RemoteStoreError::ConnectionPoisoned`] once an earlier
    /// operation left the stream framing indeterminate.
    pub fn check_ready(&self) -> Result<(), RemoteStoreError> {
        if self.poisoned {
            Err(RemoteStoreError::ConnectionPoisoned)
        } else {
            Ok(())
        }
    }

    /// Records the outcome of an operation, poisoning the connection on
    /// anything that is not a clean daemon-level failure.
    pub fn absorb<T>(
        &mut self,
        result: Result<T, RemoteStoreError>,
    ) -> Result<T, RemoteStoreError> {
        if let Err(err) = &result {
            if !err.is_recoverable() {
                warn!(%err, "poisoning daemon connection");
                self.poisoned = true;
            }
        }
        result
    }

    pub async fn send_op(&mut self, op: WorkerOp) -> Result<(), RemoteStoreError> {
        trace!(?op, "sending operation");
        (op as u64)
            .serialize(&mut self.writer, self.version, &self.store_dir)
            .await
    }

    pub async fn write_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), RemoteStoreError> {
        value
            .serialize(&mut self.writer, self.version, &self.store_dir)
            .await
    }

    pub async fn read_value<T: Deserialize>(&mut self) -> Result<T, RemoteStoreError> {
        T::deserialize(&mut self.reader, self.version, &self.store_dir).await
    }

    pub async fn flush(&mut self) -> Result<(), RemoteStoreError> {
        self.writer.flush().await.io_context("flushing request")
    }

    /// Streams a caller-supplied producer verbatim onto the socket, as
    /// AddToStore requires for the NAR payload. Returns the byte count.
    pub async fn copy_raw<S: AsyncRead + Unpin>(
        &mut self,
        source: &mut S,
    ) -> Result<u64, RemoteStoreError> {
        let mut buf = vec![0u8; 8192];
        let mut total = 0u64;
        loop {
            let n = source
                .read(&mut buf)
                .await
                .io_context("reading archive producer")?;
            if n == 0 {
                break;
            }
            self.writer
                .write_all(&buf[..n])
                .await
                .io_context("streaming archive")?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Drives the interleaved log phase until the daemon terminates it.
    /// STDERR_LAST completes normally; STDERR_ERROR yields the recoverable
    /// [`RemoteStoreError::DaemonError`]. A daemon STDERR_READ request is
    /// answered from `source`, or with an empty block when there is none.
    pub async fn process_stderr(
        &mut self,
        mut source: Option<&mut (dyn AsyncRead + Unpin + Send)>,
    ) -> Result<(), RemoteStoreError> {
        loop {
            let tag = StderrTag::from_wire(self.read_value::<u64>().await?)?;
            match tag {
                StderrTag::Last => return Ok(()),

                StderrTag::Error => return Err(self.read_daemon_error().await?),

                StderrTag::Next => {
                    let line = self.read_value::<Vec<u8>>().await?;
                    debug!(line = %String::from_utf8_lossy(&line), "daemon log");
                    self.emit(LogEvent::Line(line));
                }

                StderrTag::Read => {
                    let wanted = self.read_value::<u64>().await?;
                    let chunk = match source.as_mut() {
                        Some(src) => {
                            let mut buf = vec![0u8; wanted.min(READ_CHUNK) as usize];
                            let n = src
                                .read(&mut buf)
                                .await
                                .io_context("reading data for the daemon")?;
                            buf.truncate(n);
                            buf
                        }
                        None => Vec::new(),
                    };
                    self.write_value(&chunk).await?;
                    self.flush().await?;
                }

                StderrTag::Write => {
                    // Data pushed at us outside any operation we stream;
                    // consume it to keep the framing intact.
                    let block = self.read_value::<Vec<u8>>().await?;
                    trace!(len = block.len(), "discarding daemon data block");
                }

                StderrTag::StartActivity => {
                    let id = self.read_value::<u64>().await?;
                    let level = self.read_value::<u64>().await?;
                    let activity_type = self.read_value::<u64>().await?;
                    let text = self.read_value::<Vec<u8>>().await?;
                    let fields = self.read_activity_fields().await?;
                    let parent = self.read_value::<u64>().await?;
                    self.emit(LogEvent::StartActivity {
                        id,
                        level,
                        activity_type,
                        text,
                        fields,
                        parent,
                    });
                }

                StderrTag::StopActivity => {
                    let id = self.read_value::<u64>().await?;
                    self.emit(LogEvent::StopActivity { id });
                }

                StderrTag::Result => {
                    let id = self.read_value::<u64>().await?;
                    let result_type = self.read_value::<u64>().await?;
                    let fields = self.read_activity_fields().await?;
                    self.emit(LogEvent::Result {
                        id,
                        result_type,
                        fields,
                    });
                }
            }
        }
    }

    fn emit(&mut self, event: LogEvent) {
        if let Some(sink) = &mut self.log_sink {
            sink(event);
        }
    }

    async fn read_activity_fields(&mut self) -> Result<Vec<ActivityField>, RemoteStoreError> {
        let count = self.read_value::<u64>().await?;
        if count > MAX_STRING_LIST_SIZE {
            return Err(RemoteStoreError::decode(
                "activity fields",
                format!("length {count} exceeds maximum {MAX_STRING_LIST_SIZE}"),
            ));
        }
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let kind = self.read_value::<u64>().await?;
            fields.push(match kind {
                0 => ActivityField::Int(self.read_value::<u64>().await?),
                1 => ActivityField::Text(self.read_value::<Vec<u8>>().await?),
                other => {
                    return Err(RemoteStoreError::decode(
                        "activity fields",
                        format!("unknown field type {other}"),
                    ))
                }
            });
        }
        Ok(fields)
    }

    /// Decodes the body of a STDERR_ERROR frame. Daemons newer than 1.26
    /// send a structured error, older ones a message plus exit status.
    async fn read_daemon_error(&mut self) -> Result<RemoteStoreError, RemoteStoreError> {
        if self.version.minor >= 26 {
            let kind = self.read_value::<String>().await?;
            let level = self.read_value::<u64>().await?;
            let name = self.read_value::<String>().await?;
            let message = self.read_value::<String>().await?;
            let have_pos = self.read_value::<u64>().await?;

            let trace_count = self.read_value::<u64>().await?;
            if trace_count > MAX_STRING_LIST_SIZE {
                return Err(RemoteStoreError::decode(
                    "error traces",
                    format!("length {trace_count} exceeds maximum {MAX_STRING_LIST_SIZE}"),
                ));
            }
            let mut traces = Vec::new();
            for _ in 0..trace_count {
                traces.push(Trace {
                    have_pos: self.read_value::<u64>().await?,
                    trace: self.read_value::<String>().await?,
                });
            }

            let err = StderrError {
                kind,
                level,
                name,
                message,
                have_pos,
                traces,
            };
            debug!(?err, "daemon reported an error");
            Ok(RemoteStoreError::DaemonError {
                message: err.message,
                exit_status: None,
            })
        } else {
            let message = self.read_value::<String>().await?;
            let status = self.read_value::<u64>().await?;
            debug!(%message, status, "daemon reported an error");
            Ok(RemoteStoreError::DaemonError {
                message,
                exit_status: Some(status),
            })
        }
    }
}
