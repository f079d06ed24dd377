use crate::client::DaemonStore;
use crate::error::RemoteStoreError;
use crate::protocol::types::{CheckFlag, RepairFlag, SubstituteFlag, Trust};
use crate::protocol::{LogEvent, ProtocolVersion, WorkerOp, WORKER_MAGIC_1, WORKER_MAGIC_2};
use crate::serialization::{Deserialize, Serialize};
use quern_store_core::{
    BasicDerivation, BuildMode, BuildStatus, DerivationOutput, FileIngestionMethod, HashAlgo,
    StoreDir, StorePath, StorePathName,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

const STDERR_NEXT: u64 = 0x6f6c6d67;
const STDERR_ERROR: u64 = 0x63787470;
const STDERR_LAST: u64 = 0x616c7473;

const PATH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-x";
const PATH_B: &str = "00bgd045z0d4icpbc2yyz4gx48ak44la-net-tools-1.60";
const NAR_HASH_B32: &[u8] = b"1sfdxziarxw8j3p80lvswgpq9i7smdyxmmsj5sjhhgjdjfwjfkdr";

fn store_path(s: &str) -> StorePath {
    s.parse().unwrap()
}

// Raw wire builders for scripting the daemon side.

fn wire_int(v: u64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn wire_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = wire_int(data.len() as u64);
    out.extend_from_slice(data);
    let padding = (8 - data.len() % 8) % 8;
    out.extend_from_slice(&[0u8; 8][..padding]);
    out
}

fn wire_path(path: &str) -> Vec<u8> {
    wire_bytes(format!("/nix/store/{path}").as_bytes())
}

fn wire_path_set(paths: &[&str]) -> Vec<u8> {
    let mut out = wire_int(paths.len() as u64);
    for p in paths {
        out.extend_from_slice(&wire_path(p));
    }
    out
}

#[derive(Debug)]
enum Step {
    /// Read this many bytes from the client and assert they match.
    Expect(Vec<u8>),
    /// Push these bytes at the client.
    Send(Vec<u8>),
    /// Drop the stream, simulating a daemon crash.
    Hangup,
}

fn handshake_steps(server_version: u64) -> Vec<Step> {
    vec![
        Step::Expect(wire_int(WORKER_MAGIC_1)),
        Step::Send([wire_int(WORKER_MAGIC_2), wire_int(server_version)].concat()),
        // Client version, cpu affinity placeholder, reserve-space placeholder.
        Step::Expect([wire_int(0x115), wire_int(0), wire_int(0)].concat()),
        Step::Send(wire_int(STDERR_LAST)),
    ]
}

async fn run_daemon(mut stream: DuplexStream, steps: Vec<Step>) {
    for step in steps {
        match step {
            Step::Expect(expected) => {
                let mut buf = vec![0u8; expected.len()];
                stream.read_exact(&mut buf).await.expect("client hung up");
                assert_eq!(buf, expected, "client sent unexpected bytes");
            }
            Step::Send(bytes) => stream.write_all(&bytes).await.expect("client hung up"),
            Step::Hangup => return,
        }
    }
}

type TestStore = DaemonStore<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Connects a client to a scripted daemon. The returned handle must be
/// awaited so script assertions propagate.
async fn scripted_store(mut steps: Vec<Step>) -> (TestStore, JoinHandle<()>) {
    let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
    let mut script = handshake_steps(0x115);
    script.append(&mut steps);
    let daemon = tokio::spawn(run_daemon(daemon_side, script));

    let (reader, writer) = split(client_side);
    let store = DaemonStore::handshake(reader, writer, StoreDir::default())
        .await
        .expect("handshake failed");
    (store, daemon)
}

// Handshake

#[tokio::test]
async fn handshake_reaches_ready() {
    let (store, daemon) = scripted_store(Vec::new()).await;
    assert_eq!(store.version(), ProtocolVersion { major: 1, minor: 21 });
    daemon.await.unwrap();
}

#[tokio::test]
async fn handshake_takes_minimum_version() {
    let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
    // Server claims 1.38; the effective version is still ours.
    let daemon = tokio::spawn(run_daemon(daemon_side, handshake_steps(0x126)));

    let (reader, writer) = split(client_side);
    let store = DaemonStore::handshake(reader, writer, StoreDir::default())
        .await
        .unwrap();
    assert_eq!(store.version(), ProtocolVersion { major: 1, minor: 21 });
    daemon.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_bad_magic() {
    let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
    let daemon = tokio::spawn(run_daemon(
        daemon_side,
        vec![
            Step::Expect(wire_int(WORKER_MAGIC_1)),
            Step::Send([wire_int(0xbadc0de), wire_int(0x115)].concat()),
        ],
    ));

    let (reader, writer) = split(client_side);
    let err = DaemonStore::handshake(reader, writer, StoreDir::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::ProtocolMismatch(_)));
    daemon.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_ancient_server() {
    let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
    let daemon = tokio::spawn(run_daemon(
        daemon_side,
        vec![
            Step::Expect(wire_int(WORKER_MAGIC_1)),
            Step::Send([wire_int(WORKER_MAGIC_2), wire_int(0x109)].concat()),
        ],
    ));

    let (reader, writer) = split(client_side);
    let err = DaemonStore::handshake(reader, writer, StoreDir::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::ProtocolMismatch(_)));
    daemon.await.unwrap();
}

// Queries

#[tokio::test]
async fn is_valid_path_true() {
    // The padded request frame is 8 bytes opcode + 8 length + 48 data.
    let request = [wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat();
    assert_eq!(request.len(), 8 + 8 + 48);

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(request),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
    ])
    .await;

    assert!(store.is_valid_path(&store_path(PATH_A)).await.unwrap());
    daemon.await.unwrap();
}

#[tokio::test]
async fn query_missing_all_present() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::QueryMissing as u64), wire_path_set(&[PATH_A])].concat()),
        Step::Send(
            [
                wire_int(STDERR_LAST),
                wire_path_set(&[]),
                wire_path_set(&[]),
                wire_path_set(&[]),
                wire_int(0),
                wire_int(0),
            ]
            .concat(),
        ),
    ])
    .await;

    let missing = store
        .query_missing(&BTreeSet::from([store_path(PATH_A)]))
        .await
        .unwrap();
    assert!(missing.is_empty());
    assert_eq!(missing.download_size, 0);
    assert_eq!(missing.nar_size, 0);
    daemon.await.unwrap();
}

#[tokio::test]
async fn query_valid_paths_omits_substitute_flag() {
    // At 1.21 the substitute flag must not hit the wire.
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(
            [
                wire_int(WorkerOp::QueryValidPaths as u64),
                wire_path_set(&[PATH_B, PATH_A]),
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_path_set(&[PATH_B])].concat()),
    ])
    .await;

    let paths = BTreeSet::from([store_path(PATH_A), store_path(PATH_B)]);
    let valid = store
        .query_valid_paths(&paths, SubstituteFlag::Substitute)
        .await
        .unwrap();
    assert_eq!(valid, BTreeSet::from([store_path(PATH_B)]));
    daemon.await.unwrap();
}

#[tokio::test]
async fn query_path_from_hash_part_absent() {
    let hash_part = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(
            [
                wire_int(WorkerOp::QueryPathFromHashPart as u64),
                wire_bytes(hash_part),
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_bytes(b"")].concat()),
        Step::Expect(
            [
                wire_int(WorkerOp::QueryPathFromHashPart as u64),
                wire_bytes(hash_part),
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_path(PATH_A)].concat()),
    ])
    .await;

    assert_eq!(store.query_path_from_hash_part(hash_part).await.unwrap(), None);
    assert_eq!(
        store.query_path_from_hash_part(hash_part).await.unwrap(),
        Some(store_path(PATH_A))
    );
    daemon.await.unwrap();
}

#[tokio::test]
async fn query_path_info_assembles_metadata() {
    let reply = [
        wire_int(STDERR_LAST),
        wire_int(1),                        // valid
        wire_path(PATH_B),                  // deriver
        wire_bytes(NAR_HASH_B32),           // nar hash, base32
        wire_path_set(&[PATH_A]),           // references
        wire_int(1_700_000_000),            // registration time
        wire_int(4096),                     // nar bytes
        wire_int(1),                        // ultimate
        wire_int(2),                        // two signatures
        wire_bytes(b"cache.example.org-1:c2lnbmF0dXJl"),
        wire_bytes(b"cache.example.org-2:YW5vdGhlcg=="),
        wire_bytes(
            format!(
                "fixed:r:sha256:{}",
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
            )
            .as_bytes(),
        ),
    ]
    .concat();

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::QueryPathInfo as u64), wire_path(PATH_A)].concat()),
        Step::Send(reply),
    ])
    .await;

    let info = store.query_path_info(&store_path(PATH_A)).await.unwrap();
    assert_eq!(info.deriver, Some(store_path(PATH_B)));
    assert_eq!(info.nar_hash.algo(), HashAlgo::Sha256);
    assert_eq!(info.nar_hash.to_nix_base32().as_bytes(), NAR_HASH_B32);
    assert_eq!(info.references, BTreeSet::from([store_path(PATH_A)]));
    assert_eq!(info.registration_time, 1_700_000_000);
    assert_eq!(info.nar_bytes, 4096);
    assert_eq!(info.trust, Trust::BuiltLocally);
    assert_eq!(
        info.signatures,
        vec![
            b"cache.example.org-1:c2lnbmF0dXJl".to_vec(),
            b"cache.example.org-2:YW5vdGhlcg==".to_vec(),
        ]
    );
    assert!(info.content_address.is_some());
    daemon.await.unwrap();
}

#[tokio::test]
async fn query_path_info_invalid_path_is_recoverable() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::QueryPathInfo as u64), wire_path(PATH_A)].concat()),
        Step::Send([wire_int(STDERR_LAST), wire_int(0)].concat()),
        // The connection must still be usable afterwards.
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send([wire_int(STDERR_LAST), wire_int(0)].concat()),
    ])
    .await;

    let err = store.query_path_info(&store_path(PATH_A)).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::PathNotValid(_)));
    assert!(!store.is_valid_path(&store_path(PATH_A)).await.unwrap());
    daemon.await.unwrap();
}

#[tokio::test]
async fn find_roots_returns_mapping() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(wire_int(WorkerOp::FindRoots as u64)),
        Step::Send(
            [
                wire_int(STDERR_LAST),
                wire_int(2),
                wire_bytes(b"/nix/var/nix/gcroots/gcroot-a"),
                wire_path(PATH_A),
                wire_bytes(b"/nix/var/nix/gcroots/gcroot-b"),
                wire_path(PATH_B),
            ]
            .concat(),
        ),
    ])
    .await;

    let roots = store.find_roots().await.unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(
        roots.get(b"/nix/var/nix/gcroots/gcroot-a".as_slice()),
        Some(&store_path(PATH_A))
    );
    assert_eq!(
        roots.get(b"/nix/var/nix/gcroots/gcroot-b".as_slice()),
        Some(&store_path(PATH_B))
    );
    daemon.await.unwrap();
}

#[tokio::test]
async fn find_roots_rejects_foreign_path() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(wire_int(WorkerOp::FindRoots as u64)),
        Step::Send(
            [
                wire_int(STDERR_LAST),
                wire_int(1),
                wire_bytes(b"/nix/var/nix/gcroots/gcroot-a"),
                wire_bytes(b"/gnu/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-x"),
            ]
            .concat(),
        ),
    ])
    .await;

    let err = store.find_roots().await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::Decode { .. }));
    daemon.await.unwrap();
}

// Store modification

#[tokio::test]
async fn add_to_store_streams_nar() {
    let request = [
        wire_int(WorkerOp::AddToStore as u64),
        wire_bytes(b"x"),
        wire_int(0), // fixed = false: sha256 + recursive
        wire_int(1), // recursive
        wire_bytes(b"sha256"),
        b"nar-bytes".to_vec(), // the payload travels raw
    ]
    .concat();

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(request),
        Step::Send([wire_int(STDERR_LAST), wire_path(PATH_A)].concat()),
    ])
    .await;

    let name = StorePathName::new("x").unwrap();
    let path = store
        .add_to_store(
            &name,
            Cursor::new(b"nar-bytes".to_vec()),
            FileIngestionMethod::Recursive,
            HashAlgo::Sha256,
            RepairFlag::DontRepair,
        )
        .await
        .unwrap();
    assert_eq!(path, store_path(PATH_A));
    daemon.await.unwrap();
}

#[tokio::test]
async fn add_to_store_flat_md5_sets_fixed() {
    let request = [
        wire_int(WorkerOp::AddToStore as u64),
        wire_bytes(b"x"),
        wire_int(1), // fixed
        wire_int(0), // not recursive
        wire_bytes(b"md5"),
        b"data".to_vec(),
    ]
    .concat();

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(request),
        Step::Send([wire_int(STDERR_LAST), wire_path(PATH_A)].concat()),
    ])
    .await;

    let name = StorePathName::new("x").unwrap();
    store
        .add_to_store(
            &name,
            Cursor::new(b"data".to_vec()),
            FileIngestionMethod::Flat,
            HashAlgo::Md5,
            RepairFlag::DontRepair,
        )
        .await
        .unwrap();
    daemon.await.unwrap();
}

#[tokio::test]
async fn repair_is_rejected_before_any_write() {
    // The script allows only the handshake plus one later probe; a repair
    // attempt that wrote anything would desync it.
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
    ])
    .await;

    let name = StorePathName::new("x").unwrap();
    let err = store
        .add_to_store(
            &name,
            Cursor::new(Vec::new()),
            FileIngestionMethod::Recursive,
            HashAlgo::Sha256,
            RepairFlag::Repair,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::RepairUnsupported));

    let err = store
        .add_text_to_store("note", b"hello", &BTreeSet::new(), RepairFlag::Repair)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::RepairUnsupported));

    // Nothing was sent; the connection is still in lockstep.
    assert!(store.is_valid_path(&store_path(PATH_A)).await.unwrap());
    daemon.await.unwrap();
}

#[tokio::test]
async fn add_text_to_store_round_trip() {
    let request = [
        wire_int(WorkerOp::AddTextToStore as u64),
        wire_bytes(b"note"),
        wire_bytes(b"hello world"),
        wire_path_set(&[PATH_B]),
    ]
    .concat();

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(request),
        Step::Send([wire_int(STDERR_LAST), wire_path(PATH_A)].concat()),
    ])
    .await;

    let path = store
        .add_text_to_store(
            "note",
            b"hello world",
            &BTreeSet::from([store_path(PATH_B)]),
            RepairFlag::DontRepair,
        )
        .await
        .unwrap();
    assert_eq!(path, store_path(PATH_A));
    daemon.await.unwrap();
}

#[tokio::test]
async fn add_signatures_and_temp_root() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(
            [
                wire_int(WorkerOp::AddSignatures as u64),
                wire_path(PATH_A),
                wire_int(1),
                wire_bytes(b"key-1:c2ln"),
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
        Step::Expect([wire_int(WorkerOp::AddTempRoot as u64), wire_path(PATH_A)].concat()),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
    ])
    .await;

    store
        .add_signatures(&store_path(PATH_A), &[b"key-1:c2ln".to_vec()])
        .await
        .unwrap();
    store.add_temp_root(&store_path(PATH_A)).await.unwrap();
    daemon.await.unwrap();
}

#[tokio::test]
async fn collect_garbage_round_trip() {
    use crate::protocol::types::GcOptions;

    let request = [
        wire_int(WorkerOp::CollectGarbage as u64),
        wire_int(3), // DeleteSpecific
        wire_path_set(&[PATH_A]),
        wire_int(0), // ignore_liveness
        wire_int(0), // max_freed
        wire_int(0), // removed fields
        wire_int(0),
        wire_int(0),
    ]
    .concat();

    let reply = [
        wire_int(STDERR_LAST),
        wire_int(1),
        wire_bytes(b"/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-x"),
        wire_int(4096), // bytes freed
        wire_int(0),    // removed field
    ]
    .concat();

    let (mut store, daemon) =
        scripted_store(vec![Step::Expect(request), Step::Send(reply)]).await;

    let options = GcOptions::delete_specific(BTreeSet::from([store_path(PATH_A)]));
    let result = store.collect_garbage(&options).await.unwrap();
    assert_eq!(result.bytes_freed, 4096);
    assert_eq!(
        result.paths,
        vec![b"/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-x".to_vec()]
    );
    daemon.await.unwrap();
}

#[tokio::test]
async fn maintenance_ops_consume_status() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(wire_int(WorkerOp::SyncWithGC as u64)),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
        Step::Expect(wire_int(WorkerOp::OptimiseStore as u64)),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
        Step::Expect(
            [
                wire_int(WorkerOp::VerifyStore as u64),
                wire_int(1), // check contents
                wire_int(0), // no repair
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_int(0)].concat()),
    ])
    .await;

    store.sync_with_gc().await.unwrap();
    store.optimise_store().await.unwrap();
    let errors_found = store
        .verify_store(CheckFlag::Check, RepairFlag::DontRepair)
        .await
        .unwrap();
    assert!(!errors_found);
    daemon.await.unwrap();
}

// Building

#[tokio::test]
async fn build_derivation_sends_canonical_encoding() {
    let drv = BasicDerivation {
        outputs: BTreeMap::from([(
            b"out".to_vec(),
            DerivationOutput {
                path: store_path(PATH_A),
                hash_algo: None,
                hash: None,
            },
        )]),
        input_derivations: BTreeMap::from([(
            store_path(PATH_B),
            BTreeSet::from([b"out".to_vec()]),
        )]),
        input_sources: BTreeSet::new(),
        platform: b"x86_64-linux".to_vec(),
        builder: b"/bin/sh".to_vec(),
        args: vec![b"-c".to_vec(), b"exit 0".to_vec()],
        env: BTreeMap::from([(b"PATH".to_vec(), b"/no-path".to_vec())]),
    };

    let request = [
        wire_int(WorkerOp::BuildDerivation as u64),
        wire_path(PATH_B),
        // outputs
        wire_int(1),
        wire_bytes(b"out"),
        wire_path(PATH_A),
        wire_bytes(b""),
        wire_bytes(b""),
        // input derivations
        wire_int(1),
        wire_path(PATH_B),
        wire_int(1),
        wire_bytes(b"out"),
        // input sources
        wire_int(0),
        wire_bytes(b"x86_64-linux"),
        wire_bytes(b"/bin/sh"),
        wire_int(2),
        wire_bytes(b"-c"),
        wire_bytes(b"exit 0"),
        wire_int(1),
        wire_bytes(b"PATH"),
        wire_bytes(b"/no-path"),
        // build mode and the required trailing word
        wire_int(2),
        wire_int(0),
    ]
    .concat();

    let reply = [
        wire_int(STDERR_LAST),
        wire_int(0),           // Built
        wire_bytes(b""),       // no error message
        wire_int(1),           // times built
        wire_int(0),           // deterministic
        wire_int(1_700_000_000),
        wire_int(1_700_000_060),
    ]
    .concat();

    let (mut store, daemon) =
        scripted_store(vec![Step::Expect(request), Step::Send(reply)]).await;

    let result = store
        .build_derivation(&store_path(PATH_B), &drv, BuildMode::Check)
        .await
        .unwrap();
    assert_eq!(result.status, BuildStatus::Built);
    assert!(result.status.is_success());
    assert_eq!(result.error_msg, None);
    assert_eq!(result.times_built, 1);
    assert!(!result.is_non_deterministic);
    assert_eq!(result.stop_time - result.start_time, 60);
    daemon.await.unwrap();
}

#[tokio::test]
async fn build_paths_sends_mode() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect(
            [
                wire_int(WorkerOp::BuildPaths as u64),
                wire_path_set(&[PATH_A]),
                wire_int(0),
            ]
            .concat(),
        ),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
    ])
    .await;

    store
        .build_paths(&BTreeSet::from([store_path(PATH_A)]), BuildMode::Normal)
        .await
        .unwrap();
    daemon.await.unwrap();
}

// Log phase and error propagation

#[tokio::test]
async fn daemon_error_is_recoverable() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send(
            [
                wire_int(STDERR_ERROR),
                wire_bytes(b"no such path"),
                wire_int(1),
            ]
            .concat(),
        ),
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()),
    ])
    .await;

    let err = store.is_valid_path(&store_path(PATH_A)).await.unwrap_err();
    match err {
        RemoteStoreError::DaemonError {
            message,
            exit_status,
        } => {
            assert_eq!(message, "no such path");
            assert_eq!(exit_status, Some(1));
        }
        other => panic!("expected DaemonError, got {other:?}"),
    }

    // Same connection, next operation succeeds.
    assert!(store.is_valid_path(&store_path(PATH_A)).await.unwrap());
    daemon.await.unwrap();
}

#[tokio::test]
async fn log_events_reach_the_sink() {
    const STDERR_START_ACTIVITY: u64 = 0x53545254;
    const STDERR_STOP_ACTIVITY: u64 = 0x53544f50;

    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send(
            [
                wire_int(STDERR_NEXT),
                wire_bytes(b"building..."),
                wire_int(STDERR_START_ACTIVITY),
                wire_int(42),                 // activity id
                wire_int(5),                  // level
                wire_int(105),                // activity type
                wire_bytes(b"copying path"),  // text
                wire_int(2),                  // two fields
                wire_int(0),                  // int field
                wire_int(7),
                wire_int(1), // text field
                wire_bytes(b"detail"),
                wire_int(0), // parent
                wire_int(STDERR_STOP_ACTIVITY),
                wire_int(42),
                wire_int(STDERR_NEXT),
                wire_bytes(b"done"),
                wire_int(STDERR_LAST),
                wire_int(1),
            ]
            .concat(),
        ),
    ])
    .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    store.set_log_sink(Box::new(move |event| {
        sink_events.lock().unwrap().push(event);
    }));

    assert!(store.is_valid_path(&store_path(PATH_A)).await.unwrap());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], LogEvent::Line(b"building...".to_vec()));
    match &events[1] {
        LogEvent::StartActivity {
            id, text, fields, ..
        } => {
            assert_eq!(*id, 42);
            assert_eq!(text, b"copying path");
            assert_eq!(
                fields,
                &vec![
                    crate::protocol::ActivityField::Int(7),
                    crate::protocol::ActivityField::Text(b"detail".to_vec()),
                ]
            );
        }
        other => panic!("expected StartActivity, got {other:?}"),
    }
    assert_eq!(events[2], LogEvent::StopActivity { id: 42 });
    assert_eq!(events[3], LogEvent::Line(b"done".to_vec()));
    daemon.await.unwrap();
}

#[tokio::test]
async fn unknown_frame_tag_poisons_connection() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Send(wire_int(0xdeadbeef)),
    ])
    .await;

    let err = store.is_valid_path(&store_path(PATH_A)).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::Decode { .. }));

    // Every further operation fails without touching the wire.
    let err = store.is_valid_path(&store_path(PATH_A)).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::ConnectionPoisoned));
    daemon.await.unwrap();
}

#[tokio::test]
async fn eof_mid_frame_disconnects_and_poisons() {
    let (mut store, daemon) = scripted_store(vec![
        Step::Expect([wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat()),
        Step::Hangup,
    ])
    .await;

    let err = store.is_valid_path(&store_path(PATH_A)).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::Disconnected { .. }));

    let err = store.is_valid_path(&store_path(PATH_A)).await.unwrap_err();
    assert!(matches!(err, RemoteStoreError::ConnectionPoisoned));
    daemon.await.unwrap();
}

// Codec properties

const TEST_VERSION: ProtocolVersion = ProtocolVersion { major: 1, minor: 21 };

async fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value
        .serialize(&mut buf, TEST_VERSION, &StoreDir::default())
        .await
        .unwrap();
    buf
}

async fn decode<T: Deserialize>(bytes: &[u8]) -> T {
    let mut cursor = Cursor::new(bytes.to_vec());
    T::deserialize(&mut cursor, TEST_VERSION, &StoreDir::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn primitive_round_trips() {
    assert_eq!(decode::<u64>(&encode(&42u64).await).await, 42);
    assert_eq!(decode::<bool>(&encode(&true).await).await, true);
    assert_eq!(
        decode::<String>(&encode("hello world").await).await,
        "hello world"
    );

    let list = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
    assert_eq!(decode::<Vec<Vec<u8>>>(&encode(&list).await).await, list);
}

#[tokio::test]
async fn byte_string_length_is_padded() {
    // 8 bytes length prefix, then data padded to the next multiple of 8.
    for (len, expected) in [(0usize, 8usize), (1, 16), (7, 16), (8, 16), (9, 24)] {
        let data = vec![b'a'; len];
        assert_eq!(encode(data.as_slice()).await.len(), expected, "len {len}");
    }
}

#[tokio::test]
async fn store_path_encoding_is_absolute() {
    let path = store_path(PATH_A);
    let encoded = encode(&path).await;
    assert_eq!(encoded, wire_path(PATH_A));
    assert_eq!(decode::<StorePath>(&encoded).await, path);

    // The empty string stands for an absent path.
    assert_eq!(decode::<Option<StorePath>>(&wire_bytes(b"")).await, None);
    assert_eq!(
        decode::<Option<StorePath>>(&wire_path(PATH_A)).await,
        Some(path)
    );
}

#[tokio::test]
async fn path_sets_encode_sorted() {
    // Insertion order must not matter.
    let mut first = BTreeSet::new();
    first.insert(store_path(PATH_B));
    first.insert(store_path(PATH_A));
    let mut second = BTreeSet::new();
    second.insert(store_path(PATH_A));
    second.insert(store_path(PATH_B));

    assert_eq!(encode(&first).await, encode(&second).await);
    assert_eq!(encode(&first).await, wire_path_set(&[PATH_B, PATH_A]));
}

#[tokio::test]
async fn derivation_encoding_is_deterministic() {
    let drv = BasicDerivation {
        outputs: BTreeMap::from([(
            b"out".to_vec(),
            DerivationOutput {
                path: store_path(PATH_A),
                hash_algo: Some(HashAlgo::Sha256),
                hash: Some(b"00".to_vec()),
            },
        )]),
        input_derivations: BTreeMap::new(),
        input_sources: BTreeSet::from([store_path(PATH_B)]),
        platform: b"x86_64-linux".to_vec(),
        builder: b"/bin/sh".to_vec(),
        args: vec![b"-c".to_vec()],
        env: BTreeMap::from([(b"out".to_vec(), b"/nix/store".to_vec())]),
    };

    assert_eq!(encode(&drv).await, encode(&drv.clone()).await);
}

// Unix socket transport

#[tokio::test]
async fn connect_over_unix_socket() {
    use tokio::net::UnixListener;

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("daemon.socket");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let daemon = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut steps = handshake_steps(0x115);
        steps.push(Step::Expect(
            [wire_int(WorkerOp::IsValidPath as u64), wire_path(PATH_A)].concat(),
        ));
        steps.push(Step::Send([wire_int(STDERR_LAST), wire_int(1)].concat()));
        for step in steps {
            match step {
                Step::Expect(expected) => {
                    let mut buf = vec![0u8; expected.len()];
                    stream.read_exact(&mut buf).await.unwrap();
                    assert_eq!(buf, expected);
                }
                Step::Send(bytes) => stream.write_all(&bytes).await.unwrap(),
                Step::Hangup => return,
            }
        }
    });

    let mut store = crate::client::UnixDaemonStore::connect(&socket_path, StoreDir::default())
        .await
        .unwrap();
    assert!(store.is_valid_path(&store_path(PATH_A)).await.unwrap());
    daemon.await.unwrap();
}
