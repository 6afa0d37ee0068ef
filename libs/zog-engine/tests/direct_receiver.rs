mod common;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use common::{log_files, read_log};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use zog_engine::framing::FrameError;
use zog_engine::{
    DirectConfig, DirectSocketTransport, FramingConfig, LogSink, OperationalLogger, Receiver,
    ReceiverError, RedisBus, SocketEmitter, TransportConfig, TransportError,
};

async fn spawn_receiver(dir: &Path, config: DirectConfig) -> (SocketAddr, JoinHandle<ReceiverError>) {
    let mut transport = DirectSocketTransport::new(&config).unwrap();
    let addr = transport.bind().await.unwrap();
    let receiver = Receiver::<RedisBus>::with_transport(
        transport,
        LogSink::new(dir).unwrap(),
        OperationalLogger::new("test"),
    );
    (addr, tokio::spawn(receiver.start()))
}

async fn wait_for_log(dir: &Path, name: &str, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while read_log(dir, name) != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{name}: got {:?}, want {expected:?}",
            read_log(dir, name)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn terminal_error(handle: JoinHandle<ReceiverError>) -> ReceiverError {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("receiver did not stop")
        .unwrap()
}

#[tokio::test]
async fn frames_from_every_peer_land_in_one_topic() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_receiver(dir.path(), DirectConfig::new("127.0.0.1:0")).await;

    let mut first = SocketEmitter::connect(&addr.to_string(), &FramingConfig::default())
        .await
        .unwrap();
    for line in ["a", "b", "c"] {
        first.send(line).await.unwrap();
    }
    first.close().await.unwrap();
    wait_for_log(dir.path(), "zog.log", "a\nb\nc\n").await;

    // A peer that closed between frames is not a fault.
    let mut second = SocketEmitter::connect(&addr.to_string(), &FramingConfig::default())
        .await
        .unwrap();
    second.send("d").await.unwrap();
    wait_for_log(dir.path(), "zog.log", "a\nb\nc\nd\n").await;

    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn empty_frames_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DirectConfig::new("127.0.0.1:0");
    config.topic = "ingest".into();
    let (addr, handle) = spawn_receiver(dir.path(), config).await;

    let mut emitter = SocketEmitter::connect(&addr.to_string(), &FramingConfig::default())
        .await
        .unwrap();
    emitter.send("").await.unwrap();
    emitter.send("x").await.unwrap();
    wait_for_log(dir.path(), "ingest.log", "x\n").await;

    handle.abort();
}

#[tokio::test]
async fn oversized_frame_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DirectConfig::new("127.0.0.1:0");
    config.framing.max_payload = 4;
    let (addr, handle) = spawn_receiver(dir.path(), config).await;

    let mut emitter = SocketEmitter::connect(&addr.to_string(), &FramingConfig::default())
        .await
        .unwrap();
    emitter.send("ok").await.unwrap();
    emitter.send("far too long").await.unwrap();

    let error = terminal_error(handle).await;
    assert!(matches!(
        error,
        ReceiverError::Transport(TransportError::Frame(FrameError::TooLarge { len: 12, max: 4 }))
    ));
    assert_eq!(read_log(dir.path(), "zog.log"), "ok\n");
}

#[tokio::test]
async fn peer_closing_mid_frame_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_receiver(dir.path(), DirectConfig::new("127.0.0.1:0")).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[0, 0, 0, 5, b'a']).await.unwrap();
    raw.shutdown().await.unwrap();

    let error = terminal_error(handle).await;
    assert!(matches!(
        error,
        ReceiverError::Transport(TransportError::Frame(FrameError::Truncated { .. }))
    ));
    assert!(log_files(dir.path()).is_empty());
}

#[tokio::test]
async fn invalid_utf8_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle) = spawn_receiver(dir.path(), DirectConfig::new("127.0.0.1:0")).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[0, 0, 0, 2, 0xff, 0xfe]).await.unwrap();

    let error = terminal_error(handle).await;
    assert!(matches!(
        error,
        ReceiverError::Transport(TransportError::Decode(_))
    ));
}

#[tokio::test]
async fn little_endian_two_byte_framing() {
    let dir = tempfile::tempdir().unwrap();
    let framing: FramingConfig = toml::from_str("length_bytes = 2\nbyte_order = \"le\"").unwrap();
    let mut config = DirectConfig::new("127.0.0.1:0");
    config.framing = framing.clone();
    let (addr, handle) = spawn_receiver(dir.path(), config).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[3, 0, b'h', b'e', b'y']).await.unwrap();
    wait_for_log(dir.path(), "zog.log", "hey\n").await;

    let mut emitter = SocketEmitter::connect(&addr.to_string(), &framing).await.unwrap();
    emitter.send("you").await.unwrap();
    wait_for_log(dir.path(), "zog.log", "hey\nyou\n").await;

    handle.abort();
}

#[tokio::test]
async fn address_in_use_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let config = TransportConfig::Direct(DirectConfig::new(addr.to_string()));
    let receiver = Receiver::new(config, dir.path(), OperationalLogger::new("test")).unwrap();
    let stats = receiver.logger().stats();

    let error = receiver.start().await;

    assert!(matches!(
        error,
        ReceiverError::Transport(TransportError::Bind { .. })
    ));
    assert_eq!(stats.routed(), 0);
}

#[test]
fn scheme_in_configured_addr_is_rejected_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = TransportConfig::Direct(DirectConfig::new("tcp://*:5011"));

    let result = Receiver::<RedisBus>::new(config, dir.path(), OperationalLogger::new("test"));

    assert!(matches!(
        result,
        Err(ReceiverError::Config(zog_engine::ConfigError::Address { .. }))
    ));
}

#[tokio::test]
async fn bind_is_idempotent() {
    let mut transport = DirectSocketTransport::new(&DirectConfig::new("127.0.0.1:0")).unwrap();
    let first = transport.bind().await.unwrap();
    let second = transport.bind().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.local_addr(), Some(first));
}

#[tokio::test]
async fn receive_before_bind_is_an_error() {
    let mut transport = DirectSocketTransport::new(&DirectConfig::new("127.0.0.1:0")).unwrap();
    assert!(matches!(
        transport.receive().await,
        Err(TransportError::NotStarted)
    ));
}
