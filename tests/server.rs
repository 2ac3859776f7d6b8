use respite::connection::ConnectionStats;
use respite::server;
use respite::storage::StorageEngine;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

struct TestServer {
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let storage = Arc::new(StorageEngine::new());
    let stats = Arc::new(ConnectionStats::new());
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(server::run(listener, storage, stats, async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        _shutdown: tx,
    }
}

/// Sends `request` and asserts the server answers with exactly `expected`.
async fn exchange(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
    client.write_all(request).await.unwrap();

    let mut buf = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();

    assert_eq!(
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected),
        "reply to {:?}",
        String::from_utf8_lossy(request)
    );
}

/// Reads until the server closes the connection.
async fn read_to_close(client: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();
    buf
}

#[tokio::test]
async fn test_fixture_session() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    exchange(&mut client, b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n", b"$3\r\nhey\r\n").await;
    exchange(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        b"+OK\r\n",
    )
    .await;
    exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", b"$3\r\nbar\r\n").await;
}

#[tokio::test]
async fn test_get_missing_key() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nxxx\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_set_with_px_expires() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(
        &mut client,
        b"*5\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n$2\r\nPX\r\n$3\r\n100\r\n",
        b"+OK\r\n",
    )
    .await;
    exchange(
        &mut client,
        b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n",
        b"$5\r\nworld\r\n",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$5\r\nhello\r\n", b"$-1\r\n").await;
}

#[tokio::test]
async fn test_overwrite_clears_expiry() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(
        &mut client,
        b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\nv1\r\n$2\r\nPX\r\n$3\r\n100\r\n",
        b"+OK\r\n",
    )
    .await;
    exchange(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\nv2\r\n",
        b"+OK\r\n",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$2\r\nv2\r\n").await;
}

#[tokio::test]
async fn test_command_errors_keep_connection_open() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut client, b"*1\r\n$4\r\nECHO\r\n", b"-ERR Syntax error\r\n").await;
    exchange(
        &mut client,
        b"*1\r\n$3\r\nXXX\r\n",
        b"-ERR Invalid command: \"XXX\"\r\n",
    )
    .await;
    exchange(
        &mut client,
        b"*5\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n$2\r\nPX\r\n$3\r\nabc\r\n",
        b"-ERR Invalid value for \"PX\": Value must be a postive integer\r\n",
    )
    .await;
    exchange(
        &mut client,
        b"*2\r\n$3\r\nGET\r\n$-1\r\n",
        b"-ERR Invalid value for \"key\": Value cannot be null\r\n",
    )
    .await;

    // Still usable.
    exchange(&mut client, b"*1\r\n$4\r\nping\r\n", b"+PONG\r\n").await;
}

#[tokio::test]
async fn test_pipelined_requests() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    exchange(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n\
          *3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n\
          *2\r\n$3\r\nGET\r\n$2\r\nk1\r\n\
          *2\r\n$3\r\nGET\r\n$2\r\nk2\r\n",
        b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    client.write_all(b"*2\r\n$4\r\nEC").await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    exchange(&mut client, b"HO\r\n$3\r\nhey\r\n", b"$3\r\nhey\r\n").await;
}

#[tokio::test]
async fn test_framing_error_closes_connection() {
    let server = start_server().await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    client.write_all(b"*1\r\n$-7\r\n").await.unwrap();
    let reply = read_to_close(&mut client).await;

    assert_eq!(
        reply,
        b"-ERR Protocol error: invalid bulk string length: -7\r\n"
    );
}

#[tokio::test]
async fn test_bad_client_does_not_affect_others() {
    let server = start_server().await;
    let mut good = TcpStream::connect(server.addr).await.unwrap();
    let mut bad = TcpStream::connect(server.addr).await.unwrap();

    exchange(
        &mut good,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        b"+OK\r\n",
    )
    .await;

    bad.write_all(b"hello\r\n").await.unwrap();
    let reply = read_to_close(&mut bad).await;
    assert!(reply.starts_with(b"-ERR Protocol error"));

    exchange(&mut good, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", b"$3\r\nbar\r\n").await;
}

#[tokio::test]
async fn test_clients_share_one_store() {
    let server = start_server().await;
    let mut writer = TcpStream::connect(server.addr).await.unwrap();
    let mut reader = TcpStream::connect(server.addr).await.unwrap();

    exchange(
        &mut writer,
        b"*3\r\n$3\r\nSET\r\n$6\r\nshared\r\n$5\r\nvalue\r\n",
        b"+OK\r\n",
    )
    .await;
    exchange(
        &mut reader,
        b"*2\r\n$3\r\nGET\r\n$6\r\nshared\r\n",
        b"$5\r\nvalue\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_counters_after_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let storage = Arc::new(StorageEngine::new());
    let stats = Arc::new(ConnectionStats::new());
    let (tx, rx) = oneshot::channel::<()>();

    let server = tokio::spawn(server::run(
        listener,
        Arc::clone(&storage),
        Arc::clone(&stats),
        async {
            let _ = rx.await;
        },
    ));

    let mut client = TcpStream::connect(addr).await.unwrap();
    exchange(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        b"+OK\r\n",
    )
    .await;
    exchange(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", b"$3\r\nbar\r\n").await;

    tx.send(()).unwrap();
    server.await.unwrap();

    assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
    assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);

    let store = storage.stats();
    assert_eq!(store.keys, 1);
    assert_eq!(store.set_ops, 1);
    assert_eq!(store.get_ops, 1);
}
