//! 对等体生命周期：启动一次性、绑定失败、关闭幂等与宽限强制。

use std::time::Duration;

use ripple_codecs::LineCodec;
use ripple_core::channel::{Subscriber, Subscription};
use ripple_core::error::{CoreError, codes};
use ripple_core::peer::{PeerState, ShutdownOutcome};
use ripple_transport_tcp::{ClientOptions, ServerOptions, TcpChannel, TcpClient, TcpServer};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

fn options_on_loopback() -> ServerOptions {
    init_tracing();
    ServerOptions::listen("127.0.0.1:0".parse().unwrap())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn idle(_channel: TcpChannel<LineCodec>) -> ripple_core::Result<(), ripple_core::error::CoreError> {
    Ok(())
}

#[tokio::test]
async fn start_succeeds_at_most_once() {
    let server = TcpServer::new(LineCodec::new(), options_on_loopback());
    server.start(idle).await.unwrap();
    assert_eq!(server.state(), PeerState::Started);
    assert!(server.listen_addr().is_some());

    let err = server.start(idle).await.unwrap_err();
    assert_eq!(err.code(), codes::PEER_STATE);
    assert_eq!(server.state(), PeerState::Started);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn bind_conflict_is_reported_once() {
    let first = TcpServer::new(LineCodec::new(), options_on_loopback());
    first.start(idle).await.unwrap();
    let taken = first.listen_addr().unwrap();

    let second = TcpServer::new(LineCodec::new(), ServerOptions::listen(taken));
    let err = second.start(idle).await.unwrap_err();
    assert_eq!(err.code(), codes::TRANSPORT_BIND);
    assert_eq!(second.state(), PeerState::Stopped);

    first.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent_and_converges() {
    let server = TcpServer::new(LineCodec::new(), options_on_loopback());
    server.start(idle).await.unwrap();

    let (a, b) = tokio::join!(server.shutdown(), server.shutdown());
    assert_eq!(a.unwrap(), ShutdownOutcome::Clean);
    assert_eq!(b.unwrap(), ShutdownOutcome::Clean);
    assert_eq!(server.state(), PeerState::Stopped);

    // 后续调用观察同一结果。
    assert_eq!(server.shutdown().await.unwrap(), ShutdownOutcome::Clean);
}

#[tokio::test]
async fn shutdown_before_start_reaches_terminal_state() {
    let server = TcpServer::new(LineCodec::new(), options_on_loopback());
    assert_eq!(server.shutdown().await.unwrap(), ShutdownOutcome::Clean);
    assert_eq!(server.state(), PeerState::Stopped);

    let err = server.start(idle).await.unwrap_err();
    assert_eq!(err.code(), codes::PEER_STATE);
}

#[tokio::test]
async fn grace_exceeded_forces_remaining_connections() {
    let options = options_on_loopback().with_grace(Duration::from_millis(100));
    let server = TcpServer::new(LineCodec::new(), options);
    server
        .start(|_channel: TcpChannel<LineCodec>| async move {
            std::future::pending::<()>().await;
            Ok::<(), ripple_core::error::CoreError>(())
        })
        .await
        .unwrap();

    let addr = server.listen_addr().unwrap();
    let _conn = TcpStream::connect(addr).await.unwrap();
    // 让接受循环拾取连接并进入处理器。
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.shutdown().await.unwrap(), ShutdownOutcome::Forced);
    assert_eq!(server.state(), PeerState::Stopped);
}

struct Discard;

impl Subscriber<String> for Discard {
    fn on_item(&mut self, _item: String) {}
    fn on_error(&mut self, _err: CoreError) {}
    fn on_complete(&mut self) {}
}

#[tokio::test]
async fn forced_shutdown_closes_lingering_sockets() {
    let options = options_on_loopback().with_grace(Duration::from_millis(100));
    let server = TcpServer::new(LineCodec::new(), options);
    server
        .start(|channel: TcpChannel<LineCodec>| async move {
            // 订阅后滞留：强制关闭必须回收套接字，而非仅中止处理器任务。
            let sub = channel.receive(Discard)?;
            sub.request(1);
            std::future::pending::<()>().await;
            Ok::<(), CoreError>(())
        })
        .await
        .unwrap();

    let addr = server.listen_addr().unwrap();
    let mut conn = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.shutdown().await.unwrap(), ShutdownOutcome::Forced);
    assert_eq!(server.state(), PeerState::Stopped);

    // 终态达成后对端须立即观察到 EOF：连接不得在 STOPPED 之后存活。
    let mut scratch = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), conn.read(&mut scratch))
        .await
        .expect("socket must close once shutdown completes")
        .unwrap();
    assert_eq!(n, 0, "expected EOF on the client side");
}

#[tokio::test]
async fn client_connect_failure_is_terminal() {
    // 取一个刚释放的端口，建连应被拒绝。
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let vacant = probe.local_addr().unwrap();
    drop(probe);

    let client = TcpClient::new(
        LineCodec::new(),
        ClientOptions::connect(vacant).with_connect_timeout(Duration::from_secs(2)),
    );
    let err = client.start(idle).await.unwrap_err();
    assert_eq!(err.code(), codes::TRANSPORT_CONNECT);
    assert_eq!(client.state(), PeerState::Stopped);
}

#[tokio::test]
async fn client_lifecycle_mirrors_server() {
    let server = TcpServer::new(LineCodec::new(), options_on_loopback());
    server.start(idle).await.unwrap();
    let addr = server.listen_addr().unwrap();

    let client = TcpClient::new(LineCodec::new(), ClientOptions::connect(addr));
    client.start(idle).await.unwrap();
    assert_eq!(client.state(), PeerState::Started);

    let err = client.start(idle).await.unwrap_err();
    assert_eq!(err.code(), codes::PEER_STATE);

    assert_eq!(client.shutdown().await.unwrap(), ShutdownOutcome::Clean);
    assert_eq!(client.shutdown().await.unwrap(), ShutdownOutcome::Clean);
    server.shutdown().await.unwrap();
}
