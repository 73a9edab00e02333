//! `TcpServer`：接受循环与对等体生命周期的组装。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ripple_core::codec::Codec;
use ripple_core::error::{CoreError, codes};
use ripple_core::peer::{PeerState, ShutdownOutcome};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::channel::TcpChannel;
use crate::driver::{self, PeerDriver};
use crate::error::map_io_error;
use crate::handler::{self, ConnectionHandler};
use crate::options::ServerOptions;

/// TCP 服务端对等体。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“接受连接”与“处理连接”解耦：处理器只面对类型化的
///   [`TcpChannel`]，生命周期与连接追踪由 [`PeerDriver`] 承担。
///
/// ## 契约 (What)
/// - `start` 仅在监听套接字绑定成功后返回 `Ok`，且整个生命周期内最多
///   成功一次；绑定失败以 `transport.bind` 一次性上报并直达 `STOPPED`；
/// - `shutdown` 幂等：首次调用执行“停止接受 → 宽限排空 → 必要时强制
///   关闭”，并发/后续调用观察同一 [`ShutdownOutcome`]；
/// - 单条连接上处理器的错误或恐慌只关闭该连接。
pub struct TcpServer<C: Codec> {
    codec: Arc<C>,
    options: ServerOptions,
    driver: Arc<PeerDriver>,
}

impl<C: Codec> TcpServer<C> {
    /// 以编解码器与配置构造（尚未绑定）。
    pub fn new(codec: C, options: ServerOptions) -> Self {
        let driver = Arc::new(PeerDriver::new(options.grace()));
        Self {
            codec: Arc::new(codec),
            options,
            driver,
        }
    }

    /// 绑定监听地址并启动接受循环。
    ///
    /// 返回 `Ok` 时服务器处于 `STARTED`，实际端口可经
    /// [`TcpServer::listen_addr`] 查询。重复调用返回 `peer.state`。
    pub async fn start<H>(&self, handler: H) -> ripple_core::Result<(), CoreError>
    where
        H: ConnectionHandler<C>,
    {
        self.driver.begin_start()?;
        let listener = match driver::bind_listener(&self.options) {
            Ok(listener) => listener,
            Err(err) => {
                self.driver.fail_start();
                return Err(err);
            }
        };
        let local = match listener.local_addr() {
            Ok(addr) => addr,
            Err(err) => {
                self.driver.fail_start();
                return Err(map_io_error(codes::TRANSPORT_BIND, err));
            }
        };
        self.driver.record_listen_addr(local);
        let shutdown = self.driver.shutdown_signal();
        self.driver.complete_start()?;
        tracing::info!(%local, "tcp server started");

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.driver),
            Arc::clone(&self.codec),
            self.options.clone(),
            Arc::new(handler),
            shutdown,
        ));
        self.driver.install_accept_task(accept);
        Ok(())
    }

    /// 实际监听地址；启动成功前为 `None`。
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.driver.listen_addr()
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> PeerState {
        self.driver.state()
    }

    /// 优雅关闭。幂等，见 [`PeerDriver::shutdown`]。
    pub async fn shutdown(&self) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        self.driver.shutdown().await
    }

    /// 有界等待的优雅关闭。
    pub async fn shutdown_within(
        &self,
        limit: Duration,
    ) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        self.driver.shutdown_within(limit).await
    }
}

async fn accept_loop<C, H>(
    listener: TcpListener,
    driver: Arc<PeerDriver>,
    codec: Arc<C>,
    options: ServerOptions,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: Codec,
    H: ConnectionHandler<C>,
{
    loop {
        // 信号可能在循环启动前已置位。
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = configure_accepted(&stream, &options) {
                        tracing::warn!(%peer, error = %err, "failed to configure accepted connection");
                    }
                    let channel = match TcpChannel::new(
                        stream,
                        Arc::clone(&codec),
                        options.cancel_policy(),
                    ) {
                        Ok(channel) => channel,
                        Err(err) => {
                            tracing::warn!(%peer, code = err.code(), "dropping connection: {err}");
                            continue;
                        }
                    };
                    tracing::debug!(%peer, "connection accepted");
                    driver
                        .track(handler::invoke_guarded(channel, Arc::clone(&handler)))
                        .await;
                }
                Err(err) => {
                    // 单次接受失败不终止服务器，记录后继续。
                    tracing::warn!(code = codes::TRANSPORT_ACCEPT, error = %err, "accept failed");
                }
            },
        }
    }
    tracing::debug!("accept loop stopped");
}

fn configure_accepted(stream: &TcpStream, options: &ServerOptions) -> std::io::Result<()> {
    if options.no_delay() {
        stream.set_nodelay(true)?;
    }
    if let Some(hook) = options.pipeline_hook() {
        hook(stream);
    }
    Ok(())
}
