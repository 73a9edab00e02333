//! `TcpClient`：单连接对等体，生命周期语义与服务端一致。

use std::sync::Arc;
use std::time::Duration;

use ripple_core::codec::Codec;
use ripple_core::error::{CoreError, codes};
use ripple_core::peer::{PeerState, ShutdownOutcome};
use tokio::net::TcpStream;

use crate::channel::TcpChannel;
use crate::driver::PeerDriver;
use crate::error::map_io_error;
use crate::handler::{self, ConnectionHandler};
use crate::options::ClientOptions;

/// TCP 客户端对等体：建立一条出站连接并交给处理器。
///
/// `start` 仅在建连成功后返回 `Ok`；失败（含可选的建连超时）以
/// `transport.connect` 一次性上报并直达 `STOPPED`。`shutdown` 与服务端
/// 同样幂等、带宽限期。
pub struct TcpClient<C: Codec> {
    codec: Arc<C>,
    options: ClientOptions,
    driver: Arc<PeerDriver>,
}

impl<C: Codec> TcpClient<C> {
    /// 以编解码器与配置构造（尚未建连）。
    pub fn new(codec: C, options: ClientOptions) -> Self {
        let driver = Arc::new(PeerDriver::new(options.grace()));
        Self {
            codec: Arc::new(codec),
            options,
            driver,
        }
    }

    /// 建立连接并启动处理器。重复调用返回 `peer.state`。
    pub async fn start<H>(&self, handler: H) -> ripple_core::Result<(), CoreError>
    where
        H: ConnectionHandler<C>,
    {
        self.driver.begin_start()?;
        let stream = match self.establish().await {
            Ok(stream) => stream,
            Err(err) => {
                self.driver.fail_start();
                return Err(err);
            }
        };
        let channel =
            match TcpChannel::new(stream, Arc::clone(&self.codec), self.options.cancel_policy()) {
                Ok(channel) => channel,
                Err(err) => {
                    self.driver.fail_start();
                    return Err(err);
                }
            };
        self.driver.complete_start()?;
        tracing::info!(peer = %channel.remote_addr(), "tcp client connected");
        self.driver
            .track(handler::invoke_guarded(channel, Arc::new(handler)))
            .await;
        Ok(())
    }

    async fn establish(&self) -> ripple_core::Result<TcpStream, CoreError> {
        let connect = TcpStream::connect(self.options.target());
        let stream = match self.options.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                CoreError::new(codes::TRANSPORT_CONNECT, "connection attempt timed out")
            })?,
            None => connect.await,
        }
        .map_err(|err| map_io_error(codes::TRANSPORT_CONNECT, err))?;

        if self.options.no_delay() {
            stream
                .set_nodelay(true)
                .map_err(|err| map_io_error(codes::TRANSPORT_CONNECT, err))?;
        }
        if let Some(hook) = self.options.pipeline_hook() {
            hook(&stream);
        }
        Ok(stream)
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
