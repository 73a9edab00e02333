//! 连接处理器契约：每条连接一次调用，返回即释放连接。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use ripple_core::codec::Codec;
use ripple_core::error::CoreError;

use crate::channel::TcpChannel;
use crate::io;

/// 每条已建立连接的业务入口。
///
/// `handle` 的存续期即连接的受管期：返回（或出错、恐慌）后连接被关闭
/// 并脱离生命周期追踪，因此处理器应在内部等待自己关心的收发全部完成。
#[async_trait]
pub trait ConnectionHandler<C: Codec>: Send + Sync + 'static {
    /// 处理一条连接。返回错误会记录日志并关闭连接，不影响其他连接。
    async fn handle(&self, channel: TcpChannel<C>) -> ripple_core::Result<(), CoreError>;
}

#[async_trait]
impl<C, F, Fut> ConnectionHandler<C> for F
where
    C: Codec,
    F: Fn(TcpChannel<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ripple_core::Result<(), CoreError>> + Send + 'static,
{
    async fn handle(&self, channel: TcpChannel<C>) -> ripple_core::Result<(), CoreError> {
        (self)(channel).await
    }
}

/// 在恐慌隔离下运行处理器：单条连接的失败绝不波及对等体本身。
///
/// 连接的回收由 [`io::ShutdownGuard`] 承担：正常返回、出错、恐慌与
/// 宽限期后的任务中止都经由守卫析构关闭套接字。
pub(crate) async fn invoke_guarded<C, H>(channel: TcpChannel<C>, handler: Arc<H>)
where
    C: Codec,
    H: ConnectionHandler<C>,
{
    let peer = channel.remote_addr();
    let _guard = io::ShutdownGuard::new(channel.shared_stream());
    let outcome = AssertUnwindSafe(handler.handle(channel))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => tracing::trace!(%peer, "connection handler completed"),
        Ok(Err(err)) => {
            tracing::warn!(%peer, code = err.code(), "connection handler failed: {err}");
        }
        Err(_) => {
            tracing::error!(%peer, "connection handler panicked, closing connection");
        }
    }
}
