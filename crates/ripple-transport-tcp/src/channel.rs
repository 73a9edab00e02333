//! `TcpChannel`：把一条 TCP 连接桥接为需求驱动的类型化通道。

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
use ripple_core::channel::{CancelPolicy, Subscriber, Subscription};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::map_io_error;
use crate::demand::DemandGate;
use crate::io;

struct ChannelInner<C: Codec> {
    codec: Arc<C>,
    stream: Arc<TcpStream>,
    /// `send` 调用间的串行化锁：单次调用内的写出原子成段，互不交错。
    write_serial: AsyncMutex<()>,
    subscribed: AtomicBool,
    cancel_policy: CancelPolicy,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    /// 连接建立前已被上层读走的残余字节（协议头探测场景），首次订阅时注入。
    seed: std::sync::Mutex<Option<BytesMut>>,
}

/// TCP 通道：入站为单订阅者需求驱动流，出站为可串行化的写入汇。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把事件驱动的连接（读就绪、写就绪、关闭）翻译为显式需求协议，
///   使消费者以 `request(n)`/`cancel()` 精确控制流速；
/// - 编解码器与通道解耦：任何 [`Codec`] 实现都能把原始字节通道类型化。
///
/// ## 逻辑 (How)
/// - `receive` 启动一个读取泵任务：先排空缓冲内可解码的条目（逐条受
///   需求门控），需求耗尽时**不发起下一次套接字读取**；
/// - `send` 在异步互斥锁内逐条编码并写出，`WouldBlock` 由
///   [`io::write_all`] 转化为写就绪等待（出站背压）；
/// - 逐连接解码状态（[`Codec::State`] 与残余缓冲）由泵任务独占，
///   连接关闭即销毁，绝不跨连接共享。
///
/// ## 契约 (What)
/// - **单订阅者**：第二次 `receive`（首个仍活跃时）返回
///   `channel.already_subscribed`，首个订阅者不受影响；入站流不可重启；
/// - **投递上限**：`on_item` 调用次数不超过累计需求量；
/// - **终止语义**：解码/编码错误终止对应方向并关闭连接；对端正常关闭
///   触发 `on_complete`；
/// - `delegate()` 返回底层 `TcpStream` 引用，框架不解释其用途。
///
/// ## 注意事项 (Trade-offs)
/// - 取消是协作式的：投递在下一次需求检查点停止；
/// - EOF 时缓冲内的半帧被丢弃——不完整的尾帧无从解码，记录 trace 即可。
pub struct TcpChannel<C: Codec> {
    inner: Arc<ChannelInner<C>>,
}

impl<C: Codec> Clone for TcpChannel<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Codec> TcpChannel<C> {
    /// 包装一条已建立的连接。
    pub fn new(
        stream: TcpStream,
        codec: Arc<C>,
        cancel_policy: CancelPolicy,
    ) -> ripple_core::Result<Self, CoreError> {
        Self::from_shared(Arc::new(stream), codec, cancel_policy, BytesMut::new())
    }

    /// 以共享句柄与预读残余字节构造通道。
    ///
    /// 上层协议服务器（如 HTTP 路由层）在分类连接时可能已经读走了若干
    /// 字节，`seed` 将在首次订阅时先于任何套接字读取被解码。
    pub fn from_shared(
        stream: Arc<TcpStream>,
        codec: Arc<C>,
        cancel_policy: CancelPolicy,
        seed: BytesMut,
    ) -> ripple_core::Result<Self, CoreError> {
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(codes::TRANSPORT_READ, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(codes::TRANSPORT_READ, err))?;
        Ok(Self {
            inner: Arc::new(ChannelInner {
                codec,
                stream,
                write_serial: AsyncMutex::new(()),
                subscribed: AtomicBool::new(false),
                cancel_policy,
                local_addr,
                peer_addr,
                seed: std::sync::Mutex::new(Some(seed)),
            }),
        })
    }

    /// 安装唯一的入站订阅者并返回订阅句柄。
    ///
    /// 订阅者需通过 [`Subscription::request`] 表达需求后才会收到条目。
    pub fn receive<S>(&self, subscriber: S) -> ripple_core::Result<ChannelSubscription, CoreError>
    where
        S: Subscriber<C::Incoming>,
    {
        if self.inner.subscribed.swap(true, Ordering::AcqRel) {
            return Err(CoreError::new(
                codes::CHANNEL_ALREADY_SUBSCRIBED,
                "inbound stream already has an active subscriber",
            ));
        }

        let gate = Arc::new(DemandGate::new());
        let seed = match self.inner.seed.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
        .unwrap_or_default();

        tokio::spawn(pump(
            Arc::clone(&self.inner.codec),
            Arc::clone(&self.inner.stream),
            Arc::clone(&gate),
            Box::new(subscriber),
            seed,
        ));

        Ok(ChannelSubscription {
            gate,
            stream: Arc::clone(&self.inner.stream),
            policy: self.inner.cancel_policy,
        })
    }

    /// 排空一个出站条目源；源完成或出错时冲刷已排队的写出。
    ///
    /// 顺序调用在前一次完成后即可发起；并发调用经由内部互斥锁串行化，
    /// 单次调用内的输出绝不与他次交错。编码失败（`codec.encode`）放弃
    /// 本次写出并关闭连接。
    pub async fn send<S>(&self, source: S) -> ripple_core::Result<(), CoreError>
    where
        S: Stream<Item = C::Outgoing> + Send,
    {
        let mut source = std::pin::pin!(source);
        let _serial = self.inner.write_serial.lock().await;
        let mut scratch = BytesMut::new();

        while let Some(item) = source.next().await {
            if let Err(err) = self.inner.codec.encode(&item, &mut scratch) {
                self.close();
                return Err(err);
            }
            if let Err(err) = io::write_all(&self.inner.stream, &mut scratch).await {
                self.close();
                return Err(map_io_error(codes::TRANSPORT_WRITE, err));
            }
        }
        // try_write 直达内核缓冲：源完成时 scratch 已排空，无滞留写出。
        Ok(())
    }

    /// 底层传输句柄，供非响应式的高级配置使用。
    pub fn delegate(&self) -> &TcpStream {
        &self.inner.stream
    }

    /// 共享的套接字句柄，供生命周期守卫持有。
    pub(crate) fn shared_stream(&self) -> Arc<TcpStream> {
        Arc::clone(&self.inner.stream)
    }

    /// 连接的本端地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// 连接的对端地址。
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// 双向关闭连接。幂等。
    pub fn close(&self) {
        io::shutdown_both(&self.inner.stream);
    }
}

/// [`TcpChannel::receive`] 返回的订阅句柄。
pub struct ChannelSubscription {
    gate: Arc<DemandGate>,
    stream: Arc<TcpStream>,
    policy: CancelPolicy,
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscription").finish_non_exhaustive()
    }
}

impl Subscription for ChannelSubscription {
    fn request(&self, n: u64) {
        self.gate.request(n);
    }

    fn cancel(&self) {
        self.gate.cancel();
        if self.policy == CancelPolicy::CloseConnection {
            io::shutdown_both(&self.stream);
        }
    }
}

/// 读取泵：单任务串行驱动“解码 → 门控 → 投递 → 读取”。
async fn pump<C: Codec>(
    codec: Arc<C>,
    stream: Arc<TcpStream>,
    gate: Arc<DemandGate>,
    mut subscriber: Box<dyn Subscriber<C::Incoming>>,
    mut buf: BytesMut,
) {
    let mut state = codec.open_state();
    loop {
        // 先排空缓冲内已可解码的条目：一次读取可能补齐多帧。
        loop {
            match codec.decode(&mut state, &mut buf) {
                Ok(DecodeOutcome::Complete(item)) => {
                    if !gate.wait_positive().await {
                        tracing::trace!("inbound subscription cancelled, pump exits");
                        return;
                    }
                    gate.consume_one();
                    subscriber.on_item(item);
                }
                Ok(DecodeOutcome::Incomplete) => break,
                Err(err) => {
                    tracing::debug!(code = err.code(), "decode failed, closing connection");
                    subscriber.on_error(err);
                    io::shutdown_both(&stream);
                    return;
                }
            }
        }

        // 需求耗尽时暂停读取：这是入站背压的落点。
        if !gate.wait_positive().await {
            tracing::trace!("inbound subscription cancelled, pump exits");
            return;
        }

        match io::read_chunk(&stream, &mut buf).await {
            Ok(0) => {
                if !buf.is_empty() {
                    tracing::trace!(residual = buf.len(), "eof with undecodable trailing bytes");
                }
                subscriber.on_complete();
                return;
            }
            Ok(_) => {}
            Err(err) => {
                subscriber.on_error(map_io_error(codes::TRANSPORT_READ, err));
                io::shutdown_both(&stream);
                return;
            }
        }
    }
}
