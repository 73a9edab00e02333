//! `PeerDriver`：对等体生命周期的可复用内核。
//!
//! 服务器（TCP 直连与上层协议路由）共享同一套状态迁移、连接任务追踪与
//! 宽限关闭逻辑；驱动器不理解协议，只负责“何时接受、何时收敛”。

use std::net::SocketAddr;
use std::sync::{Mutex as StdMutex, OnceLock};
use std::time::Duration;

use ripple_core::error::{CoreError, codes};
use ripple_core::peer::{PeerState, PeerStateCell, ShutdownOutcome};
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::map_io_error;
use crate::options::ServerOptions;

/// 按配置绑定监听套接字（`SO_REUSEADDR`、backlog 经 socket2 落实）。
///
/// 绑定失败一次性以 `transport.bind` 报告给调用方，核心不做自动重试。
pub fn bind_listener(options: &ServerOptions) -> ripple_core::Result<TcpListener, CoreError> {
    let addr = options.listen_target();
    let bind = |err| map_io_error(codes::TRANSPORT_BIND, err);

    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(bind)?;
    if options.reuse_address() {
        socket.set_reuse_address(true).map_err(bind)?;
    }
    socket.set_nonblocking(true).map_err(bind)?;
    socket.bind(&addr.into()).map_err(bind)?;
    socket.listen(options.backlog() as i32).map_err(bind)?;

    TcpListener::from_std(socket.into()).map_err(bind)
}

/// 生命周期驱动器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - `start()`/`shutdown()` 的状态约束（只成功启动一次、关闭幂等、第二次
///   关闭观察同一结果）在 TCP 服务器、客户端与 HTTP 服务器间完全一致，
///   收敛到一个驱动器避免语义漂移。
///
/// ## 逻辑 (How)
/// - 状态迁移由 [`PeerStateCell`] 的 CAS 保证原子；
/// - 关闭信号经 `watch` 广播给接受循环（广播先于订阅也不丢失）；
/// - 连接任务统一挂入 `JoinSet`：宽限期内等待自然收敛，超时则
///   `abort_all` 强制关闭并记录 `Forced`；
/// - 关闭结果记录在互斥量内，后续调用直接观察已有结果（幂等）。
///
/// ## 契约 (What)
/// - `shutdown()` 仅在所有连接任务终止后完成；
/// - 需要有界等待的调用方使用 [`PeerDriver::shutdown_within`]，
///   超限返回 `peer.shutdown_timeout`。
pub struct PeerDriver {
    state: PeerStateCell,
    grace: Duration,
    shutdown_tx: watch::Sender<bool>,
    conns: AsyncMutex<JoinSet<()>>,
    accept_task: StdMutex<Option<JoinHandle<()>>>,
    done: AsyncMutex<Option<ShutdownOutcome>>,
    listen_addr: OnceLock<SocketAddr>,
}

impl PeerDriver {
    /// 以给定宽限期构造。
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: PeerStateCell::new(),
            grace,
            shutdown_tx,
            conns: AsyncMutex::new(JoinSet::new()),
            accept_task: StdMutex::new(None),
            done: AsyncMutex::new(None),
            listen_addr: OnceLock::new(),
        }
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> PeerState {
        self.state.load()
    }

    /// 进入 `STARTING`；重复启动返回 `peer.state`。
    pub fn begin_start(&self) -> ripple_core::Result<(), CoreError> {
        self.state.transition(PeerState::Unbound, PeerState::Starting)
    }

    /// 绑定/建连成功后进入 `STARTED`。
    pub fn complete_start(&self) -> ripple_core::Result<(), CoreError> {
        self.state.transition(PeerState::Starting, PeerState::Started)
    }

    /// 启动失败：直达终态，错误由调用方一次性上报。
    pub fn fail_start(&self) {
        self.state.force(PeerState::Stopped);
    }

    /// 记录实际监听地址（端口 0 场景在此解析落定）。
    pub fn record_listen_addr(&self, addr: SocketAddr) {
        let _ = self.listen_addr.set(addr);
    }

    /// 实际监听地址；未启动时为 `None`。
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.get().copied()
    }

    /// 订阅关闭信号。接受循环在信号置位后停止接受新连接。
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 把一条连接任务纳入追踪，使关闭流程能够等待/强制其终止。
    pub async fn track<F>(&self, conn: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.conns.lock().await.spawn(conn);
    }

    /// 登记接受循环任务，关闭时先行汇合。
    pub fn install_accept_task(&self, handle: JoinHandle<()>) {
        match self.accept_task.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    fn take_accept_task(&self) -> Option<JoinHandle<()>> {
        match self.accept_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// 优雅关闭：停止接受、宽限排空、必要时强制收割。幂等。
    pub async fn shutdown(&self) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        let mut done = self.done.lock().await;
        if let Some(outcome) = *done {
            return Ok(outcome);
        }

        match self.state.load() {
            PeerState::Unbound => {
                // 从未启动：无事可关，直接进入终态。
                self.state.force(PeerState::Stopped);
                *done = Some(ShutdownOutcome::Clean);
                return Ok(ShutdownOutcome::Clean);
            }
            PeerState::Stopped => {
                *done = Some(ShutdownOutcome::Clean);
                return Ok(ShutdownOutcome::Clean);
            }
            _ => {}
        }

        let _ = self
            .state
            .transition(PeerState::Started, PeerState::ShuttingDown)
            .or_else(|_| {
                self.state
                    .transition(PeerState::Starting, PeerState::ShuttingDown)
            });

        self.shutdown_tx.send_replace(true);
        if let Some(accept) = self.take_accept_task() {
            let _ = accept.await;
        }

        let mut conns = self.conns.lock().await;
        let drained = tokio::time::timeout(self.grace, async {
            while conns.join_next().await.is_some() {}
        })
        .await;

        let outcome = if drained.is_ok() {
            ShutdownOutcome::Clean
        } else {
            tracing::warn!(
                code = codes::PEER_SHUTDOWN_TIMEOUT,
                grace_ms = self.grace.as_millis() as u64,
                "grace period exceeded, force-closing remaining channels"
            );
            conns.abort_all();
            while conns.join_next().await.is_some() {}
            ShutdownOutcome::Forced
        };
        drop(conns);

        self.state.force(PeerState::Stopped);
        *done = Some(outcome);
        tracing::info!(?outcome, "peer stopped");
        Ok(outcome)
    }

    /// 有界等待的关闭辅助：在 `limit` 内未完成则返回 `peer.shutdown_timeout`。
    pub async fn shutdown_within(
        &self,
        limit: Duration,
    ) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        tokio::time::timeout(limit, self.shutdown())
            .await
            .map_err(|_| {
                CoreError::new(
                    codes::PEER_SHUTDOWN_TIMEOUT,
                    "shutdown did not complete within the requested bound",
                )
            })?
    }
}
