#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = r#"
# ripple-transport-tcp

## 设计动机（Why）
- **定位**：在 Tokio 运行时上实现 `ripple-core` 的通道契约，把事件驱动的
  TCP 连接桥接为“需求驱动、单订阅者”的流模型。
- **架构角色**：传输实现层的基础积木。编解码来自 `ripple-codecs`（或任何
  实现 [`Codec`](ripple_core::codec::Codec) 的类型），生命周期与错误分类
  对接 `ripple-core` 的契约。
- **设计理念**：背压是协作式协议而非隐式缓冲——入站侧在需求耗尽时
  **不再读取套接字**，出站侧以写就绪信号（`WouldBlock` → `writable()`）
  暂停排放。

## 核心契约（What）
- [`TcpChannel`]：虚拟双向连接。`receive` 安装唯一订阅者并返回
  [`Subscription`](ripple_core::channel::Subscription) 句柄；`send` 排空一个
  出站条目流并在完成时冲刷；`delegate` 暴露底层 `TcpStream` 供高级配置。
- [`TcpServer`] / [`TcpClient`]：对等体生命周期
  `UNBOUND → STARTING → STARTED → SHUTTING_DOWN → STOPPED`；`start` 仅在
  绑定/建连成功后完成，`shutdown` 幂等且带宽限期。
- 每条连接的解码状态由通道实例独占，连接关闭即销毁。

## 实现策略（How）
- 完全依赖 Tokio 的就绪模型：`readable()`/`try_read_buf` 与
  `writable()`/`try_write`，使需求门控能精确决定“是否发起下一次读”；
- [`DemandGate`] 以原子计数 + `Notify` 实现 `request(n)`/`cancel()`；
- 服务器的接受循环、连接任务追踪与宽限关闭收敛在 [`PeerDriver`]，
  供上层协议服务器（如 HTTP 路由层）复用。

## 风险与考量（Trade-offs）
- 同一 `send` 调用内的条目原子地串行写出（异步互斥锁），并发 `send`
  之间因此互不交错，但也意味着慢源会延迟后续 `send`；
- 订阅取消是协作式的：投递在下一次需求检查点停止，毫秒级延迟可接受。
"#]

pub mod channel;
pub mod client;
pub mod demand;
pub mod driver;
mod error;
pub mod handler;
pub mod io;
pub mod options;
pub mod server;

pub use channel::{ChannelSubscription, TcpChannel};
pub use client::TcpClient;
pub use demand::DemandGate;
pub use driver::PeerDriver;
pub use handler::ConnectionHandler;
pub use options::{ClientOptions, ServerOptions, TlsOptions};
pub use server::TcpServer;
