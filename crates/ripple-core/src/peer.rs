//! 对等体（Peer）生命周期状态机与关闭结果。

use alloc::format;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::{CoreError, codes};

/// 对等体生命周期状态。
///
/// 合法迁移路径是一条单向链：
/// `Unbound → Starting → Started → ShuttingDown → Stopped`。
/// 启动失败时允许 `Starting → Stopped` 直达；关闭可从 `Starting`/`Started`
/// 任一状态发起。任何其他迁移都是 `peer.state` 错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerState {
    /// 尚未绑定/连接。
    Unbound = 0,
    /// 正在绑定（服务端）或建连（客户端）。
    Starting = 1,
    /// 已就绪并处理连接；配置自此不可变。
    Started = 2,
    /// 已停止接受新连接，等待存量通道排空。
    ShuttingDown = 3,
    /// 所有通道已关闭，终态。
    Stopped = 4,
}

impl PeerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// 状态名（日志与错误消息使用）。
    pub fn name(self) -> &'static str {
        match self {
            Self::Unbound => "UNBOUND",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Stopped => "STOPPED",
        }
    }
}

/// 无锁生命周期单元：以 CAS 实施单向迁移约束。
///
/// # 设计背景（Why）
/// - `start()`/`shutdown()` 可能被多个调用方并发触发，状态迁移必须原子判定，
///   保证 “启动只成功一次、关闭幂等” 的对外契约；
/// - 核心层不依赖运行时，因此用 `AtomicU8` 而非异步原语表达。
#[derive(Debug)]
pub struct PeerStateCell(AtomicU8);

impl PeerStateCell {
    /// 以 `Unbound` 初始化。
    pub const fn new() -> Self {
        Self(AtomicU8::new(PeerState::Unbound as u8))
    }

    /// 读取当前状态。
    pub fn load(&self) -> PeerState {
        PeerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// 尝试从 `from` 迁移到 `to`；当前状态不符则返回 `peer.state` 错误。
    pub fn transition(&self, from: PeerState, to: PeerState) -> crate::Result<(), CoreError> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| {
                CoreError::new(
                    codes::PEER_STATE,
                    format!(
                        "illegal peer transition {} -> {} (current {})",
                        from.name(),
                        to.name(),
                        PeerState::from_u8(actual).name()
                    ),
                )
            })
    }

    /// 无条件置为 `to`。仅限关闭路径收尾使用。
    pub fn force(&self, to: PeerState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl Default for PeerStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次关闭流程的记录结果。幂等的第二次 `shutdown()` 观察到同一值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 全部通道在宽限期内排空并关闭。
    Clean,
    /// 宽限期耗尽（`peer.shutdown_timeout` 条件），剩余通道被强制关闭。
    Forced,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let cell = PeerStateCell::new();
        cell.transition(PeerState::Unbound, PeerState::Starting).unwrap();
        cell.transition(PeerState::Starting, PeerState::Started).unwrap();
        cell.transition(PeerState::Started, PeerState::ShuttingDown).unwrap();
        cell.transition(PeerState::ShuttingDown, PeerState::Stopped).unwrap();
        assert_eq!(cell.load(), PeerState::Stopped);
    }

    #[test]
    fn double_start_is_rejected() {
        let cell = PeerStateCell::new();
        cell.transition(PeerState::Unbound, PeerState::Starting).unwrap();
        let err = cell
            .transition(PeerState::Unbound, PeerState::Starting)
            .unwrap_err();
        assert_eq!(err.code(), codes::PEER_STATE);
    }
}
