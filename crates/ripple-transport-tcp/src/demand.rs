//! 需求门：入站背压协议的原子实现。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ripple_core::channel::REQUEST_UNBOUNDED;
use tokio::sync::Notify;

/// 需求计数 + 取消标志的组合门。
///
/// # 设计背景（Why）
/// - 背压协议要求生产者（读取泵）只有在存量需求大于零时才投递条目、
///   需求耗尽时暂停读取套接字；
/// - 消费者通过订阅句柄在任意线程调用 `request`/`cancel`，门必须无锁可达。
///
/// # 行为逻辑（How）
/// - `request(n)`：饱和累加后唤醒等待者；`u64::MAX` 视为无上限，一旦到达
///   便不再递减（等价于关闭背压）；
/// - `wait_positive()`：挂起直到需求为正或被取消；内部先注册唤醒意向再
///   复查条件，杜绝“检查与挂起之间丢通知”的竞态；
/// - `consume_one()`：投递前消费一份需求，仅由读取泵调用（单消费者）。
///
/// # 契约（What）
/// - 取消是幂等的，且一经置位永不复位；
/// - 门本身不感知连接，是否随取消关闭连接由通道层按
///   [`CancelPolicy`](ripple_core::channel::CancelPolicy) 决定。
#[derive(Debug, Default)]
pub struct DemandGate {
    demand: AtomicU64,
    cancelled: AtomicBool,
    notify: Notify,
}

impl DemandGate {
    /// 创建需求为零的门。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加 `n` 份需求并唤醒等待者。`n == 0` 为空操作。
    pub fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            })
            .ok();
        self.notify.notify_waiters();
    }

    /// 置取消标志并唤醒等待者。幂等。
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// 取消标志是否已置位。
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 当前存量需求（观测用）。
    pub fn pending(&self) -> u64 {
        self.demand.load(Ordering::Acquire)
    }

    /// 消费一份需求。需求为 `u64::MAX`（无上限）时不递减。
    ///
    /// 仅限单一消费者（读取泵）调用；返回 `false` 表示存量为零。
    pub fn consume_one(&self) -> bool {
        self.demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match current {
                0 => None,
                REQUEST_UNBOUNDED => Some(REQUEST_UNBOUNDED),
                n => Some(n - 1),
            })
            .is_ok()
    }

    /// 等待需求为正。返回 `false` 表示订阅已被取消。
    pub async fn wait_positive(&self) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            if self.pending() > 0 {
                return true;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 先注册唤醒意向再复查，避免通知落在检查与挂起的窗口之间。
            notified.as_mut().enable();
            if self.is_cancelled() {
                return false;
            }
            if self.pending() > 0 {
                return true;
            }
            notified.await;
        }
    }
}
