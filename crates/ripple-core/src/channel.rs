//! 通道契约：需求驱动的单订阅者入站流与可序列化的出站写入。

use crate::error::CoreError;

/// 请求“无上限”需求时使用的哨兵值。
///
/// 传入 [`Subscription::request`] 后需求计数饱和在 `u64::MAX`，
/// 等价于关闭入站背压（生产者不再因需求耗尽而暂停读取）。
pub const REQUEST_UNBOUNDED: u64 = u64::MAX;

/// 入站流的单订阅者回调契约。
///
/// # 设计背景（Why）
/// - 规避隐式缓冲：通道只有在订阅者显式请求需求后才向其投递条目，
///   需求协议（request/cancel + on_item/on_error/on_complete）是一个
///   刻意收窄的显式契约；
/// - 回调在连接自身的执行上下文中串行触发，同一连接的事件不会并发，
///   因此方法接收 `&mut self`，实现无须内部加锁。
///
/// # 契约说明（What）
/// - `on_item`：投递一个解码后的业务条目；调用次数不超过累计请求的需求量；
/// - `on_error`：终止信号，此后不再有任何回调；
/// - `on_complete`：对端正常关闭后的终止信号，与 `on_error` 互斥；
/// - **前置条件**：实现必须可跨线程移动（`Send`），由传输层任务持有。
///
/// # 权衡（Trade-offs）
/// - 回调内抛出的 panic 由传输层在连接边界捕获并转化为该连接的终止错误，
///   不会波及其他连接；但回调内长时间阻塞会拖慢本连接的投递。
pub trait Subscriber<T>: Send + 'static {
    /// 投递一个条目。仅在存量需求大于零时被调用。
    fn on_item(&mut self, item: T);

    /// 终止信号：通道因错误关闭。
    fn on_error(&mut self, error: CoreError);

    /// 终止信号：对端正常关闭，入站流自然结束。
    fn on_complete(&mut self);
}

/// 订阅句柄：消费者借此表达需求与取消意愿。
///
/// # 契约说明（What）
/// - `request(n)`：追加 `n` 份需求，计数饱和累加；`n == 0` 为空操作；
/// - `cancel()`：立即停止后续投递，幂等；是否同时关闭底层连接由
///   [`CancelPolicy`] 决定，而非取消动作的自动后果。
pub trait Subscription: Send + Sync + 'static {
    /// 追加 `n` 份投递需求。
    fn request(&self, n: u64);

    /// 取消订阅，停止后续投递。幂等。
    fn cancel(&self);
}

/// 取消入站订阅时对底层连接的处置策略。
///
/// 规格层面的开放问题在此落为显式配置：取消默认只停止投递
/// （出站侧仍可继续写入），调用方可选择让取消连带关闭连接。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// 仅停止投递，连接保持打开，出站侧可继续使用。
    #[default]
    HaltDelivery,
    /// 取消的同时关闭底层连接（双向）。
    CloseConnection,
}
