//! 编解码契约：字节流与业务值之间的双向变换。

use bytes::BytesMut;

use crate::error::CoreError;

/// 一次解码尝试的统一结果。
///
/// `Incomplete` 并非错误：它表示当前缓冲不足以切出完整帧，
/// 调用方应保留残余字节并等待下一次传输读取。
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome<T> {
    /// 成功切出一个完整业务条目，对应字节已从缓冲中消费。
    Complete(T),
    /// 缓冲中的字节尚不足一帧，未消费任何字节（残余保留）。
    Incomplete,
}

/// `Codec` 统一封装编码与解码逻辑，是通道类型化的唯一扩展点。
///
/// # 设计初衷（Why）
/// - 以单一 trait 同时表达双向能力，关联类型区分入站/出站业务对象，
///   保证静态类型安全；
/// - 编解码器自身必须无状态（可被多个连接共享）；逐连接的可变状态
///   通过关联类型 [`Codec::State`] 显式建模：连接建立时调用
///   [`Codec::open_state`] 创建，随每次 `decode` 调用传入，连接关闭时销毁。
///   两个共享同一编解码配置的连接绝不会观察到彼此的半帧状态。
///
/// # 行为逻辑（How）
/// 1. `decode` 从 `src` 前端尝试切出一个完整条目；一次传输读取可能产出
///    零个、一个或多个条目，调用方应循环调用直至返回 `Incomplete`；
/// 2. `encode` 将业务对象序列化后追加到 `dst` 尾部；
/// 3. 残余字节保留在 `src` 中，由通道实例逐连接持有。
///
/// # 契约说明（What）
/// - **关联类型**：`Incoming`/`Outgoing` 需满足 `Send + 'static` 以支持跨任务传输；
/// - **错误语义**：`decode` 失败返回 `codec.decode`，`encode` 失败返回
///   `codec.encode`；二者均为该连接的终止性错误，框架随后关闭连接；
/// - **后置条件**：返回 `Incomplete` 时不得消费 `src` 中的字节。
///
/// # 权衡（Trade-offs）
/// - `decode` 以 `&mut BytesMut` 操作连续缓冲，牺牲分片零拷贝换取实现直观；
/// - 无分隔符、无前缀的协议（如透传）可将整个缓冲视为一帧。
pub trait Codec: Send + Sync + 'static {
    /// 解码后的业务类型。
    type Incoming: Send + 'static;
    /// 编码时的业务类型。
    type Outgoing: Send + 'static;
    /// 逐连接解码状态；无状态协议使用 `()`。
    type State: Default + Send + 'static;

    /// 为一条新连接创建独立的解码状态。
    fn open_state(&self) -> Self::State {
        Self::State::default()
    }

    /// 从 `src` 前端尝试解码一个业务条目。
    fn decode(
        &self,
        state: &mut Self::State,
        src: &mut BytesMut,
    ) -> crate::Result<DecodeOutcome<Self::Incoming>, CoreError>;

    /// 将业务对象编码并追加到 `dst`。
    fn encode(&self, item: &Self::Outgoing, dst: &mut BytesMut) -> crate::Result<(), CoreError>;
}
