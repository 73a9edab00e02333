//! 稳定错误域：所有可观察错误的最终形态。

use alloc::{borrow::Cow, boxed::Box};
use core::error::Error;
use core::fmt;

/// `CoreError` 是 ripple 各层共享的稳定错误载体。
///
/// # 设计背景（Why）
/// - 传输层、编解码层与路由层在不同位置产生的故障需要合流为统一的错误码，
///   便于日志、指标与测试断言执行精确匹配；
/// - 框架需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，
///   而以 `core::error::Error` 表达根因链路。
///
/// # 契约说明（What）
/// - `code`：`'static` 稳定字符串，遵循 `<域>.<语义>` 命名（见 [`codes`]）；
/// - `message`：面向排障人员的自然语言描述，不包含敏感信息；
/// - `cause`：可选底层原因（例如 IO 错误），通过 `source()` 暴露。
///
/// # 权衡（Trade-offs）
/// - 消息采用 `Cow<'static, str>`，静态文案零分配，动态文案仅一次堆分配；
/// - 错误不携带重试策略等元数据，上层如需自动化治理应基于错误码映射。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<Box<dyn Error + Send + Sync>>,
}

impl CoreError {
    /// 构造核心错误。
    ///
    /// - **前置条件**：`code` 必须取自 [`codes`] 或遵循 `<域>.<语义>` 约定；
    /// - **后置条件**：返回值拥有独立所有权，可跨线程传递（`Send + Sync`）。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 返回人类可读消息。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 返回底层原因（若有）。
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// 稳定错误码清单。
///
/// 命名遵循 `<域>.<语义>`：`transport` 为套接字操作，`channel` 为订阅协议，
/// `codec` 为编解码，`router`/`http` 为路由层，`peer` 为生命周期。
/// 新增错误码必须同步更新各 crate 的契约测试。
pub mod codes {
    /// 绑定监听地址失败（端口冲突、权限不足等）。
    pub const TRANSPORT_BIND: &str = "transport.bind";
    /// 建立出站连接失败（目标不可达、被拒绝等）。
    pub const TRANSPORT_CONNECT: &str = "transport.connect";
    /// 接受入站连接失败。
    pub const TRANSPORT_ACCEPT: &str = "transport.accept";
    /// 从连接读取字节失败。
    pub const TRANSPORT_READ: &str = "transport.read";
    /// 向连接写入字节失败。
    pub const TRANSPORT_WRITE: &str = "transport.write";
    /// 入站流已存在活跃订阅者，重复订阅被拒绝。
    pub const CHANNEL_ALREADY_SUBSCRIBED: &str = "channel.already_subscribed";
    /// 帧畸形、声明长度非法或负载不可解析。
    pub const CODEC_DECODE: &str = "codec.decode";
    /// 业务值不可序列化，本次写出被放弃。
    pub const CODEC_ENCODE: &str = "codec.encode";
    /// 路由表既无兜底响应也无全局处理器——配置期错误。
    pub const ROUTER_NO_FALLBACK: &str = "router.no_fallback";
    /// WebSocket 升级握手失败。
    pub const HTTP_UPGRADE: &str = "http.upgrade";
    /// 对等体生命周期状态迁移非法。
    pub const PEER_STATE: &str = "peer.state";
    /// 优雅关闭超出宽限期，剩余通道被强制关闭。
    pub const PEER_SHUTDOWN_TIMEOUT: &str = "peer.shutdown_timeout";
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("underlying failure")
        }
    }

    impl Error for Underlying {}

    #[test]
    fn display_carries_code_and_message() {
        let err = CoreError::new(codes::TRANSPORT_BIND, "address in use");
        assert_eq!(err.to_string(), "[transport.bind] address in use");
        assert_eq!(err.code(), codes::TRANSPORT_BIND);
        assert!(err.cause().is_none());
    }

    #[test]
    fn cause_is_exposed_through_source() {
        let err = CoreError::new(codes::TRANSPORT_READ, "read failed").with_cause(Underlying);
        assert_eq!(err.cause().map(ToString::to_string).as_deref(), Some("underlying failure"));
        assert!(Error::source(&err).is_some());
    }
}
