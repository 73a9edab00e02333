//! 不可变的对等体配置值：启动时校验，启动后不再变更。

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ripple_core::channel::CancelPolicy;
use tokio::net::TcpStream;

/// 每条已接受/已建立连接可执行的透明定制钩子。
///
/// 框架不解释钩子行为；典型用途是设置仅传输层关心的套接字选项。
pub type PipelineHook = Arc<dyn Fn(&TcpStream) + Send + Sync>;

/// TLS 材料配置。核心按规格**不解释**其内容（握手机制是传输协作方的
/// 职责），仅原样携带给定制层。
#[derive(Clone)]
pub struct TlsOptions {
    keystore_file: String,
    keystore_password: String,
    trust_provider: Option<Arc<dyn Fn() -> Vec<u8> + Send + Sync>>,
}

impl TlsOptions {
    /// 以密钥库路径与口令构造。
    pub fn new(keystore_file: impl Into<String>, keystore_password: impl Into<String>) -> Self {
        Self {
            keystore_file: keystore_file.into(),
            keystore_password: keystore_password.into(),
            trust_provider: None,
        }
    }

    /// 设置信任材料供应器（DER 字节束），由定制层自行消费。
    pub fn with_trust_provider(
        mut self,
        provider: Arc<dyn Fn() -> Vec<u8> + Send + Sync>,
    ) -> Self {
        self.trust_provider = Some(provider);
        self
    }

    /// 密钥库路径。
    pub fn keystore_file(&self) -> &str {
        &self.keystore_file
    }

    /// 密钥库口令。
    pub fn keystore_password(&self) -> &str {
        &self.keystore_password
    }

    /// 信任材料供应器。
    pub fn trust_provider(&self) -> Option<&Arc<dyn Fn() -> Vec<u8> + Send + Sync>> {
        self.trust_provider.as_ref()
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("keystore_file", &self.keystore_file)
            .field("trust_provider", &self.trust_provider.is_some())
            .finish_non_exhaustive()
    }
}

/// 服务端配置。构造后即不可变；`start()` 在绑定时消费。
#[derive(Clone)]
pub struct ServerOptions {
    listen: SocketAddr,
    backlog: u32,
    reuse_address: bool,
    no_delay: bool,
    grace: Duration,
    cancel_policy: CancelPolicy,
    pipeline_hook: Option<PipelineHook>,
    tls: Option<TlsOptions>,
}

impl ServerOptions {
    /// 监听给定地址；端口 0 表示由内核分配，实际端口经
    /// `listen_addr()` 解析（对齐原始行为）。
    pub fn listen(listen: SocketAddr) -> Self {
        Self {
            listen,
            backlog: 1024,
            reuse_address: true,
            no_delay: false,
            grace: Duration::from_secs(5),
            cancel_policy: CancelPolicy::default(),
            pipeline_hook: None,
            tls: None,
        }
    }

    /// 接受队列长度。
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// 是否设置 `SO_REUSEADDR`。
    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// 是否对每条连接设置 `TCP_NODELAY`。
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// 优雅关闭宽限期。
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// 取消入站订阅时对连接的处置策略。
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// 安装每连接定制钩子。
    pub fn with_pipeline_hook(mut self, hook: PipelineHook) -> Self {
        self.pipeline_hook = Some(hook);
        self
    }

    /// 携带 TLS 材料（不解释）。
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// 监听地址（配置值，未必是实际绑定端口）。
    pub fn listen_target(&self) -> SocketAddr {
        self.listen
    }

    /// 接受队列长度。
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// `SO_REUSEADDR` 开关。
    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    /// `TCP_NODELAY` 开关。
    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    /// 优雅关闭宽限期。
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// 取消处置策略。
    pub fn cancel_policy(&self) -> CancelPolicy {
        self.cancel_policy
    }

    /// 每连接定制钩子。
    pub fn pipeline_hook(&self) -> Option<&PipelineHook> {
        self.pipeline_hook.as_ref()
    }

    /// TLS 材料。
    pub fn tls(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("listen", &self.listen)
            .field("backlog", &self.backlog)
            .field("reuse_address", &self.reuse_address)
            .field("no_delay", &self.no_delay)
            .field("grace", &self.grace)
            .field("cancel_policy", &self.cancel_policy)
            .field("pipeline_hook", &self.pipeline_hook.is_some())
            .field("tls", &self.tls)
            .finish()
    }
}

/// 客户端配置。
#[derive(Clone)]
pub struct ClientOptions {
    target: SocketAddr,
    no_delay: bool,
    grace: Duration,
    connect_timeout: Option<Duration>,
    cancel_policy: CancelPolicy,
    pipeline_hook: Option<PipelineHook>,
    tls: Option<TlsOptions>,
}

impl ClientOptions {
    /// 连接到目标地址。
    pub fn connect(target: SocketAddr) -> Self {
        Self {
            target,
            no_delay: false,
            grace: Duration::from_secs(5),
            connect_timeout: None,
            cancel_policy: CancelPolicy::default(),
            pipeline_hook: None,
            tls: None,
        }
    }

    /// 是否设置 `TCP_NODELAY`。
    pub fn with_no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    /// 优雅关闭宽限期。
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// 建连超时（超时按 `transport.connect` 报告）。
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// 取消入站订阅时对连接的处置策略。
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// 安装连接定制钩子。
    pub fn with_pipeline_hook(mut self, hook: PipelineHook) -> Self {
        self.pipeline_hook = Some(hook);
        self
    }

    /// 携带 TLS 材料（不解释）。
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// 目标地址。
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// `TCP_NODELAY` 开关。
    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    /// 宽限期。
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// 建连超时。
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// 取消处置策略。
    pub fn cancel_policy(&self) -> CancelPolicy {
        self.cancel_policy
    }

    /// 连接定制钩子。
    pub fn pipeline_hook(&self) -> Option<&PipelineHook> {
        self.pipeline_hook.as_ref()
    }

    /// TLS 材料。
    pub fn tls(&self) -> Option<&TlsOptions> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("target", &self.target)
            .field("no_delay", &self.no_delay)
            .field("grace", &self.grace)
            .field("connect_timeout", &self.connect_timeout)
            .field("cancel_policy", &self.cancel_policy)
            .field("pipeline_hook", &self.pipeline_hook.is_some())
            .field("tls", &self.tls)
            .finish()
    }
}
