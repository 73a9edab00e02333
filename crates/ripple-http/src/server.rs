//! `HttpServer`：连接分类、路由分派、保活复用与 WebSocket 升级。

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::FutureExt;
use ripple_core::error::{CoreError, codes};
use ripple_core::peer::{PeerState, ShutdownOutcome};
use ripple_transport_tcp::driver::{self, PeerDriver};
use ripple_transport_tcp::io;
use ripple_transport_tcp::{ServerOptions, TcpChannel};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::channel::{HttpChannel, reason};
use crate::head::{self, RequestHead};
use crate::router::{Resolution, Router, Target, WsHandler};
use crate::ws::{self, WsCodec};

/// 请求头上限。超限按畸形请求拒绝，防止慢速头部耗尽内存。
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// 默认请求体上限。`Content-Length` 是对端声明的数值，预读前必须先
/// 校验上限，否则恶意声明即可换取等量的服务端缓冲。
const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// HTTP 服务端对等体。
///
/// 生命周期语义与 `TcpServer` 完全一致（同一 [`PeerDriver`] 内核）：
/// `start` 在绑定成功后完成，`shutdown` 幂等且带宽限期。路由表在
/// `start` 前固化，此后可被全部连接上下文并发查询。
pub struct HttpServer {
    router: Arc<Router>,
    options: ServerOptions,
    max_body: usize,
    driver: Arc<PeerDriver>,
}

impl HttpServer {
    /// 以固化路由表与配置构造（尚未绑定）。
    pub fn new(router: Router, options: ServerOptions) -> Self {
        let driver = Arc::new(PeerDriver::new(options.grace()));
        Self {
            router: Arc::new(router),
            options,
            max_body: DEFAULT_MAX_BODY_BYTES,
            driver,
        }
    }

    /// 设置请求体上限；声明超限的请求以 `413` 拒绝并关闭连接。
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// 绑定并开始接受连接。重复调用返回 `peer.state`。
    pub async fn start(&self) -> ripple_core::Result<(), CoreError> {
        self.driver.begin_start()?;
        let listener = match driver::bind_listener(&self.options) {
            Ok(listener) => listener,
            Err(err) => {
                self.driver.fail_start();
                return Err(err);
            }
        };
        let local = match listener.local_addr() {
            Ok(addr) => addr,
            Err(err) => {
                self.driver.fail_start();
                return Err(
                    CoreError::new(codes::TRANSPORT_BIND, "failed to resolve listen address")
                        .with_cause(err),
                );
            }
        };
        self.driver.record_listen_addr(local);
        let shutdown = self.driver.shutdown_signal();
        self.driver.complete_start()?;
        tracing::info!(%local, "http server started");

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.driver),
            Arc::clone(&self.router),
            self.options.clone(),
            self.max_body,
            shutdown,
        ));
        self.driver.install_accept_task(accept);
        Ok(())
    }

    /// 实际监听地址；启动成功前为 `None`。
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.driver.listen_addr()
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> PeerState {
        self.driver.state()
    }

    /// 优雅关闭。幂等。
    pub async fn shutdown(&self) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        self.driver.shutdown().await
    }

    /// 有界等待的优雅关闭。
    pub async fn shutdown_within(
        &self,
        limit: Duration,
    ) -> ripple_core::Result<ShutdownOutcome, CoreError> {
        self.driver.shutdown_within(limit).await
    }
}

async fn accept_loop(
    listener: TcpListener,
    driver: Arc<PeerDriver>,
    router: Arc<Router>,
    options: ServerOptions,
    max_body: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if options.no_delay()
                        && let Err(err) = stream.set_nodelay(true)
                    {
                        tracing::warn!(%peer, error = %err, "failed to set nodelay");
                    }
                    if let Some(hook) = options.pipeline_hook() {
                        hook(&stream);
                    }
                    tracing::debug!(%peer, "connection accepted");
                    driver
                        .track(serve_guarded(
                            stream,
                            peer,
                            Arc::clone(&router),
                            options.clone(),
                            max_body,
                        ))
                        .await;
                }
                Err(err) => {
                    tracing::warn!(code = codes::TRANSPORT_ACCEPT, error = %err, "accept failed");
                }
            },
        }
    }
    tracing::debug!("accept loop stopped");
}

async fn serve_guarded(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    options: ServerOptions,
    max_body: usize,
) {
    let stream = Arc::new(stream);
    // 守卫析构负责关闭套接字：正常返回与宽限期后的任务中止共用同一路径。
    let _guard = io::ShutdownGuard::new(Arc::clone(&stream));
    let outcome = AssertUnwindSafe(serve_connection(
        Arc::clone(&stream),
        peer,
        router,
        options,
        max_body,
    ))
    .catch_unwind()
    .await;
    if outcome.is_err() {
        tracing::error!(%peer, "request handler panicked, closing connection");
    }
}

/// 单连接服务循环：读头 → 预读体 → 路由 → 分派，保活时继续下一个请求。
async fn serve_connection(
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    router: Arc<Router>,
    options: ServerOptions,
    max_body: usize,
) {
    let mut buf = BytesMut::new();
    loop {
        let head_end = loop {
            if let Some(end) = head::find_head_end(&buf) {
                break end;
            }
            if buf.len() > MAX_HEAD_BYTES {
                let _ = respond_simple(&stream, 400, "request head too large").await;
                return;
            }
            match io::read_chunk(&stream, &mut buf).await {
                Ok(0) => {
                    if !buf.is_empty() {
                        tracing::trace!(%peer, residual = buf.len(), "eof inside a request head");
                    }
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(%peer, error = %err, "read failed");
                    return;
                }
            }
        };

        let head_bytes = buf.split_to(head_end);
        let head = match RequestHead::parse(&head_bytes[..head_end - 4]) {
            Ok(head) => head,
            Err(err) => {
                tracing::debug!(%peer, error = %err, "malformed request head");
                let _ = respond_simple(&stream, 400, "malformed request").await;
                return;
            }
        };

        // 预读声明长度的请求体；残余字节留在 buf 供下一个请求使用。
        let body_len = head.content_length().unwrap_or(0);
        if body_len > max_body {
            tracing::debug!(%peer, declared = body_len, limit = max_body, "request body over limit");
            let _ = respond_simple(&stream, 413, "request body too large").await;
            return;
        }
        while buf.len() < body_len {
            match io::read_chunk(&stream, &mut buf).await {
                Ok(0) => {
                    tracing::debug!(%peer, "eof inside a request body");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(%peer, error = %err, "read failed");
                    return;
                }
            }
        }
        let body = buf.split_to(body_len).freeze();

        if head.is_websocket_upgrade()
            && let Resolution::Matched {
                target: Target::Ws(handler),
                ..
            } = router.resolve(head.method(), head.path())
        {
            let handler = Arc::clone(handler);
            upgrade_and_serve(stream, peer, head, buf, handler, &options).await;
            return;
        }

        let reuse = Arc::new(AtomicBool::new(head.keep_alive()));
        let (handler, mut params) = match router.resolve(head.method(), head.path()) {
            Resolution::Matched {
                target: Target::Http(handler),
                params,
            } => (Arc::clone(handler), params),
            Resolution::Matched {
                target: Target::Ws(_),
                ..
            } => {
                // WebSocket 路由要求升级握手。
                if respond_simple(&stream, 426, "websocket upgrade required")
                    .await
                    .is_err()
                    || !head.keep_alive()
                {
                    return;
                }
                continue;
            }
            Resolution::Unrouted(handler) => (Arc::clone(handler), Vec::new()),
        };
        params.extend(router.extra_params(&head));

        let channel = HttpChannel::new(
            Arc::clone(&stream),
            head,
            params,
            body,
            Arc::clone(&reuse),
        );
        match AssertUnwindSafe(handler.handle(channel)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(%peer, code = err.code(), "request handler failed: {err}");
                return;
            }
            Err(_) => {
                tracing::error!(%peer, "request handler panicked, closing connection");
                return;
            }
        }

        if !reuse.load(Ordering::Acquire) {
            return;
        }
    }
}

/// 升级握手并把连接交给 WebSocket 处理器；连接自此被消息流独占。
async fn upgrade_and_serve(
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    head: RequestHead,
    residual: BytesMut,
    handler: Arc<dyn WsHandler>,
    options: &ServerOptions,
) {
    let response = match ws::handshake_response(&head) {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(%peer, code = err.code(), "websocket handshake rejected: {err}");
            let _ = respond_simple(&stream, 400, "websocket handshake failed").await;
            return;
        }
    };
    let mut out = BytesMut::from(response.as_bytes());
    if let Err(err) = io::write_all(&stream, &mut out).await {
        tracing::debug!(%peer, error = %err, "failed to write handshake response");
        return;
    }

    let channel = match TcpChannel::from_shared(
        stream,
        Arc::new(WsCodec::new()),
        options.cancel_policy(),
        residual,
    ) {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(%peer, code = err.code(), "failed to build websocket channel: {err}");
            return;
        }
    };
    tracing::debug!(%peer, "websocket upgrade completed");

    match AssertUnwindSafe(handler.handle(channel.clone()))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => tracing::trace!(%peer, "websocket handler completed"),
        Ok(Err(err)) => {
            tracing::warn!(%peer, code = err.code(), "websocket handler failed: {err}");
        }
        Err(_) => tracing::error!(%peer, "websocket handler panicked"),
    }
    channel.close();
}

async fn respond_simple(
    stream: &Arc<TcpStream>,
    status: u16,
    body: &str,
) -> ripple_core::Result<(), CoreError> {
    let mut out = BytesMut::from(
        format!(
            "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\n\r\n{body}",
            reason(status),
            body.len(),
        )
        .as_bytes(),
    );
    io::write_all(stream, &mut out).await.map_err(|err| {
        CoreError::new(codes::TRANSPORT_WRITE, "failed to write response").with_cause(err)
    })
}
