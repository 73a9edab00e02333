//! `HttpChannel`：承载单个请求的元数据与响应写出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use ripple_core::error::{CoreError, codes};
use ripple_transport_tcp::io;
use tokio::net::TcpStream;

use crate::head::{Headers, HttpVersion, Method, RequestHead};

/// 响应体的传输模式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferMode {
    /// 定长响应体（`Content-Length`），响应后连接可复用。
    #[default]
    Plain,
    /// 分块传输；本实现中结束后关闭连接。
    Chunked,
    /// Server-Sent Events：`text/event-stream`，连接由事件流独占。
    EventStream,
}

/// 一次请求的通道视图：请求元数据 + 响应构造 + 底层连接句柄。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 处理器不接触原始套接字协议细节：读到的请求已切好头、体与路径
///   捕获；写出只需声明状态、头与体。
///
/// ## 契约 (What)
/// - 请求侧只读（头、cookie、参数、体均在构造时定格）；
/// - 响应头只能在首次写出前修改，`send_response`/首个事件/首个分块
///   之后头已上线；
/// - 复用性：仅定长响应保留 keep-alive，流式模式写出后连接不再复用。
pub struct HttpChannel {
    stream: Arc<TcpStream>,
    head: RequestHead,
    params: Vec<(String, String)>,
    body: Bytes,
    status: u16,
    response_headers: Headers,
    response_cookies: Vec<(String, String)>,
    transfer: TransferMode,
    head_sent: bool,
    reuse: Arc<AtomicBool>,
}

impl HttpChannel {
    pub(crate) fn new(
        stream: Arc<TcpStream>,
        head: RequestHead,
        params: Vec<(String, String)>,
        body: Bytes,
        reuse: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream,
            head,
            params,
            body,
            status: 200,
            response_headers: Headers::default(),
            response_cookies: Vec::new(),
            transfer: TransferMode::default(),
            head_sent: false,
            reuse,
        }
    }

    /// 请求方法。
    pub fn method(&self) -> Method {
        self.head.method()
    }

    /// 原始请求目标。
    pub fn uri(&self) -> &str {
        self.head.uri()
    }

    /// 请求路径。
    pub fn path(&self) -> &str {
        self.head.path()
    }

    /// 查询串。
    pub fn query(&self) -> Option<&str> {
        self.head.query()
    }

    /// 协议版本。
    pub fn version(&self) -> HttpVersion {
        self.head.version()
    }

    /// 请求头。
    pub fn headers(&self) -> &Headers {
        self.head.headers()
    }

    /// 请求 cookie。
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.head.cookies()
    }

    /// 路径捕获参数。
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// 全部捕获参数（按模板内出现顺序）。
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// 已预读的请求体。
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 响应后连接是否仍可复用。
    pub fn keep_alive(&self) -> bool {
        self.reuse.load(Ordering::Acquire)
    }

    /// 底层传输句柄，框架不解释其用途。
    pub fn delegate(&self) -> &TcpStream {
        &self.stream
    }

    /// 设置响应状态码（默认 200）。
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// 追加一条响应头。
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.response_headers.insert(name, value);
        self
    }

    /// 追加一条响应 cookie（渲染为 `Set-Cookie`）。
    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.response_cookies.push((name.into(), value.into()));
        self
    }

    /// 切换传输模式。流式模式会放弃连接复用。
    pub fn set_transfer(&mut self, transfer: TransferMode) -> &mut Self {
        self.transfer = transfer;
        if transfer != TransferMode::Plain {
            self.reuse.store(false, Ordering::Release);
        }
        self
    }

    /// 进入 SSE 模式的捷径：设置 `text/event-stream` 与事件流传输。
    pub fn sse(&mut self) -> &mut Self {
        self.add_header("Content-Type", "text/event-stream");
        self.add_header("Cache-Control", "no-cache");
        self.set_transfer(TransferMode::EventStream)
    }

    /// 写出定长响应（头 + 体），之后本请求即完成。
    pub async fn send_response(&mut self, body: &[u8]) -> ripple_core::Result<(), CoreError> {
        if self.head_sent {
            return Err(CoreError::new(
                codes::TRANSPORT_WRITE,
                "response head was already sent",
            ));
        }
        if self.transfer != TransferMode::Plain {
            return Err(CoreError::new(
                codes::TRANSPORT_WRITE,
                "fixed-length response conflicts with a streaming transfer mode",
            ));
        }
        let mut out = self.render_head(Some(body.len()));
        out.extend_from_slice(body);
        self.head_sent = true;
        self.write(out).await
    }

    /// 写出一个分块（首次调用会先上线分块响应头）。
    pub async fn send_chunk(&mut self, chunk: &[u8]) -> ripple_core::Result<(), CoreError> {
        if !self.head_sent {
            self.set_transfer(TransferMode::Chunked);
            let head = self.render_head(None);
            self.head_sent = true;
            self.write(head).await?;
        }
        let mut out = BytesMut::with_capacity(chunk.len() + 16);
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
        self.write(out).await
    }

    /// 写出一个 SSE 事件（首次调用会先上线事件流响应头）。
    pub async fn send_event(
        &mut self,
        event: Option<&str>,
        data: &str,
    ) -> ripple_core::Result<(), CoreError> {
        if !self.head_sent {
            if self.transfer != TransferMode::EventStream {
                self.sse();
            }
            let head = self.render_head(None);
            self.head_sent = true;
            self.write(head).await?;
        }
        let mut out = BytesMut::new();
        if let Some(event) = event {
            out.extend_from_slice(format!("event: {event}\n").as_bytes());
        }
        for line in data.split('\n') {
            out.extend_from_slice(format!("data: {line}\n").as_bytes());
        }
        out.extend_from_slice(b"\n");
        self.write(out).await
    }

    /// 结束响应：分块模式写终结块；尚未写头则发送空定长响应。
    pub async fn finish(&mut self) -> ripple_core::Result<(), CoreError> {
        if !self.head_sent {
            return self.send_response(b"").await;
        }
        if self.transfer == TransferMode::Chunked {
            self.write(BytesMut::from(&b"0\r\n\r\n"[..])).await?;
        }
        Ok(())
    }

    fn render_head(&self, content_length: Option<usize>) -> BytesMut {
        let mut head = BytesMut::with_capacity(256);
        head.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.head.version().as_str(),
                self.status,
                reason(self.status)
            )
            .as_bytes(),
        );
        for (name, value) in self.response_headers.iter() {
            head.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        for (name, value) in &self.response_cookies {
            head.extend_from_slice(format!("Set-Cookie: {name}={value}\r\n").as_bytes());
        }
        match self.transfer {
            TransferMode::Plain => {
                let length = content_length.unwrap_or(0);
                head.extend_from_slice(format!("Content-Length: {length}\r\n").as_bytes());
            }
            TransferMode::Chunked => {
                head.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
            }
            TransferMode::EventStream => {}
        }
        if !self.keep_alive() {
            head.extend_from_slice(b"Connection: close\r\n");
        }
        head.extend_from_slice(b"\r\n");
        head
    }

    async fn write(&self, mut out: BytesMut) -> ripple_core::Result<(), CoreError> {
        io::write_all(&self.stream, &mut out).await.map_err(|err| {
            CoreError::new(codes::TRANSPORT_WRITE, "failed to write response bytes")
                .with_cause(err)
        })
    }
}

/// 常见状态码的原因短语；未知码回落到 `Unknown`。
pub(crate) fn reason(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
