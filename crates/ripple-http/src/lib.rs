#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = r#"
# ripple-http

## 设计动机（Why）
- **定位**：在 `ripple-transport-tcp` 的对等体内核之上提供 HTTP/1.x 的
  最小路由层：请求头按不透明键值切分、有序路由表分派、`HttpChannel`
  承载请求/响应元数据、可选 WebSocket 升级。
- **边界**：头部语法校验、TLS 握手与 JSON 模式校验不在范围内；头与
  cookie 一律按键值数据对待。

## 核心契约（What）
- [`RouterBuilder`] / [`Router`]：注册序即匹配序（**先注册者胜**），
  `{name}` 捕获单个路径段并做百分号解码；既无兜底也无全局处理器时
  `build` 以 `router.no_fallback` 拒绝——这是配置期错误而非请求期故障。
- [`HttpChannel`]：方法、URI、头、cookie、捕获参数与预读请求体只读；
  状态码、响应头/cookie 与传输模式（定长/分块/SSE）可在首次写出前设置。
- [`HttpServer`]：生命周期与 `TcpServer` 共用同一内核，`start`/
  `shutdown` 语义完全一致；保活连接在定长响应后复用，流式响应独占连接。
- [`WsCodec`]：升级成功后的消息帧编解码（掩码、分片重组、控制帧）。

## 实现策略（How）
- 连接循环先读满请求头（`\r\n\r\n`），按 `Content-Length` 预读请求体，
  残余字节留在连接缓冲以支持保活与升级种子注入；
- 升级请求命中 WebSocket 路由时先完成 `Sec-WebSocket-Accept` 握手，
  再以残余字节为种子构造 `TcpChannel<WsCodec>` 交给处理器；
- 处理器的错误与恐慌在连接边界捕获，故障隔离严格按连接。
"#]

pub mod channel;
pub mod head;
pub mod router;
pub mod server;
pub mod ws;

pub use channel::{HttpChannel, TransferMode};
pub use head::{Headers, HttpVersion, Method, RequestHead};
pub use router::{
    HttpHandler, MethodRule, ParamsResolver, PathPattern, Router, RouterBuilder, WsHandler,
};
pub use server::HttpServer;
pub use ws::{WsCodec, WsMessage, accept_key};
