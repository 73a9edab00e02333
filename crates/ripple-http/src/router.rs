//! 有序路由表：注册序即匹配序，`{name}` 捕获单个路径段。

use std::sync::Arc;

use async_trait::async_trait;
use ripple_core::error::{CoreError, codes};
use ripple_transport_tcp::TcpChannel;

use crate::channel::HttpChannel;
use crate::head::{Method, RequestHead};
use crate::ws::WsCodec;

/// 补充参数解析器：在路径捕获之外，按请求头派生额外参数。
pub type ParamsResolver = Arc<dyn Fn(&RequestHead) -> Vec<(String, String)> + Send + Sync>;

/// 普通请求处理器：每个匹配请求调用一次。
#[async_trait]
pub trait HttpHandler: Send + Sync + 'static {
    /// 处理一个请求。错误记录日志并关闭连接，不波及其他连接。
    async fn handle(&self, channel: HttpChannel) -> ripple_core::Result<(), CoreError>;
}

#[async_trait]
impl<F, Fut> HttpHandler for F
where
    F: Fn(HttpChannel) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ripple_core::Result<(), CoreError>> + Send + 'static,
{
    async fn handle(&self, channel: HttpChannel) -> ripple_core::Result<(), CoreError> {
        (self)(channel).await
    }
}

/// WebSocket 处理器：升级成功后获得按消息帧分型的通道。
#[async_trait]
pub trait WsHandler: Send + Sync + 'static {
    /// 处理一条已升级的连接。
    async fn handle(&self, channel: TcpChannel<WsCodec>) -> ripple_core::Result<(), CoreError>;
}

#[async_trait]
impl<F, Fut> WsHandler for F
where
    F: Fn(TcpChannel<WsCodec>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ripple_core::Result<(), CoreError>> + Send + 'static,
{
    async fn handle(&self, channel: TcpChannel<WsCodec>) -> ripple_core::Result<(), CoreError> {
        (self)(channel).await
    }
}

/// 路由条目的方法约束。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodRule {
    /// 任意方法。
    Any,
    /// 仅给定方法。
    Exact(Method),
}

impl MethodRule {
    fn accepts(self, method: Method) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == method,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

/// 路径模板：字面段与 `{name}` 捕获段的有序序列。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// 解析模板，如 `/users/{id}/posts`。
    pub fn parse(pattern: &str) -> Self {
        let segments = split_segments(pattern)
            .into_iter()
            .map(|segment| {
                if let Some(inner) = segment
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Segment::Capture(inner.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// 逐段匹配请求路径；捕获段经百分号解码后写入参数表。
    pub(crate) fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let actual = split_segments(path);
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, raw) in self.segments.iter().zip(actual) {
            let decoded = percent_decode(raw);
            match segment {
                Segment::Literal(literal) => {
                    if *literal != decoded {
                        return None;
                    }
                }
                Segment::Capture(name) => params.push((name.clone(), decoded)),
            }
        }
        Some(params)
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// 解码 `%XX` 转义；非法转义序列按原文保留。
fn percent_decode(segment: &str) -> String {
    let raw = segment.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && let (Some(hi), Some(lo)) = (
                raw.get(i + 1).copied().and_then(hex_value),
                raw.get(i + 2).copied().and_then(hex_value),
            )
        {
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub(crate) enum Target {
    Http(Arc<dyn HttpHandler>),
    Ws(Arc<dyn WsHandler>),
}

struct RouteEntry {
    method: MethodRule,
    pattern: PathPattern,
    target: Target,
}

/// 路由表构建器。仅在配置期可变；`build` 之后只读。
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<RouteEntry>,
    global: Option<Arc<dyn HttpHandler>>,
    fallback: Option<Arc<dyn HttpHandler>>,
    params_resolver: Option<ParamsResolver>,
}

impl RouterBuilder {
    /// 空表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册任意方法约束的路由。
    pub fn route(
        mut self,
        method: MethodRule,
        pattern: &str,
        handler: impl HttpHandler,
    ) -> Self {
        self.routes.push(RouteEntry {
            method,
            pattern: PathPattern::parse(pattern),
            target: Target::Http(Arc::new(handler)),
        });
        self
    }

    /// GET 路由。
    pub fn get(self, pattern: &str, handler: impl HttpHandler) -> Self {
        self.route(MethodRule::Exact(Method::Get), pattern, handler)
    }

    /// POST 路由。
    pub fn post(self, pattern: &str, handler: impl HttpHandler) -> Self {
        self.route(MethodRule::Exact(Method::Post), pattern, handler)
    }

    /// PUT 路由。
    pub fn put(self, pattern: &str, handler: impl HttpHandler) -> Self {
        self.route(MethodRule::Exact(Method::Put), pattern, handler)
    }

    /// DELETE 路由。
    pub fn delete(self, pattern: &str, handler: impl HttpHandler) -> Self {
        self.route(MethodRule::Exact(Method::Delete), pattern, handler)
    }

    /// WebSocket 路由（以 GET + 升级握手触达）。
    pub fn ws(mut self, pattern: &str, handler: impl WsHandler) -> Self {
        self.routes.push(RouteEntry {
            method: MethodRule::Exact(Method::Get),
            pattern: PathPattern::parse(pattern),
            target: Target::Ws(Arc::new(handler)),
        });
        self
    }

    /// 全局处理器：仅在**无路由命中**时运行，优先于静态兜底。
    /// 已命中的路由处理器不与其叠加。
    pub fn global(mut self, handler: impl HttpHandler) -> Self {
        self.global = Some(Arc::new(handler));
        self
    }

    /// 静态兜底处理器（惯例上产生 404）。
    pub fn fallback(mut self, handler: impl HttpHandler) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// 注册补充参数解析器；其结果在路径捕获之后并入参数表。
    pub fn params_resolver(
        mut self,
        resolver: impl Fn(&RequestHead) -> Vec<(String, String)> + Send + Sync + 'static,
    ) -> Self {
        self.params_resolver = Some(Arc::new(resolver));
        self
    }

    /// 固化路由表。
    ///
    /// 既无兜底也无全局处理器是配置期错误 `router.no_fallback`，
    /// 而不是留给每个未命中请求的运行期故障。
    pub fn build(self) -> ripple_core::Result<Router, CoreError> {
        let unrouted = self.global.or(self.fallback).ok_or_else(|| {
            CoreError::new(
                codes::ROUTER_NO_FALLBACK,
                "router has neither a fallback nor a global handler",
            )
        })?;
        Ok(Router {
            routes: self.routes,
            unrouted,
            params_resolver: self.params_resolver,
        })
    }
}

/// 固化后的路由表：`build` 之后只读，可被多个连接上下文并发查询。
pub struct Router {
    routes: Vec<RouteEntry>,
    unrouted: Arc<dyn HttpHandler>,
    params_resolver: Option<ParamsResolver>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

pub(crate) enum Resolution<'a> {
    Matched {
        target: &'a Target,
        params: Vec<(String, String)>,
    },
    Unrouted(&'a Arc<dyn HttpHandler>),
}

impl Router {
    /// 按注册顺序解析首个命中条目；**先注册者胜**，即使后注册的
    /// 字面量条目更精确。无命中时落到全局/兜底处理器。
    pub(crate) fn resolve(&self, method: Method, path: &str) -> Resolution<'_> {
        for entry in &self.routes {
            if !entry.method.accepts(method) {
                continue;
            }
            if let Some(params) = entry.pattern.matches(path) {
                return Resolution::Matched {
                    target: &entry.target,
                    params,
                };
            }
        }
        Resolution::Unrouted(&self.unrouted)
    }

    /// 运行补充参数解析器（若注册）。
    pub(crate) fn extra_params(&self, head: &RequestHead) -> Vec<(String, String)> {
        match &self.params_resolver {
            Some(resolver) => resolver(head),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_channel: HttpChannel) -> ripple_core::Result<(), CoreError> {
        Ok(())
    }

    fn params_of(router: &Router, method: Method, path: &str) -> Option<Vec<(String, String)>> {
        match router.resolve(method, path) {
            Resolution::Matched { params, .. } => Some(params),
            Resolution::Unrouted(_) => None,
        }
    }

    #[test]
    fn registration_order_wins_over_specificity() {
        let router = RouterBuilder::new()
            .get("/a/{x}", noop)
            .get("/a/b", noop)
            .fallback(noop)
            .build()
            .unwrap();

        // "/a/b" 命中先注册的 "/a/{x}"，以 x="b" 捕获。
        let params = params_of(&router, Method::Get, "/a/b").unwrap();
        assert_eq!(params, vec![("x".to_string(), "b".to_string())]);
    }

    #[test]
    fn captures_are_percent_decoded() {
        let router = RouterBuilder::new()
            .get("/tag/{name}", noop)
            .fallback(noop)
            .build()
            .unwrap();

        let params = params_of(&router, Method::Get, "/tag/caf%C3%A9%20au%20lait").unwrap();
        assert_eq!(
            params,
            vec![("name".to_string(), "café au lait".to_string())]
        );
    }

    #[test]
    fn method_mismatch_skips_the_entry() {
        let router = RouterBuilder::new()
            .post("/items", noop)
            .route(MethodRule::Any, "/any", noop)
            .fallback(noop)
            .build()
            .unwrap();

        assert!(params_of(&router, Method::Get, "/items").is_none());
        assert!(params_of(&router, Method::Post, "/items").is_some());
        assert!(params_of(&router, Method::Delete, "/any").is_some());
    }

    #[test]
    fn capture_spans_exactly_one_segment() {
        let router = RouterBuilder::new()
            .get("/users/{id}", noop)
            .fallback(noop)
            .build()
            .unwrap();

        assert!(params_of(&router, Method::Get, "/users/42").is_some());
        assert!(params_of(&router, Method::Get, "/users").is_none());
        assert!(params_of(&router, Method::Get, "/users/42/posts").is_none());
    }

    #[test]
    fn building_without_fallback_or_global_fails() {
        let err = RouterBuilder::new()
            .get("/only", noop)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), codes::ROUTER_NO_FALLBACK);

        assert!(RouterBuilder::new().global(noop).build().is_ok());
        assert!(RouterBuilder::new().fallback(noop).build().is_ok());
    }
}
