//! 请求头解析：请求行与头部按“不透明键值”切分，不做语法校验。

use ripple_core::error::{CoreError, codes};
use thiserror::Error;

/// 请求头的结构性故障，作为 `codec.decode` 的底因上报。
#[derive(Debug, Error)]
pub enum HeadParseError {
    /// 请求行不是 `<method> <target> <version>` 三段。
    #[error("request line is malformed")]
    MalformedRequestLine,
    /// 方法不在支持集合内。
    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),
    /// 版本不是 HTTP/1.0 或 HTTP/1.1。
    #[error("unsupported version `{0}`")]
    UnsupportedVersion(String),
    /// 头部行缺少冒号。
    #[error("header line is missing a colon")]
    MalformedHeader,
    /// 头部区不是合法 UTF-8。
    #[error("request head is not valid utf-8")]
    InvalidUtf8,
}

impl From<HeadParseError> for CoreError {
    fn from(err: HeadParseError) -> Self {
        CoreError::new(codes::CODEC_DECODE, "failed to parse request head").with_cause(err)
    }
}

/// 支持的请求方法。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// 从请求行方法标记解析。
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// 线上表示。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议版本。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpVersion {
    /// HTTP/1.0：默认短连接。
    V10,
    /// HTTP/1.1：默认保活。
    V11,
}

impl HttpVersion {
    /// 线上表示。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V10 => "HTTP/1.0",
            Self::V11 => "HTTP/1.1",
        }
    }
}

/// 保序、大小写不敏感查找的头部集合。重名头保留全部条目。
#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// 追加一条头部（不去重）。
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// 首个同名头的值，名字大小写不敏感。
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 所有同名头的值。
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 头值是否按逗号分隔包含给定标记（大小写不敏感）。
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).any(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    }

    /// 按插入顺序遍历。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// 条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 解析后的请求头。
#[derive(Clone, Debug)]
pub struct RequestHead {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    version: HttpVersion,
    headers: Headers,
}

impl RequestHead {
    /// 解析一段以 `\r\n\r\n` 结尾之前的头部字节（不含终结空行）。
    pub fn parse(raw: &[u8]) -> Result<Self, HeadParseError> {
        let text = str::from_utf8(raw).map_err(|_| HeadParseError::InvalidUtf8)?;
        let mut lines = text.split("\r\n");
        let request_line = lines.next().ok_or(HeadParseError::MalformedRequestLine)?;

        let mut parts = request_line.split_ascii_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HeadParseError::MalformedRequestLine);
        };
        let method = Method::from_token(method)
            .ok_or_else(|| HeadParseError::UnsupportedMethod(method.to_string()))?;
        let version = match version {
            "HTTP/1.0" => HttpVersion::V10,
            "HTTP/1.1" => HttpVersion::V11,
            other => return Err(HeadParseError::UnsupportedVersion(other.to_string())),
        };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        let mut headers = Headers::default();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or(HeadParseError::MalformedHeader)?;
            headers.insert(name.trim(), value.trim());
        }

        Ok(Self {
            method,
            target: target.to_string(),
            path,
            query,
            version,
            headers,
        })
    }

    /// 请求方法。
    pub fn method(&self) -> Method {
        self.method
    }

    /// 原始请求目标（路径 + 可选查询串）。
    pub fn uri(&self) -> &str {
        &self.target
    }

    /// 路径部分（未做百分号解码，交由路由层按段解码）。
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 查询串（`?` 之后的部分）。
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 协议版本。
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 头部集合。
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// 从全部 `Cookie` 头解出键值对；值按不透明字符串对待。
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut cookies = Vec::new();
        for header in self.headers.get_all("cookie") {
            for pair in header.split(';') {
                if let Some((name, value)) = pair.split_once('=') {
                    cookies.push((name.trim().to_string(), value.trim().to_string()));
                }
            }
        }
        cookies
    }

    /// `Content-Length` 头声明的请求体长度。
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// 连接在响应后是否可复用。
    pub fn keep_alive(&self) -> bool {
        match self.version {
            HttpVersion::V11 => !self.headers.contains_token("connection", "close"),
            HttpVersion::V10 => self.headers.contains_token("connection", "keep-alive"),
        }
    }

    /// 是否为 WebSocket 升级请求（`Connection: Upgrade` + `Upgrade: websocket`）。
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers.contains_token("connection", "upgrade")
            && self
                .headers
                .get("upgrade")
                .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }
}

/// 头部终结符 `\r\n\r\n` 之后的偏移；未出现则返回 `None`。
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_query_and_headers() {
        let head = RequestHead::parse(
            b"GET /users/42?verbose=1 HTTP/1.1\r\nHost: example.test\r\nX-Tag: a\r\nX-Tag: b",
        )
        .unwrap();
        assert_eq!(head.method(), Method::Get);
        assert_eq!(head.path(), "/users/42");
        assert_eq!(head.query(), Some("verbose=1"));
        assert_eq!(head.headers().get("host"), Some("example.test"));
        assert_eq!(head.headers().get_all("x-tag").count(), 2);
    }

    #[test]
    fn cookies_come_from_all_cookie_headers() {
        let head = RequestHead::parse(
            b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\nCookie: c=3",
        )
        .unwrap();
        assert_eq!(
            head.cookies(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn keep_alive_defaults_follow_the_version() {
        let v11 = RequestHead::parse(b"GET / HTTP/1.1\r\nHost: x").unwrap();
        assert!(v11.keep_alive());
        let v11_close = RequestHead::parse(b"GET / HTTP/1.1\r\nConnection: close").unwrap();
        assert!(!v11_close.keep_alive());
        let v10 = RequestHead::parse(b"GET / HTTP/1.0\r\nHost: x").unwrap();
        assert!(!v10.keep_alive());
    }

    #[test]
    fn malformed_request_line_is_rejected() {
        assert!(matches!(
            RequestHead::parse(b"GET /"),
            Err(HeadParseError::MalformedRequestLine)
        ));
        assert!(matches!(
            RequestHead::parse(b"BREW /pot HTTP/1.1"),
            Err(HeadParseError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn detects_websocket_upgrade() {
        let head = RequestHead::parse(
            b"GET /live HTTP/1.1\r\nConnection: keep-alive, Upgrade\r\nUpgrade: websocket",
        )
        .unwrap();
        assert!(head.is_websocket_upgrade());
    }

    #[test]
    fn head_end_is_located_after_the_blank_line() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nrest"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
    }
}
