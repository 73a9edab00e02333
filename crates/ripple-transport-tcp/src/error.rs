//! IO 错误到稳定错误域的映射。

use std::io;

use ripple_core::error::CoreError;

/// 把一次套接字操作的 `io::Error` 包装为带稳定错误码的 [`CoreError`]。
///
/// 原始 `io::Error` 作为根因保留，`source()` 链路可供日志层展开。
pub(crate) fn map_io_error(code: &'static str, err: io::Error) -> CoreError {
    CoreError::new(code, err.to_string()).with_cause(err)
}
