#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = "ripple-core: 响应式通道框架的核心契约层。"]
#![doc = ""]
#![doc = "== 定位（Why） =="]
#![doc = "本 crate 只承载契约：需求驱动的订阅协议、编解码双向变换、`Frame` 数据单元、"]
#![doc = "对等体（Peer）生命周期状态机与稳定错误域。任何具体运行时（Tokio TCP、HTTP 路由）"]
#![doc = "都在实现层 crate 中完成，核心不创建线程、不持有套接字。"]
#![doc = ""]
#![doc = "== 兼容性（What） =="]
#![doc = "定位于 `no_std + alloc` 场景：契约依赖 `Box`、`Vec`、`String` 等堆类型以保持"]
#![doc = "trait 对象安全；`std` Feature 仅为下游传播标记，核心逻辑不感知。"]

extern crate alloc;

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;
pub mod peer;
pub mod prelude;

pub use error::CoreError;

/// 框架统一结果别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;
