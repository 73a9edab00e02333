#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `ripple-codecs` 提供框架内置的编解码器族。
//!
//! # 定位（Why）
//! - 所有实现都遵循 `ripple-core` 的 [`Codec`](ripple_core::codec::Codec) 契约：
//!   编解码器本体无状态、可被多连接共享，半帧残余保留在调用方的逐连接缓冲中；
//! - 一次传输读取可能切出零帧、一帧或多帧，调用方循环 `decode` 直至
//!   `Incomplete`，这一约定保证帧重组与传输读边界完全解耦。
//!
//! # 成员（What）
//! - [`PassthroughCodec`]：恒等变换，直接暴露原始字节块；
//! - [`LineCodec`]：分隔符切分 + UTF-8 解码的文本协议；
//! - [`LengthFieldCodec`]：定宽数值前缀声明负载长度的二进制协议；
//! - [`FrameCodec`]：2 字节前缀，向调用方暴露 `Frame{prefix, payload}`；
//! - [`JsonCodec`]：行分隔 JSON 的结构化对象编解码（`json` Feature）。

extern crate alloc;

mod frame;
#[cfg(feature = "json")]
mod json;
mod length;
mod line;
mod passthrough;

pub use crate::frame::FrameCodec;
#[cfg(feature = "json")]
pub use crate::json::JsonCodec;
pub use crate::length::{ByteOrder, LengthFieldCodec, PrefixWidth};
pub use crate::line::LineCodec;
pub use crate::passthrough::PassthroughCodec;
