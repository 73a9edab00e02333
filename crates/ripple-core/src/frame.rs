//! `Frame`：以长度字段界定边界的解码数据单元。

use bytes::{BufMut, Bytes, BytesMut};

/// 长度前缀帧：原始前缀字节与等长负载的配对。
///
/// # 契约说明（What）
/// - `prefix`：线上原样的定宽前缀字节（可能携带辅助元数据），解码器保证
///   其声明的负载长度与 `payload.len()` 一致；
/// - `payload`：精确等于声明长度的负载切片；
/// - 所有权：由解码器产出、交给消费者，消费完毕即释放，框架不回收。
///
/// # 权衡（Trade-offs）
/// - 保留原始前缀字节（而非仅存解析后的整数）使
///   `encode(decode(bytes)) == bytes` 的往返不依赖字节序重建。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    prefix: Bytes,
    payload: Bytes,
}

impl Frame {
    /// 以原始前缀与负载构造帧。调用方负责保证二者一致。
    pub fn new(prefix: Bytes, payload: Bytes) -> Self {
        Self { prefix, payload }
    }

    /// 以大端 2 字节前缀包装负载。负载长度必须不超过 `u16::MAX`。
    pub fn with_u16_prefix(payload: Bytes) -> Self {
        debug_assert!(payload.len() <= usize::from(u16::MAX));
        let mut prefix = BytesMut::with_capacity(2);
        prefix.put_u16(payload.len() as u16);
        Self {
            prefix: prefix.freeze(),
            payload,
        }
    }

    /// 原始前缀字节。
    pub fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// 负载切片。
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 将前缀按大端 `u16` 解析（2 字节帧编解码器的约定读法）。
    pub fn prefix_u16(&self) -> u16 {
        debug_assert_eq!(self.prefix.len(), 2);
        u16::from_be_bytes([self.prefix[0], self.prefix[1]])
    }

    /// 拆解为（前缀, 负载）。
    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.prefix, self.payload)
    }
}
