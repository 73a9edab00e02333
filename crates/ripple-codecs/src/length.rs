use alloc::format;

use bytes::{Buf, Bytes, BytesMut};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};

/// 长度前缀的定宽规格。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    /// 1 字节前缀（最大负载 255）。
    U8,
    /// 2 字节前缀（最大负载 65535）。
    U16,
    /// 4 字节前缀。
    U32,
    /// 8 字节前缀。
    U64,
}

impl PrefixWidth {
    /// 前缀占用的字节数。
    pub fn len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// 该宽度可声明的最大负载长度。
    pub fn max_value(self) -> u64 {
        match self {
            Self::U8 => u64::from(u8::MAX),
            Self::U16 => u64::from(u16::MAX),
            Self::U32 => u64::from(u32::MAX),
            Self::U64 => u64::MAX,
        }
    }
}

/// 前缀的数值字节序。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// 网络序（默认）。
    BigEndian,
    /// 小端。
    LittleEndian,
}

/// 长度前缀二进制编解码器。
///
/// # 设计动机（Why）
/// - 二进制协议最常见的分帧方式：定宽数值前缀声明负载长度 N，随后恰好
///   N 字节负载；
/// - 帧重组必须与传输读边界无关：一次读取可能切出零帧、一帧或多帧外加
///   一个尾部半帧，半帧原样保留在逐连接缓冲中。
///
/// # 行为概览（How）
/// 1. `decode` 先窥视（不消费）前缀；字节不足时返回 `Incomplete`；
/// 2. 校验声明长度不超过 `max_frame`，防御恶意超长声明；
/// 3. 负载未到齐时同样返回 `Incomplete`，到齐后一次性消费前缀与负载；
/// 4. `encode` 镜像写出：前缀在前、负载随后。
///
/// # 契约（What）
/// - 入站/出站均为 [`Bytes`] 负载（不含前缀）；
/// - 对任意切分方式，`encode` 产物重新喂入 `decode` 恰好还原一帧且
///   字节一致（见 `tests/reassembly.rs` 的性质测试）。
#[derive(Debug, Clone)]
pub struct LengthFieldCodec {
    width: PrefixWidth,
    order: ByteOrder,
    max_frame: usize,
}

/// 默认单帧上限：16 MiB。
const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

impl LengthFieldCodec {
    /// 以指定前缀宽度、网络序与默认帧上限构造。
    pub fn new(width: PrefixWidth) -> Self {
        Self {
            width,
            order: ByteOrder::BigEndian,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    /// 替换前缀字节序。
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// 设置单帧负载上限，超长声明立即判为解码错误。
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// 前缀宽度。
    pub fn width(&self) -> PrefixWidth {
        self.width
    }

    fn read_prefix(&self, bytes: &[u8]) -> u64 {
        let mut value: u64 = 0;
        match self.order {
            ByteOrder::BigEndian => {
                for byte in bytes {
                    value = (value << 8) | u64::from(*byte);
                }
            }
            ByteOrder::LittleEndian => {
                for byte in bytes.iter().rev() {
                    value = (value << 8) | u64::from(*byte);
                }
            }
        }
        value
    }

    fn write_prefix(&self, value: u64, dst: &mut BytesMut) {
        let width = self.width.len();
        let be = value.to_be_bytes();
        match self.order {
            ByteOrder::BigEndian => dst.extend_from_slice(&be[8 - width..]),
            ByteOrder::LittleEndian => {
                let le = value.to_le_bytes();
                dst.extend_from_slice(&le[..width]);
            }
        }
    }
}

impl Codec for LengthFieldCodec {
    type Incoming = Bytes;
    type Outgoing = Bytes;
    type State = ();

    fn decode(
        &self,
        _state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        let width = self.width.len();
        if src.len() < width {
            return Ok(DecodeOutcome::Incomplete);
        }

        let declared = self.read_prefix(&src[..width]);
        if declared > self.max_frame as u64 {
            return Err(CoreError::new(
                codes::CODEC_DECODE,
                format!(
                    "declared frame length {} exceeds limit {}",
                    declared, self.max_frame
                ),
            ));
        }

        let declared = declared as usize;
        if src.len() < width + declared {
            return Ok(DecodeOutcome::Incomplete);
        }

        src.advance(width);
        let payload = src.split_to(declared).freeze();
        Ok(DecodeOutcome::Complete(payload))
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        let len = item.len() as u64;
        if len > self.width.max_value() {
            return Err(CoreError::new(
                codes::CODEC_ENCODE,
                format!(
                    "payload length {} not representable in {}-byte prefix",
                    len,
                    self.width.len()
                ),
            ));
        }
        if item.len() > self.max_frame {
            return Err(CoreError::new(
                codes::CODEC_ENCODE,
                format!("payload length {} exceeds limit {}", item.len(), self.max_frame),
            ));
        }

        dst.reserve(self.width.len() + item.len());
        self.write_prefix(len, dst);
        dst.extend_from_slice(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn roundtrip(codec: &LengthFieldCodec, payload: &[u8]) {
        let mut wire = BytesMut::new();
        codec.encode(&Bytes::copy_from_slice(payload), &mut wire).unwrap();

        let mut buf = BytesMut::from(&wire[..]);
        match codec.decode(&mut (), &mut buf).unwrap() {
            DecodeOutcome::Complete(decoded) => assert_eq!(&decoded[..], payload),
            DecodeOutcome::Incomplete => panic!("frame should be complete"),
        }
        assert!(buf.is_empty(), "no residual after a single whole frame");
    }

    #[test]
    fn roundtrips_across_boundary_sizes() {
        let codec = LengthFieldCodec::new(PrefixWidth::U32);
        for size in [0usize, 1, 128, 65535] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            roundtrip(&codec, &payload);
        }
    }

    #[test]
    fn little_endian_prefix_is_mirrored() {
        let codec = LengthFieldCodec::new(PrefixWidth::U16).with_order(ByteOrder::LittleEndian);
        let mut wire = BytesMut::new();
        codec.encode(&Bytes::from_static(b"abc"), &mut wire).unwrap();
        assert_eq!(&wire[..2], &[3u8, 0]);
        roundtrip(&codec, b"abc");
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let codec = LengthFieldCodec::new(PrefixWidth::U16);
        let mut wire = BytesMut::new();
        codec.encode(&Bytes::from_static(b"one"), &mut wire).unwrap();
        codec.encode(&Bytes::from_static(b"two"), &mut wire).unwrap();
        codec.encode(&Bytes::from_static(b"three"), &mut wire).unwrap();

        let mut frames = Vec::new();
        while let DecodeOutcome::Complete(frame) = codec.decode(&mut (), &mut wire).unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[2][..], b"three");
    }

    #[test]
    fn malicious_declared_length_is_rejected() {
        let codec = LengthFieldCodec::new(PrefixWidth::U32).with_max_frame(1024);
        let mut buf = BytesMut::from(&[0xffu8, 0xff, 0xff, 0xff][..]);
        let err = codec.decode(&mut (), &mut buf).unwrap_err();
        assert_eq!(err.code(), codes::CODEC_DECODE);
    }

    #[test]
    fn encode_rejects_unrepresentable_length() {
        let codec = LengthFieldCodec::new(PrefixWidth::U8);
        let payload = Bytes::from(alloc::vec![0u8; 300]);
        let err = codec.encode(&payload, &mut BytesMut::new()).unwrap_err();
        assert_eq!(err.code(), codes::CODEC_ENCODE);
    }
}
