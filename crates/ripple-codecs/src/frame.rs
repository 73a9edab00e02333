use alloc::format;

use bytes::BytesMut;
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};
use ripple_core::frame::Frame;

/// 2 字节前缀的 `Frame` 编解码器。
///
/// # 意图（Why）
/// - 与 [`LengthFieldCodec`](crate::LengthFieldCodec) 的区别在于暴露层级：
///   本编解码器把原始前缀字节连同负载一起交给调用方（`Frame{prefix, payload}`），
///   供需要读取前缀内元数据的协议使用；
/// - 前缀按大端 `u16` 解读为负载长度。
///
/// # 契约（What）
/// - 解码产出的 `Frame` 满足 `payload.len() == prefix 声明长度`；
/// - 编码要求 `Frame` 自洽（前缀 2 字节且声明长度等于负载长度），
///   否则判为 `codec.encode`；
/// - 由于前缀字节原样保留，`encode(decode(bytes)) == bytes` 成立。
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// 前缀宽度：2 字节。
    pub const PREFIX_LEN: usize = 2;
}

impl Codec for FrameCodec {
    type Incoming = Frame;
    type Outgoing = Frame;
    type State = ();

    fn decode(
        &self,
        _state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        if src.len() < Self::PREFIX_LEN {
            return Ok(DecodeOutcome::Incomplete);
        }

        let declared = usize::from(u16::from_be_bytes([src[0], src[1]]));
        if src.len() < Self::PREFIX_LEN + declared {
            return Ok(DecodeOutcome::Incomplete);
        }

        let prefix = src.split_to(Self::PREFIX_LEN).freeze();
        let payload = src.split_to(declared).freeze();
        Ok(DecodeOutcome::Complete(Frame::new(prefix, payload)))
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        if item.prefix().len() != Self::PREFIX_LEN {
            return Err(CoreError::new(
                codes::CODEC_ENCODE,
                format!("frame prefix must be 2 bytes, got {}", item.prefix().len()),
            ));
        }
        let declared = usize::from(item.prefix_u16());
        if declared != item.payload().len() {
            return Err(CoreError::new(
                codes::CODEC_ENCODE,
                format!(
                    "frame prefix declares {} bytes but payload has {}",
                    declared,
                    item.payload().len()
                ),
            ));
        }

        dst.reserve(Self::PREFIX_LEN + item.payload().len());
        dst.extend_from_slice(item.prefix());
        dst.extend_from_slice(item.payload());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frame_preserves_prefix_bytes() {
        let codec = FrameCodec;
        let frame = Frame::with_u16_prefix(Bytes::from(alloc::vec![1u8; 128]));

        let mut wire = BytesMut::new();
        codec.encode(&frame, &mut wire).unwrap();
        let original = wire.clone();

        match codec.decode(&mut (), &mut wire).unwrap() {
            DecodeOutcome::Complete(decoded) => {
                assert_eq!(decoded.prefix_u16(), 128);
                assert_eq!(decoded.payload().len(), 128);

                let mut rewire = BytesMut::new();
                codec.encode(&decoded, &mut rewire).unwrap();
                assert_eq!(&rewire[..], &original[..], "round-trip must be byte-identical");
            }
            DecodeOutcome::Incomplete => panic!("frame should be complete"),
        }
    }

    #[test]
    fn inconsistent_frame_is_an_encode_error() {
        let codec = FrameCodec;
        let frame = Frame::new(Bytes::from_static(&[0, 4]), Bytes::from_static(b"xy"));
        let err = codec.encode(&frame, &mut BytesMut::new()).unwrap_err();
        assert_eq!(err.code(), codes::CODEC_ENCODE);
    }

    #[test]
    fn zero_length_frame_roundtrips() {
        let codec = FrameCodec;
        let mut wire = BytesMut::new();
        codec.encode(&Frame::with_u16_prefix(Bytes::new()), &mut wire).unwrap();
        assert_eq!(&wire[..], &[0u8, 0]);
        match codec.decode(&mut (), &mut wire).unwrap() {
            DecodeOutcome::Complete(frame) => assert!(frame.payload().is_empty()),
            DecodeOutcome::Incomplete => panic!("zero frame should decode"),
        }
    }
}
