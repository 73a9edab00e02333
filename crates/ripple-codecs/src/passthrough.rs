use bytes::{Bytes, BytesMut};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::CoreError;

/// 恒等编解码器：原始字节按到达的块直接上抛。
///
/// # 意图（Why）
/// - 当调用方希望自行处理字节（调试、代理转发、自定义协议）时，
///   用它把原始通道“类型化”为 `Bytes` 通道而不引入任何变换。
///
/// # 契约（What）
/// - `decode`：把当前缓冲的全部字节作为一个条目切出；空缓冲返回 `Incomplete`；
/// - `encode`：原样追加，永不失败；
/// - 条目边界即传输读取边界，上层不得依赖其与业务消息边界对齐。
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    type Incoming = Bytes;
    type Outgoing = Bytes;
    type State = ();

    fn decode(
        &self,
        _state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        if src.is_empty() {
            return Ok(DecodeOutcome::Incomplete);
        }
        Ok(DecodeOutcome::Complete(src.split().freeze()))
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        dst.extend_from_slice(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_chunk_is_one_item() {
        let codec = PassthroughCodec;
        let mut buf = BytesMut::from(&b"hello"[..]);
        match codec.decode(&mut (), &mut buf).unwrap() {
            DecodeOutcome::Complete(chunk) => assert_eq!(&chunk[..], b"hello"),
            DecodeOutcome::Incomplete => panic!("expected a chunk"),
        }
        assert!(buf.is_empty());
        assert_eq!(codec.decode(&mut (), &mut buf).unwrap(), DecodeOutcome::Incomplete);
    }
}
