//! 帧重组不变量：任意传输读切分都不改变解码结果。

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use ripple_codecs::{FrameCodec, LengthFieldCodec, PrefixWidth};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::frame::Frame;

/// 按给定切分点把线上字节逐块喂给解码器，收集全部产出帧。
fn feed_in_chunks<C: Codec>(codec: &C, wire: &[u8], cuts: &[usize]) -> Vec<C::Incoming> {
    let mut state = codec.open_state();
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();

    let mut last = 0usize;
    let mut boundaries: Vec<usize> = cuts.iter().map(|cut| cut % (wire.len() + 1)).collect();
    boundaries.push(wire.len());
    boundaries.sort_unstable();

    for boundary in boundaries {
        if boundary > last {
            buf.extend_from_slice(&wire[last..boundary]);
            last = boundary;
        }
        // 一次“读取”可能补齐多帧，循环排空。
        while let DecodeOutcome::Complete(frame) = codec.decode(&mut state, &mut buf).unwrap() {
            frames.push(frame);
        }
    }
    assert!(buf.is_empty(), "wire fully consumed leaves no residual");
    frames
}

#[test]
fn frame_of_128_bytes_survives_five_partial_writes() {
    let codec = FrameCodec;
    let payload = Bytes::from(vec![1u8; 128]);
    let mut wire = BytesMut::new();
    codec.encode(&Frame::with_u16_prefix(payload), &mut wire).unwrap();

    // 单次整写与五次零碎写必须产出同一帧。
    for cuts in [vec![], vec![1, 2, 40, 77]] {
        let frames = feed_in_chunks(&codec, &wire, &cuts);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].prefix_u16(), 128);
        assert_eq!(frames[0].payload().len(), 128);
    }
}

#[test]
fn max_u16_payload_reassembles() {
    let codec = LengthFieldCodec::new(PrefixWidth::U16);
    let payload: Vec<u8> = (0..65535usize).map(|i| (i % 256) as u8).collect();
    let mut wire = BytesMut::new();
    codec.encode(&Bytes::from(payload.clone()), &mut wire).unwrap();

    let frames = feed_in_chunks(&codec, &wire, &[3, 1000, 40000, 65000]);
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][..], &payload[..]);
}

proptest! {
    /// 对任意负载与任意切分序列，长度前缀帧恰好还原一帧且字节一致。
    #[test]
    fn arbitrary_chunking_yields_exactly_one_identical_frame(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        cuts in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let codec = LengthFieldCodec::new(PrefixWidth::U16);
        let mut wire = BytesMut::new();
        codec.encode(&Bytes::from(payload.clone()), &mut wire).unwrap();

        let frames = feed_in_chunks(&codec, &wire, &cuts);
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(&frames[0][..], &payload[..]);
    }

    /// 往返恒等：`encode(decode(bytes)) == bytes`。
    #[test]
    fn encode_decode_is_identity_on_the_wire(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let codec = FrameCodec;
        let mut wire = BytesMut::new();
        codec.encode(&Frame::with_u16_prefix(Bytes::from(payload)), &mut wire).unwrap();
        let original = wire.clone();

        let mut state = codec.open_state();
        let DecodeOutcome::Complete(frame) = codec.decode(&mut state, &mut wire).unwrap() else {
            panic!("complete wire must decode");
        };
        let mut rewire = BytesMut::new();
        codec.encode(&frame, &mut rewire).unwrap();
        prop_assert_eq!(&rewire[..], &original[..]);
    }
}
