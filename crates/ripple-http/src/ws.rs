//! WebSocket：握手应答计算与消息帧编解码。
//!
//! 解码接受客户端的掩码帧并处理分片重组；编码输出服务端的无掩码
//! 单帧消息。超出协议最小集的扩展（permessage-deflate 等）不在范围内。

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};
use sha1::{Digest, Sha1};

use crate::head::RequestHead;

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

/// 一条完整的 WebSocket 消息（分片已重组）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// 文本消息，UTF-8 已校验。
    Text(String),
    /// 二进制消息。
    Binary(Bytes),
    /// Ping 控制帧。
    Ping(Bytes),
    /// Pong 控制帧。
    Pong(Bytes),
    /// 关闭帧：可选状态码与原因。
    Close {
        /// 关闭状态码。
        code: Option<u16>,
        /// 关闭原因（可为空）。
        reason: String,
    },
}

impl WsMessage {
    fn opcode(&self) -> u8 {
        match self {
            Self::Text(_) => OP_TEXT,
            Self::Binary(_) => OP_BINARY,
            Self::Ping(_) => OP_PING,
            Self::Pong(_) => OP_PONG,
            Self::Close { .. } => OP_CLOSE,
        }
    }
}

/// 跨帧的分片重组状态，每连接独享。
#[derive(Debug, Default)]
pub struct FragmentState {
    opcode: Option<u8>,
    buffer: BytesMut,
}

/// WebSocket 消息编解码器。
#[derive(Clone, Debug)]
pub struct WsCodec {
    max_message: usize,
}

impl WsCodec {
    /// 默认消息上限 1 MiB。
    pub fn new() -> Self {
        Self {
            max_message: 1 << 20,
        }
    }

    /// 调整重组后消息的大小上限。
    pub fn with_max_message(mut self, max_message: usize) -> Self {
        self.max_message = max_message;
        self
    }

    fn finish_message(&self, opcode: u8, payload: Bytes) -> ripple_core::Result<WsMessage, CoreError> {
        match opcode {
            OP_TEXT => {
                let text = String::from_utf8(payload.to_vec()).map_err(|err| {
                    CoreError::new(codes::CODEC_DECODE, "text message is not valid utf-8")
                        .with_cause(err)
                })?;
                Ok(WsMessage::Text(text))
            }
            OP_BINARY => Ok(WsMessage::Binary(payload)),
            _ => Err(CoreError::new(
                codes::CODEC_DECODE,
                "unexpected data opcode",
            )),
        }
    }
}

impl Default for WsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for WsCodec {
    type Incoming = WsMessage;
    type Outgoing = WsMessage;
    type State = FragmentState;

    fn decode(
        &self,
        state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        // 非终帧只推进重组状态，继续消费下一帧，直到凑出完整消息
        // 或缓冲耗尽。
        loop {
            if src.len() < 2 {
                return Ok(DecodeOutcome::Incomplete);
            }
            let b0 = src[0];
            let b1 = src[1];
            let fin = b0 & 0x80 != 0;
            let opcode = b0 & 0x0F;
            let masked = b1 & 0x80 != 0;
            let len7 = (b1 & 0x7F) as usize;

            let len_width = match len7 {
                126 => 2,
                127 => 8,
                _ => 0,
            };
            let header_len = 2 + len_width + if masked { 4 } else { 0 };
            if src.len() < header_len {
                return Ok(DecodeOutcome::Incomplete);
            }

            let payload_len = match len7 {
                126 => u16::from_be_bytes([src[2], src[3]]) as usize,
                127 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&src[2..10]);
                    let declared = u64::from_be_bytes(raw);
                    usize::try_from(declared).map_err(|_| {
                        CoreError::new(codes::CODEC_DECODE, "frame length exceeds address space")
                    })?
                }
                _ => len7,
            };
            if payload_len.saturating_add(state.buffer.len()) > self.max_message {
                return Err(CoreError::new(
                    codes::CODEC_DECODE,
                    "message exceeds the configured size limit",
                ));
            }
            if src.len() < header_len + payload_len {
                return Ok(DecodeOutcome::Incomplete);
            }

            let header = src.split_to(header_len);
            let mut payload = src.split_to(payload_len);
            if masked {
                let key = &header[header_len - 4..];
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= key[i % 4];
                }
            }
            let payload = payload.freeze();

            match opcode {
                OP_CONTINUATION => {
                    let Some(pending) = state.opcode else {
                        return Err(CoreError::new(
                            codes::CODEC_DECODE,
                            "continuation frame without a preceding fragment",
                        ));
                    };
                    state.buffer.extend_from_slice(&payload);
                    if fin {
                        state.opcode = None;
                        let whole = state.buffer.split().freeze();
                        return Ok(DecodeOutcome::Complete(
                            self.finish_message(pending, whole)?,
                        ));
                    }
                }
                OP_TEXT | OP_BINARY => {
                    if state.opcode.is_some() {
                        return Err(CoreError::new(
                            codes::CODEC_DECODE,
                            "interleaved data frames within a fragmented message",
                        ));
                    }
                    if fin {
                        return Ok(DecodeOutcome::Complete(
                            self.finish_message(opcode, payload)?,
                        ));
                    }
                    state.opcode = Some(opcode);
                    state.buffer.extend_from_slice(&payload);
                }
                OP_CLOSE | OP_PING | OP_PONG => {
                    if !fin || payload.len() > 125 {
                        return Err(CoreError::new(
                            codes::CODEC_DECODE,
                            "control frame is fragmented or oversized",
                        ));
                    }
                    let message = match opcode {
                        OP_PING => WsMessage::Ping(payload),
                        OP_PONG => WsMessage::Pong(payload),
                        _ => {
                            let (code, reason) = if payload.len() >= 2 {
                                let code = u16::from_be_bytes([payload[0], payload[1]]);
                                let reason =
                                    String::from_utf8_lossy(&payload[2..]).into_owned();
                                (Some(code), reason)
                            } else {
                                (None, String::new())
                            };
                            WsMessage::Close { code, reason }
                        }
                    };
                    return Ok(DecodeOutcome::Complete(message));
                }
                other => {
                    return Err(CoreError::new(codes::CODEC_DECODE, "unknown opcode")
                        .with_cause(UnknownOpcode(other)));
                }
            }
        }
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        let payload: Bytes = match item {
            WsMessage::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            WsMessage::Binary(data) | WsMessage::Ping(data) | WsMessage::Pong(data) => {
                data.clone()
            }
            WsMessage::Close { code, reason } => {
                let mut raw = BytesMut::new();
                if let Some(code) = code {
                    raw.put_u16(*code);
                    raw.extend_from_slice(reason.as_bytes());
                } else if !reason.is_empty() {
                    // 裸原因必须携带状态码才可表示。
                    return Err(CoreError::new(
                        codes::CODEC_ENCODE,
                        "close reason requires a close code",
                    ));
                }
                raw.freeze()
            }
        };

        let opcode = item.opcode();
        if matches!(opcode, OP_CLOSE | OP_PING | OP_PONG) && payload.len() > 125 {
            return Err(CoreError::new(
                codes::CODEC_ENCODE,
                "control frame payload exceeds 125 bytes",
            ));
        }

        // 服务端帧不掩码，FIN 恒置位（不做出站分片）。
        dst.put_u8(0x80 | opcode);
        match payload.len() {
            len if len < 126 => dst.put_u8(len as u8),
            len if len <= u16::MAX as usize => {
                dst.put_u8(126);
                dst.put_u16(len as u16);
            }
            len => {
                dst.put_u8(127);
                dst.put_u64(len as u64);
            }
        }
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

#[derive(Debug)]
struct UnknownOpcode(u8);

impl core::fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "opcode {:#x}", self.0)
    }
}

impl core::error::Error for UnknownOpcode {}

/// 由 `Sec-WebSocket-Key` 计算 `Sec-WebSocket-Accept`（SHA-1 + base64）。
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(GUID);
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// 校验升级请求并渲染 `101 Switching Protocols` 应答。
///
/// 缺失升级头、版本不是 13 或没有密钥都按 `http.upgrade` 拒绝。
pub fn handshake_response(head: &RequestHead) -> ripple_core::Result<String, CoreError> {
    if !head.is_websocket_upgrade() {
        return Err(CoreError::new(
            codes::HTTP_UPGRADE,
            "request does not carry websocket upgrade headers",
        ));
    }
    let version = head.headers().get("sec-websocket-version");
    if version != Some("13") {
        return Err(CoreError::new(
            codes::HTTP_UPGRADE,
            "unsupported websocket version",
        ));
    }
    let Some(key) = head.headers().get("sec-websocket-key") else {
        return Err(CoreError::new(
            codes::HTTP_UPGRADE,
            "missing sec-websocket-key",
        ));
    };

    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &WsCodec, state: &mut FragmentState, src: &mut BytesMut) -> Vec<WsMessage> {
        let mut out = Vec::new();
        while let DecodeOutcome::Complete(message) = codec.decode(state, src).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn accept_key_matches_the_rfc_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn decodes_the_rfc_masked_text_frame() {
        let codec = WsCodec::new();
        let mut state = FragmentState::default();
        let mut src = BytesMut::from(
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..],
        );
        let messages = decode_all(&codec, &mut state, &mut src);
        assert_eq!(messages, vec![WsMessage::Text("Hello".to_string())]);
        assert!(src.is_empty());
    }

    #[test]
    fn reassembles_fragmented_text() {
        let codec = WsCodec::new();
        let mut state = FragmentState::default();
        let mut src = BytesMut::new();
        // "Hel"（TEXT，未置 FIN）+ "lo"（CONTINUATION，FIN）。
        src.extend_from_slice(&[0x01, 0x03, b'H', b'e', b'l']);
        src.extend_from_slice(&[0x80, 0x02, b'l', b'o']);
        let messages = decode_all(&codec, &mut state, &mut src);
        assert_eq!(messages, vec![WsMessage::Text("Hello".to_string())]);
    }

    #[test]
    fn partial_frames_defer_until_bytes_arrive() {
        let codec = WsCodec::new();
        let mut state = FragmentState::default();
        let mut src = BytesMut::from(&[0x82, 0x04, 0x01, 0x02][..]);
        assert!(matches!(
            codec.decode(&mut state, &mut src).unwrap(),
            DecodeOutcome::Incomplete
        ));
        src.extend_from_slice(&[0x03, 0x04]);
        let messages = decode_all(&codec, &mut state, &mut src);
        assert_eq!(
            messages,
            vec![WsMessage::Binary(Bytes::from_static(&[1, 2, 3, 4]))]
        );
    }

    #[test]
    fn encode_uses_the_extended_length_forms() {
        let codec = WsCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(&WsMessage::Text("Hi".to_string()), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0x81, 0x02, b'H', b'i']);

        dst.clear();
        let big = WsMessage::Binary(Bytes::from(vec![0u8; 300]));
        codec.encode(&big, &mut dst).unwrap();
        assert_eq!(dst[0], 0x82);
        assert_eq!(dst[1], 126);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 300);
    }

    #[test]
    fn close_round_trips_code_and_reason() {
        let codec = WsCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                &WsMessage::Close {
                    code: Some(1000),
                    reason: "bye".to_string(),
                },
                &mut dst,
            )
            .unwrap();

        let mut state = FragmentState::default();
        let messages = decode_all(&codec, &mut state, &mut dst);
        assert_eq!(
            messages,
            vec![WsMessage::Close {
                code: Some(1000),
                reason: "bye".to_string(),
            }]
        );
    }

    #[test]
    fn control_frames_must_not_be_fragmented() {
        let codec = WsCodec::new();
        let mut state = FragmentState::default();
        // PING 未置 FIN。
        let mut src = BytesMut::from(&[0x09, 0x00][..]);
        let err = codec.decode(&mut state, &mut src).unwrap_err();
        assert_eq!(err.code(), codes::CODEC_DECODE);
    }

    #[test]
    fn handshake_requires_version_and_key() {
        let head = crate::head::RequestHead::parse(
            b"GET /live HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==",
        )
        .unwrap();
        let response = handshake_response(&head).unwrap();
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        let missing = crate::head::RequestHead::parse(
            b"GET /live HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket",
        )
        .unwrap();
        let err = handshake_response(&missing).unwrap_err();
        assert_eq!(err.code(), codes::HTTP_UPGRADE);
    }
}
