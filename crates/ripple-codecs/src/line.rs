use alloc::format;
use alloc::string::String;

use bytes::{BufMut, BytesMut};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};

/// 基于分隔符的文本编解码器。
///
/// # 设计动机（Why）
/// - 行分隔文本协议常见于日志流、命令通道，语义直观；
/// - 缺失分隔符不是错误：残余字节保留在逐连接缓冲里，等待下一次
///   传输读取补齐，只有不可恢复的编码错误（非法 UTF-8）才终止连接。
///
/// # 行为概览（How）
/// - `decode`：扫描首个分隔符，切出该帧并做 UTF-8 解码；未见分隔符时
///   校验行长预算后返回 `Incomplete`；
/// - `encode`：写入业务字节并追加分隔符。
///
/// # 权衡（Trade-offs）
/// - 不提供转义策略：业务文本若包含分隔符会破坏帧边界，需要二进制安全
///   时应改用 [`LengthFieldCodec`](crate::LengthFieldCodec)。
#[derive(Debug, Clone)]
pub struct LineCodec {
    delimiter: u8,
    max_line: Option<usize>,
}

impl LineCodec {
    /// 以 `\n` 分隔、不限行长构造。
    pub fn new() -> Self {
        Self {
            delimiter: b'\n',
            max_line: None,
        }
    }

    /// 替换分隔符字节。
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// 设置单行最大字节数（不含分隔符），超限即解码错误。
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = Some(max_line);
        self
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for LineCodec {
    type Incoming = String;
    type Outgoing = String;
    type State = ();

    fn decode(
        &self,
        _state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        let Some(pos) = src.iter().position(|byte| *byte == self.delimiter) else {
            // 分隔符未现身：只要累计字节仍在预算内，就继续等待下一次读取。
            if let Some(limit) = self.max_line
                && src.len() > limit
            {
                return Err(CoreError::new(
                    codes::CODEC_DECODE,
                    format!(
                        "line length {} exceeds budget {} before delimiter",
                        src.len(),
                        limit
                    ),
                ));
            }
            return Ok(DecodeOutcome::Incomplete);
        };

        if let Some(limit) = self.max_line
            && pos > limit
        {
            return Err(CoreError::new(
                codes::CODEC_DECODE,
                format!("line length {} exceeds budget {}", pos, limit),
            ));
        }

        let mut raw = src.split_to(pos + 1);
        raw.truncate(pos); // 去掉分隔符。
        match String::from_utf8(raw.to_vec()) {
            Ok(text) => Ok(DecodeOutcome::Complete(text)),
            Err(err) => Err(CoreError::new(
                codes::CODEC_DECODE,
                format!("line payload is not valid UTF-8: {}", err),
            )),
        }
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());
        dst.put_u8(self.delimiter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn splits_on_delimiter_and_keeps_residual() {
        let codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"hello\nwor"[..]);
        match codec.decode(&mut (), &mut buf).unwrap() {
            DecodeOutcome::Complete(line) => assert_eq!(line, "hello"),
            DecodeOutcome::Incomplete => panic!("expected a full line"),
        }
        // 残余的半行留在缓冲中等待补齐。
        assert_eq!(&buf[..], b"wor");
        assert_eq!(codec.decode(&mut (), &mut buf).unwrap(), DecodeOutcome::Incomplete);

        buf.extend_from_slice(b"ld\n");
        match codec.decode(&mut (), &mut buf).unwrap() {
            DecodeOutcome::Complete(line) => assert_eq!(line, "world"),
            DecodeOutcome::Incomplete => panic!("expected the second line"),
        }
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let codec = LineCodec::new();
        let mut buf = BytesMut::from(&[0xffu8, 0xfe, b'\n'][..]);
        let err = codec.decode(&mut (), &mut buf).unwrap_err();
        assert_eq!(err.code(), codes::CODEC_DECODE);
    }

    #[test]
    fn oversized_line_is_rejected() {
        let codec = LineCodec::new().with_max_line(4);
        let mut buf = BytesMut::from(&b"toolong\n"[..]);
        let err = codec.decode(&mut (), &mut buf).unwrap_err();
        assert!(err.message().contains("budget"), "{}", err);
    }

    #[test]
    fn encode_appends_delimiter() {
        let codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(&"ping".to_string(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"ping\n");
    }
}
