use alloc::format;
use core::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use ripple_core::codec::{Codec, DecodeOutcome};
use ripple_core::error::{CoreError, codes};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// 行分隔 JSON 的结构化对象编解码器。
///
/// # 设计动机（Why）
/// - “结构化对象编解码”需要一个与传输读边界无关的显式分帧；原始实现
///   依赖底层缓冲块边界切分 JSON，本实现改为每条记录一行（NDJSON），
///   使帧重组不变量对结构化协议同样成立（决策记录见 DESIGN.md）；
/// - 业务形状由调用方通过类型参数 `T` 指定，serde 负责映射。
///
/// # 契约（What）
/// - `decode`：切出下一行并 `serde_json` 反序列化；空行跳过；负载不可解析
///   返回 `codec.decode`；
/// - `encode`：序列化失败（值不可表示）返回 `codec.encode` 并放弃本次写出。
#[derive(Debug)]
pub struct JsonCodec<T> {
    max_record: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// 构造不限记录长度的 JSON 编解码器。
    pub fn new() -> Self {
        Self {
            max_record: None,
            _marker: PhantomData,
        }
    }

    /// 设置单条记录的最大字节数。
    pub fn with_max_record(mut self, max_record: usize) -> Self {
        self.max_record = Some(max_record);
        self
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            max_record: self.max_record,
            _marker: PhantomData,
        }
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Incoming = T;
    type Outgoing = T;
    type State = ();

    fn decode(
        &self,
        _state: &mut Self::State,
        src: &mut BytesMut,
    ) -> ripple_core::Result<DecodeOutcome<Self::Incoming>, CoreError> {
        loop {
            let Some(pos) = src.iter().position(|byte| *byte == b'\n') else {
                if let Some(limit) = self.max_record
                    && src.len() > limit
                {
                    return Err(CoreError::new(
                        codes::CODEC_DECODE,
                        format!("json record length {} exceeds budget {}", src.len(), limit),
                    ));
                }
                return Ok(DecodeOutcome::Incomplete);
            };

            let raw = src.split_to(pos + 1);
            let line = &raw[..pos];
            if line.iter().all(u8::is_ascii_whitespace) {
                // 空行不构成记录，继续扫描。
                continue;
            }

            return serde_json::from_slice(line)
                .map(DecodeOutcome::Complete)
                .map_err(|err| {
                    CoreError::new(
                        codes::CODEC_DECODE,
                        format!("json record is not deserializable: {}", err),
                    )
                });
        }
    }

    fn encode(
        &self,
        item: &Self::Outgoing,
        dst: &mut BytesMut,
    ) -> ripple_core::Result<(), CoreError> {
        let raw = serde_json::to_vec(item).map_err(|err| {
            CoreError::new(
                codes::CODEC_ENCODE,
                format!("value is not serializable as json: {}", err),
            )
        })?;
        dst.reserve(raw.len() + 1);
        dst.extend_from_slice(&raw);
        dst.put_u8(b'\n');
        Ok(())
    }
}
