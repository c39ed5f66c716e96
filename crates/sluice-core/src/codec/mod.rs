//! 帧编解码。
//!
//! 解码侧：[`FrameDecoder`] 每次调用至多产出一帧，由
//! [`ByteToMessageHandler`] 驱动"解一帧、传一帧、再试一次"的循环；
//! 编码侧：[`LengthFieldPrepender`] 为出站帧补上长度前缀。

mod fixed;
mod length_field;
mod prepender;

pub use fixed::FixedLengthFrameDecoder;
pub use length_field::LengthFieldBasedFrameDecoder;
pub use prepender::LengthFieldPrepender;

use bytes::Bytes;

use crate::buffer::ByteQueue;
use crate::error::Result;
use crate::pipeline::{InboundContext, InboundHandler};

/// 长度字段的字节序。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    /// 网络序（大端）。
    BigEndian,
    /// 小端。
    LittleEndian,
}

impl ByteOrder {
    pub(crate) fn is_big_endian(self) -> bool {
        matches!(self, ByteOrder::BigEndian)
    }
}

/// 从字节队列中切分离散帧的解码器。
///
/// # 契约说明（What）
/// - `Ok(Some(frame))`：产出一帧，相应字节已从队列消费；
/// - `Ok(None)`：数据不足，未消费任何字节，等待更多输入；
/// - `Err(err)`：协议违规；违规字节已按各解码器的文档从队列消费，错误
///   由驱动链节转为 `read_exception` 事件继续传播；
/// - 每次调用至多产出一帧，由调用方循环驱动直到无进展。
pub trait FrameDecoder: Send + Sync + 'static {
    /// 尝试从队列头部切出一帧。
    fn decode(&self, queue: &ByteQueue) -> Result<Option<Bytes>>;
}

/// 解码驱动链节：`ByteQueue` 入、[`Bytes`] 帧出。
///
/// 每次入站交付循环调用解码器：产出的帧逐一向后传播，协议违规转为
/// `read_exception` 后本轮停止（后续交付会继续推进）。
pub struct ByteToMessageHandler<D: FrameDecoder> {
    decoder: D,
}

impl<D: FrameDecoder> ByteToMessageHandler<D> {
    /// 包装一个解码器。
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// 解码器访问器。
    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D: FrameDecoder> InboundHandler for ByteToMessageHandler<D> {
    type Rin = ByteQueue;
    type Rout = Bytes;

    fn on_read(&self, ctx: &InboundContext<Bytes>, queue: ByteQueue) {
        loop {
            match self.decoder.decode(&queue) {
                Ok(Some(frame)) => ctx.fire_read(frame),
                Ok(None) => break,
                Err(err) => {
                    ctx.fire_read_exception(err);
                    break;
                }
            }
        }
    }
}
