use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{SluiceError, codes};
use crate::future::Eventual;
use crate::pipeline::{OutboundContext, OutboundHandler};

use super::ByteOrder;

/// 出站长度前缀编码器，[`super::LengthFieldBasedFrameDecoder`] 的写侧
/// 对偶：为每帧补上定宽长度字段。
pub struct LengthFieldPrepender {
    length_field_length: usize,
    byte_order: ByteOrder,
    length_includes_field: bool,
}

impl LengthFieldPrepender {
    /// 以字段宽度创建编码器。
    ///
    /// # 前置条件
    /// - `length_field_length` ∈ {1, 2, 4, 8}。
    pub fn new(length_field_length: usize) -> crate::error::Result<Self> {
        if !matches!(length_field_length, 1 | 2 | 4 | 8) {
            return Err(SluiceError::new(
                codes::CODEC_FRAME_TOO_SMALL,
                format!("invalid length field length {length_field_length}, expected 1/2/4/8"),
            ));
        }
        Ok(Self {
            length_field_length,
            byte_order: ByteOrder::BigEndian,
            length_includes_field: false,
        })
    }

    /// 设置字段字节序，默认网络序。
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// 长度值是否包含字段自身宽度。
    pub fn with_length_includes_field(mut self, includes: bool) -> Self {
        self.length_includes_field = includes;
        self
    }
}

impl OutboundHandler for LengthFieldPrepender {
    type Win = Bytes;
    type Wout = Bytes;

    fn on_write(&self, ctx: &OutboundContext<Bytes>, msg: Bytes) -> Eventual<()> {
        let mut length = msg.len() as u64;
        if self.length_includes_field {
            length += self.length_field_length as u64;
        }
        if self.length_field_length < 8 && length >= (1u64 << (self.length_field_length * 8)) {
            return Eventual::failed(SluiceError::new(
                codes::CODEC_FRAME_OVERSIZE,
                format!(
                    "frame length {length} does not fit a {}-byte length field",
                    self.length_field_length
                ),
            ));
        }

        let mut framed = BytesMut::with_capacity(self.length_field_length + msg.len());
        match self.byte_order {
            ByteOrder::BigEndian => framed.put_uint(length, self.length_field_length),
            ByteOrder::LittleEndian => framed.put_uint_le(length, self.length_field_length),
        }
        framed.extend_from_slice(&msg);
        ctx.fire_write(framed.freeze())
    }
}
