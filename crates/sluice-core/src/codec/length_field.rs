use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::buffer::ByteQueue;
use crate::error::{Result, SluiceError, codes};

use super::{ByteOrder, FrameDecoder};

/// 长度前缀帧解码器。
///
/// # 帧模型（What）
/// - 帧总长 `total = 长度字段值 + length_adjustment + (offset + 字段宽度)`；
/// - 交付的帧为总长去掉头部 `initial_bytes_to_strip` 字节后的剩余部分；
/// - 全部参数在构造时确定，之后不可变。
///
/// # 错误路径
/// - `total` 小于头部长度：消费头部字节，报
///   [`codes::CODEC_FRAME_TOO_SMALL`]；
/// - `total` 超过上限：尽力消费 `total` 字节（队列不足时记账，后续交付
///   继续丢弃直到补齐，流在帧边界处重新对齐），报
///   [`codes::CODEC_FRAME_OVERSIZE`]；
/// - `initial_bytes_to_strip` 大于整帧：消费整帧，报
///   [`codes::CODEC_STRIP_EXCEEDS_FRAME`]。
pub struct LengthFieldBasedFrameDecoder {
    length_field_length: usize,
    max_frame_length: u64,
    length_field_offset: usize,
    length_adjustment: i64,
    initial_bytes_to_strip: usize,
    byte_order: ByteOrder,
    length_field_end_offset: usize,
    pending_discard: AtomicU64,
}

impl LengthFieldBasedFrameDecoder {
    /// 创建解码器。
    ///
    /// # 前置条件
    /// - `length_field_length` ∈ {1, 2, 4, 8}；
    /// - `max_frame_length > 0`。
    pub fn new(length_field_length: usize, max_frame_length: u64) -> Result<Self> {
        if !matches!(length_field_length, 1 | 2 | 4 | 8) {
            return Err(SluiceError::new(
                codes::CODEC_FRAME_TOO_SMALL,
                format!("invalid length field length {length_field_length}, expected 1/2/4/8"),
            ));
        }
        if max_frame_length == 0 {
            return Err(SluiceError::new(
                codes::CODEC_FRAME_OVERSIZE,
                "max frame length must be positive",
            ));
        }
        Ok(Self {
            length_field_length,
            max_frame_length,
            length_field_offset: 0,
            length_adjustment: 0,
            initial_bytes_to_strip: 0,
            byte_order: ByteOrder::BigEndian,
            length_field_end_offset: length_field_length,
            pending_discard: AtomicU64::new(0),
        })
    }

    /// 设置长度字段前的偏移。
    ///
    /// # 前置条件
    /// - `offset <= max_frame_length - length_field_length`。
    pub fn with_length_field_offset(mut self, offset: usize) -> Result<Self> {
        let limit = self.max_frame_length.saturating_sub(self.length_field_length as u64);
        if offset as u64 > limit {
            return Err(SluiceError::new(
                codes::CODEC_FRAME_OVERSIZE,
                format!("length field offset {offset} exceeds max frame budget {limit}"),
            ));
        }
        self.length_field_offset = offset;
        self.length_field_end_offset = offset + self.length_field_length;
        Ok(self)
    }

    /// 设置加到解析值上的修正量，可为负。
    pub fn with_length_adjustment(mut self, adjustment: i64) -> Self {
        self.length_adjustment = adjustment;
        self
    }

    /// 设置交付前从帧首剥离的字节数。
    pub fn with_initial_bytes_to_strip(mut self, strip: usize) -> Self {
        self.initial_bytes_to_strip = strip;
        self
    }

    /// 设置长度字段的字节序，默认网络序。
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// 推进尚未丢弃完的超限帧，返回是否仍有欠账。
    fn drain_pending_discard(&self, queue: &ByteQueue) -> bool {
        let pending = self.pending_discard.load(Ordering::Acquire);
        if pending == 0 {
            return false;
        }
        let take = usize::try_from(pending).unwrap_or(usize::MAX);
        let trimmed = queue.trim_start(take) as u64;
        let remaining = pending - trimmed;
        self.pending_discard.store(remaining, Ordering::Release);
        remaining > 0
    }
}

impl FrameDecoder for LengthFieldBasedFrameDecoder {
    fn decode(&self, queue: &ByteQueue) -> Result<Option<Bytes>> {
        if self.drain_pending_discard(queue) {
            return Ok(None);
        }

        if queue.len() < self.length_field_end_offset {
            return Ok(None);
        }
        let Some(unadjusted) = queue.read_uint_at(
            self.length_field_offset,
            self.length_field_length,
            self.byte_order.is_big_endian(),
        ) else {
            return Ok(None);
        };

        let header = self.length_field_end_offset;
        let total = i128::from(unadjusted) + i128::from(self.length_adjustment) + header as i128;

        if total < header as i128 {
            queue.trim_start(header);
            return Err(SluiceError::new(
                codes::CODEC_FRAME_TOO_SMALL,
                format!("frame length {total} smaller than header {header}"),
            ));
        }
        let total = total as u64;

        if total > self.max_frame_length {
            let want = usize::try_from(total).unwrap_or(usize::MAX);
            let trimmed = queue.trim_start(want) as u64;
            self.pending_discard.store(total - trimmed, Ordering::Release);
            return Err(SluiceError::new(
                codes::CODEC_FRAME_OVERSIZE,
                format!("frame larger than {}", self.max_frame_length),
            ));
        }

        let total = total as usize;
        if queue.len() < total {
            return Ok(None);
        }

        if self.initial_bytes_to_strip > total {
            queue.trim_start(total);
            return Err(SluiceError::new(
                codes::CODEC_STRIP_EXCEEDS_FRAME,
                format!(
                    "initial_bytes_to_strip {} larger than frame {total}",
                    self.initial_bytes_to_strip
                ),
            ));
        }

        queue.trim_start(self.initial_bytes_to_strip);
        Ok(Some(queue.split_to(total - self.initial_bytes_to_strip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &LengthFieldBasedFrameDecoder, queue: &ByteQueue) -> (Vec<Bytes>, Vec<SluiceError>) {
        let mut frames = Vec::new();
        let mut errors = Vec::new();
        loop {
            match decoder.decode(queue) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => errors.push(err),
            }
        }
        (frames, errors)
    }

    #[test]
    fn reassembles_frame_across_arbitrary_chunks() {
        let decoder = LengthFieldBasedFrameDecoder::new(4, 1024).expect("valid params");
        let queue = ByteQueue::new();
        let chunks: [&[u8]; 4] = [&[0x00], &[0x00, 0x00, 0x05], &[0x48, 0x45], &[0x4c, 0x4c, 0x4f]];

        let mut frames = Vec::new();
        for chunk in chunks {
            queue.append(chunk);
            let (mut produced, errors) = drain(&decoder, &queue);
            assert!(errors.is_empty(), "no error expected mid-frame");
            frames.append(&mut produced);
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"\x00\x00\x00\x05HELLO");
        assert!(queue.is_empty());
    }

    #[test]
    fn strip_removes_the_length_prefix_from_delivery() {
        let decoder = LengthFieldBasedFrameDecoder::new(4, 1024)
            .expect("valid params")
            .with_initial_bytes_to_strip(4);
        let queue = ByteQueue::new();
        queue.append(b"\x00\x00\x00\x05HELLO");
        let (frames, errors) = drain(&decoder, &queue);
        assert!(errors.is_empty());
        assert_eq!(&frames[0][..], b"HELLO");
    }

    #[test]
    fn oversize_frame_raises_and_discards_best_effort() {
        let decoder = LengthFieldBasedFrameDecoder::new(4, 1024).expect("valid params");
        let queue = ByteQueue::new();
        // 长度 1025 → 总长 1029，超过 1024。
        queue.append(&[0x00, 0x00, 0x04, 0x01]);

        let err = decoder.decode(&queue).expect_err("oversize must raise");
        assert_eq!(err.code(), codes::CODEC_FRAME_OVERSIZE);
        assert!(err.message().contains("larger than 1024"));
        assert!(queue.is_empty(), "present bytes are consumed immediately");

        // 后续到达的 1025 字节属于超限帧，继续被丢弃，直到欠账补齐。
        queue.append(&vec![0xaa; 1000]);
        assert!(decoder.decode(&queue).expect("still discarding").is_none());
        assert!(queue.is_empty());

        queue.append(&vec![0xbb; 25]);
        assert!(decoder.decode(&queue).expect("discard tail").is_none());
        assert!(queue.is_empty());

        // 欠账结清后，流在下一帧边界恢复正常。
        queue.append(b"\x00\x00\x00\x02ok");
        let (frames, errors) = drain(&decoder, &queue);
        assert!(errors.is_empty());
        assert_eq!(&frames[0][..], b"\x00\x00\x00\x02ok");
    }

    #[test]
    fn negative_adjustment_can_shrink_total_below_header() {
        let decoder = LengthFieldBasedFrameDecoder::new(4, 1024)
            .expect("valid params")
            .with_length_adjustment(-8);
        let queue = ByteQueue::new();
        queue.append(&[0x00, 0x00, 0x00, 0x02, 0x01, 0x02]);
        let err = decoder.decode(&queue).expect_err("frame too small");
        assert_eq!(err.code(), codes::CODEC_FRAME_TOO_SMALL);
        // 头部四字节被消费，载荷保留在队列中。
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn strip_larger_than_frame_consumes_whole_frame() {
        let decoder = LengthFieldBasedFrameDecoder::new(1, 64)
            .expect("valid params")
            .with_initial_bytes_to_strip(16);
        let queue = ByteQueue::new();
        queue.append(&[0x02, 0xde, 0xad]);
        let err = decoder.decode(&queue).expect_err("strip exceeds frame");
        assert_eq!(err.code(), codes::CODEC_STRIP_EXCEEDS_FRAME);
        assert!(queue.is_empty());
    }

    #[test]
    fn little_endian_length_field_and_offset() {
        let decoder = LengthFieldBasedFrameDecoder::new(2, 1024)
            .expect("valid params")
            .with_length_field_offset(2)
            .expect("valid offset")
            .with_byte_order(ByteOrder::LittleEndian)
            .with_initial_bytes_to_strip(4);
        let queue = ByteQueue::new();
        queue.append(&[0xca, 0xfe, 0x03, 0x00, b'a', b'b', b'c']);
        let (frames, errors) = drain(&decoder, &queue);
        assert!(errors.is_empty());
        assert_eq!(&frames[0][..], b"abc");
    }

    #[test]
    fn rejects_invalid_construction_parameters() {
        assert!(LengthFieldBasedFrameDecoder::new(3, 1024).is_err());
        assert!(LengthFieldBasedFrameDecoder::new(4, 0).is_err());
        let err = LengthFieldBasedFrameDecoder::new(4, 16)
            .expect("valid base")
            .with_length_field_offset(13)
            .expect_err("offset must respect max - width");
        assert_eq!(err.code(), codes::CODEC_FRAME_OVERSIZE);
    }
}
