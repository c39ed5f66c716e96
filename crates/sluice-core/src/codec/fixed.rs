use bytes::Bytes;

use crate::buffer::ByteQueue;
use crate::error::Result;

use super::FrameDecoder;

/// 定长帧解码器：每攒够 `length` 字节切出一帧。
///
/// 分片 `A | BC | DEFG | HI` 在 `length = 3` 下产出 `ABC | DEF | GHI`。
pub struct FixedLengthFrameDecoder {
    length: usize,
}

impl FixedLengthFrameDecoder {
    /// 以固定帧长创建解码器。
    pub fn new(length: usize) -> Self {
        Self { length: length.max(1) }
    }
}

impl FrameDecoder for FixedLengthFrameDecoder {
    fn decode(&self, queue: &ByteQueue) -> Result<Option<Bytes>> {
        if queue.len() < self.length {
            return Ok(None);
        }
        Ok(Some(queue.split_to(self.length)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regroups_fragments_into_fixed_frames() {
        let decoder = FixedLengthFrameDecoder::new(3);
        let queue = ByteQueue::new();
        let mut frames = Vec::new();
        for chunk in [&b"A"[..], b"BC", b"DEFG", b"HI"] {
            queue.append(chunk);
            while let Ok(Some(frame)) = decoder.decode(&queue) {
                frames.push(frame);
            }
        }
        let collected: Vec<&[u8]> = frames.iter().map(|f| &f[..]).collect();
        assert_eq!(collected, vec![&b"ABC"[..], b"DEF", b"GHI"]);
    }
}
