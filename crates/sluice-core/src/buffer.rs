use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;

/// 入站字节累积队列。
///
/// # 设计背景（Why）
/// - 终端传输 Handler 持续向队列追加收到的字节，解码器从队列头部消费；
///   二者位于同一条链路上却分属不同链节，因此队列以"句柄"形式在链路中
///   传递：[`Clone`] 复制的是句柄，底层缓冲共享。
/// - 管道固定绑定单个事件循环线程，队列的互斥锁仅为满足 `Send + Sync`
///   约束，运行期不存在争用。
///
/// # 契约说明（What）
/// - `append` 追加字节；`split_to` 冻结并取走头部 `n` 字节；
/// - `trim_start` 丢弃头部至多 `n` 字节并返回实际丢弃量——队列短于 `n`
///   时按现有长度截断，调用方据此实现"尽力丢弃"语义；
/// - `read_uint_at` 以指定宽度与端序读取定长无符号整数，不消费字节。
#[derive(Clone, Default)]
pub struct ByteQueue {
    inner: Arc<Mutex<BytesMut>>,
}

impl ByteQueue {
    /// 创建空队列。
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前累积的字节数。
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 队列是否为空。
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 追加一段字节到队列尾部。
    pub fn append(&self, data: &[u8]) {
        self.inner.lock().extend_from_slice(data);
    }

    /// 预留至少 `additional` 字节的尾部空间。
    pub fn reserve(&self, additional: usize) {
        self.inner.lock().reserve(additional);
    }

    /// 取走头部 `n` 字节并冻结为 [`Bytes`]。
    ///
    /// # 前置条件
    /// - `n <= self.len()`，由调用方保证；解码器总是在长度检查之后调用。
    pub fn split_to(&self, n: usize) -> Bytes {
        self.inner.lock().split_to(n).freeze()
    }

    /// 丢弃头部至多 `n` 字节，返回实际丢弃的字节数。
    pub fn trim_start(&self, n: usize) -> usize {
        let mut inner = self.inner.lock();
        let take = n.min(inner.len());
        inner.advance(take);
        take
    }

    /// 在偏移 `offset` 处读取宽度为 `width` 字节的无符号整数，不消费。
    ///
    /// 数据不足时返回 `None`。`width` 合法取值为 1/2/4/8，由解码器的
    /// 构造校验保证。
    pub fn read_uint_at(&self, offset: usize, width: usize, big_endian: bool) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.len() < offset + width {
            return None;
        }
        let field = &inner[offset..offset + width];
        let mut value = 0u64;
        if big_endian {
            for byte in field {
                value = (value << 8) | u64::from(*byte);
            }
        } else {
            for byte in field.iter().rev() {
                value = (value << 8) | u64::from(*byte);
            }
        }
        Some(value)
    }

    /// 拷贝整个队列内容，仅用于诊断与测试。
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().to_vec()
    }
}

impl std::fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_split_round_trips() {
        let queue = ByteQueue::new();
        queue.append(b"hello ");
        queue.append(b"world");
        assert_eq!(queue.len(), 11);
        assert_eq!(&queue.split_to(5)[..], b"hello");
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn trim_start_is_best_effort_on_short_queue() {
        let queue = ByteQueue::new();
        queue.append(b"abc");
        assert_eq!(queue.trim_start(10), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn read_uint_respects_width_and_order() {
        let queue = ByteQueue::new();
        queue.append(&[0xff, 0x00, 0x00, 0x00, 0x05]);
        assert_eq!(queue.read_uint_at(1, 4, true), Some(5));
        assert_eq!(queue.read_uint_at(1, 4, false), Some(0x0500_0000));
        assert_eq!(queue.read_uint_at(1, 8, true), None);
    }

    #[test]
    fn clones_share_the_same_backing_buffer() {
        let queue = ByteQueue::new();
        let alias = queue.clone();
        queue.append(b"shared");
        assert_eq!(alias.len(), 6);
        alias.trim_start(6);
        assert!(queue.is_empty());
    }
}
