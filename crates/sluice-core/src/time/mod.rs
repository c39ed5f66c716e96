//! 可注入的时钟抽象，供过载检测等时间敏感组件在测试中获得确定性。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 抽象"获取当前单调时间"的能力。
///
/// # 设计背景（Why）
/// - 过载检测（见 [`crate::overload`]）依赖滑动时间窗；直接调用
///   `Instant::now()` 会让窗口推进无法在测试中复现；
/// - 通过 trait 注入后，生产路径使用 [`SystemClock`]，测试使用
///   [`ManualClock`] 手动推进时间轴。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 直通系统单调时钟。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的虚拟时钟，服务于单元测试的确定性需求。
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// 以当前时刻为起点创建虚拟时钟。
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Instant::now())) }
    }

    /// 将虚拟时间向前推进 `delta`。
    pub fn advance(&self, delta: Duration) {
        let mut now = self.inner.lock();
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.inner.lock()
    }
}
