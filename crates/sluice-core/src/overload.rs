//! 受控延迟（CoDel）过载检测。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::time::{Clock, SystemClock};

/// CoDel 参数。
#[derive(Clone, Copy, Debug)]
pub struct CodelOptions {
    /// 目标排队延迟，超过即视为拥塞信号。
    pub target_delay: Duration,
    /// 滑动窗口长度。
    pub interval: Duration,
}

impl Default for CodelOptions {
    fn default() -> Self {
        Self { target_delay: Duration::from_millis(5), interval: Duration::from_millis(100) }
    }
}

/// 受控延迟过载检测器。
///
/// # 判定模型（What）
/// - 在滑动窗口内跟踪观测到的最小排队延迟；窗口翻转时，若窗口内最小
///   延迟超过目标值则进入过载态，否则退出；
/// - 过载态下，延迟超过 2 倍目标值的请求判为应当丢弃；
/// - 窗口翻转由单线程认领（原子交换），保证每窗口恰好一个线程执行
///   最小值重置；
/// - `load()` 归一化为 0–100：`min(100, 最小延迟 / (2 × 目标))`。
///
/// # 并发契约
/// - 全部状态为原子量，可被任意多线程并发调用 `overloaded`。
pub struct Codel {
    options: CodelOptions,
    clock: Arc<dyn Clock>,
    /// 窗口内最小延迟，微秒。
    min_delay_us: AtomicU64,
    /// 当前窗口的截止时刻，相对 `epoch` 的微秒数。
    interval_deadline_us: AtomicU64,
    reset_delay: AtomicBool,
    overloaded: AtomicBool,
    epoch: Instant,
}

impl Codel {
    /// 以默认参数（目标 5ms，窗口 100ms）创建。
    pub fn new() -> Self {
        Self::with_options(CodelOptions::default())
    }

    /// 以显式参数创建。
    pub fn with_options(options: CodelOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// 注入时钟，供测试确定性推进窗口。
    pub fn with_clock(options: CodelOptions, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            options,
            clock,
            min_delay_us: AtomicU64::new(0),
            interval_deadline_us: AtomicU64::new(0),
            reset_delay: AtomicBool::new(true),
            overloaded: AtomicBool::new(false),
            epoch,
        }
    }

    /// 上报一次排队延迟，返回该请求是否应当被丢弃。
    pub fn overloaded(&self, delay: Duration) -> bool {
        let now_us = self.now_us();
        let delay_us = delay.as_micros().min(u128::from(u64::MAX)) as u64;

        // 窗口到期后由恰好一个线程翻转窗口并重算过载态。
        let min_delay = self.min_delay_us.load(Ordering::Acquire);
        if now_us > self.interval_deadline_us.load(Ordering::Acquire)
            && !self.reset_delay.load(Ordering::Acquire)
            && !self.reset_delay.swap(true, Ordering::AcqRel)
        {
            let interval_us = self.options.interval.as_micros() as u64;
            self.interval_deadline_us.store(now_us + interval_us, Ordering::Release);
            let target_us = self.target_us();
            self.overloaded.store(min_delay > target_us, Ordering::Release);
        }

        // 认领重置的线程写入新窗口的首个样本；窗口内只需一个请求时
        // 不触发丢弃。
        if self.reset_delay.load(Ordering::Acquire) && self.reset_delay.swap(false, Ordering::AcqRel)
        {
            self.min_delay_us.store(delay_us, Ordering::Release);
            return false;
        }
        if delay_us < self.min_delay_us.load(Ordering::Acquire) {
            self.min_delay_us.store(delay_us, Ordering::Release);
        }

        self.overloaded.load(Ordering::Acquire) && delay_us > 2 * self.target_us()
    }

    /// 归一化负载：`min(100, 最小延迟 / (2 × 目标延迟))`。
    pub fn load(&self) -> u64 {
        let target_ms = self.options.target_delay.as_millis().max(1) as u64;
        let min_delay_ms = self.min_delay_us.load(Ordering::Acquire) / 1000;
        (min_delay_ms / (2 * target_ms)).min(100)
    }

    /// 窗口内最小延迟。
    pub fn min_delay(&self) -> Duration {
        Duration::from_micros(self.min_delay_us.load(Ordering::Acquire))
    }

    fn target_us(&self) -> u64 {
        self.options.target_delay.as_micros() as u64
    }

    fn now_us(&self) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_micros()
            .min(u128::from(u64::MAX)) as u64
    }
}

impl Default for Codel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    const MS: Duration = Duration::from_millis(1);

    fn codel_with_manual_clock() -> (Codel, ManualClock) {
        let clock = ManualClock::new();
        let codel = Codel::with_clock(CodelOptions::default(), Arc::new(clock.clone()));
        (codel, clock)
    }

    #[test]
    fn consistently_low_delay_never_overloads() {
        let (codel, clock) = codel_with_manual_clock();
        for _ in 0..10 {
            clock.advance(20 * MS);
            assert!(!codel.overloaded(MS), "1ms samples must never shed");
        }
        assert_eq!(codel.load(), 0);
    }

    #[test]
    fn sustained_high_delay_flips_to_overloaded_and_sheds() {
        let (codel, clock) = codel_with_manual_clock();
        // 第一个窗口：全部样本都超过目标值，窗口最小值停留在 20ms。
        codel.overloaded(20 * MS);
        for _ in 0..5 {
            clock.advance(30 * MS);
            codel.overloaded(20 * MS);
        }
        // 窗口翻转后进入过载态：高于 2×target 的样本被丢弃，低的放行。
        clock.advance(150 * MS);
        codel.overloaded(20 * MS);
        assert!(codel.overloaded(20 * MS), "above 2x target while overloaded -> shed");
        assert!(!codel.overloaded(9 * MS), "at or below 2x target -> admit");
    }

    #[test]
    fn first_sample_of_a_window_is_never_shed() {
        let (codel, clock) = codel_with_manual_clock();
        assert!(!codel.overloaded(50 * MS), "window seed sample must pass");
        clock.advance(10 * MS);
        assert!(!codel.overloaded(50 * MS), "seed sample of a fresh window is admitted");
    }

    #[test]
    fn load_is_normalized_against_double_target() {
        let (codel, clock) = codel_with_manual_clock();
        codel.overloaded(40 * MS);
        clock.advance(MS);
        codel.overloaded(40 * MS);
        assert_eq!(codel.load(), 4, "40ms min over 2x5ms target");
    }
}
