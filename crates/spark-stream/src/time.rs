//! 时间抽象，提供可注入的单调时钟以支撑吞吐计量与节拍调度在测试中的确定性。
//!
//! # 模块定位（Why）
//! - 吞吐计量依赖“自上次重置以来经过的时间”；若直接调用系统时钟，刷新窗口的断言将无法复现；
//! - `Clock` trait 只暴露 `now`，调用方在生产环境注入 [`SystemClock`]，在测试中注入 [`MockClock`]。
//!
//! # 使用指引（How）
//! - 推荐通过 `Arc<dyn Clock>` 传递给需要时间能力的组件；
//! - 测试中调用 [`MockClock::advance`] 推进虚拟时间。

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// 单调时间源。
///
/// # 接口约束（What）
/// - 实现者必须保证 `now` 单调不减；
/// - 实现需 `Send + Sync`，以便在控制线程与循环线程之间共享。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 直接委托 [`Instant::now`] 的系统时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 虚拟时钟：通过手动推进时间复现确定性的计量窗口。
///
/// # 契约说明（What）
/// - `advance` 可以多次调用，偏移量单调增加；
/// - 克隆体共享同一时间轴，便于测试一边持有时钟一边交给被测组件。
#[derive(Clone, Debug)]
pub struct MockClock {
    inner: Arc<Mutex<ClockState>>,
}

#[derive(Debug)]
struct ClockState {
    origin: Instant,
    elapsed: Duration,
}

impl MockClock {
    /// 创建起始时间为当前系统时间的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起始时间构造虚拟时钟。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockState {
                origin,
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// 手动推进虚拟时钟。
    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(delta);
    }

    /// 返回自起始时间以来的虚拟时间偏移。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.origin + state.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_monotonically() {
        let origin = Instant::now();
        let clock = MockClock::with_start(origin);
        assert_eq!(clock.now(), origin);

        clock.advance(Duration::from_millis(40));
        let shared = clock.clone();
        shared.advance(Duration::from_millis(60));

        assert_eq!(clock.elapsed(), Duration::from_millis(100));
        assert_eq!(clock.now(), origin + Duration::from_millis(100));
    }
}
