//! 吞吐计量：统计读端派发的窗口数并按刷新窗口折算为频率。
//!
//! # 设计概要（How）
//! - [`ThroughputMeter`] 由读端线程独占持有，每派发一个窗口调用一次 [`record`](ThroughputMeter::record)；
//! - 经过时间达到 `refresh` 时计算 `count * 1000 / elapsed_ms`，写入 [`FrequencyGauge`] 并重置计数；
//! - [`FrequencyGauge`] 以 `AtomicU64` 保存 `f64` 位模式，控制线程无锁读取最近一次读数。
//!
//! # 风险提示（Trade-offs）
//! - 读数在两次刷新之间保持不变，属于采样平滑的取舍；数据源长时间停滞时，读数停留在最后一次刷新值。

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::time::Clock;

/// 最近一次测得频率的共享读数。
#[derive(Clone, Debug, Default)]
pub struct FrequencyGauge {
    bits: Arc<AtomicU64>,
}

impl FrequencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次刷新得到的频率（次/秒）；尚未刷新时为 `0.0`。
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn set(&self, frequency: f64) {
        self.bits.store(frequency.to_bits(), Ordering::Release);
    }
}

/// 滚动窗口吞吐计量器。
pub struct ThroughputMeter {
    clock: Arc<dyn Clock>,
    refresh: Duration,
    count: u64,
    window_start: Instant,
    gauge: FrequencyGauge,
}

impl ThroughputMeter {
    /// 以 `clock` 的当前时间作为第一个窗口的起点。
    pub fn new(clock: Arc<dyn Clock>, refresh: Duration) -> Self {
        let window_start = clock.now();
        Self {
            clock,
            refresh,
            count: 0,
            window_start,
            gauge: FrequencyGauge::new(),
        }
    }

    /// 与控制面共享的读数句柄。
    pub fn gauge(&self) -> FrequencyGauge {
        self.gauge.clone()
    }

    /// 记录一个已处理窗口；若刷新窗口到期则发布新读数并返回它。
    pub fn record(&mut self) -> Option<f64> {
        self.count += 1;
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.refresh {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let frequency = self.count as f64 * 1000.0 / elapsed_ms;
        self.gauge.set(frequency);
        self.count = 0;
        self.window_start = now;
        Some(frequency)
    }

    pub fn last_frequency(&self) -> f64 {
        self.gauge.get()
    }

    /// 当前窗口内尚未折算的计数。
    pub fn pending_count(&self) -> u64 {
        self.count
    }
}

impl std::fmt::Debug for ThroughputMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputMeter")
            .field("refresh", &self.refresh)
            .field("count", &self.count)
            .field("last_frequency", &self.gauge.get())
            .finish()
    }
}
