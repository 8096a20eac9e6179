//! 处理端契约与模拟处理端。
//!
//! - [`ProcessingSink`]：接收恰好 `processing_chunk_size` 个单元的窗口；闭包
//!   `FnMut(&[char]) -> Result<(), BoxError>` 自动实现；
//! - [`SimulatedSink`]：按目标频率引入随机处理延迟，复现“处理端自身也有耗时”的场景。

use std::{ops::Range, thread, time::Duration};

use crate::error::BoxError;

/// 固定长度窗口的处理端。
pub trait ProcessingSink: Send + 'static {
    /// 处理一个窗口；错误视为读端终止条件。
    fn process(&mut self, window: &[char]) -> Result<(), BoxError>;
}

impl<F> ProcessingSink for F
where
    F: FnMut(&[char]) -> Result<(), BoxError> + Send + 'static,
{
    fn process(&mut self, window: &[char]) -> Result<(), BoxError> {
        self(window)
    }
}

/// 模拟处理端。
///
/// # 教案式说明
/// - **行为 (How)**：每个窗口休眠 `[rate / 100, 5 * rate / 100)` 毫秒（整数除法；区间为空时取下界）；
/// - **契约 (What)**：只消耗时间并累计处理数，不保留窗口内容。
#[derive(Debug)]
pub struct SimulatedSink {
    rng: fastrand::Rng,
    delay_ms: Range<u64>,
    processed: u64,
}

impl SimulatedSink {
    pub fn new(processing_rate: u32) -> Self {
        Self::with_seed(processing_rate, 42)
    }

    pub fn with_seed(processing_rate: u32, seed: u64) -> Self {
        let rate = u64::from(processing_rate);
        Self {
            rng: fastrand::Rng::with_seed(seed),
            delay_ms: rate / 100..5 * rate / 100,
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn next_delay(&mut self) -> Duration {
        let millis = if self.delay_ms.is_empty() {
            self.delay_ms.start
        } else {
            self.rng.u64(self.delay_ms.clone())
        };
        Duration::from_millis(millis)
    }
}

impl ProcessingSink for SimulatedSink {
    fn process(&mut self, _window: &[char]) -> Result<(), BoxError> {
        let delay = self.next_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.processed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_range_scales_with_rate() {
        let mut sink = SimulatedSink::new(80);
        for _ in 0..50 {
            let delay = sink.next_delay();
            assert!(delay < Duration::from_millis(4), "80Hz 下延迟应落在 [0, 4)ms");
        }

        let mut slow = SimulatedSink::new(10);
        assert_eq!(slow.next_delay(), Duration::ZERO, "10Hz 下区间为空，取下界 0");
    }

    #[test]
    fn counts_processed_windows() {
        let mut sink = SimulatedSink::new(10);
        let window: Vec<char> = "abc".chars().collect();
        sink.process(&window).unwrap();
        sink.process(&window).unwrap();
        assert_eq!(sink.processed(), 2);
    }
}
