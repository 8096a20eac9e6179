//! 节拍与退避：决定两个循环“何时再动”。
//!
//! # 模块定位（Why）
//! - 读端按固定周期触发，节拍必须与写端的到达节奏完全解耦；
//! - 写端在缓冲满时需要等待空间，但不能满速自旋，也不能持有任何读端会触碰的锁。
//!
//! # 结构概览（What）
//! - [`TickSchedule`]：锚定式节拍表，`next = previous + period`，处理端延迟不会侵蚀平均速率；
//! - [`Backoff`]：指数退避，从初始值翻倍直至上限，写成功后复位；
//! - [`park_until`]：可被 [`StopToken`] 打断的定时休眠，`stop()` 通过 `unpark` 立即唤醒线程。

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::signal::StopToken;

/// 固定周期的节拍表。
///
/// # 教案式说明
/// - **意图 (Why)**：若每个 tick 结束后再“睡一个周期”，处理端的耗时会累加到周期上，实测频率系统性偏低；
///   锚定式调度让截止时间只由起点与周期决定。
/// - **逻辑 (How)**：`advance` 将截止时间推进一个周期；若当前时间已落后超过一整个周期，
///   则重新对齐到 `now`，放弃补发错过的 tick，避免恢复后突发派发。
/// - **契约 (What)**：`period` 必须大于零；所有时间点须来自同一单调时钟。
#[derive(Clone, Debug)]
pub struct TickSchedule {
    period: Duration,
    next: Instant,
}

impl TickSchedule {
    /// 以 `start` 为第一个 tick 的截止时间。
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            period,
            next: start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 下一个 tick 的截止时间。
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// 当前 tick 完成后推进节拍表，返回新的截止时间。
    pub fn advance(&mut self, now: Instant) -> Instant {
        let next = self.next + self.period;
        self.next = if now > next + self.period { now } else { next };
        self.next
    }
}

/// 写端等待空间时使用的指数退避。
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// 返回本次应等待的时长，并把下一次翻倍（不超过上限）。
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// 写入成功后复位到初始值。
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// 休眠到 `deadline`，期间若 `stop` 被触发则提前返回。
///
/// 返回 `true` 表示按时到期，`false` 表示因停止信号提前退出。
/// `thread::park_timeout` 可能伪唤醒，因此循环重新检查剩余时间。
pub fn park_until(deadline: Instant, stop: &StopToken) -> bool {
    loop {
        if stop.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::park_timeout(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_is_anchored_to_period() {
        let start = Instant::now();
        let period = Duration::from_millis(10);
        let mut schedule = TickSchedule::new(start, period);

        // tick 本身耗时 4ms，不应推迟下一次截止时间。
        let next = schedule.advance(start + Duration::from_millis(4));
        assert_eq!(next, start + period);
        let next = schedule.advance(start + Duration::from_millis(13));
        assert_eq!(next, start + period * 2);
    }

    #[test]
    fn schedule_resyncs_when_far_behind() {
        let start = Instant::now();
        let period = Duration::from_millis(10);
        let mut schedule = TickSchedule::new(start, period);

        let late = start + Duration::from_millis(55);
        assert_eq!(schedule.advance(late), late, "落后超过一个周期时应对齐到当前时间");
        assert_eq!(schedule.advance(late), late + period);
    }

    #[test]
    fn backoff_doubles_until_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn park_until_returns_early_on_stop() {
        let stop = StopToken::new();
        stop.cancel();
        let deadline = Instant::now() + Duration::from_secs(60);
        assert!(!park_until(deadline, &stop));
    }

    #[test]
    fn park_until_waits_for_deadline() {
        let stop = StopToken::new();
        let deadline = Instant::now() + Duration::from_millis(5);
        assert!(park_until(deadline, &stop));
        assert!(Instant::now() >= deadline);
    }
}
