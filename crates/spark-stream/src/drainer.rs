//! 读端循环：按固定节拍从缓冲取出窗口并交给处理端。
//!
//! # 教案式说明
//! - **意图 (Why)**：处理端期望以稳定频率收到固定长度的窗口，读端的节拍必须与数据源的到达节奏解耦；
//! - **逻辑 (How)**：
//!   1. [`TickSchedule`] 给出下一个截止时间，[`park_until`] 休眠至该时刻或被停止信号唤醒；
//!   2. 每个 tick 调用一次 [`tick`](Drainer::tick)：数据不足即空转，否则取出恰好一个窗口；
//!   3. 校验窗口长度，调用处理端，计入吞吐计量并通知观察者；
//! - **契约 (What)**：
//!   - 读端从不阻塞等待数据，空 tick 不会推迟下一次截止时间；
//!   - 窗口长度不符属于不变量被破坏：记录 `error!`、通知写端停止并以
//!     [`StreamError::WindowLengthMismatch`] 结束；
//!   - 处理端错误同样是终止性的。
//!
//! # 风险提示（Trade-offs）
//! - 处理端在读端线程内同步执行，耗时超过一个周期时节拍表会放弃补发错过的 tick，实测频率随之下降。

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    config::StreamConfig,
    error::StreamError,
    meter::ThroughputMeter,
    observer::{DispatchEvent, DispatchObserver},
    pace::{TickSchedule, park_until},
    ring::BufferReader,
    signal::StopToken,
    sink::ProcessingSink,
    stats::EngineStats,
};

/// 单个 tick 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// 派发了一个完整窗口。
    Dispatched,
    /// 缓冲内不足一个窗口，本 tick 无事可做。
    Empty,
}

/// 读端循环正常退出时的统计。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrainerReport {
    pub ticks: u64,
    pub windows: u64,
    pub empty_ticks: u64,
    pub stall_warnings: u64,
    /// 退出时最近一次测得的频率。
    pub last_frequency: f64,
}

/// 读端循环。
pub struct Drainer {
    reader: BufferReader<char>,
    sink: Box<dyn ProcessingSink>,
    observer: Arc<dyn DispatchObserver>,
    meter: ThroughputMeter,
    stop: StopToken,
    stats: Arc<EngineStats>,
    chunk_size: usize,
    period: Duration,
    stall_timeout: Option<Duration>,
    window: Vec<char>,
    last_dispatch: Instant,
    stalled: bool,
    report: DrainerReport,
}

impl Drainer {
    pub fn new(
        config: &StreamConfig,
        reader: BufferReader<char>,
        sink: Box<dyn ProcessingSink>,
        observer: Arc<dyn DispatchObserver>,
        meter: ThroughputMeter,
        stop: StopToken,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            reader,
            sink,
            observer,
            meter,
            stop,
            stats,
            chunk_size: config.processing_chunk_size,
            period: config.tick_period(),
            stall_timeout: config.source_stall_timeout(),
            window: vec![char::default(); config.processing_chunk_size],
            last_dispatch: Instant::now(),
            stalled: false,
            report: DrainerReport::default(),
        }
    }

    /// 按节拍运行直到停止信号或终止性错误。
    pub fn run(mut self) -> Result<DrainerReport, StreamError> {
        let mut schedule = TickSchedule::new(Instant::now() + self.period, self.period);

        while park_until(schedule.deadline(), &self.stop) {
            self.tick(Instant::now())?;
            schedule.advance(Instant::now());
        }

        self.report.last_frequency = self.meter.last_frequency();
        tracing::debug!(
            ticks = self.report.ticks,
            windows = self.report.windows,
            empty_ticks = self.report.empty_ticks,
            "drainer stopped"
        );
        Ok(self.report)
    }

    /// 执行一个 tick；`now` 用于数据源停滞检测。
    ///
    /// 返回错误前已触发停止信号，调用方无需再次通知写端。
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, StreamError> {
        self.report.ticks += 1;

        if self.reader.read_window_into(&mut self.window).is_err() {
            self.report.empty_ticks += 1;
            self.stats.inc_empty_ticks();
            self.check_stall(now);
            return Ok(TickOutcome::Empty);
        }
        self.last_dispatch = now;
        self.stalled = false;

        if let Err(err) = ensure_window_len(&self.window, self.chunk_size) {
            return Err(self.fail(err));
        }

        if let Err(err) = self.sink.process(&self.window) {
            tracing::error!(error = %err, "processing sink failed; stopping drainer");
            return Err(self.fail(StreamError::Sink(err)));
        }

        self.report.windows += 1;
        self.stats.inc_windows_dispatched();
        if let Some(frequency) = self.meter.record() {
            tracing::trace!(frequency, "throughput reading refreshed");
        }

        let event = DispatchEvent {
            read_pos: self.reader.read_pos(),
            write_pos: self.reader.write_pos(),
            frequency: self.meter.last_frequency(),
            sample: &self.window,
        };
        self.observer.on_dispatch(&event);
        Ok(TickOutcome::Dispatched)
    }

    fn fail(&self, err: StreamError) -> StreamError {
        self.stop.cancel();
        err
    }

    /// 连续无数据超过阈值时告警一次，直到下一次成功派发才重新计时。
    fn check_stall(&mut self, now: Instant) {
        let Some(timeout) = self.stall_timeout else {
            return;
        };
        if self.stalled {
            return;
        }
        let idle = now.saturating_duration_since(self.last_dispatch);
        if idle >= timeout {
            self.stalled = true;
            self.report.stall_warnings += 1;
            self.stats.inc_stall_warnings();
            tracing::warn!(
                idle_ms = idle.as_millis() as u64,
                buffered = self.reader.available(),
                "chunk source stalled; no full window available"
            );
        }
    }
}

impl std::fmt::Debug for Drainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drainer")
            .field("reader", &self.reader)
            .field("meter", &self.meter)
            .field("period", &self.period)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// 校验派发窗口长度。
///
/// 失败时记录 `error!`，携带窗口内容、实际长度与期望长度。
pub(crate) fn ensure_window_len(window: &[char], expected: usize) -> Result<(), StreamError> {
    if window.len() == expected {
        return Ok(());
    }
    let sample: String = window.iter().collect();
    tracing::error!(
        sample = %sample,
        actual = window.len(),
        expected,
        "dispatched window has wrong length"
    );
    Err(StreamError::WindowLengthMismatch {
        sample,
        actual: window.len(),
        expected,
    })
}
