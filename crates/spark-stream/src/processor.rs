//! 流处理引擎：组装环形缓冲、写端与读端，并提供启动/停止控制面。
//!
//! # 教案式说明
//! - **意图 (Why)**：调用方只关心“以目标频率把数据源切成固定窗口交给处理端”，
//!   线程、游标与节拍都应封装在引擎内部；
//! - **逻辑 (How)**：
//!   1. [`StreamProcessor::new`] 校验配置并按容量一次性分配缓冲；
//!   2. [`start`](StreamProcessor::start) 把写端与读端分别交给两个具名线程；
//!   3. [`stop`](StreamProcessor::stop) 触发停止信号、唤醒两个线程，立即 join 读端，
//!      写端在 [`FEEDER_STOP_GRACE`] 内未退出（仍阻塞在数据源调用中）时被分离，汇总 [`RunReport`]；
//! - **契约 (What)**：
//!   - 引擎只能启动一次，第二次调用返回 [`StreamError::AlreadyStarted`]；
//!   - 任一循环以错误结束时另一循环随之停止，`stop` 返回该错误；
//!     两个循环都失败时优先返回不变量错误，否则先写端后读端；
//!   - `Drop` 时若仍在运行会自动停止并丢弃结果。

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    config::StreamConfig,
    drainer::{Drainer, DrainerReport},
    error::StreamError,
    feeder::{Feeder, FeederReport},
    meter::{FrequencyGauge, ThroughputMeter},
    observer::{DispatchObserver, TracingObserver},
    pace::Backoff,
    ring::{BufferReader, BufferWriter, CircularBuffer},
    signal::StopToken,
    sink::ProcessingSink,
    source::ChunkSource,
    stats::{EngineStats, StatsSnapshot},
    time::{Clock, SystemClock},
};

const FEEDER_THREAD: &str = "spark-stream-feeder";
const DRAINER_THREAD: &str = "spark-stream-drainer";

/// `stop` 等待写端退出的上限。数据源调用无法被打断，超时后写端线程被分离，
/// 待数据源返回时观察到停止信号并自行退出，不再写入缓冲。
pub const FEEDER_STOP_GRACE: Duration = Duration::from_millis(200);

/// 一次运行的汇总。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunReport {
    pub feeder: FeederReport,
    pub drainer: DrainerReport,
    /// 写端在宽限期内未退出而被分离；此时 `feeder` 由运行期计数器推导，`chunks` 为 0。
    pub feeder_detached: bool,
    /// 从 `start` 到 `stop` 完成的墙钟时间。
    pub elapsed: Duration,
}

impl RunReport {
    /// 最近一次测得的频率。
    pub fn measured_frequency(&self) -> f64 {
        self.drainer.last_frequency
    }
}

struct Parts {
    writer: BufferWriter<char>,
    reader: BufferReader<char>,
    source: Box<dyn ChunkSource>,
    sink: Box<dyn ProcessingSink>,
}

struct Running {
    feeder: JoinHandle<Result<FeederReport, StreamError>>,
    drainer: JoinHandle<Result<DrainerReport, StreamError>>,
    started_at: Instant,
}

/// 固定频率的流处理引擎。
pub struct StreamProcessor {
    config: StreamConfig,
    parts: Option<Parts>,
    running: Option<Running>,
    observer: Arc<dyn DispatchObserver>,
    clock: Arc<dyn Clock>,
    stop: StopToken,
    stats: Arc<EngineStats>,
    gauge: FrequencyGauge,
}

impl StreamProcessor {
    /// 校验配置并分配缓冲；此时不启动任何线程。
    pub fn new<S, K>(config: StreamConfig, source: S, sink: K) -> Result<Self, StreamError>
    where
        S: ChunkSource,
        K: ProcessingSink,
    {
        config.validate()?;
        let (writer, reader) = CircularBuffer::new(config.capacity())?.split();

        Ok(Self {
            config,
            parts: Some(Parts {
                writer,
                reader,
                source: Box::new(source),
                sink: Box::new(sink),
            }),
            running: None,
            observer: Arc::new(TracingObserver),
            clock: Arc::new(SystemClock),
            stop: StopToken::new(),
            stats: Arc::new(EngineStats::new()),
            gauge: FrequencyGauge::new(),
        })
    }

    /// 替换派发观察者，缺省为 [`TracingObserver`]。
    pub fn with_observer(mut self, observer: impl DispatchObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// 替换吞吐计量使用的时钟，缺省为 [`SystemClock`]。
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// 启动写端与读端线程。
    pub fn start(&mut self) -> Result<(), StreamError> {
        let Some(parts) = self.parts.take() else {
            return Err(StreamError::AlreadyStarted);
        };

        let meter = ThroughputMeter::new(self.clock.clone(), self.config.metrics_refresh());
        self.gauge = meter.gauge();

        let (initial, max) = self.config.feeder_backoff();
        let feeder = Feeder::new(
            parts.writer,
            parts.source,
            self.stop.child(),
            Backoff::new(initial, max),
            self.stats.clone(),
        );
        let drainer = Drainer::new(
            &self.config,
            parts.reader,
            parts.sink,
            self.observer.clone(),
            meter,
            self.stop.child(),
            self.stats.clone(),
        );

        let started_at = Instant::now();
        let feeder = thread::Builder::new()
            .name(FEEDER_THREAD.to_owned())
            .spawn(move || feeder.run())
            .map_err(|source| StreamError::Spawn {
                role: "feeder",
                source,
            })?;
        let drainer = match thread::Builder::new()
            .name(DRAINER_THREAD.to_owned())
            .spawn(move || drainer.run())
        {
            Ok(handle) => handle,
            Err(source) => {
                self.stop.cancel();
                feeder.thread().unpark();
                let _ = feeder.join();
                return Err(StreamError::Spawn {
                    role: "drainer",
                    source,
                });
            }
        };

        tracing::info!(
            processing_rate = self.config.processing_rate,
            processing_chunk_size = self.config.processing_chunk_size,
            capacity = self.config.capacity(),
            "stream processor started"
        );
        self.running = Some(Running {
            feeder,
            drainer,
            started_at,
        });
        Ok(())
    }

    /// 停止两个循环并等待其退出。
    ///
    /// 未启动时调用同样合法：引擎进入终止状态并返回空报告。
    pub fn stop(&mut self) -> Result<RunReport, StreamError> {
        self.stop.cancel();
        self.parts = None;
        let Some(running) = self.running.take() else {
            return Ok(RunReport {
                feeder: FeederReport::default(),
                drainer: DrainerReport::default(),
                feeder_detached: false,
                elapsed: Duration::ZERO,
            });
        };

        running.feeder.thread().unpark();
        running.drainer.thread().unpark();
        let drainer = running
            .drainer
            .join()
            .unwrap_or(Err(StreamError::LoopPanicked { role: "drainer" }));
        let (feeder, feeder_detached) =
            match join_within(running.feeder, Instant::now() + FEEDER_STOP_GRACE) {
                Some(result) => (
                    result.unwrap_or(Err(StreamError::LoopPanicked { role: "feeder" })),
                    false,
                ),
                None => {
                    let stats = self.stats.snapshot();
                    tracing::warn!(
                        grace_ms = FEEDER_STOP_GRACE.as_millis() as u64,
                        "feeder still blocked in chunk source; detaching thread"
                    );
                    let report = FeederReport {
                        units_written: stats.units_written,
                        backoffs: stats.feeder_backoffs,
                        ..FeederReport::default()
                    };
                    (Ok(report), true)
                }
            };
        let elapsed = running.started_at.elapsed();

        let report = match (feeder, drainer) {
            (Ok(feeder), Ok(drainer)) => RunReport {
                feeder,
                drainer,
                feeder_detached,
                elapsed,
            },
            (_, Err(err)) if err.is_invariant_violation() => return Err(err),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "stream processor stopped with error");
                return Err(err);
            }
        };

        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            windows = report.drainer.windows,
            units_written = report.feeder.units_written,
            measured_frequency = report.measured_frequency(),
            "stream processor stopped"
        );
        Ok(report)
    }

    /// 最近一次测得的频率（次/秒）；刷新前为 `0.0`。
    pub fn last_measured_frequency(&self) -> f64 {
        self.gauge.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 两个循环是否都仍在运行。
    ///
    /// 任一循环因错误退出后返回 `false`，即便尚未调用 `stop`。
    pub fn is_running(&self) -> bool {
        match &self.running {
            Some(running) => {
                !self.stop.is_cancelled()
                    && !running.feeder.is_finished()
                    && !running.drainer.is_finished()
            }
            None => false,
        }
    }
}

/// 在 `deadline` 前等待线程结束；超时返回 `None`，句柄随之被丢弃，线程转为分离状态。
fn join_within<T>(handle: JoinHandle<T>, deadline: Instant) -> Option<thread::Result<T>> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
    Some(handle.join())
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(err) = self.stop() {
                tracing::debug!(error = %err, "stream processor dropped after failure");
            }
        }
    }
}

impl std::fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("config", &self.config)
            .field("started", &self.parts.is_none())
            .field("running", &self.is_running())
            .field("last_frequency", &self.gauge.get())
            .finish_non_exhaustive()
    }
}
