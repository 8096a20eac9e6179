//! 写端循环：从数据源拉取批次并写入环形缓冲。
//!
//! # 教案式说明
//! - **意图 (Why)**：数据源慢且突发，写端负责把不规则的到达节奏吸收进缓冲，
//!   让读端只面对“有没有一个完整窗口”这一个问题；
//! - **逻辑 (How)**：
//!   1. 每次迭代开头检查停止信号；
//!   2. 拉取一批字符串，拼接进复用的暂存区；
//!   3. 每次写入不超过当前空闲空间的一段；缓冲满时按 [`Backoff`] 休眠后重新检查空闲空间，期间不持有任何锁；
//!   4. 等待空间期间收到停止信号时放弃剩余单元；每个分段要么整体写入、要么完全未写，不会出现半截写入。
//! - **契约 (What)**：永不丢弃或覆盖未读数据；数据源错误以 [`StreamError::Source`] 终止循环，
//!   并通过共享的 [`StopToken`] 通知读端一起停止。

use std::{sync::Arc, time::Instant};

use crate::{
    error::StreamError,
    pace::{Backoff, park_until},
    ring::BufferWriter,
    signal::StopToken,
    source::ChunkSource,
    stats::EngineStats,
};

/// 写端循环正常退出时的统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeederReport {
    /// 从数据源拉取的批次数。
    pub chunks: u64,
    /// 成功写入缓冲的单元数。
    pub units_written: u64,
    /// 因缓冲满而退避的次数。
    pub backoffs: u64,
    /// 停止时尚未写入而被放弃的单元数。
    pub abandoned_units: u64,
}

/// 写端循环。
pub struct Feeder {
    writer: BufferWriter<char>,
    source: Box<dyn ChunkSource>,
    stop: StopToken,
    backoff: Backoff,
    stats: Arc<EngineStats>,
    staging: Vec<char>,
}

impl Feeder {
    pub fn new(
        writer: BufferWriter<char>,
        source: Box<dyn ChunkSource>,
        stop: StopToken,
        backoff: Backoff,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            writer,
            source,
            stop,
            backoff,
            stats,
            staging: Vec::new(),
        }
    }

    /// 运行直到停止信号或数据源出错。
    pub fn run(mut self) -> Result<FeederReport, StreamError> {
        let mut report = FeederReport::default();

        while !self.stop.is_cancelled() {
            let chunk = match self.source.next_chunk() {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::error!(error = %err, "chunk source failed; stopping feeder");
                    self.stop.cancel();
                    return Err(StreamError::Source(err));
                }
            };
            report.chunks += 1;

            self.staging.clear();
            self.staging.extend(chunk.iter().flat_map(|s| s.chars()));
            if self.stop.is_cancelled() {
                report.abandoned_units += self.staging.len() as u64;
                break;
            }

            if !self.deliver(&mut report) {
                break;
            }
        }

        tracing::debug!(
            chunks = report.chunks,
            units_written = report.units_written,
            backoffs = report.backoffs,
            "feeder stopped"
        );
        Ok(report)
    }

    /// 写入暂存区中的全部单元；返回 `false` 表示等待空间时被停止。
    ///
    /// 每次尝试写入 `min(free, remaining)` 个单元：读端只按整窗口释放空间，缓冲中可能长期残留
    /// 不足一个窗口的单元，要求更长的整段写入会与读端互相等待。
    fn deliver(&mut self, report: &mut FeederReport) -> bool {
        let total = self.staging.len();
        if total > self.writer.capacity() {
            tracing::debug!(
                units = total,
                capacity = self.writer.capacity(),
                "batch exceeds buffer capacity; writing in segments"
            );
        }

        let mut offset = 0;
        while offset < total {
            let free = self.writer.free();
            if free > 0 {
                let end = offset + free.min(total - offset);
                let segment = &self.staging[offset..end];
                // 只有写端会消耗空闲空间，观测到的 `free` 在写入前只增不减。
                if self.writer.write(segment).is_ok() {
                    self.backoff.reset();
                    report.units_written += segment.len() as u64;
                    self.stats.add_units_written(segment.len());
                    offset = end;
                    continue;
                }
            }

            report.backoffs += 1;
            self.stats.inc_feeder_backoffs();
            let delay = self.backoff.next_delay();
            tracing::trace!(
                remaining = total - offset,
                free,
                delay_ms = delay.as_millis() as u64,
                "buffer full; feeder backing off"
            );
            if !park_until(Instant::now() + delay, &self.stop) {
                report.abandoned_units += (total - offset) as u64;
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for Feeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feeder")
            .field("writer", &self.writer)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
