//! 数据源契约与随机数据源实现。
//!
//! # 模块定位（Why）
//! - 引擎只通过 [`ChunkSource::next_chunk`] 拉取数据，调用可能阻塞任意时长，返回的字符串个数与长度都不确定；
//! - 字符串之间无分隔符，写端会把它们拼接成连续的单元流，来源的边界对缓冲没有意义。
//!
//! # 结构概览（What）
//! - [`ChunkSource`]：拉取契约；闭包 `FnMut() -> Result<Vec<String>, BoxError>` 自动实现；
//! - [`RandomChunkSource`]：可复现的随机源，按固定种子生成字母数字串并模拟读取延迟。

use std::{ops::RangeInclusive, thread, time::Duration};

use crate::error::BoxError;

/// 慢速、突发的数据源。
pub trait ChunkSource: Send + 'static {
    /// 拉取下一批字符串；允许返回空批次，错误视为写端终止条件。
    fn next_chunk(&mut self) -> Result<Vec<String>, BoxError>;
}

impl<F> ChunkSource for F
where
    F: FnMut() -> Result<Vec<String>, BoxError> + Send + 'static,
{
    fn next_chunk(&mut self) -> Result<Vec<String>, BoxError> {
        self()
    }
}

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 随机数据源。
///
/// # 教案式说明
/// - **行为 (How)**：每次调用生成 11..60 个字符串，每个长度落在
///   `processing_chunk_size / 2 .. processing_chunk_size * 2`，随后休眠 50..=100ms 模拟读盘；
/// - **契约 (What)**：相同种子产生相同的字符串序列；延迟可通过 [`with_latency`](Self::with_latency)
///   调整，测试中通常设为零以获得满速数据源。
#[derive(Debug)]
pub struct RandomChunkSource {
    rng: fastrand::Rng,
    strings_per_chunk: RangeInclusive<usize>,
    string_len: RangeInclusive<usize>,
    latency_ms: RangeInclusive<u64>,
}

impl RandomChunkSource {
    /// 默认种子，保证基准扫描在不同运行间可复现。
    pub const DEFAULT_SEED: u64 = 42;

    pub fn new(processing_chunk_size: usize) -> Self {
        Self::with_seed(processing_chunk_size, Self::DEFAULT_SEED)
    }

    pub fn with_seed(processing_chunk_size: usize, seed: u64) -> Self {
        let min_len = (processing_chunk_size / 2).max(1);
        let max_len = (processing_chunk_size * 2).saturating_sub(1).max(min_len);
        Self {
            rng: fastrand::Rng::with_seed(seed),
            strings_per_chunk: 11..=59,
            string_len: min_len..=max_len,
            latency_ms: 50..=100,
        }
    }

    /// 调整模拟读取延迟范围（毫秒，闭区间）。
    pub fn with_latency(mut self, latency_ms: RangeInclusive<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// 单次调用可能产生的最大单元数，用于评估缓冲容量。
    pub fn max_units_per_chunk(&self) -> usize {
        self.strings_per_chunk.end() * self.string_len.end()
    }

    fn random_string(&mut self) -> String {
        let len = self.rng.usize(self.string_len.clone());
        (0..len)
            .map(|_| char::from(ALPHANUMERIC[self.rng.usize(..ALPHANUMERIC.len())]))
            .collect()
    }
}

impl ChunkSource for RandomChunkSource {
    fn next_chunk(&mut self) -> Result<Vec<String>, BoxError> {
        let count = self.rng.usize(self.strings_per_chunk.clone());
        let chunk = (0..count).map(|_| self.random_string()).collect();

        let latency = self.rng.u64(self.latency_ms.clone());
        if latency > 0 {
            thread::sleep(Duration::from_millis(latency));
        }
        Ok(chunk)
    }
}
