//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义环形缓冲、配置与引擎运行期的错误语义；
//! - 区分“可恢复信号”（[`CapacityExceeded`]、[`InsufficientData`]）与“终止性错误”（[`StreamError`]），
//!   避免调用方把背压信号误当成故障上报。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接参与 `?` 传播与 `std::error::Error` 链；
//! - 外部协作者（数据源、处理端）的错误统一以 [`BoxError`] 承载，保留原始错误链。

use std::{io, path::PathBuf};

use thiserror::Error;

/// 外部协作者返回的类型擦除错误。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 写入长度超过当前空闲空间。
///
/// # 教案式说明
/// - **意图 (Why)**：环形缓冲拒绝覆盖未读数据，通过该信号提示写端执行背压策略；
/// - **契约 (What)**：返回该错误时 `write_pos` 与缓冲内容均保持不变；
///   `requested` 为本次写入长度，`free` 为观测时的空闲单元数，`capacity` 为总容量。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("write of {requested} units exceeds free space ({free} of {capacity} units free)")]
pub struct CapacityExceeded {
    pub requested: usize,
    pub free: usize,
    pub capacity: usize,
}

/// 缓冲内的数据不足一个窗口。
///
/// 对读端而言这是“本 tick 无事可做”的正常信号，而非故障；返回时 `read_pos` 不变。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("window of {requested} units requested but only {available} buffered")]
pub struct InsufficientData {
    pub requested: usize,
    pub available: usize,
}

/// 配置校验或加载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("processing_rate must be greater than zero")]
    ZeroRate,

    #[error("processing_chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("metrics_refresh_ms must be greater than zero")]
    ZeroRefresh,

    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// 容量不足以容纳最少数量的处理窗口。
    #[error("buffer capacity {capacity} is below the required minimum of {required} units")]
    CapacityTooSmall { capacity: usize, required: usize },

    #[error("feeder backoff range is invalid: initial {initial_ms} ms, max {max_ms} ms")]
    BackoffRange { initial_ms: u64, max_ms: u64 },

    #[error("failed to parse stream configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read stream configuration `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 引擎层的终止性错误。
///
/// # 教案式说明
/// - **意图 (Why)**：任一循环以该错误结束时，引擎会同时通知另一循环停止，避免单边空转；
/// - **契约 (What)**：
///   - `Source`/`Sink` 保留外部协作者的原始错误链；
///   - `WindowLengthMismatch` 表示游标算术或容量配置存在缺陷，属于内部不变量被破坏，不可重试；
///   - `LoopPanicked` 在线程 join 失败时返回，`role` 为 `"feeder"` 或 `"drainer"`。
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stream processor has already been started")]
    AlreadyStarted,

    #[error("chunk source failed: {0}")]
    Source(#[source] BoxError),

    #[error("processing sink failed: {0}")]
    Sink(#[source] BoxError),

    #[error(
        "window invariant violated: sample `{sample}` has length {actual}, expected {expected}"
    )]
    WindowLengthMismatch {
        sample: String,
        actual: usize,
        expected: usize,
    },

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{role} loop panicked")]
    LoopPanicked { role: &'static str },
}

impl StreamError {
    /// 是否为内部不变量被破坏（而非外部协作者故障）。
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StreamError::WindowLengthMismatch { .. })
    }
}
