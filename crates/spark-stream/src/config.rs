//! 引擎配置：构造参数显式传入，可从 TOML 加载。
//!
//! # 教案式说明
//! - **意图 (Why)**：引擎实例不读取任何全局状态，所有参数都经由 [`StreamConfig`] 传入，
//!   多个引擎可以并存并在测试中相互隔离；
//! - **契约 (What)**：[`StreamConfig::validate`] 在引擎构造时执行，任何非法取值都以
//!   [`ConfigError`] 拒绝，而非在运行期暴露；
//! - **默认值 (How)**：`processing_rate = 80`、`processing_chunk_size = 30`、
//!   `metrics_refresh_ms = 250`，容量缺省为 `processing_chunk_size * 256`，
//!   足以吸收单次最多约 `118 * processing_chunk_size` 个单元的突发写入。

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::ConfigError;

/// 缺省容量相对处理窗口的倍数。
pub const DEFAULT_CAPACITY_MULTIPLIER: usize = 256;

/// 容量至少能容纳的处理窗口数。
pub const MIN_CAPACITY_WINDOWS: usize = 2;

/// 引擎配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// 读端每秒触发的 tick 数。
    pub processing_rate: u32,
    /// 每个窗口的单元数。
    pub processing_chunk_size: usize,
    /// 吞吐读数的刷新窗口。
    pub metrics_refresh_ms: u64,
    /// 环形缓冲容量；缺省按 [`DEFAULT_CAPACITY_MULTIPLIER`] 推导。
    pub buffer_capacity: Option<usize>,
    /// 写端首次退避时长。
    pub feeder_backoff_ms: u64,
    /// 写端退避上限。
    pub feeder_backoff_max_ms: u64,
    /// 读端连续无数据超过该时长时告警；`None` 表示不检测。
    pub source_stall_timeout_ms: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            processing_rate: 80,
            processing_chunk_size: 30,
            metrics_refresh_ms: 250,
            buffer_capacity: None,
            feeder_backoff_ms: 1,
            feeder_backoff_max_ms: 20,
            source_stall_timeout_ms: None,
        }
    }
}

impl StreamConfig {
    /// 以目标频率与窗口大小构造，其余字段取默认值。
    pub fn new(processing_rate: u32, processing_chunk_size: usize) -> Self {
        Self {
            processing_rate,
            processing_chunk_size,
            ..Self::default()
        }
    }

    pub fn with_metrics_refresh_ms(mut self, refresh_ms: u64) -> Self {
        self.metrics_refresh_ms = refresh_ms;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn with_feeder_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.feeder_backoff_ms = initial_ms;
        self.feeder_backoff_max_ms = max_ms;
        self
    }

    pub fn with_source_stall_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.source_stall_timeout_ms = Some(timeout_ms);
        self
    }

    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并解析 TOML 文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 实际使用的缓冲容量。
    pub fn capacity(&self) -> usize {
        self.buffer_capacity.unwrap_or_else(|| {
            self.processing_chunk_size
                .saturating_mul(DEFAULT_CAPACITY_MULTIPLIER)
        })
    }

    /// 读端节拍周期：`1s / processing_rate`。
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.processing_rate.max(1)))
    }

    pub fn metrics_refresh(&self) -> Duration {
        Duration::from_millis(self.metrics_refresh_ms)
    }

    pub fn feeder_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.feeder_backoff_ms),
            Duration::from_millis(self.feeder_backoff_max_ms),
        )
    }

    pub fn source_stall_timeout(&self) -> Option<Duration> {
        self.source_stall_timeout_ms.map(Duration::from_millis)
    }

    /// 校验全部字段。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing_rate == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.processing_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.metrics_refresh_ms == 0 {
            return Err(ConfigError::ZeroRefresh);
        }

        let capacity = self.capacity();
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let required = self
            .processing_chunk_size
            .saturating_mul(MIN_CAPACITY_WINDOWS);
        if capacity < required {
            return Err(ConfigError::CapacityTooSmall { capacity, required });
        }

        if self.feeder_backoff_ms == 0 || self.feeder_backoff_max_ms < self.feeder_backoff_ms {
            return Err(ConfigError::BackoffRange {
                initial_ms: self.feeder_backoff_ms,
                max_ms: self.feeder_backoff_max_ms,
            });
        }
        Ok(())
    }
}
