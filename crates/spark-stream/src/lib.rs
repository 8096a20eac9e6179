#![deny(unsafe_code)]
#![doc = "spark-stream: 将慢速、突发的数据源整形为固定频率、固定长度窗口的流处理引擎。"]
#![doc = ""]
#![doc = "== 架构概览 =="]
#![doc = "1. 写端线程从 [`ChunkSource`] 拉取字符串批次，拼接为连续单元流写入单生产者单消费者的 [`CircularBuffer`]；"]
#![doc = "2. 读端线程按 `processing_rate` 的固定节拍检查缓冲，凑满 `processing_chunk_size` 个单元即派发给 [`ProcessingSink`]，否则空转；"]
#![doc = "3. [`ThroughputMeter`] 按刷新窗口折算实测频率，控制面通过 [`StreamProcessor::last_measured_frequency`] 无锁读取。"]
#![doc = ""]
#![doc = "== 背压策略 =="]
#![doc = "缓冲满时写端按指数退避等待读端释放空间，绝不覆盖未读数据；读端从不等待写端。"]

pub mod config;
pub mod drainer;
pub mod error;
pub mod feeder;
pub mod meter;
pub mod observer;
pub mod pace;
pub mod processor;
#[allow(unsafe_code)]
pub mod ring;
pub mod signal;
pub mod sink;
pub mod source;
pub mod stats;
mod sync;
pub mod time;

pub use config::StreamConfig;
pub use error::{BoxError, CapacityExceeded, ConfigError, InsufficientData, StreamError};
pub use meter::{FrequencyGauge, ThroughputMeter};
pub use observer::{DispatchEvent, DispatchObserver, NoopObserver, TracingObserver};
pub use processor::{FEEDER_STOP_GRACE, RunReport, StreamProcessor};
pub use ring::{BufferReader, BufferWriter, CircularBuffer};
pub use signal::StopToken;
pub use sink::{ProcessingSink, SimulatedSink};
pub use source::{ChunkSource, RandomChunkSource};
pub use stats::StatsSnapshot;
pub use time::{Clock, MockClock, SystemClock};
