//! `rate_sweep`：在多组频率与窗口大小下运行引擎，核对实测频率与目标频率的偏差。
//!
//! # 工作方式（How）
//! 1. 以 `--config` 指定的 TOML（缺省为内置默认值）作为基础配置；
//! 2. 对每组 `(processing_rate, processing_chunk_size)` 启动一个引擎，使用随机数据源与模拟处理端运行
//!    `--duration-ms` 毫秒后停止；
//! 3. 打印 `Rate | ChunkSize | Measured Rate | % Error` 表格，误差为 `100 - measured * 100 / rate`；
//! 4. 任一组误差的绝对值超过 `--threshold` 时输出失败信息并以非零状态码退出。
//!
//! # 使用契约（What）
//! - 日志级别由 `RUST_LOG` 控制，缺省 `info`；
//! - `--quick` 缩短每组运行时长，用于冒烟验证。

use std::{env, process, thread, time::Duration};

use spark_stream::{
    ConfigError, RandomChunkSource, SimulatedSink, StreamConfig, StreamError, StreamProcessor,
};
use tracing_subscriber::{EnvFilter, fmt};

const RATES: [u32; 3] = [10, 50, 80];
const CHUNK_SIZES: [usize; 2] = [20, 80];
const DEFAULT_DURATION_MS: u64 = 3_000;
const QUICK_DURATION_MS: u64 = 1_000;
const DEFAULT_THRESHOLD_PCT: f64 = 15.0;

fn main() {
    install_tracing();
    match run() {
        Ok(true) => println!("Test Success"),
        Ok(false) => process::exit(1),
        Err(ToolError::Usage(message)) => {
            eprintln!("rate_sweep: {message}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
        Err(ToolError::Stream(error)) => {
            eprintln!("rate_sweep: {error}");
            process::exit(1);
        }
    }
}

const USAGE: &str =
    "usage: rate_sweep [--duration-ms <n>] [--threshold <pct>] [--config <path>] [--quick]";

#[derive(Debug)]
enum ToolError {
    Usage(String),
    Stream(StreamError),
}

impl From<StreamError> for ToolError {
    fn from(error: StreamError) -> Self {
        ToolError::Stream(error)
    }
}

impl From<ConfigError> for ToolError {
    fn from(error: ConfigError) -> Self {
        ToolError::Stream(error.into())
    }
}

#[derive(Debug)]
struct Options {
    duration: Duration,
    threshold_pct: f64,
    base: StreamConfig,
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, ToolError> {
    let mut duration_ms = None;
    let mut quick = false;
    let mut threshold_pct = DEFAULT_THRESHOLD_PCT;
    let mut base = StreamConfig::default();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--quick" => quick = true,
            "--duration-ms" => {
                let value = flag_value(&mut args, "--duration-ms")?;
                duration_ms = Some(value.parse::<u64>().map_err(|_| {
                    ToolError::Usage(format!("invalid --duration-ms value `{value}`"))
                })?);
            }
            "--threshold" => {
                let value = flag_value(&mut args, "--threshold")?;
                threshold_pct = value
                    .parse::<f64>()
                    .ok()
                    .filter(|pct| pct.is_finite() && *pct >= 0.0)
                    .ok_or_else(|| {
                        ToolError::Usage(format!("invalid --threshold value `{value}`"))
                    })?;
            }
            "--config" => {
                let path = flag_value(&mut args, "--config")?;
                base = StreamConfig::load(path)?;
            }
            other => return Err(ToolError::Usage(format!("unknown argument `{other}`"))),
        }
    }

    let duration_ms = duration_ms.unwrap_or(if quick {
        QUICK_DURATION_MS
    } else {
        DEFAULT_DURATION_MS
    });
    Ok(Options {
        duration: Duration::from_millis(duration_ms),
        threshold_pct,
        base,
    })
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ToolError> {
    args.next()
        .ok_or_else(|| ToolError::Usage(format!("{flag} requires a value")))
}

/// 运行全部组合；返回 `Ok(false)` 表示存在超出阈值的组合。
fn run() -> Result<bool, ToolError> {
    let options = parse_args(env::args().skip(1))?;

    println!(
        "{:>6} | {:>9} | {:>13} | {:>8}",
        "Rate", "ChunkSize", "Measured Rate", "% Error"
    );
    let mut passed = true;
    for rate in RATES {
        for chunk_size in CHUNK_SIZES {
            let measured = measure(&options, rate, chunk_size)?;
            let error_pct = 100.0 - measured * 100.0 / f64::from(rate);
            println!("{rate:>6} | {chunk_size:>9} | {measured:>13.2} | {error_pct:>8.2}");
            if error_pct.abs() > options.threshold_pct {
                passed = false;
            }
        }
    }

    if !passed {
        println!("Test Failed: Threshold of {}% exceeded", options.threshold_pct);
    }
    Ok(passed)
}

fn measure(options: &Options, rate: u32, chunk_size: usize) -> Result<f64, StreamError> {
    let mut config = options.base.clone();
    config.processing_rate = rate;
    config.processing_chunk_size = chunk_size;
    // 基础配置中的显式容量可能小于新窗口的下限，这里回退到按窗口推导。
    if config.validate().is_err() {
        config.buffer_capacity = None;
    }

    let source = RandomChunkSource::new(chunk_size);
    let sink = SimulatedSink::new(rate);
    let mut processor = StreamProcessor::new(config, source, sink)?;
    processor.start()?;
    thread::sleep(options.duration);
    let measured = processor.last_measured_frequency();
    let report = processor.stop()?;

    tracing::debug!(
        rate,
        chunk_size,
        windows = report.drainer.windows,
        empty_ticks = report.drainer.empty_ticks,
        "sweep point finished"
    );
    Ok(measured)
}
