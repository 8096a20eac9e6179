//! 引擎端到端行为：启动两个真实线程，验证节拍、顺序、错误传播与停止语义。

#![cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use spark_stream::{
    BoxError, DispatchEvent, MockClock, NoopObserver, RandomChunkSource, StreamConfig,
    StreamError, StreamProcessor,
};

fn null_sink() -> impl FnMut(&[char]) -> Result<(), BoxError> + Send + 'static {
    |_: &[char]| Ok(())
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// 按 `a..z` 循环生成确定性单元流，前 `limit` 个单元之后停滞。
fn counting_source(limit: usize) -> impl FnMut() -> Result<Vec<String>, BoxError> + Send + 'static {
    let mut produced = 0usize;
    let mut batch_len = 1usize;
    move || {
        if produced >= limit {
            thread::sleep(Duration::from_millis(5));
            return Ok(Vec::new());
        }
        let len = batch_len.min(limit - produced);
        let chunk: String = (produced..produced + len).map(unit_at).collect();
        produced += len;
        batch_len = batch_len % 13 + 1;
        Ok(vec![chunk])
    }
}

fn unit_at(index: usize) -> char {
    char::from(b'a' + (index % 26) as u8)
}

#[test]
fn drainer_keeps_ticking_while_source_stalls() {
    let source = || -> Result<Vec<String>, BoxError> {
        thread::sleep(Duration::from_millis(20));
        Ok(Vec::new())
    };
    let mut processor = StreamProcessor::new(StreamConfig::new(50, 10), source, null_sink())
        .unwrap()
        .with_observer(NoopObserver);
    processor.start().unwrap();

    thread::sleep(Duration::from_millis(400));
    let snapshot = processor.stats();
    assert!(snapshot.empty_ticks >= 8, "50Hz 下 400ms 内应至少空转 8 次，实际 {snapshot:?}");
    assert_eq!(snapshot.windows_dispatched, 0);

    let started = Instant::now();
    let report = processor.stop().unwrap();
    assert!(started.elapsed() < Duration::from_millis(200), "停止不应等待数据");
    assert_eq!(report.drainer.windows, 0);
    assert!(report.drainer.empty_ticks >= 8);
}

#[test]
fn stop_returns_promptly_while_source_call_blocks() {
    let source = || -> Result<Vec<String>, BoxError> {
        thread::sleep(Duration::from_secs(3));
        Ok(vec!["late".to_owned()])
    };
    let mut processor = StreamProcessor::new(StreamConfig::new(50, 4), source, null_sink())
        .unwrap()
        .with_observer(NoopObserver);
    processor.start().unwrap();
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let report = processor.stop().unwrap();

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "停止耗时 {:?}，不应等待阻塞中的数据源",
        started.elapsed()
    );
    assert!(report.feeder_detached);
    assert_eq!(report.feeder.units_written, 0);
    assert!(report.drainer.empty_ticks > 0);
}

#[test]
fn windows_arrive_exact_sized_and_in_order() {
    const CHUNK: usize = 6;
    const LIMIT: usize = CHUNK * 20 + 3;

    let samples = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = samples.clone();
    let observer = move |event: &DispatchEvent<'_>| {
        recorder.lock().push(event.sample_string());
    };

    // 容量只够 3 个窗口，迫使写端反复退避并跨越回绕边界。
    let config = StreamConfig::new(200, CHUNK).with_buffer_capacity(CHUNK * 3);
    let mut processor = StreamProcessor::new(config, counting_source(LIMIT), null_sink())
        .unwrap()
        .with_observer(observer);
    processor.start().unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        samples.lock().len() >= 20 && processor.stats().units_written == LIMIT as u64
    }));
    let report = processor.stop().unwrap();

    let samples = samples.lock();
    assert_eq!(samples.len(), 20, "剩余 3 个单元不足一个窗口，不得派发");
    assert!(samples.iter().all(|s| s.chars().count() == CHUNK));
    let expected: String = (0..CHUNK * 20).map(unit_at).collect();
    assert_eq!(samples.concat(), expected);
    assert_eq!(report.feeder.units_written, LIMIT as u64);
}

#[test]
fn partial_window_leftover_does_not_stall_the_engine() {
    let mut batches = vec![vec!["ab".to_owned()], vec!["cdefghij".to_owned()]].into_iter();
    let source = move || -> Result<Vec<String>, BoxError> {
        match batches.next() {
            Some(batch) => Ok(batch),
            None => {
                thread::sleep(Duration::from_millis(5));
                Ok(Vec::new())
            }
        }
    };

    let samples = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = samples.clone();
    let observer = move |event: &DispatchEvent<'_>| recorder.lock().push(event.sample_string());

    // 容量 8 恰为窗口的两倍多两个单元，配置合法。
    let config = StreamConfig::new(200, 3).with_buffer_capacity(8);
    let mut processor = StreamProcessor::new(config, source, null_sink())
        .unwrap()
        .with_observer(observer);
    processor.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || samples.lock().len() >= 3));
    let report = processor.stop().unwrap();

    assert_eq!(*samples.lock(), vec!["abc", "def", "ghi"]);
    assert_eq!(report.feeder.units_written, 10);
    assert_eq!(report.feeder.abandoned_units, 0);
}

#[test]
fn measured_frequency_converges_to_target_rate() {
    let source = RandomChunkSource::new(20).with_latency(0..=0);
    let mut processor = StreamProcessor::new(StreamConfig::new(50, 20), source, null_sink())
        .unwrap()
        .with_observer(NoopObserver);
    processor.start().unwrap();

    thread::sleep(Duration::from_millis(1_500));
    let measured = processor.last_measured_frequency();
    let report = processor.stop().unwrap();

    let error_pct = (100.0 - measured * 100.0 / 50.0).abs();
    assert!(error_pct <= 15.0, "measured {measured:.2} Hz deviates {error_pct:.2}%");
    assert!(report.drainer.windows > 0);
}

#[test]
fn source_error_stops_engine_and_surfaces_on_stop() {
    let mut calls = 0;
    let source = move || -> Result<Vec<String>, BoxError> {
        calls += 1;
        if calls > 2 {
            return Err("upstream closed".into());
        }
        Ok(vec!["abcdef".to_owned()])
    };
    let mut processor = StreamProcessor::new(StreamConfig::new(50, 3), source, null_sink())
        .unwrap()
        .with_observer(NoopObserver);
    processor.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || !processor.is_running()));
    match processor.stop() {
        Err(StreamError::Source(err)) => assert_eq!(err.to_string(), "upstream closed"),
        other => panic!("expected source error, got {other:?}"),
    }
}

#[test]
fn sink_error_stops_engine_and_surfaces_on_stop() {
    let mut processed = 0;
    let sink = move |_: &[char]| -> Result<(), BoxError> {
        processed += 1;
        if processed == 3 {
            return Err("sink rejected window".into());
        }
        Ok(())
    };
    let mut processor =
        StreamProcessor::new(StreamConfig::new(100, 4), counting_source(400), sink)
            .unwrap()
            .with_observer(NoopObserver);
    processor.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || !processor.is_running()));
    assert_eq!(processor.stats().windows_dispatched, 2);
    assert!(matches!(processor.stop(), Err(StreamError::Sink(_))));
}

#[test]
fn injected_clock_drives_the_meter() {
    let clock = MockClock::new();
    let mut processor =
        StreamProcessor::new(StreamConfig::new(100, 4), counting_source(4_000), null_sink())
            .unwrap()
            .with_observer(NoopObserver)
            .with_clock(Arc::new(clock.clone()));
    processor.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        processor.stats().windows_dispatched >= 5
    }));
    assert_eq!(
        processor.last_measured_frequency(),
        0.0,
        "虚拟时间未推进，刷新窗口不应到期"
    );

    clock.advance(Duration::from_secs(10));
    assert!(wait_until(Duration::from_secs(2), || {
        processor.last_measured_frequency() > 0.0
    }));
    processor.stop().unwrap();
}

#[test]
fn second_start_is_rejected() {
    let mut processor =
        StreamProcessor::new(StreamConfig::new(50, 4), counting_source(0), null_sink()).unwrap();
    processor.start().unwrap();
    assert!(matches!(processor.start(), Err(StreamError::AlreadyStarted)));
    processor.stop().unwrap();
}
