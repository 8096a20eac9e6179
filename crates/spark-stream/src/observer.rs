//! 派发观察者：每个窗口派发后回调一次，替代在处理函数中直接打印调试信息。
//!
//! # 教案式说明
//! - **意图 (Why)**：调试输出是副作用，抽成可注入回调后，测试可以直接断言游标与窗口内容，
//!   生产环境则交给 [`TracingObserver`] 走结构化日志；
//! - **契约 (What)**：回调在读端线程内同步执行，应保持轻量；事件中的游标为本次读取之后的快照。

use tracing::Level;

/// 一次窗口派发的快照。
#[derive(Clone, Copy, Debug)]
pub struct DispatchEvent<'a> {
    /// 读取后的 `read_pos`。
    pub read_pos: u64,
    /// 读取时观测到的 `write_pos`。
    pub write_pos: u64,
    /// 最近一次测得的频率。
    pub frequency: f64,
    /// 刚派发的窗口。
    pub sample: &'a [char],
}

impl DispatchEvent<'_> {
    /// 将窗口内容拼成字符串，便于日志输出。
    pub fn sample_string(&self) -> String {
        self.sample.iter().collect()
    }
}

/// 派发观察者。
pub trait DispatchObserver: Send + Sync + 'static {
    fn on_dispatch(&self, event: &DispatchEvent<'_>);
}

impl<F> DispatchObserver for F
where
    F: Fn(&DispatchEvent<'_>) + Send + Sync + 'static,
{
    fn on_dispatch(&self, event: &DispatchEvent<'_>) {
        self(event)
    }
}

/// 以 `debug` 级别输出每次派发。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_dispatch(&self, event: &DispatchEvent<'_>) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        tracing::debug!(
            read_pos = event.read_pos,
            write_pos = event.write_pos,
            frequency = event.frequency,
            sample = %event.sample_string(),
            "window dispatched"
        );
    }
}

/// 不做任何事的观察者。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn on_dispatch(&self, _event: &DispatchEvent<'_>) {}
}
