use std::sync::atomic::{AtomicU64, Ordering};

/// 引擎运行期计数器，两个循环各自递增，控制面随时读取快照。
///
/// 计数只用于观测，不参与同步，因此统一使用 `Relaxed`。
#[derive(Debug, Default)]
pub struct EngineStats {
    units_written: AtomicU64,
    windows_dispatched: AtomicU64,
    empty_ticks: AtomicU64,
    feeder_backoffs: AtomicU64,
    stall_warnings: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_units_written(&self, units: usize) {
        self.units_written
            .fetch_add(units as u64, Ordering::Relaxed);
    }

    pub(crate) fn inc_windows_dispatched(&self) {
        self.windows_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_empty_ticks(&self) {
        self.empty_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_feeder_backoffs(&self) {
        self.feeder_backoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_stall_warnings(&self) {
        self.stall_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            units_written: self.units_written.load(Ordering::Relaxed),
            windows_dispatched: self.windows_dispatched.load(Ordering::Relaxed),
            empty_ticks: self.empty_ticks.load(Ordering::Relaxed),
            feeder_backoffs: self.feeder_backoffs.load(Ordering::Relaxed),
            stall_warnings: self.stall_warnings.load(Ordering::Relaxed),
        }
    }
}

/// [`EngineStats`] 的只读快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 写端成功写入缓冲的单元总数。
    pub units_written: u64,
    /// 已派发给处理端的窗口数。
    pub windows_dispatched: u64,
    /// 因数据不足而空转的 tick 数。
    pub empty_ticks: u64,
    /// 写端因缓冲满而退避的次数。
    pub feeder_backoffs: u64,
    /// 数据源停滞告警次数。
    pub stall_warnings: u64,
}

impl StatsSnapshot {
    /// 读端已触发的 tick 总数。
    pub fn ticks(&self) -> u64 {
        self.windows_dispatched + self.empty_ticks
    }
}
