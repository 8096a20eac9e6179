use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// 停止信号，统一表达两个循环的协作式退出。
///
/// # 设计背景（Why）
/// - 任一循环因错误终止时需要通知对端停止，控制面调用 `stop()` 时也需要同时通知两端；
/// - 以单个原子位表达，读端检查时不涉及任何锁。
///
/// # 契约说明（What）
/// - `cancel` 在首次成功设置停止位时返回 `true`，重复调用返回 `false`；
/// - 循环在每次迭代开头检查 `is_cancelled`，已开始的写入/派发会完整结束后才退出。
#[derive(Clone, Debug)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// 创建处于“未停止”状态的令牌。
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 标记停止；返回值为 `true` 表示本次调用首次触发。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
