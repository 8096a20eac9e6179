// 教案级说明：为了让 Loom 在模型检查阶段能够捕获游标原子操作的所有调度交错，
// 当启用 `--cfg loom`（或 `spark_loom`）且打开 `loom-model` feature 时切换到它提供的原子类型；`Arc` 保持标准实现，
// 缓冲槽位的 `UnsafeCell` 也沿用标准库版本，模型只关注游标的发布/获取顺序。
#[cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]
pub(crate) use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
pub(crate) use loom::sync::atomic::{AtomicU64, Ordering};

/// 按缓存行对齐的包装，避免读写游标落在同一缓存行上产生伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct CachePadded<T>(pub(crate) T);

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
