//! 固定容量、单写单读的环形缓冲。
//!
//! # 模块定位（Why）
//! - 引擎在构造时一次性分配全部存储，写端（Feeder）与读端（Drainer）共享同一块内存，
//!   整个生命周期内不扩容、不重新分配；
//! - 读端必须永不阻塞：两端之间不共享任何锁，只通过各自游标的原子发布/获取协作。
//!
//! # 设计概要（How）
//! - `write_pos`/`read_pos` 为单调递增的 `u64` 逻辑偏移，只在访问内存时才映射为 `pos % capacity`
//!   的物理下标，从而消除“游标相等究竟是空还是满”的歧义；
//! - `write_pos - read_pos` 即当前已缓冲单元数，恒满足 `0 <= used <= capacity`；
//! - [`CircularBuffer::split`] 产出唯一的 [`BufferWriter`] 与 [`BufferReader`]，二者 `Send` 但不可
//!   `Clone`/`Sync`，由类型系统保证单生产者/单消费者。
//!
//! # 内存序（What）
//! - 写端：先拷贝数据，再以 `Release` 发布新的 `write_pos`；
//! - 读端：以 `Acquire` 读取 `write_pos` 后拷贝数据，再以 `Release` 发布新的 `read_pos`；
//! - 写端以 `Acquire` 读取 `read_pos`，确保读端对旧槽位的拷贝先于覆盖写完成。

use std::{cell::Cell, cell::UnsafeCell, fmt, marker::PhantomData, ptr, sync::Arc};

use crate::{
    error::{CapacityExceeded, ConfigError, InsufficientData},
    sync::{AtomicU64, CachePadded, Ordering},
};

/// 尚未拆分的环形缓冲。
///
/// 构造即完成唯一一次存储分配；随后通过 [`split`](Self::split) 交给两个循环分别持有。
pub struct CircularBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Default> CircularBuffer<T> {
    /// 分配 `capacity` 个单元的存储。
    ///
    /// # 契约说明（What）
    /// - `capacity == 0` 返回 [`ConfigError::ZeroCapacity`]；
    /// - 槽位以 `T::default()` 初始化，之后不会再发生任何分配。
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let storage: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            shared: Arc::new(Shared {
                storage,
                capacity,
                write_pos: CachePadded(AtomicU64::new(0)),
                read_pos: CachePadded(AtomicU64::new(0)),
            }),
        })
    }
}

impl<T> CircularBuffer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// 拆分为唯一的写端与读端。
    pub fn split(self) -> (BufferWriter<T>, BufferReader<T>) {
        (
            BufferWriter {
                shared: Arc::clone(&self.shared),
                _not_sync: PhantomData,
            },
            BufferReader {
                shared: self.shared,
                _not_sync: PhantomData,
            },
        )
    }
}

impl<T> fmt::Debug for CircularBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shared.debug_fields(f.debug_struct("CircularBuffer"))
    }
}

struct Shared<T> {
    storage: Box<[UnsafeCell<T>]>,
    capacity: usize,
    write_pos: CachePadded<AtomicU64>,
    read_pos: CachePadded<AtomicU64>,
}

// SAFETY: 槽位访问由游标协议隔离：写端只触碰 `[write_pos, read_pos + capacity)`，
// 读端只触碰 `[read_pos, write_pos)`，两段区间在任意时刻互不重叠。
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn base(&self) -> *mut T {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    fn index(&self, pos: u64) -> usize {
        (pos % self.capacity as u64) as usize
    }

    fn used(write: u64, read: u64) -> usize {
        write.wrapping_sub(read) as usize
    }

    fn snapshot(&self) -> (u64, u64) {
        let read = self.read_pos.load(Ordering::Acquire);
        let write = self.write_pos.load(Ordering::Acquire);
        (read, write)
    }

    fn debug_fields(&self, mut builder: fmt::DebugStruct<'_, '_>) -> fmt::Result {
        let (read, write) = self.snapshot();
        builder
            .field("capacity", &self.capacity)
            .field("read_pos", &read)
            .field("write_pos", &write)
            .finish()
    }
}

/// 写端：唯一允许推进 `write_pos` 的句柄。
pub struct BufferWriter<T> {
    shared: Arc<Shared<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Copy> BufferWriter<T> {
    /// 追加 `data` 全部单元，要么整体成功，要么完全不生效。
    ///
    /// # 教案式说明
    /// - **逻辑 (How)**：从 `write_pos % capacity` 开始拷贝；若跨越容量边界，拆成尾段与头段两次拷贝；
    /// - **契约 (What)**：
    ///   - `data.len() > capacity - (write_pos - read_pos)` 时返回 [`CapacityExceeded`]，
    ///     `write_pos` 与缓冲内容均不变；
    ///   - 成功后 `write_pos` 前进 `data.len()`；空切片直接成功。
    pub fn write(&mut self, data: &[T]) -> Result<(), CapacityExceeded> {
        let shared = &*self.shared;
        let write = shared.write_pos.load(Ordering::Relaxed);
        let read = shared.read_pos.load(Ordering::Acquire);
        let free = shared.capacity - Shared::<T>::used(write, read);

        if data.len() > free {
            return Err(CapacityExceeded {
                requested: data.len(),
                free,
                capacity: shared.capacity,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let start = shared.index(write);
        let head = data.len().min(shared.capacity - start);
        // SAFETY: `[write, write + len)` 位于空闲区间内，读端在观察到新的 `write_pos` 之前不会访问；
        // `start + head <= capacity` 且 `len - head <= start`，两段拷贝都不越界。
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), shared.base().add(start), head);
            ptr::copy_nonoverlapping(data.as_ptr().add(head), shared.base(), data.len() - head);
        }

        shared
            .write_pos
            .store(write.wrapping_add(data.len() as u64), Ordering::Release);
        Ok(())
    }
}

impl<T> BufferWriter<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// 已缓冲单元数的瞬时快照。
    pub fn available(&self) -> usize {
        let (read, write) = self.shared.snapshot();
        Shared::<T>::used(write, read)
    }

    /// 当前可写入的空闲单元数。
    pub fn free(&self) -> usize {
        self.shared.capacity - self.available()
    }

    pub fn write_pos(&self) -> u64 {
        self.shared.write_pos.load(Ordering::Relaxed)
    }

    pub fn read_pos(&self) -> u64 {
        self.shared.read_pos.load(Ordering::Acquire)
    }

    /// 底层存储的地址；同一缓冲的生命周期内保持不变。
    pub fn storage_addr(&self) -> usize {
        self.shared.base() as usize
    }
}

impl<T> fmt::Debug for BufferWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shared.debug_fields(f.debug_struct("BufferWriter"))
    }
}

/// 读端：唯一允许推进 `read_pos` 的句柄。
pub struct BufferReader<T> {
    shared: Arc<Shared<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Copy + Default> BufferReader<T> {
    /// 取出 `size` 个单元并返回新分配的窗口。
    ///
    /// 数据不足时返回 [`InsufficientData`]，`read_pos` 不变；窗口是拷贝而非借用，
    /// 因为对应槽位随后会被写端覆盖。
    pub fn read_window(&mut self, size: usize) -> Result<Vec<T>, InsufficientData> {
        let available = self.available();
        if size > available {
            return Err(InsufficientData {
                requested: size,
                available,
            });
        }

        let mut window = vec![T::default(); size];
        self.read_window_into(&mut window)?;
        Ok(window)
    }
}

impl<T: Copy> BufferReader<T> {
    /// 取出 `dst.len()` 个单元写入调用方持有的窗口，避免每个 tick 重新分配。
    ///
    /// # 契约说明（What）
    /// - 可读单元少于 `dst.len()` 时返回 [`InsufficientData`]，`read_pos` 与 `dst` 均不变；
    /// - 成功后 `dst` 恰好包含 `[read_pos, read_pos + len)` 的内容（跨越边界时自动拼接），
    ///   `read_pos` 前进 `dst.len()`。
    pub fn read_window_into(&mut self, dst: &mut [T]) -> Result<(), InsufficientData> {
        let shared = &*self.shared;
        let read = shared.read_pos.load(Ordering::Relaxed);
        let write = shared.write_pos.load(Ordering::Acquire);
        let available = Shared::<T>::used(write, read);

        if dst.len() > available {
            return Err(InsufficientData {
                requested: dst.len(),
                available,
            });
        }
        if dst.is_empty() {
            return Ok(());
        }

        let start = shared.index(read);
        let head = dst.len().min(shared.capacity - start);
        // SAFETY: `[read, read + len)` 已由写端以 Release 发布，写端在观察到新的 `read_pos`
        // 之前不会覆盖这些槽位；下标计算与写路径对称，不越界。
        unsafe {
            ptr::copy_nonoverlapping(shared.base().add(start), dst.as_mut_ptr(), head);
            ptr::copy_nonoverlapping(
                shared.base(),
                dst.as_mut_ptr().add(head),
                dst.len() - head,
            );
        }

        shared
            .read_pos
            .store(read.wrapping_add(dst.len() as u64), Ordering::Release);
        Ok(())
    }
}

impl<T> BufferReader<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// 已缓冲单元数的瞬时快照。
    pub fn available(&self) -> usize {
        let (read, write) = self.shared.snapshot();
        Shared::<T>::used(write, read)
    }

    pub fn read_pos(&self) -> u64 {
        self.shared.read_pos.load(Ordering::Relaxed)
    }

    pub fn write_pos(&self) -> u64 {
        self.shared.write_pos.load(Ordering::Acquire)
    }

    /// 底层存储的地址；同一缓冲的生命周期内保持不变。
    pub fn storage_addr(&self) -> usize {
        self.shared.base() as usize
    }
}

impl<T> fmt::Debug for BufferReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.shared.debug_fields(f.debug_struct("BufferReader"))
    }
}
