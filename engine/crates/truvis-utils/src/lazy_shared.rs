use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// 延迟创建的共享资源槽位
///
/// 槽位内部只保存 [`Weak`]，所有权完全交给调用方：
/// - 有调用方仍然持有 `Arc<T>` 时，`get` 返回同一个实例，不会重复创建
/// - 最后一个 `Arc<T>` 被释放后实例立即销毁，下一次 `get` 会重新创建
///
/// 检查与创建在同一把锁内完成，因此并发未命中时 factory 也只会被调用一次。
/// GPU 侧的 allocator 创建会申请驱动句柄，不能容忍"先各自创建再丢弃一个"。
///
/// # 嵌套创建
/// factory 内部可以访问 *其他* 槽位（例如 resource allocator 依赖 memory allocator），
/// 但不能重入同一个槽位，否则会死锁。各槽位之间的依赖必须是无环的。
pub struct LazyShared<T> {
    slot: Mutex<Weak<T>>,
}

impl<T> Default for LazyShared<T> {
    fn default() -> Self {
        Self::new()
    }
}

// 创建
impl<T> LazyShared<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Weak::new()),
        }
    }
}

// 获取
impl<T> LazyShared<T> {
    /// 如果已有存活实例则共享它，否则调用 `factory` 创建新实例
    #[inline]
    pub fn get(&self, factory: impl FnOnce() -> T) -> Arc<T> {
        match self.try_get(|| Ok::<T, std::convert::Infallible>(factory())) {
            Ok(shared) => shared,
            Err(never) => match never {},
        }
    }

    /// [`LazyShared::get`] 的可失败版本
    ///
    /// factory 失败时槽位保持为空，错误原样返回给调用方。
    pub fn try_get<E>(&self, factory: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock();
        if let Some(shared) = slot.upgrade() {
            log::trace!("LazyShared<{}>: reuse live instance", std::any::type_name::<T>());
            return Ok(shared);
        }

        let shared = Arc::new(factory()?);
        *slot = Arc::downgrade(&shared);
        Ok(shared)
    }

    /// 只尝试共享已存在的实例，不会创建
    #[inline]
    pub fn peek(&self) -> Option<Arc<T>> {
        self.slot.lock().upgrade()
    }

    /// 外部是否还有持有者
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.slot.lock().strong_count() > 0
    }

    /// 忘掉当前的弱引用
    ///
    /// 不会影响外部已经持有的实例，只是让之后的 `peek` 看不到它。
    pub fn reset(&self) {
        *self.slot.lock() = Weak::new();
    }
}
