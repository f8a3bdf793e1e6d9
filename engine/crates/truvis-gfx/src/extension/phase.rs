/// 扩展在 context 生命周期中所处的阶段
///
/// 只允许按顺序前进一步：
/// `Uninitialized → Initializing → DeviceSelected → Created → Destroyed`
///
/// context 创建失败时，`Initializing` 或 `DeviceSelected` 可以回退到 `Uninitialized`，之后可以重新创建
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtensionPhase {
    #[default]
    Uninitialized,
    /// 可以查看其他扩展，但 context 还不存在
    Initializing,
    /// 已经确定 physical device，记录了能力标记，还不能创建任何 GPU 资源
    DeviceSelected,
    /// 唯一允许创建资源设施的阶段
    Created,
    /// 终止状态
    Destroyed,
}

impl ExtensionPhase {
    /// 合法的下一阶段
    #[inline]
    pub const fn successor(self) -> Option<ExtensionPhase> {
        match self {
            ExtensionPhase::Uninitialized => Some(ExtensionPhase::Initializing),
            ExtensionPhase::Initializing => Some(ExtensionPhase::DeviceSelected),
            ExtensionPhase::DeviceSelected => Some(ExtensionPhase::Created),
            ExtensionPhase::Created => Some(ExtensionPhase::Destroyed),
            ExtensionPhase::Destroyed => None,
        }
    }

    /// 推进到 `next` 阶段
    ///
    /// # Panics
    /// 驱动方乱序调用 hook 时直接 panic：继续执行可能会在不存在或已销毁的 context 上创建 GPU 对象
    pub fn advance(&mut self, next: ExtensionPhase, extension: &str) {
        assert_eq!(
            self.successor(),
            Some(next),
            "extension `{}`: illegal lifecycle transition {:?} -> {:?}",
            extension,
            self,
            next
        );
        log::info!("extension `{}`: {:?} -> {:?}", extension, self, next);
        *self = next;
    }

    /// context 创建失败，回退到 `Uninitialized`
    ///
    /// # Panics
    /// 只有 `Initializing` 与 `DeviceSelected` 可以回退
    pub fn rollback(&mut self, extension: &str) {
        assert!(
            matches!(self, ExtensionPhase::Initializing | ExtensionPhase::DeviceSelected),
            "extension `{}`: illegal lifecycle rollback from {:?}",
            extension,
            self
        );
        log::warn!("extension `{}`: {:?} -> {:?} (bring-up aborted)", extension, self, ExtensionPhase::Uninitialized);
        *self = ExtensionPhase::Uninitialized;
    }

    #[inline]
    pub fn is_created(self) -> bool {
        self == ExtensionPhase::Created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sequence() {
        let mut phase = ExtensionPhase::default();
        for next in [
            ExtensionPhase::Initializing,
            ExtensionPhase::DeviceSelected,
            ExtensionPhase::Created,
            ExtensionPhase::Destroyed,
        ] {
            phase.advance(next, "test");
        }
        assert_eq!(phase, ExtensionPhase::Destroyed);
        assert_eq!(phase.successor(), None);
    }

    #[test]
    #[should_panic(expected = "illegal lifecycle transition")]
    fn test_skip_phase_panics() {
        let mut phase = ExtensionPhase::Initializing;
        phase.advance(ExtensionPhase::Created, "test");
    }

    #[test]
    fn test_rollback_allows_retry() {
        let mut phase = ExtensionPhase::default();
        phase.advance(ExtensionPhase::Initializing, "test");
        phase.advance(ExtensionPhase::DeviceSelected, "test");
        phase.rollback("test");
        assert_eq!(phase, ExtensionPhase::Uninitialized);

        phase.advance(ExtensionPhase::Initializing, "test");
        phase.rollback("test");
        assert_eq!(phase, ExtensionPhase::Uninitialized);
        phase.advance(ExtensionPhase::Initializing, "test");
    }

    #[test]
    #[should_panic(expected = "illegal lifecycle rollback")]
    fn test_created_cannot_rollback() {
        let mut phase = ExtensionPhase::Created;
        phase.rollback("test");
    }

    #[test]
    #[should_panic(expected = "illegal lifecycle transition")]
    fn test_destroyed_is_terminal() {
        let mut phase = ExtensionPhase::Destroyed;
        phase.advance(ExtensionPhase::Initializing, "test");
    }
}
