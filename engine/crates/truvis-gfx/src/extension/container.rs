use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::extension::GfxExtension;
use crate::foundation::physical_device::{DeviceFeatures, PhysicalDeviceInfo};

/// 汇总所有扩展之后，创建 device 时需要开启的内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRequest {
    /// 按扩展注册顺序排列，已去重
    pub extensions: Vec<&'static CStr>,
    pub features: DeviceFeatures,
}

/// 扩展容器，同时也是 context 创建流程的驱动方
///
/// 扩展以 `Arc` 保存：业务代码可以在注册时拿到同一个 `Arc`，
/// 之后直接通过它访问扩展提供的功能（例如 allocator）。
pub struct ExtensionContainer<C> {
    extensions: Vec<Arc<dyn GfxExtension<C>>>,

    /// bring_up 成功之后为 true，tear_down 之后恢复为 false
    brought_up: AtomicBool,
}

impl<C: 'static> Default for ExtensionContainer<C> {
    fn default() -> Self {
        Self::new()
    }
}

// 注册与查询
impl<C: 'static> ExtensionContainer<C> {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
            brought_up: AtomicBool::new(false),
        }
    }

    /// 注册一个扩展，返回共享的句柄
    pub fn add<E: GfxExtension<C>>(&mut self, extension: E) -> Arc<E> {
        self.add_shared(Arc::new(extension))
    }

    pub fn add_shared<E: GfxExtension<C>>(&mut self, extension: Arc<E>) -> Arc<E> {
        assert!(
            !self.contains(extension.name()),
            "extension `{}` registered twice",
            extension.name()
        );
        self.extensions.push(extension.clone());
        extension
    }

    /// 按类型查找扩展
    pub fn get<E: GfxExtension<C>>(&self) -> Option<&E> {
        self.extensions.iter().find_map(|ext| ext.as_any().downcast_ref::<E>())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext.name() == name)
    }

    #[inline]
    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// 是否有一个由 bring_up 创建、尚未 tear_down 的 context
    #[inline]
    pub fn is_brought_up(&self) -> bool {
        self.brought_up.load(Ordering::Acquire)
    }
}

// context 的创建与销毁流程
impl<C: 'static> ExtensionContainer<C> {
    /// 驱动所有扩展完成 context 的创建
    ///
    /// 在 context 创建出来之前失败时，所有扩展都会收到 `on_context_aborted` 并回到初始状态，
    /// 错误原样返回，之后可以再次调用 bring_up
    ///
    /// # Parameters
    /// - `candidates`: 候选显卡，`D` 是显卡的原始句柄（vulkan 下是 `vk::PhysicalDevice`）
    /// - `create_context`: 用选中的显卡以及汇总后的请求创建 context
    pub fn bring_up<D, F>(&self, candidates: Vec<(D, PhysicalDeviceInfo)>, create_context: F) -> GfxResult<Arc<C>>
    where
        F: FnOnce(D, &PhysicalDeviceInfo, &DeviceRequest) -> GfxResult<Arc<C>>,
    {
        log::info!("bringing up context with extensions: {:?}", self.names());

        for ext in &self.extensions {
            ext.on_context_initializing(self);
        }

        let context = match self.select_and_create(candidates, create_context) {
            Ok(context) => context,
            Err(err) => {
                log::error!("context bring-up failed: {}", err);
                for ext in self.extensions.iter().rev() {
                    ext.on_context_aborted();
                }
                return Err(err);
            }
        };

        for ext in &self.extensions {
            ext.on_context_created(&context, self);
        }
        self.brought_up.store(true, Ordering::Release);

        Ok(context)
    }

    /// 通知所有扩展 context 即将销毁，顺序与注册顺序相反
    ///
    /// 没有成功 bring_up 过的 context 时什么都不做
    ///
    /// 调用方需要保证此时没有其他线程在访问扩展提供的资源
    pub fn tear_down(&self) {
        if !self.brought_up.swap(false, Ordering::AcqRel) {
            log::warn!("tear_down without a live context, skipped");
            return;
        }
        for ext in self.extensions.iter().rev() {
            ext.on_destroy_context();
        }
        log::info!("context torn down");
    }

    fn select_and_create<D, F>(&self, candidates: Vec<(D, PhysicalDeviceInfo)>, create_context: F) -> GfxResult<Arc<C>>
    where
        F: FnOnce(D, &PhysicalDeviceInfo, &DeviceRequest) -> GfxResult<Arc<C>>,
    {
        let (raw_device, device) = self.select_physical_device(candidates)?;
        log::info!("selected gpu: {:?}", device.name());

        for ext in &self.extensions {
            ext.on_physical_device_selected(&device);
        }

        let request = self.collect_device_request(&device)?;
        log::info!("device request: {:?}", request);

        create_context(raw_device, &device, &request)
    }

    /// 所有扩展都接受的显卡中，优先选择独立显卡，否则选第一个
    pub fn select_physical_device<D>(&self, candidates: Vec<(D, PhysicalDeviceInfo)>) -> GfxResult<(D, PhysicalDeviceInfo)> {
        let mut rejections = Vec::new();
        let mut accepted = candidates
            .into_iter()
            .filter(|(_, info)| match self.check_physical_device(info) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("skip gpu {:?}: {}", info.name(), err);
                    rejections.push(err);
                    false
                }
            })
            .collect_vec();

        if accepted.is_empty() {
            return Err(GfxError::NoSuitablePhysicalDevice { rejections });
        }

        let index = accepted.iter().position(|(_, info)| info.is_discrete_gpu()).unwrap_or(0);
        Ok(accepted.swap_remove(index))
    }

    /// 显卡必须有 gfx queue，并且每个扩展都接受它
    pub fn check_physical_device(&self, device: &PhysicalDeviceInfo) -> GfxResult<()> {
        if device.gfx_queue_family_index().is_none() {
            return Err(GfxError::DeviceCapabilityUnsatisfied {
                extension: "ExtensionContainer",
                device: device.name().to_string(),
                missing: "queue family with GRAPHICS | COMPUTE | TRANSFER".to_string(),
            });
        }
        self.extensions.iter().try_for_each(|ext| ext.accepts_physical_device(device))
    }

    /// 汇总所有扩展的 device extension 以及 feature 请求，并确认显卡全部支持
    pub fn collect_device_request(&self, device: &PhysicalDeviceInfo) -> GfxResult<DeviceRequest> {
        let mut request = DeviceRequest::default();

        for ext in &self.extensions {
            for name in ext.required_device_extension_names(device) {
                if !device.supports_extension(name) {
                    return Err(GfxError::DeviceCapabilityUnsatisfied {
                        extension: ext.name(),
                        device: device.name().to_string(),
                        missing: format!("device extension {:?}", name),
                    });
                }
                if !request.extensions.contains(&name) {
                    request.extensions.push(name);
                }
            }

            let features = ext.required_device_features(device);
            if !device.supports_features(features) {
                return Err(GfxError::DeviceCapabilityUnsatisfied {
                    extension: ext.name(),
                    device: device.name().to_string(),
                    missing: format!("device features {:?}", features - device.features()),
                });
            }
            request.features |= features;
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use parking_lot::Mutex;
    use std::any::Any;

    #[derive(Debug)]
    struct FakeContext;

    /// 记录 hook 调用顺序的扩展
    struct Recorder {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        device_exts: Vec<&'static CStr>,
        reject: Option<&'static str>,
    }

    impl Recorder {
        fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                journal: journal.clone(),
                device_exts: Vec::new(),
                reject: None,
            }
        }

        fn log(&self, event: &str) {
            self.journal.lock().push(format!("{}:{}", self.name, event));
        }
    }

    impl GfxExtension<FakeContext> for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn accepts_physical_device(&self, device: &PhysicalDeviceInfo) -> GfxResult<()> {
            match self.reject {
                Some(rejected) if rejected == device.name() => Err(GfxError::DeviceCapabilityUnsatisfied {
                    extension: self.name,
                    device: device.name().to_string(),
                    missing: "everything".to_string(),
                }),
                _ => Ok(()),
            }
        }

        fn on_context_initializing(&self, container: &ExtensionContainer<FakeContext>) {
            assert!(container.contains(self.name));
            self.log("initializing");
        }

        fn on_physical_device_selected(&self, device: &PhysicalDeviceInfo) {
            self.log(&format!("selected({})", device.name()));
        }

        fn required_device_extension_names(&self, _device: &PhysicalDeviceInfo) -> Vec<&'static CStr> {
            self.device_exts.clone()
        }

        fn on_context_created(&self, _context: &Arc<FakeContext>, _container: &ExtensionContainer<FakeContext>) {
            self.log("created");
        }

        fn on_context_aborted(&self) {
            self.log("aborted");
        }

        fn on_destroy_context(&self) {
            self.log("destroy");
        }
    }

    fn gpu(name: &str, device_type: vk::PhysicalDeviceType) -> ((), PhysicalDeviceInfo) {
        ((), PhysicalDeviceInfo::new(name, device_type).with_extensions([ash::ext::memory_budget::NAME]))
    }

    #[test]
    fn test_hook_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::new();
        container.add(Recorder::new("a", &journal));
        container.add(Recorder::new("b", &journal));

        let context = container
            .bring_up(vec![gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU)], |_, _, _| {
                journal.lock().push("create".to_string());
                Ok(Arc::new(FakeContext))
            })
            .unwrap();
        container.tear_down();
        drop(context);

        assert_eq!(
            *journal.lock(),
            vec![
                "a:initializing",
                "b:initializing",
                "a:selected(igpu)",
                "b:selected(igpu)",
                "create",
                "a:created",
                "b:created",
                "b:destroy",
                "a:destroy",
            ]
        );
    }

    #[test]
    fn test_prefer_discrete_gpu() {
        let container = ExtensionContainer::<FakeContext>::new();
        let (_, selected) = container
            .select_physical_device(vec![
                gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
                gpu("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            ])
            .unwrap();
        assert_eq!(selected.name(), "dgpu");
    }

    #[test]
    fn test_rejected_device_is_skipped() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::new();
        let mut picky = Recorder::new("picky", &journal);
        picky.reject = Some("dgpu");
        container.add(picky);

        let (_, selected) = container
            .select_physical_device(vec![
                gpu("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
                gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ])
            .unwrap();
        assert_eq!(selected.name(), "igpu");

        let err = container
            .select_physical_device(vec![gpu("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU)])
            .err()
            .unwrap();
        let GfxError::NoSuitablePhysicalDevice { rejections } = err else {
            panic!("expected NoSuitablePhysicalDevice");
        };
        assert_eq!(rejections.len(), 1);
        assert!(matches!(
            &rejections[0],
            GfxError::DeviceCapabilityUnsatisfied { extension: "picky", device, .. } if device.as_str() == "dgpu"
        ));
    }

    #[test]
    fn test_device_without_gfx_queue_falls_back() {
        let container = ExtensionContainer::<FakeContext>::new();
        let (raw, compute_only) = gpu("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        let (_, selected) = container
            .select_physical_device(vec![
                (raw, compute_only.with_gfx_queue_family_index(None)),
                gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ])
            .unwrap();
        assert_eq!(selected.name(), "igpu");
    }

    #[test]
    fn test_failed_bring_up_rolls_back_and_retries() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::new();
        container.add(Recorder::new("a", &journal));
        container.add(Recorder::new("b", &journal));

        let err = container
            .bring_up(vec![gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU)], |_, _, _| {
                Err::<Arc<FakeContext>, _>(GfxError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
            })
            .err()
            .unwrap();
        assert!(matches!(err, GfxError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY)));
        assert!(!container.is_brought_up());

        // 没有 context 时 tear_down 不会通知扩展
        container.tear_down();

        let context = container
            .bring_up(vec![gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU)], |_, _, _| {
                Ok(Arc::new(FakeContext))
            })
            .unwrap();
        assert!(container.is_brought_up());
        container.tear_down();
        assert!(!container.is_brought_up());
        drop(context);

        assert_eq!(
            *journal.lock(),
            vec![
                "a:initializing",
                "b:initializing",
                "a:selected(igpu)",
                "b:selected(igpu)",
                "b:aborted",
                "a:aborted",
                "a:initializing",
                "b:initializing",
                "a:selected(igpu)",
                "b:selected(igpu)",
                "a:created",
                "b:created",
                "b:destroy",
                "a:destroy",
            ]
        );
    }

    #[test]
    fn test_device_request_dedup_and_missing() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::new();
        let mut a = Recorder::new("a", &journal);
        a.device_exts = vec![ash::ext::memory_budget::NAME];
        let mut b = Recorder::new("b", &journal);
        b.device_exts = vec![ash::ext::memory_budget::NAME];
        container.add(a);
        container.add(b);

        let (_, device) = gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU);
        let request = container.collect_device_request(&device).unwrap();
        assert_eq!(request.extensions, vec![ash::ext::memory_budget::NAME]);

        let mut c = Recorder::new("c", &journal);
        c.device_exts = vec![ash::ext::memory_priority::NAME];
        container.add(c);
        let err = container.collect_device_request(&device).err().unwrap();
        assert!(matches!(err, GfxError::DeviceCapabilityUnsatisfied { extension: "c", .. }));
    }

    #[test]
    fn test_get_by_type() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::<FakeContext>::new();
        let shared = container.add(Recorder::new("a", &journal));

        let found = container.get::<Recorder>().unwrap();
        assert!(std::ptr::eq(found, shared.as_ref()));
        assert_eq!(container.names(), vec!["a"]);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut container = ExtensionContainer::<FakeContext>::new();
        container.add(Recorder::new("a", &journal));
        container.add(Recorder::new("a", &journal));
    }
}
