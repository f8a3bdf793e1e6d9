//! 资源扩展：按需创建并共享 memory allocator、resource allocator、sampler pool 以及 staging manager
//!
//! 扩展本身只持有 context 和各设施的弱引用，所有权完全属于外部调用方：
//! - 有人持有时，多次访问得到同一个实例
//! - 最后一个持有者释放后实例立即销毁，下一次访问重新创建
//!
//! 设施之间的依赖是无环的：staging → resource allocator → memory allocator，
//! 每个设施有自己独立的锁，因此嵌套创建不会死锁。

pub mod capability;
pub mod config;
pub mod vk_factory;

use std::any::Any;
use std::ffi::CStr;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use truvis_utils::LazyShared;

use crate::error::{GfxError, GfxResult};
use crate::extension::resources::capability::{AllocatorFeatures, CapabilityNegotiator, CapabilityRequest};
use crate::extension::resources::config::ResourcesConfig;
use crate::extension::{ExtensionContainer, ExtensionPhase, GfxExtension};
use crate::foundation::physical_device::{DeviceFeatures, PhysicalDeviceInfo};

/// 四种设施的具体创建方式
///
/// 生命周期管理与具体的图形 API 在这里分开：vulkan 的实现见 [`vk_factory::VkFacilityFactory`]
pub trait FacilityFactory: Send + Sync + 'static {
    type Context: Send + Sync + 'static;
    type MemoryAllocator: Send + Sync + 'static;
    type ResourceAllocator: Send + Sync + 'static;
    type SamplerPool: Send + Sync + 'static;
    type StagingManager: Send + Sync + 'static;

    fn create_memory_allocator(
        &self,
        context: &Arc<Self::Context>,
        features: AllocatorFeatures,
    ) -> GfxResult<Self::MemoryAllocator>;

    fn create_resource_allocator(
        &self,
        context: &Arc<Self::Context>,
        memory_allocator: Arc<Self::MemoryAllocator>,
    ) -> GfxResult<Self::ResourceAllocator>;

    fn create_sampler_pool(&self, context: &Arc<Self::Context>) -> GfxResult<Self::SamplerPool>;

    fn create_staging_manager(
        &self,
        context: &Arc<Self::Context>,
        resource_allocator: Arc<Self::ResourceAllocator>,
    ) -> GfxResult<Self::StagingManager>;
}

struct LifecycleState<C> {
    phase: ExtensionPhase,
    /// 只是反向引用，绝不延长 context 的生命周期
    context: Weak<C>,
    /// 在 `on_physical_device_selected` 中确定
    request: CapabilityRequest,
}

/// 资源扩展
///
/// # 使用示例
/// ```ignore
/// let mut extensions = ExtensionContainer::new();
/// let resources = extensions.add(GfxResourcesExtension::new(VkFacilityFactory));
/// let context = GfxContext::create("MyApp", &extensions)?;
///
/// let allocator = resources.resource_allocator()?;
/// // ...
/// drop(allocator);
/// context.destroy(&extensions);
/// ```
pub struct ResourcesExtension<F: FacilityFactory> {
    factory: F,
    config: ResourcesConfig,

    /// 访问设施时持有读锁，销毁 context 时持有写锁，因此销毁是一个屏障
    state: RwLock<LifecycleState<F::Context>>,

    memory_allocator: LazyShared<F::MemoryAllocator>,
    resource_allocator: LazyShared<F::ResourceAllocator>,
    sampler_pool: LazyShared<F::SamplerPool>,
    staging: LazyShared<F::StagingManager>,
}

// 创建
impl<F: FacilityFactory> ResourcesExtension<F> {
    pub const NAME: &'static str = CapabilityNegotiator::<'static>::EXTENSION_NAME;

    pub fn new(factory: F) -> Self {
        Self::with_config(factory, ResourcesConfig::default())
    }

    pub fn with_config(factory: F, config: ResourcesConfig) -> Self {
        Self {
            factory,
            config,
            state: RwLock::new(LifecycleState {
                phase: ExtensionPhase::Uninitialized,
                context: Weak::new(),
                request: CapabilityRequest::default(),
            }),
            memory_allocator: LazyShared::new(),
            resource_allocator: LazyShared::new(),
            sampler_pool: LazyShared::new(),
            staging: LazyShared::new(),
        }
    }
}

// getters
impl<F: FacilityFactory> ResourcesExtension<F> {
    #[inline]
    pub fn phase(&self) -> ExtensionPhase {
        self.state.read().phase
    }

    #[inline]
    pub fn config(&self) -> &ResourcesConfig {
        &self.config
    }

    #[inline]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// 选定显卡之后才有值
    pub fn capability_request(&self) -> Option<CapabilityRequest> {
        let state = self.state.read();
        match state.phase {
            ExtensionPhase::Uninitialized | ExtensionPhase::Initializing => None,
            _ => Some(state.request.clone()),
        }
    }

    /// 目前仍被外部持有的设施
    pub fn live_facilities(&self) -> Vec<&'static str> {
        [
            ("memory_allocator", self.memory_allocator.is_alive()),
            ("resource_allocator", self.resource_allocator.is_alive()),
            ("sampler_pool", self.sampler_pool.is_alive()),
            ("staging", self.staging.is_alive()),
        ]
        .into_iter()
        .filter_map(|(name, alive)| alive.then_some(name))
        .collect()
    }
}

// 设施访问
impl<F: FacilityFactory> ResourcesExtension<F> {
    /// 底层的 memory allocator，根据协商的能力配置创建参数
    pub fn memory_allocator(&self) -> GfxResult<Arc<F::MemoryAllocator>> {
        let state = self.state.read();
        let context = Self::live_context(&state, "memory_allocator")?;
        self.memory_allocator_in(&state, &context)
    }

    /// 基于 memory allocator 的资源分配器，会共享而不是重复创建 memory allocator
    pub fn resource_allocator(&self) -> GfxResult<Arc<F::ResourceAllocator>> {
        let state = self.state.read();
        let context = Self::live_context(&state, "resource_allocator")?;
        self.resource_allocator_in(&state, &context)
    }

    pub fn sampler_pool(&self) -> GfxResult<Arc<F::SamplerPool>> {
        let state = self.state.read();
        let context = Self::live_context(&state, "sampler_pool")?;
        self.sampler_pool.try_get(|| {
            log::info!("{}: create sampler pool", Self::NAME);
            self.factory.create_sampler_pool(&context)
        })
    }

    pub fn staging(&self) -> GfxResult<Arc<F::StagingManager>> {
        let state = self.state.read();
        let context = Self::live_context(&state, "staging")?;
        self.staging.try_get(|| {
            let resource_allocator = self.resource_allocator_in(&state, &context)?;
            log::info!("{}: create staging manager", Self::NAME);
            self.factory.create_staging_manager(&context, resource_allocator)
        })
    }

    fn memory_allocator_in(
        &self,
        state: &LifecycleState<F::Context>,
        context: &Arc<F::Context>,
    ) -> GfxResult<Arc<F::MemoryAllocator>> {
        self.memory_allocator.try_get(|| {
            log::info!("{}: create memory allocator with {:?}", Self::NAME, state.request.allocator_features);
            self.factory.create_memory_allocator(context, state.request.allocator_features)
        })
    }

    fn resource_allocator_in(
        &self,
        state: &LifecycleState<F::Context>,
        context: &Arc<F::Context>,
    ) -> GfxResult<Arc<F::ResourceAllocator>> {
        self.resource_allocator.try_get(|| {
            let memory_allocator = self.memory_allocator_in(state, context)?;
            log::info!("{}: create resource allocator", Self::NAME);
            self.factory.create_resource_allocator(context, memory_allocator)
        })
    }

    /// 只有 Created 阶段并且 context 仍然存活时才能创建设施
    fn live_context(state: &LifecycleState<F::Context>, operation: &'static str) -> GfxResult<Arc<F::Context>> {
        if !state.phase.is_created() {
            log::error!("{}: `{}` called in phase {:?}", Self::NAME, operation, state.phase);
            return Err(GfxError::LifecycleViolation {
                extension: Self::NAME,
                operation,
                phase: state.phase,
            });
        }
        state.context.upgrade().ok_or(GfxError::ContextDropped { extension: Self::NAME })
    }
}

impl<F: FacilityFactory> GfxExtension<F::Context> for ResourcesExtension<F> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn accepts_physical_device(&self, device: &PhysicalDeviceInfo) -> GfxResult<()> {
        CapabilityNegotiator::new(&self.config).verify(device)
    }

    fn on_context_initializing(&self, _container: &ExtensionContainer<F::Context>) {
        self.state.write().phase.advance(ExtensionPhase::Initializing, Self::NAME);
    }

    fn on_physical_device_selected(&self, device: &PhysicalDeviceInfo) {
        let mut state = self.state.write();
        state.phase.advance(ExtensionPhase::DeviceSelected, Self::NAME);
        state.request = CapabilityNegotiator::new(&self.config).negotiate(device);
        log::info!("{}: negotiated {:?} on {:?}", Self::NAME, state.request, device.name());
    }

    fn required_device_extension_names(&self, _device: &PhysicalDeviceInfo) -> Vec<&'static CStr> {
        let state = self.state.read();
        Self::assert_device_selected(&state, "required_device_extension_names");
        state.request.device_extensions.clone()
    }

    fn required_device_features(&self, _device: &PhysicalDeviceInfo) -> DeviceFeatures {
        let state = self.state.read();
        Self::assert_device_selected(&state, "required_device_features");
        state.request.device_features
    }

    fn on_context_created(&self, context: &Arc<F::Context>, _container: &ExtensionContainer<F::Context>) {
        let mut state = self.state.write();
        state.phase.advance(ExtensionPhase::Created, Self::NAME);
        state.context = Arc::downgrade(context);
    }

    fn on_context_aborted(&self) {
        let mut state = self.state.write();
        state.phase.rollback(Self::NAME);
        state.request = CapabilityRequest::default();
    }

    fn on_destroy_context(&self) {
        let mut state = self.state.write();
        state.phase.advance(ExtensionPhase::Destroyed, Self::NAME);
        state.context = Weak::new();

        // 扩展只持有弱引用，这里不会释放任何设施；仍被外部持有的设施必须先于 context 释放
        for name in self.live_facilities() {
            log::warn!("{}: `{}` is still held outside after context teardown", Self::NAME, name);
        }
        self.memory_allocator.reset();
        self.resource_allocator.reset();
        self.sampler_pool.reset();
        self.staging.reset();
    }
}

impl<F: FacilityFactory> ResourcesExtension<F> {
    fn assert_device_selected(state: &LifecycleState<F::Context>, operation: &str) {
        assert!(
            !matches!(state.phase, ExtensionPhase::Uninitialized | ExtensionPhase::Initializing),
            "{}: `{}` queried before a physical device was selected",
            Self::NAME,
            operation
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeContext;

    #[derive(Default)]
    struct CountingFactory {
        memory_allocators: AtomicUsize,
        resource_allocators: AtomicUsize,
        fail_resource_allocator: bool,
    }

    #[derive(Debug)]
    struct FakeMemoryAllocator(AllocatorFeatures);
    #[derive(Debug)]
    struct FakeResourceAllocator(Arc<FakeMemoryAllocator>);
    #[derive(Debug)]
    struct FakeSamplerPool;
    #[derive(Debug)]
    struct FakeStaging(Arc<FakeResourceAllocator>);

    impl FacilityFactory for CountingFactory {
        type Context = FakeContext;
        type MemoryAllocator = FakeMemoryAllocator;
        type ResourceAllocator = FakeResourceAllocator;
        type SamplerPool = FakeSamplerPool;
        type StagingManager = FakeStaging;

        fn create_memory_allocator(
            &self,
            _context: &Arc<FakeContext>,
            features: AllocatorFeatures,
        ) -> GfxResult<FakeMemoryAllocator> {
            self.memory_allocators.fetch_add(1, Ordering::SeqCst);
            Ok(FakeMemoryAllocator(features))
        }

        fn create_resource_allocator(
            &self,
            _context: &Arc<FakeContext>,
            memory_allocator: Arc<FakeMemoryAllocator>,
        ) -> GfxResult<FakeResourceAllocator> {
            if self.fail_resource_allocator {
                return Err(GfxError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            self.resource_allocators.fetch_add(1, Ordering::SeqCst);
            Ok(FakeResourceAllocator(memory_allocator))
        }

        fn create_sampler_pool(&self, _context: &Arc<FakeContext>) -> GfxResult<FakeSamplerPool> {
            Ok(FakeSamplerPool)
        }

        fn create_staging_manager(
            &self,
            _context: &Arc<FakeContext>,
            resource_allocator: Arc<FakeResourceAllocator>,
        ) -> GfxResult<FakeStaging> {
            Ok(FakeStaging(resource_allocator))
        }
    }

    fn created(factory: CountingFactory) -> (ResourcesExtension<CountingFactory>, Arc<FakeContext>) {
        let extension = ResourcesExtension::new(factory);
        let container = ExtensionContainer::new();
        let device = PhysicalDeviceInfo::new("gpu", vk::PhysicalDeviceType::DISCRETE_GPU)
            .with_features(DeviceFeatures::BUFFER_DEVICE_ADDRESS);
        let context = Arc::new(FakeContext);

        extension.on_context_initializing(&container);
        extension.on_physical_device_selected(&device);
        extension.on_context_created(&context, &container);
        (extension, context)
    }

    #[test]
    fn test_resource_allocator_shares_memory_allocator() {
        let (extension, _context) = created(CountingFactory::default());

        let memory_allocator = extension.memory_allocator().unwrap();
        let resource_allocator = extension.resource_allocator().unwrap();
        let staging = extension.staging().unwrap();

        assert!(Arc::ptr_eq(&memory_allocator, &resource_allocator.0));
        assert!(Arc::ptr_eq(&resource_allocator, &staging.0));
        assert_eq!(extension.factory().memory_allocators.load(Ordering::SeqCst), 1);
        assert_eq!(memory_allocator.0, AllocatorFeatures::BUFFER_DEVICE_ADDRESS);
    }

    #[test]
    fn test_released_facility_is_recreated() {
        let (extension, _context) = created(CountingFactory::default());

        let first = extension.resource_allocator().unwrap();
        let again = extension.resource_allocator().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        drop((first, again));

        assert!(extension.live_facilities().is_empty());
        let _second = extension.resource_allocator().unwrap();
        assert_eq!(extension.factory().resource_allocators.load(Ordering::SeqCst), 2);
        assert_eq!(extension.factory().memory_allocators.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_resource_allocator_releases_memory_allocator() {
        let (extension, _context) = created(CountingFactory {
            fail_resource_allocator: true,
            ..Default::default()
        });

        assert!(matches!(extension.resource_allocator(), Err(GfxError::Vulkan(_))));
        assert!(extension.live_facilities().is_empty());
    }

    #[test]
    fn test_dropped_context_is_reported() {
        let (extension, context) = created(CountingFactory::default());
        drop(context);

        assert!(matches!(extension.sampler_pool(), Err(GfxError::ContextDropped { .. })));
    }

    #[test]
    fn test_accessor_after_destroy_fails() {
        let (extension, _context) = created(CountingFactory::default());
        let held = extension.sampler_pool().unwrap();
        extension.on_destroy_context();

        assert_eq!(extension.phase(), ExtensionPhase::Destroyed);
        assert!(extension.sampler_pool().err().unwrap().is_lifecycle_violation());
        // 之前拿到的句柄仍然有效
        drop(held);
    }

    #[test]
    #[should_panic(expected = "queried before a physical device was selected")]
    fn test_request_before_selection_panics() {
        let extension = ResourcesExtension::new(CountingFactory::default());
        let device = PhysicalDeviceInfo::new("gpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        extension.required_device_extension_names(&device);
    }
}
