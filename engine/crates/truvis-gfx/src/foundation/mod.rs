pub mod context;
pub mod device;
pub mod mem_allocator;
pub mod physical_device;
