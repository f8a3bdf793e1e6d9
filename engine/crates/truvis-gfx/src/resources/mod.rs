pub mod buffer;
pub mod image;
pub mod resource_allocator;
pub mod staging_manager;
