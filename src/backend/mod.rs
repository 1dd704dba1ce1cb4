// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash; policy decisions (adapter choice, format
// negotiation, image-count clamping) live next to the objects they size.

pub mod buffer;
pub mod command;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
