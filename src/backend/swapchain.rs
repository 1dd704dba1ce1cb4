// Swapchain - window presentation
//
// Manages the ring of images we render to and present to the screen.
// Recreated on resize; the old handle is passed to the new creation call
// so the driver can reuse resources during the handoff.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::surface;
use super::VulkanDevice;

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create a swapchain sized to the surface's current extent.
    ///
    /// Capabilities and format are re-queried on every call; the cached
    /// values from a previous generation are stale after a resize. A
    /// retired generation's handle is passed to the creation call as a
    /// reuse hint and destroyed as soon as the new chain exists.
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
        old_swapchain: Option<RetiredSwapchain>,
        desired_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )
        }
        .context("Failed to check surface support")?;

        if !supported {
            anyhow::bail!("Physical device does not support presenting to this surface");
        }

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, surface)
        }
        .context("Failed to get surface capabilities")?;

        let format = surface::negotiate_format(surface_loader, device.physical_device, surface)?;

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, surface)
        }
        .context("Failed to get surface present modes")?;

        // FIFO is the only mode Vulkan guarantees to exist.
        let present_mode = if present_modes.contains(&desired_present_mode) {
            desired_present_mode
        } else {
            vk::PresentModeKHR::FIFO
        };

        let extent = surface_caps.current_extent;
        let min_image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{}, {} images requested, {:?}",
            extent.width,
            extent.height,
            min_image_count,
            present_mode
        );

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(
                old_swapchain
                    .as_ref()
                    .map(RetiredSwapchain::handle)
                    .unwrap_or_else(vk::SwapchainKHR::null),
            );

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // The old generation's handle has served its purpose.
        if let Some(retired) = old_swapchain {
            retired.destroy();
        }

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        if images.is_empty() {
            anyhow::bail!("Swapchain has no images");
        }

        log::info!("Created swapchain with {} images", images.len());

        let image_views: Result<Vec<_>> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    device
                        .device
                        .create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect();

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views: image_views?,
            format,
            extent,
            device,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image for rendering, signaling `semaphore` when the
    /// image is actually ready for writing.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, _suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
        .context("Failed to acquire next swapchain image")?;

        Ok(index)
    }

    /// Queue image `image_index` for presentation, gated on `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .context("Failed to present swapchain image")?;

        Ok(())
    }

    /// Tear this generation down to its bare handle, which the replacement
    /// chain's creation call takes as its `old_swapchain`.
    ///
    /// The image views are destroyed here; the handle itself stays alive
    /// until the new chain has been created from it.
    pub fn retire(&mut self) -> RetiredSwapchain {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.device.destroy_image_view(view, None);
            }
        }
        self.images.clear();

        RetiredSwapchain {
            swapchain: std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null()),
            loader: self.swapchain_loader.clone(),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Retired instances already gave their handle away.
        if self.swapchain == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// The bare handle of a dismantled swapchain generation, kept alive just
/// long enough to seed the next generation's creation call.
pub struct RetiredSwapchain {
    swapchain: vk::SwapchainKHR,
    loader: ash::extensions::khr::Swapchain,
}

impl RetiredSwapchain {
    fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    fn destroy(self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Triple buffering where the adapter allows it, clamped into the reported
/// min/max range (`max_image_count == 0` means unbounded).
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = 3.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn clamps_down_to_adapter_maximum() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
    }

    #[test]
    fn honors_three_when_unbounded() {
        assert_eq!(choose_image_count(&caps(1, 0)), 3);
    }

    #[test]
    fn clamps_up_to_adapter_minimum() {
        assert_eq!(choose_image_count(&caps(4, 8)), 4);
    }

    #[test]
    fn keeps_three_inside_range() {
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }
}
