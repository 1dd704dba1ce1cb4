// Synchronization primitives
//
// One semaphore pair for GPU-GPU ordering (created once, never touched by
// the resize path) and one fence per swapchain image for CPU-GPU
// throttling. The fence ring follows the image count, which can change
// across a swapchain recreation.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct FrameSync {
    /// Signaled when the acquired image is actually ready for writing.
    pub image_available: vk::Semaphore,
    /// Signaled when rendering to the image has finished.
    pub image_rendered: vk::Semaphore,
    /// One per swapchain image; waits out the previous use of that slot.
    fences: Vec<vk::Fence>,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>, image_count: usize) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let (image_available, image_rendered) = unsafe {
            (
                device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image available semaphore")?,
                device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create image rendered semaphore")?,
            )
        };

        let mut sync = Self {
            image_available,
            image_rendered,
            fences: Vec::new(),
            device,
        };
        sync.resize_fences(image_count)?;

        Ok(sync)
    }

    /// Grow or shrink the fence ring to `image_count` entries.
    ///
    /// Called after every swapchain (re)creation; the semaphores are left
    /// alone. New fences start signaled so the first wait on a fresh slot
    /// does not block forever.
    pub fn resize_fences(&mut self, image_count: usize) -> Result<()> {
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            while self.fences.len() > image_count {
                if let Some(fence) = self.fences.pop() {
                    self.device.device.destroy_fence(fence, None);
                }
            }
            while self.fences.len() < image_count {
                let fence = self
                    .device
                    .device
                    .create_fence(&fence_info, None)
                    .context("Failed to create fence")?;
                self.fences.push(fence);
            }
        }

        Ok(())
    }

    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }

    pub fn fence(&self, image_index: usize) -> vk::Fence {
        self.fences[image_index]
    }

    /// Block until the previous submission that used `image_index` has
    /// finished, then reset its fence for the upcoming submit.
    pub fn wait_and_reset_fence(&self, image_index: usize) -> Result<()> {
        let fences = [self.fences[image_index]];
        unsafe {
            self.device
                .device
                .wait_for_fences(&fences, true, u64::MAX)
                .context("Failed to wait for fence")?;
            self.device
                .device
                .reset_fences(&fences)
                .context("Failed to reset fence")?;
        }
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            for &fence in &self.fences {
                self.device.device.destroy_fence(fence, None);
            }
            self.device
                .device
                .destroy_semaphore(self.image_rendered, None);
            self.device
                .device
                .destroy_semaphore(self.image_available, None);
        }
    }
}
