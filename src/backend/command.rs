// Command pool and draw-command recording
//
// One primary command buffer per swapchain image, recorded once up front.
// The draw content is static, so the buffers are recorded with the
// simultaneous-use flag and resubmitted every frame without re-recording.

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info =
        vk::CommandPoolCreateInfo::builder().queue_family_index(device.graphics_queue_family);

    unsafe {
        device
            .device
            .create_command_pool(&pool_info, None)
            .context("Failed to create command pool")
    }
}

/// Allocate and pre-record one draw command buffer per framebuffer.
pub fn record_draw_commands(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    render_pass: vk::RenderPass,
    framebuffers: &[vk::Framebuffer],
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
    vertex_buffer: vk::Buffer,
    vertex_count: u32,
    clear_color: [f32; 4],
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(framebuffers.len() as u32);

    let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")?;

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

    let clear_value = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    };
    let clear_values = [clear_value];

    for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        unsafe {
            device
                .device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer recording")?;

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.device.cmd_begin_render_pass(
                cmd,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
            device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);

            let vertex_buffers = [vertex_buffer];
            let offsets = [0];
            device
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &vertex_buffers, &offsets);

            device.device.cmd_draw(cmd, vertex_count, 1, 0, 0);

            device.device.cmd_end_render_pass(cmd);

            device
                .device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer recording")?;
        }
    }

    Ok(command_buffers)
}
