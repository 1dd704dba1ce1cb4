// Buffer utilities
//
// Vertex and staging buffers backed by explicitly allocated device memory.
// The one-shot copy drains the queue instead of pipelining; it only runs
// during startup.

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Create a buffer with the given usage and memory properties.
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe {
        device
            .device
            .create_buffer(&buffer_info, None)
            .context("Failed to create buffer")?
    };

    let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = find_memory_type(
        device,
        mem_requirements.memory_type_bits,
        memory_properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let buffer_memory = unsafe {
        device
            .device
            .allocate_memory(&alloc_info, None)
            .context("Failed to allocate buffer memory")?
    };

    unsafe {
        device
            .device
            .bind_buffer_memory(buffer, buffer_memory, 0)
            .context("Failed to bind buffer memory")?;
    }

    Ok((buffer, buffer_memory))
}

/// Create a host-visible buffer and fill it with `data`.
pub fn create_buffer_with_data<T: bytemuck::Pod>(
    device: &VulkanDevice,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = bytes.len() as vk::DeviceSize;

    let (buffer, memory) = create_buffer(
        device,
        size,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    unsafe {
        let ptr = device
            .device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
            .context("Failed to map buffer memory")? as *mut u8;

        ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        device.device.unmap_memory(memory);
    }

    Ok((buffer, memory))
}

/// Copy `size` bytes between buffers with a one-shot command buffer,
/// waiting for the queue to drain before returning.
pub fn copy_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate transfer command buffer")?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .device
            .begin_command_buffer(command_buffer, &begin_info)
            .context("Failed to begin transfer command buffer")?;

        let region = vk::BufferCopy::builder().size(size).build();
        device
            .device
            .cmd_copy_buffer(command_buffer, src, dst, &[region]);

        device
            .device
            .end_command_buffer(command_buffer)
            .context("Failed to end transfer command buffer")?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        device
            .device
            .queue_submit(device.graphics_queue, &[submit_info], vk::Fence::null())
            .context("Failed to submit transfer command buffer")?;

        device
            .device
            .queue_wait_idle(device.graphics_queue)
            .context("Failed to wait for transfer to finish")?;

        device
            .device
            .free_command_buffers(command_pool, &command_buffers);
    }

    Ok(())
}

/// First memory type matching both the requirement bits and the requested
/// property flags.
fn find_memory_type(
    device: &VulkanDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let mem_properties = &device.memory_properties;

    for i in 0..mem_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    anyhow::bail!("Failed to find suitable memory type")
}
