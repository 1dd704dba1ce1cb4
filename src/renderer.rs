// Renderer - owns the full Vulkan object graph and drives the frame loop
//
// Split into two lifetimes:
// - Renderer: instance/device/surface, the semaphore pair, the fence ring
//   and the vertex buffer. Created once, destroyed at exit.
// - FrameResources: everything keyed to one swapchain generation
//   (swapchain, image views, render pass, pipeline, framebuffers, command
//   pool + buffers). Torn down and rebuilt as a unit on resize.

use anyhow::{Context, Result};
use ash::vk;
use glam::{Vec2, Vec3};
use std::sync::Arc;
use winit::window::Window;

use crate::backend::swapchain::RetiredSwapchain;
use crate::backend::sync::FrameSync;
use crate::backend::{buffer, command, pipeline, shader, surface, Swapchain, VulkanDevice};
use crate::backend::pipeline::Vertex;
use crate::config::Config;

/// Two clockwise triangles forming a centered quad, colored per corner.
const QUAD_VERTICES: [Vertex; 6] = [
    Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    Vertex::new(Vec2::new(0.5, -0.5), Vec3::new(1.0, 1.0, 1.0)),
];

/// All objects tied to one swapchain generation, allocated together and
/// freed together so the per-image arrays can never drift out of step with
/// the image count.
struct FrameResources {
    device: Arc<VulkanDevice>,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl FrameResources {
    /// Build the swapchain-dependent object chain on top of an already
    /// created swapchain: render pass, pipeline, framebuffers, command
    /// pool. Command buffers are recorded separately, the draw parameters
    /// are not ours to keep.
    fn new(
        device: Arc<VulkanDevice>,
        swapchain: Swapchain,
        vertex_shader_path: &str,
        fragment_shader_path: &str,
    ) -> Result<Self> {
        let render_pass = pipeline::create_render_pass(&device, swapchain.format.format)?;

        let vert_shader = shader::create_shader_module(&device, vertex_shader_path)?;
        let frag_shader = match shader::create_shader_module(&device, fragment_shader_path) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert_shader, None) };
                return Err(e);
            }
        };

        let pipeline_result = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            vert_shader,
            frag_shader,
        );

        // The modules are baked into the pipeline; they are not needed
        // past this point even on the error path.
        unsafe {
            device.device.destroy_shader_module(frag_shader, None);
            device.device.destroy_shader_module(vert_shader, None);
        }

        let (pipeline, pipeline_layout) = pipeline_result?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        let command_pool = command::create_command_pool(&device)?;

        Ok(Self {
            device,
            swapchain,
            render_pass,
            pipeline_layout,
            pipeline,
            framebuffers,
            command_pool,
            command_buffers: Vec::new(),
        })
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// (Re)record the per-image draw command buffers. The caller supplies
    /// the draw parameters each time.
    fn record_commands(
        &mut self,
        vertex_buffer: vk::Buffer,
        vertex_count: u32,
        clear_color: [f32; 4],
    ) -> Result<()> {
        if !self.command_buffers.is_empty() {
            unsafe {
                self.device
                    .device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
            }
            self.command_buffers.clear();
        }

        self.command_buffers = command::record_draw_commands(
            &self.device,
            self.command_pool,
            self.render_pass,
            &self.framebuffers,
            self.pipeline,
            self.swapchain.extent,
            vertex_buffer,
            vertex_count,
            clear_color,
        )?;

        log::info!(
            "Recorded {} draw command buffers",
            self.command_buffers.len()
        );

        Ok(())
    }

    /// Destroy everything except the swapchain handle itself, in reverse
    /// creation order: command pool (frees its buffers), framebuffers,
    /// pipeline, pipeline layout, render pass. Safe to call twice; handles
    /// are nulled as they go.
    unsafe fn destroy_dependents(&mut self) {
        let device = &self.device.device;

        if self.command_pool != vk::CommandPool::null() {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            device.destroy_command_pool(self.command_pool, None);
            self.command_pool = vk::CommandPool::null();
        }

        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }

        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline, None);
            self.pipeline = vk::Pipeline::null();
        }

        if self.pipeline_layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.pipeline_layout = vk::PipelineLayout::null();
        }

        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }
    }

    /// Tear this generation down to the bare swapchain handle the next
    /// generation's creation call reuses.
    fn dismantle(mut self) -> RetiredSwapchain {
        unsafe { self.destroy_dependents() };
        self.swapchain.retire()
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        unsafe { self.destroy_dependents() };
        // The swapchain field drops after this body: image views, then the
        // swapchain itself.
    }
}

/// The renderer context: owns the device and everything above it, and
/// implements the per-frame protocol and the resize rebuild.
pub struct Renderer {
    device: Arc<VulkanDevice>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::extensions::khr::Surface,
    frames: Option<FrameResources>,
    sync: FrameSync,
    vertex_buffer: vk::Buffer,
    vertex_buffer_memory: vk::DeviceMemory,
    vertex_count: u32,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    vertex_shader_path: String,
    fragment_shader_path: String,
}

impl Renderer {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(&config.window.title, enable_validation)?;

        let surface_loader =
            ash::extensions::khr::Surface::new(&device.entry, &device.instance);
        let surface = surface::create_surface(&device, window)?;

        let present_mode = config.present_mode();

        let swapchain = Swapchain::new(device.clone(), surface, &surface_loader, None, present_mode)?;
        let image_count = swapchain.image_count();

        let mut frames = FrameResources::new(
            device.clone(),
            swapchain,
            &config.shaders.vertex,
            &config.shaders.fragment,
        )?;

        let sync = FrameSync::new(device.clone(), image_count)?;

        let (vertex_buffer, vertex_buffer_memory) =
            upload_vertices(&device, frames.command_pool, &QUAD_VERTICES)?;
        let vertex_count = QUAD_VERTICES.len() as u32;

        frames.record_commands(vertex_buffer, vertex_count, config.graphics.clear_color)?;

        log::info!("Vulkan initialized");

        Ok(Self {
            device,
            surface,
            surface_loader,
            frames: Some(frames),
            sync,
            vertex_buffer,
            vertex_buffer_memory,
            vertex_count,
            clear_color: config.graphics.clear_color,
            present_mode,
            vertex_shader_path: config.shaders.vertex.clone(),
            fragment_shader_path: config.shaders.fragment.clone(),
        })
    }

    /// Draw and present one frame.
    ///
    /// Ordering is load-bearing: acquire first (the GPU can start on the
    /// acquire while we wait), then throttle on the acquired slot's fence,
    /// then submit gated on the image-available semaphore, then present
    /// gated on the image-rendered semaphore. Any failure is fatal to the
    /// caller.
    pub fn render_frame(&mut self) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .context("Frame resources not initialized")?;

        let image_index = frames.swapchain.acquire_next_image(self.sync.image_available)?;

        // Bounds frames in flight to the image count: slot reuse waits out
        // the previous submission that rendered to this image.
        self.sync.wait_and_reset_fence(image_index as usize)?;

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frames.command_buffers[image_index as usize]];
        let signal_semaphores = [self.sync.image_rendered];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    self.sync.fence(image_index as usize),
                )
                .context("Failed to submit draw command buffer")?;
        }

        frames
            .swapchain
            .present(self.device.graphics_queue, image_index, self.sync.image_rendered)?;

        Ok(())
    }

    /// Tear down and rebuild everything keyed to the swapchain.
    ///
    /// The device, instance, surface and semaphores survive; the fence
    /// ring is resized if the new swapchain reports a different image
    /// count. The old swapchain handle is passed to the new creation call
    /// and destroyed immediately after it.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        log::info!("Recreating swapchain");

        self.device.wait_idle()?;

        let retired = self
            .frames
            .take()
            .context("Frame resources not initialized")?
            .dismantle();

        let swapchain = Swapchain::new(
            self.device.clone(),
            self.surface,
            &self.surface_loader,
            Some(retired),
            self.present_mode,
        )?;

        let image_count = swapchain.image_count();

        let mut frames = FrameResources::new(
            self.device.clone(),
            swapchain,
            &self.vertex_shader_path,
            &self.fragment_shader_path,
        )?;

        // The image count can legitimately change across a recreation; the
        // fence ring must follow it.
        self.sync.resize_fences(image_count)?;
        debug_assert_eq!(self.sync.fence_count(), image_count);

        frames.record_commands(self.vertex_buffer, self.vertex_count, self.clear_color)?;

        self.frames = Some(frames);

        Ok(())
    }

    pub fn wait_idle(&self) {
        let _ = self.device.wait_idle();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");

        let _ = self.device.wait_idle();

        // Reverse creation order: the swapchain generation first, then the
        // vertex buffer, then the surface. The fence ring and semaphores
        // drop with the sync field, the device (and instance) last via Arc.
        self.frames = None;

        unsafe {
            self.device.device.destroy_buffer(self.vertex_buffer, None);
            self.device
                .device
                .free_memory(self.vertex_buffer_memory, None);

            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Upload the vertex data into a device-local buffer through a staging
/// buffer, draining the queue before returning. Startup-only path.
fn upload_vertices(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    vertices: &[Vertex],
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let size = std::mem::size_of_val(vertices) as vk::DeviceSize;

    let (staging_buffer, staging_memory) =
        buffer::create_buffer_with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, vertices)?;

    let (vertex_buffer, vertex_memory) = buffer::create_buffer(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let copy_result = buffer::copy_buffer(device, command_pool, staging_buffer, vertex_buffer, size);

    unsafe {
        device.device.destroy_buffer(staging_buffer, None);
        device.device.free_memory(staging_memory, None);
    }

    copy_result?;

    Ok((vertex_buffer, vertex_memory))
}
