// Surface - platform window connection
//
// Creates a VkSurfaceKHR from winit's raw window/display handles and
// negotiates the surface format the swapchain and render pass agree on.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::window::Window;

use super::VulkanDevice;

/// Create a surface for the given window.
pub fn create_surface(device: &VulkanDevice, window: &Window) -> Result<vk::SurfaceKHR> {
    let window_handle = window
        .window_handle()
        .context("Failed to get window handle")?
        .as_raw();
    let display_handle = window
        .display_handle()
        .context("Failed to get display handle")?
        .as_raw();

    match (display_handle, window_handle) {
        #[cfg(target_os = "windows")]
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance =
                handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader =
                ash::extensions::khr::Win32Surface::new(&device.entry, &device.instance);
            unsafe { loader.create_win32_surface(&create_info, None) }
                .context("Failed to create Win32 surface")
        }

        #[cfg(target_os = "linux")]
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display
                .display
                .map(|p| p.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy as *mut _)
                .window(handle.window);
            let loader = ash::extensions::khr::XlibSurface::new(&device.entry, &device.instance);
            unsafe { loader.create_xlib_surface(&create_info, None) }
                .context("Failed to create Xlib surface")
        }

        #[cfg(target_os = "linux")]
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(handle.surface.as_ptr());
            let loader =
                ash::extensions::khr::WaylandSurface::new(&device.entry, &device.instance);
            unsafe { loader.create_wayland_surface(&create_info, None) }
                .context("Failed to create Wayland surface")
        }

        _ => anyhow::bail!("Unsupported window handle type"),
    }
}

/// Query the formats the adapter supports for this surface and pick one.
pub fn negotiate_format(
    surface_loader: &ash::extensions::khr::Surface,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<vk::SurfaceFormatKHR> {
    let formats = unsafe {
        surface_loader.get_physical_device_surface_formats(physical_device, surface)
    }
    .context("Failed to get surface formats")?;

    choose_surface_format(&formats)
}

/// First format matching RGBA8-unorm or BGRA8-unorm wins; otherwise fall
/// back to the first reported entry. An undefined final pick is fatal.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    if formats.is_empty() {
        anyhow::bail!("No surface formats available");
    }

    let format = formats
        .iter()
        .find(|f| {
            f.format == vk::Format::R8G8B8A8_UNORM || f.format == vk::Format::B8G8R8A8_UNORM
        })
        .copied()
        .unwrap_or(formats[0]);

    if format.format == vk::Format::UNDEFINED {
        anyhow::bail!("Surface has an undefined format");
    }

    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_first_unorm_match() {
        let formats = [
            fmt(vk::Format::R5G6B5_UNORM_PACK16),
            fmt(vk::Format::R8G8B8A8_UNORM),
            fmt(vk::Format::B8G8R8A8_UNORM),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn falls_back_to_first_reported_format() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT),
            fmt(vk::Format::A2B10G10R10_UNORM_PACK32),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn undefined_fallback_is_an_error() {
        let formats = [
            fmt(vk::Format::UNDEFINED),
            fmt(vk::Format::R16G16B16A16_SFLOAT),
        ];
        assert!(choose_surface_format(&formats).is_err());
    }

    #[test]
    fn empty_format_list_is_an_error() {
        assert!(choose_surface_format(&[]).is_err());
    }
}
