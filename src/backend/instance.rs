// Vulkan Instance + presentation surface
//
// Responsibilities:
// - Load the Vulkan library and create the instance
// - Validation layers + debug messenger (when requested and available)
// - Platform surface creation from raw window handles

use super::error::{destroy_on_error, BackendError};
use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with automatic cleanup
pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: ash::extensions::khr::Surface,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create the instance with the surface extensions the display needs.
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("VXR")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let enable_validation = enable_validation && Self::validation_available(&entry);

        let mut extensions = surface_extensions(display)?;
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        let debug_utils = if enable_validation {
            let messenger = Self::setup_debug_messenger(&entry, &instance);
            Some(destroy_on_error(messenger, || unsafe { instance.destroy_instance(None) })?)
        } else {
            None
        };

        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

        Ok(Arc::new(Self {
            entry,
            instance,
            surface_loader,
            debug_utils,
        }))
    }

    fn validation_available(entry: &Entry) -> bool {
        let layers = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("Could not enumerate instance layers: {:?}", e);
                return false;
            }
        };

        let found = layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        });

        if !found {
            log::error!("Validation layers requested but not available!");
        }
        found
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Instance extensions required to present on the given display.
fn surface_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    use ash::extensions::khr;

    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        _ => return Err(BackendError::UnsupportedPlatform.into()),
    };

    Ok(vec![khr::Surface::name().as_ptr(), platform.as_ptr()])
}

/// Presentation surface bound to a window. Keeps its instance alive.
pub struct Surface {
    pub surface: vk::SurfaceKHR,
    instance: Arc<Instance>,
}

impl Surface {
    pub fn new(
        instance: Arc<Instance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        use ash::extensions::khr;

        let entry = &instance.entry;
        let vk_instance = &instance.instance;

        let surface = unsafe {
            match (display, window) {
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                    let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
                    let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    khr::Win32Surface::new(entry, vk_instance).create_win32_surface(&create_info, None)?
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                    let dpy = display
                        .display
                        .context("Xlib display handle is null")?
                        .as_ptr();
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy.cast())
                        .window(handle.window);
                    khr::XlibSurface::new(entry, vk_instance).create_xlib_surface(&create_info, None)?
                }
                (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
                    let connection = display
                        .connection
                        .context("Xcb connection handle is null")?
                        .as_ptr();
                    let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection.cast())
                        .window(handle.window.get());
                    khr::XcbSurface::new(entry, vk_instance).create_xcb_surface(&create_info, None)?
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr().cast())
                        .surface(handle.surface.as_ptr().cast());
                    khr::WaylandSurface::new(entry, vk_instance).create_wayland_surface(&create_info, None)?
                }
                _ => return Err(BackendError::UnsupportedPlatform.into()),
            }
        };

        log::info!("Created presentation surface");
        Ok(Self { surface, instance })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
