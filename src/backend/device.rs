// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (graphics + present queue, prefer discrete GPU)
// - Logical device + queue creation
// - MSAA sample count and depth format probing
// - Memory type lookup, buffer creation, image allocation
// - One-time command submission for uploads

use super::error::{destroy_on_error, BackendError};
use super::instance::{Instance, Surface};
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// What selection needs to know about one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterInfo {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    pub supports_swapchain: bool,
}

impl AdapterInfo {
    pub fn is_suitable(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some() && self.supports_swapchain
    }
}

/// Weighted score: discrete bonus plus the largest 2D image the adapter supports.
pub fn rate_adapter(info: &AdapterInfo) -> u64 {
    let mut score = 0u64;
    if info.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score + info.max_image_dimension_2d as u64
}

/// Index of the highest scoring suitable adapter. Ties keep the first one seen.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Result<usize, BackendError> {
    adapters
        .iter()
        .enumerate()
        .filter(|(_, info)| info.is_suitable())
        .fold(None::<(usize, u64)>, |best, (i, info)| {
            let score = rate_adapter(info);
            match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((i, score)),
            }
        })
        .map(|(i, _)| i)
        .ok_or(BackendError::NoSuitableAdapter)
}

/// Queue family capabilities relevant to selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    pub present: bool,
}

/// Pick graphics and present families. A family doing both wins so the
/// swapchain can stay in exclusive sharing mode.
pub fn pick_queue_families(families: &[QueueFamilyCaps]) -> (Option<u32>, Option<u32>) {
    if let Some(i) = families.iter().position(|f| f.graphics && f.present) {
        return (Some(i as u32), Some(i as u32));
    }
    let graphics = families.iter().position(|f| f.graphics).map(|i| i as u32);
    let present = families.iter().position(|f| f.present).map(|i| i as u32);
    (graphics, present)
}

/// Highest sample count present in `counts` (8x > 4x > 2x > 1x), not above `cap`.
pub fn max_usable_sample_count(counts: vk::SampleCountFlags, cap: u32) -> vk::SampleCountFlags {
    [
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|&(n, flag)| n <= cap && counts.contains(flag))
    .map(|(_, flag)| flag)
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Anything that can answer format feature queries (the physical device, or a test double).
pub trait FormatSupport {
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;
}

struct AdapterFormats<'a> {
    instance: &'a ash::Instance,
    physical_device: vk::PhysicalDevice,
}

impl FormatSupport for AdapterFormats<'_> {
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }
}

/// First candidate whose features for `tiling` include `features`, or `UNDEFINED`.
pub fn find_supported_format(
    support: &impl FormatSupport,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> vk::Format {
    for &format in candidates {
        let props = support.format_properties(format);
        let available = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features,
            _ => props.optimal_tiling_features,
        };
        if available.contains(features) {
            return format;
        }
    }

    log::error!("No supported format among {:?}", candidates);
    vk::Format::UNDEFINED
}

pub fn find_depth_format(support: &impl FormatSupport) -> vk::Format {
    find_supported_format(
        support,
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// First memory type allowed by `type_filter` whose flags are a superset of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, BackendError> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let allowed = type_filter & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(BackendError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

/// Logical device plus everything cached about the adapter it runs on.
///
/// Shared as `Arc<VulkanDevice>` by every component that creates GPU objects,
/// so the device is always destroyed after its last consumer.
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<Instance>,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,

    pub msaa_samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,

    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    allocator: Option<Mutex<Allocator>>,
    upload_pool: vk::CommandPool,
}

impl VulkanDevice {
    /// Select an adapter able to present to `surface` and create the logical device.
    ///
    /// `max_msaa_samples` caps the supported sample count (1 disables MSAA).
    pub fn new(surface: &Surface, max_msaa_samples: u32) -> Result<Arc<Self>> {
        let instance = surface.instance().clone();
        let vk_instance = &instance.instance;

        let devices = unsafe { vk_instance.enumerate_physical_devices() }?;
        if devices.is_empty() {
            log::error!("No Vulkan-capable GPU found!");
        }

        let infos = devices
            .iter()
            .map(|&pd| Self::describe_adapter(&instance, pd, surface.surface))
            .collect::<Result<Vec<_>>>()?;

        let index = select_adapter(&infos).map_err(|e| {
            log::error!("Failed: {}", e);
            e
        })?;
        let physical_device = devices[index];
        let info = infos[index];
        let graphics_queue_family = info.graphics_family.context("graphics family vanished")?;
        let present_queue_family = info.present_family.context("present family vanished")?;

        let properties = unsafe { vk_instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { vk_instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {} (score {})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            rate_adapter(&info)
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let limits = &properties.limits;
        let msaa_samples = max_usable_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
            max_msaa_samples,
        );
        log::info!("MSAA samples: {:?}", msaa_samples);

        let depth_format = find_depth_format(&AdapterFormats {
            instance: vk_instance,
            physical_device,
        });
        log::info!("Depth format: {:?}", depth_format);

        let (device, graphics_queue, present_queue) = Self::create_logical_device(
            vk_instance,
            physical_device,
            graphics_queue_family,
            present_queue_family,
        )?;

        // Nothing owns the device yet, so failures below must destroy it
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let upload_pool = destroy_on_error(
            unsafe { device.create_command_pool(&pool_info, None) },
            || unsafe { device.destroy_device(None) },
        )
        .context("Failed to create upload command pool")?;

        let allocator = destroy_on_error(
            Allocator::new(&AllocatorCreateDesc {
                instance: vk_instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }),
            || unsafe {
                device.destroy_command_pool(upload_pool, None);
                device.destroy_device(None);
            },
        )
        .context("Failed to create GPU memory allocator")?;

        log::info!("Logical device created successfully!");

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            graphics_queue,
            present_queue,
            graphics_queue_family,
            present_queue_family,
            msaa_samples,
            depth_format,
            memory_properties,
            allocator: Some(Mutex::new(allocator)),
            upload_pool,
        }))
    }

    fn describe_adapter(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<AdapterInfo> {
        let vk_instance = &instance.instance;
        let props = unsafe { vk_instance.get_physical_device_properties(physical_device) };
        let queue_families =
            unsafe { vk_instance.get_physical_device_queue_family_properties(physical_device) };

        let caps = queue_families
            .iter()
            .enumerate()
            .map(|(i, family)| {
                let present = unsafe {
                    instance.surface_loader.get_physical_device_surface_support(
                        physical_device,
                        i as u32,
                        surface,
                    )
                }?;
                Ok(QueueFamilyCaps {
                    graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                    present,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let (graphics_family, present_family) = pick_queue_families(&caps);

        let extensions =
            unsafe { vk_instance.enumerate_device_extension_properties(physical_device) }?;
        let supports_swapchain = extensions.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == ash::extensions::khr::Swapchain::name()
        });

        Ok(AdapterInfo {
            device_type: props.device_type,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            graphics_family,
            present_family,
            supports_swapchain,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        present_family: u32,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let unique_families: BTreeSet<u32> = [graphics_family, present_family].into();
        let queue_infos: Vec<_> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        Ok(find_memory_type(&self.memory_properties, type_filter, properties)?)
    }

    /// Create a buffer and bind freshly allocated memory to it.
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let mem_requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match self.find_memory_type(
            mem_requirements.memory_type_bits,
            memory_properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(anyhow::Error::new(e).context("Failed to allocate buffer memory"));
            }
        };

        destroy_on_error(unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }, || unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        })
        .context("Failed to bind buffer memory")?;

        Ok((buffer, memory))
    }

    /// Create a GPU-only image backed by the shared allocator.
    pub fn create_image(
        &self,
        name: &str,
        info: &vk::ImageCreateInfo,
    ) -> Result<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(info, None) }
            .with_context(|| format!("Failed to create image '{}'", name))?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self
            .allocator()?
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: info.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for image '{}'", name))?;

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }
        .with_context(|| format!("Failed to bind memory for image '{}'", name))?;

        Ok((image, allocation))
    }

    pub fn destroy_image(&self, image: vk::Image, allocation: Allocation) {
        unsafe { self.device.destroy_image(image, None) };
        if let Ok(allocator) = self.allocator() {
            if let Err(e) = allocator.lock().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
    }

    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.create_image_view(&view_info, None) }
            .context("Failed to create image view")
    }

    fn allocator(&self) -> Result<&Mutex<Allocator>> {
        self.allocator.as_ref().context("Allocator already released")
    }

    /// Record a one-time command buffer, submit it and block until it completes.
    ///
    /// Only used for initialization and asset uploads, never per frame.
    pub fn submit_one_time<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.upload_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate upload command buffer")?[0];

        let result = (|| -> Result<()> {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(cmd, &begin_info) }?;

            record(&self.device, cmd)?;

            unsafe { self.device.end_command_buffer(cmd) }?;

            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            unsafe {
                self.device.queue_submit(
                    self.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )?;
                self.device.queue_wait_idle(self.graphics_queue)?;
            }
            Ok(())
        })();

        unsafe { self.device.free_command_buffers(self.upload_pool, &[cmd]) };
        result.context("One-time command submission failed")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_command_pool(self.upload_pool, None);
            // Allocator must release its memory blocks before the device goes away
            self.allocator = None;
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn adapter(
        device_type: vk::PhysicalDeviceType,
        dim: u32,
        graphics: Option<u32>,
        present: Option<u32>,
    ) -> AdapterInfo {
        AdapterInfo {
            device_type,
            max_image_dimension_2d: dim,
            graphics_family: graphics,
            present_family: present,
            supports_swapchain: true,
        }
    }

    #[test]
    fn picks_highest_scoring_suitable_adapter() {
        let adapters = [
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384, Some(0), Some(0)),
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 16384, Some(0), Some(1)),
            // Would score highest but cannot present
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 32768, Some(0), None),
        ];
        assert_eq!(select_adapter(&adapters), Ok(1));
    }

    #[test]
    fn image_dimension_can_outweigh_discrete_bonus() {
        let adapters = [
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 4096, Some(0), Some(0)),
            adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192, Some(0), Some(0)),
        ];
        assert_eq!(rate_adapter(&adapters[0]), 5096);
        assert_eq!(select_adapter(&adapters), Ok(1));
    }

    #[test]
    fn no_suitable_adapter_fails() {
        assert_eq!(select_adapter(&[]), Err(BackendError::NoSuitableAdapter));

        let mut no_swapchain = adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 1, Some(0), Some(0));
        no_swapchain.supports_swapchain = false;
        let adapters = [
            adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 16384, None, Some(0)),
            no_swapchain,
        ];
        assert_eq!(select_adapter(&adapters), Err(BackendError::NoSuitableAdapter));
    }

    #[test]
    fn queue_families_prefer_shared_family() {
        let families = [
            QueueFamilyCaps { graphics: true, present: false },
            QueueFamilyCaps { graphics: false, present: true },
            QueueFamilyCaps { graphics: true, present: true },
        ];
        assert_eq!(pick_queue_families(&families), (Some(2), Some(2)));

        let split = [
            QueueFamilyCaps { graphics: true, present: false },
            QueueFamilyCaps { graphics: false, present: true },
        ];
        assert_eq!(pick_queue_families(&split), (Some(0), Some(1)));

        let compute_only = [QueueFamilyCaps { graphics: false, present: false }];
        assert_eq!(pick_queue_families(&compute_only), (None, None));
    }

    #[test]
    fn sample_count_intersection_prefers_highest() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;

        assert_eq!(max_usable_sample_count(color & depth, 8), vk::SampleCountFlags::TYPE_4);
        assert_eq!(max_usable_sample_count(color, 8), vk::SampleCountFlags::TYPE_8);
        assert_eq!(max_usable_sample_count(color, 2), vk::SampleCountFlags::TYPE_2);
        assert_eq!(max_usable_sample_count(color, 1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, 8),
            vk::SampleCountFlags::TYPE_1
        );
    }

    struct MockFormats(HashMap<vk::Format, vk::FormatFeatureFlags>);

    impl FormatSupport for MockFormats {
        fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
            vk::FormatProperties {
                optimal_tiling_features: self.0.get(&format).copied().unwrap_or_default(),
                ..Default::default()
            }
        }
    }

    #[test]
    fn depth_format_falls_through_preference_list() {
        let only_d24 = MockFormats(HashMap::from([(
            vk::Format::D24_UNORM_S8_UINT,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )]));
        assert_eq!(find_depth_format(&only_d24), vk::Format::D24_UNORM_S8_UINT);

        let none = MockFormats(HashMap::new());
        assert_eq!(find_depth_format(&none), vk::Format::UNDEFINED);
    }

    #[test]
    fn depth_format_requires_feature_flag() {
        // D32 exists but only as a sampled format, so it must be skipped
        let formats = MockFormats(HashMap::from([
            (vk::Format::D32_SFLOAT, vk::FormatFeatureFlags::SAMPLED_IMAGE),
            (
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ),
        ]));
        assert_eq!(find_depth_format(&formats), vk::Format::D32_SFLOAT_S8_UINT);
    }

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = f;
        }
        props
    }

    #[test]
    fn memory_type_honors_filter_and_superset() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b111, host), Ok(1));
        // Type 1 filtered out, type 2 is a superset
        assert_eq!(find_memory_type(&props, 0b101, host), Ok(2));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Ok(0)
        );
        assert_eq!(
            find_memory_type(&props, 0b001, host),
            Err(BackendError::NoSuitableMemoryType {
                type_filter: 0b001,
                properties: host
            })
        );
    }
}
