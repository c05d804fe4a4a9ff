//! GPU device, adapter, queue, and surface management.
//!
//! `GpuState` is shared across all windows and owns the wgpu device lifetime.

use std::sync::Arc;

use winit::window::Window;

/// GPU state shared across all windows.
pub struct GpuState {
    instance: wgpu::Instance,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    /// The native surface format (used for surface configuration).
    surface_format: wgpu::TextureFormat,
    /// The sRGB format used for render passes and pipelines. May differ from
    /// `surface_format` when the surface doesn't natively support sRGB.
    pub(super) render_format: wgpu::TextureFormat,
    surface_alpha_mode: wgpu::CompositeAlphaMode,
    /// Vulkan pipeline cache (compiled shaders cached to disk across sessions).
    pub(super) pipeline_cache: Option<wgpu::PipelineCache>,
    pipeline_cache_path: Option<std::path::PathBuf>,
}

impl GpuState {
    /// Initialize GPU: create instance, surface, adapter, device, queue.
    /// Prefers Vulkan (supports pipeline caching for faster subsequent launches),
    /// falling back to any other primary or secondary backend.
    pub fn new(window: &Arc<Window>) -> Self {
        if let Some(state) = Self::try_init(window, wgpu::Backends::VULKAN) {
            return state;
        }
        if let Some(state) = Self::try_init(window, wgpu::Backends::PRIMARY) {
            return state;
        }
        Self::try_init(window, wgpu::Backends::SECONDARY).expect("failed to initialize GPU with any backend")
    }

    fn try_init(window: &Arc<Window>, backends: wgpu::Backends) -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor { backends, ..Default::default() });

        let surface = instance.create_surface(window.clone()).ok()?;

        // enumerate_adapters instead of the slow request_adapter; prefer a
        // discrete GPU, falling back to any compatible adapter.
        let mut adapter: Option<wgpu::Adapter> = None;
        let mut fallback: Option<wgpu::Adapter> = None;
        for a in pollster::block_on(instance.enumerate_adapters(backends)) {
            if !a.is_surface_supported(&surface) {
                continue;
            }
            let info = a.get_info();
            if info.device_type == wgpu::DeviceType::DiscreteGpu {
                adapter = Some(a);
                break;
            }
            if fallback.is_none() {
                fallback = Some(a);
            }
        }
        let adapter = adapter.or(fallback)?;

        let mut features = wgpu::Features::empty();
        if adapter.features().contains(wgpu::Features::PIPELINE_CACHE) {
            features |= wgpu::Features::PIPELINE_CACHE;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("yetty"),
            required_features: features,
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| tracing::error!(target: "yetty.gpu", error = %e, "GPU device request failed"))
        .ok()?;

        let caps = surface.get_capabilities(&adapter);
        // Pick the native surface format, then derive an sRGB render format via
        // view_formats + add_srgb_suffix so gamma-aware blending holds even on
        // backends that only expose a non-sRGB surface format.
        let surface_format = caps.formats[0];
        let render_format = surface_format.add_srgb_suffix();
        let view_formats = if render_format == surface_format { vec![] } else { vec![render_format] };

        let surface_alpha_mode = if caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::PreMultiplied) {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else if caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::PostMultiplied) {
            wgpu::CompositeAlphaMode::PostMultiplied
        } else {
            caps.alpha_modes[0]
        };

        let size = window.inner_size();
        surface.configure(
            &device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: surface_format,
                width: size.width.max(1),
                height: size.height.max(1),
                present_mode: wgpu::PresentMode::Fifo,
                alpha_mode: surface_alpha_mode,
                view_formats,
                desired_maximum_frame_latency: 2,
            },
        );

        let info = adapter.get_info();
        tracing::info!(
            target: "yetty.gpu",
            adapter = %info.name,
            backend = ?info.backend,
            ?surface_format,
            ?render_format,
            ?surface_alpha_mode,
            "GPU initialized",
        );

        let (pipeline_cache, pipeline_cache_path) = Self::load_pipeline_cache(&device, &info);

        drop(adapter);

        Some(Self { instance, device, queue, surface_format, render_format, surface_alpha_mode, pipeline_cache, pipeline_cache_path })
    }

    /// Returns true if the surface alpha mode supports transparency.
    pub fn supports_transparency(&self) -> bool {
        !matches!(self.surface_alpha_mode, wgpu::CompositeAlphaMode::Opaque)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn render_format(&self) -> wgpu::TextureFormat {
        self.render_format
    }

    fn view_formats(&self) -> Vec<wgpu::TextureFormat> {
        if self.render_format == self.surface_format { vec![] } else { vec![self.render_format] }
    }

    /// Load a pipeline cache from disk (Vulkan only). Returns `(None, None)`
    /// on backends without `PIPELINE_CACHE` support.
    ///
    /// Safety: `create_pipeline_cache` is unsafe because it accepts arbitrary
    /// bytes. Corrupt or driver-mismatched data is silently ignored by Vulkan
    /// since `fallback` is set to `true`.
    #[allow(unsafe_code)]
    fn load_pipeline_cache(device: &wgpu::Device, adapter_info: &wgpu::AdapterInfo) -> (Option<wgpu::PipelineCache>, Option<std::path::PathBuf>) {
        let cache_key = match wgpu::util::pipeline_cache_key(adapter_info) {
            Some(key) if device.features().contains(wgpu::Features::PIPELINE_CACHE) => key,
            _ => return (None, None),
        };
        let cache_dir = crate::config::config_dir();
        let cache_path = cache_dir.join(cache_key);
        let cache_data = std::fs::read(&cache_path).ok();

        // Safety: cache data came from a previous `get_data()` call on the same adapter.
        let cache = unsafe {
            device.create_pipeline_cache(&wgpu::PipelineCacheDescriptor { label: Some("yetty_pipeline_cache"), data: cache_data.as_deref(), fallback: true })
        };

        tracing::debug!(target: "yetty.gpu", path = %cache_path.display(), existing = cache_data.is_some(), "pipeline cache loaded");

        (Some(cache), Some(cache_path))
    }

    /// Save the pipeline cache to disk. Call before exit.
    pub fn save_pipeline_cache(&self) {
        let (Some(cache), Some(path)) = (&self.pipeline_cache, &self.pipeline_cache_path) else {
            return;
        };
        let Some(data) = cache.get_data() else {
            return;
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let temp = path.with_extension("tmp");
        if std::fs::write(&temp, &data).is_ok() {
            let _ = std::fs::rename(&temp, path);
            tracing::debug!(target: "yetty.gpu", bytes = data.len(), path = %path.display(), "pipeline cache saved");
        }
    }

    /// Create and configure a new surface for a window.
    pub fn create_surface(&self, window: &Arc<Window>) -> Option<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)> {
        let surface = self.instance.create_surface(window.clone()).ok()?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: self.surface_alpha_mode,
            view_formats: self.view_formats(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&self.device, &config);
        Some((surface, config))
    }
}
