//! Per-window GPU surface wrapper. One workspace per window — no tab concept.

use std::sync::Arc;

use winit::window::Window;

use crate::gpu::GpuState;

pub struct HostWindow {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl HostWindow {
    pub fn new(window: Arc<Window>, gpu: &GpuState) -> Option<Self> {
        let (surface, config) = gpu.create_surface(&window)?;
        Some(Self { window, surface, surface_config: config })
    }

    pub fn resize_surface(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(device, &self.surface_config);
    }
}
