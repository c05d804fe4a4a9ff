//! The Host engine: winit `ApplicationHandler` wiring plus the per-frame
//! orchestration sequence (pump events → dispatch → update shaders → flush card
//! buffers → render → present).

use std::cell::RefCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::window::{Window, WindowId};

use crate::card::CardBufferManager;
use crate::config::Config;
use crate::event::{self, Event};
use crate::gpu::GpuState;
use crate::shader::ShaderManager;
use crate::tile::Workspace;
use crate::widget::FrameContext;
use crate::window::HostWindow;

const BASE_SHADER: &str = "\
// FUNCTIONS_PLACEHOLDER
// DISPATCH_PLACEHOLDER
// PRE_EFFECT_FUNCTIONS_PLACEHOLDER
// PRE_EFFECT_APPLY_PLACEHOLDER
// POST_EFFECT_FUNCTIONS_PLACEHOLDER
// POST_EFFECT_APPLY_PLACEHOLDER
";

/// Top-level application state driving one window and one workspace.
///
/// Owns every shared collaborator a widget's [`FrameContext`] might need
/// (device/queue via `gpu`, the shared image atlas via `card_buffer`) so no
/// widget ever reaches for global state on its own.
pub struct Host {
    config: Config,
    gpu: Option<GpuState>,
    window: Option<HostWindow>,
    card_buffer: Option<RefCell<CardBufferManager>>,
    shader_manager: RefCell<ShaderManager>,
    workspace: RefCell<Workspace>,
    start: Instant,
    first_window_created: bool,
}

impl Host {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            gpu: None,
            window: None,
            card_buffer: None,
            shader_manager: RefCell::new(ShaderManager::create(BASE_SHADER).expect("base shader is non-empty")),
            workspace: RefCell::new(Workspace::create().expect("workspace arena starts empty")),
            start: Instant::now(),
            first_window_created: false,
        }
    }

    pub fn workspace(&self) -> &RefCell<Workspace> {
        &self.workspace
    }

    fn time_seconds(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Runs the per-frame sequence documented for the host engine: pump the
    /// event loop, let every widget observe the shared event stream via
    /// `EventLoop::dispatch`, recompile dirty shaders, flush dirty card-buffer
    /// ranges, then record one render pass and present.
    fn render(&mut self) {
        let time_seconds = self.time_seconds();
        let dirty_max_gap = self.config.card_buffer.dirty_max_gap as u32;
        let [r, g, b, a] = self.config.render.clear_color;

        let Ok(loop_) = event::event_loop() else { return };
        if !loop_.is_running() {
            return;
        }
        loop_.pump();

        let Some(gpu) = &self.gpu else { return };
        let Some(card_buffer) = &self.card_buffer else { return };

        self.shader_manager.borrow_mut().update(gpu.device());
        card_buffer.borrow_mut().flush(gpu.queue(), dirty_max_gap);

        let Some(window) = &mut self.window else { return };
        let frame = match window.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = window.window.inner_size();
                window.resize_surface(gpu.device(), size.width, size.height);
                return;
            }
            Err(e) => {
                tracing::error!(target: "yetty.host", error = %e, "failed to acquire surface texture");
                return;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("yetty-frame-encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("yetty-frame-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let ctx = FrameContext {
                device: gpu.device(),
                queue: gpu.queue(),
                target_format: gpu.render_format(),
                time_seconds,
                card_buffer: Some(card_buffer),
            };
            let workspace = self.workspace.borrow();
            workspace.prepare_frame(&ctx);
            workspace.render(&mut pass);
        }

        gpu.queue().submit(std::iter::once(encoder.finish()));
        frame.present();
    }
}

impl ApplicationHandler for Host {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.first_window_created {
            return;
        }
        self.first_window_created = true;

        let attrs = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.window.width, self.config.window.height));

        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                tracing::error!(target: "yetty.host", error = %e, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        let gpu = GpuState::new(&window);
        let card_buffer = match CardBufferManager::create(gpu.device(), &self.config.card_buffer) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::error!(target: "yetty.host", error = %crate::error::chain_to_string(&e), "failed to create card buffer manager");
                event_loop.exit();
                return;
            }
        };
        let Some(host_window) = HostWindow::new(window.clone(), &gpu) else {
            tracing::error!(target: "yetty.host", "failed to create surface for window");
            event_loop.exit();
            return;
        };

        self.card_buffer = Some(RefCell::new(card_buffer));
        self.window = Some(host_window);
        self.gpu = Some(gpu);

        // winit's ApplicationHandler owns the real blocking wait/wake cadence for
        // this process, so the crate's own EventLoop never calls its own start();
        // it instead tracks "running" across the same window bracketed by this
        // resumed()/the CloseRequested below, and pump()s once per frame from render().
        if let Ok(loop_) = event::event_loop() {
            loop_.mark_running();
        }

        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = &self.window else { return };
        if window.window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Ok(loop_) = event::event_loop() {
                    loop_.stop();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.render(),
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &self.gpu {
                    if let Some(window) = &mut self.window {
                        window.resize_surface(gpu.device(), size.width, size.height);
                    }
                }
                if let Ok(loop_) = event::event_loop() {
                    loop_.dispatch(&Event::Resize { width: size.width as f32, height: size.height as f32 });
                }
                if let Some(window) = &self.window {
                    window.window.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Ok(loop_) = event::event_loop() {
                    loop_.dispatch(&Event::MouseMove { x: position.x as f32, y: position.y as f32 });
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else { return };
        let target_fps = self.config.render.target_fps.max(1);
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(target_fps));
        window.window.request_redraw();
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + frame_interval));
    }
}
