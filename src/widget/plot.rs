//! Binary/text plot payload parsing and a small private line-pipeline renderer.

use std::cell::{Cell, RefCell};

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, OnOffEdge, PositionMode, ScreenType, Widget};

const HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
}

/// CPU-side decoded plot data: `N` series of `M` points each, row-major.
pub struct PlotPayload {
    pub num_plots: u32,
    pub num_points: u32,
    pub viewport: Viewport,
    pub values: Vec<f32>,
}

impl PlotPayload {
    /// Parses either the 24-byte binary header + row-major `f32` body, or the
    /// text fallback `"N,M"` / `"N,M,xmin,xmax,ymin,ymax"` (no sample data —
    /// produces a zero-filled buffer of the right length).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if let Ok(text) = std::str::from_utf8(payload) {
            if text.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                return Self::parse_text(text.trim());
            }
        }
        Self::parse_binary(payload)
    }

    fn parse_binary(payload: &[u8]) -> Result<Self> {
        if payload.len() < HEADER_LEN {
            return Err(Error::invalid_argument("plot payload shorter than 24-byte header"));
        }
        let n = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let m = u32::from_le_bytes(payload[4..8].try_into().unwrap());
        let xmin = f32::from_le_bytes(payload[8..12].try_into().unwrap());
        let xmax = f32::from_le_bytes(payload[12..16].try_into().unwrap());
        let ymin = f32::from_le_bytes(payload[16..20].try_into().unwrap());
        let ymax = f32::from_le_bytes(payload[20..24].try_into().unwrap());

        let expected = n as usize * m as usize;
        let body = &payload[HEADER_LEN..];
        if body.len() < expected * 4 {
            return Err(Error::invalid_argument(format!(
                "plot payload body too short: expected {} floats, got {}",
                expected,
                body.len() / 4
            )));
        }
        let values = body[..expected * 4]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();

        Ok(Self { num_plots: n, num_points: m, viewport: Viewport { xmin, xmax, ymin, ymax }, values })
    }

    fn parse_text(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 2 && parts.len() != 6 {
            return Err(Error::invalid_argument("text plot payload must be \"N,M\" or \"N,M,xmin,xmax,ymin,ymax\""));
        }
        let parse_u32 = |s: &str| s.trim().parse::<u32>().map_err(|_| Error::invalid_argument(format!("invalid integer: {s}")));
        let parse_f32 = |s: &str| s.trim().parse::<f32>().map_err(|_| Error::invalid_argument(format!("invalid float: {s}")));

        let n = parse_u32(parts[0])?;
        let m = parse_u32(parts[1])?;
        let viewport = if parts.len() == 6 {
            Viewport { xmin: parse_f32(parts[2])?, xmax: parse_f32(parts[3])?, ymin: parse_f32(parts[4])?, ymax: parse_f32(parts[5])? }
        } else {
            Viewport { xmin: 0.0, xmax: 1.0, ymin: 0.0, ymax: 1.0 }
        };
        Ok(Self { num_plots: n, num_points: m, viewport, values: vec![0.0; (n * m) as usize] })
    }
}

struct GpuState {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
}

/// A line/points plot widget. Not a card — it owns a small private pipeline
/// drawn into the shared pass rather than going through the card buffer manager.
pub struct PlotWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    payload: PlotPayload,
    edge: OnOffEdge,
    gpu: RefCell<Option<GpuState>>,
    failed: Cell<bool>,
}

impl PlotWidget {
    pub fn create(payload: &[u8]) -> Result<Self> {
        let payload = PlotPayload::parse(payload)?;
        Ok(Self {
            id: ObjectId::next(),
            visible: Cell::new(true),
            focus: Cell::new(false),
            payload,
            edge: OnOffEdge::new(),
            gpu: RefCell::new(None),
            failed: Cell::new(false),
        })
    }

    pub fn num_plots(&self) -> u32 {
        self.payload.num_plots
    }

    pub fn num_points(&self) -> u32 {
        self.payload.num_points
    }

    pub fn viewport(&self) -> Viewport {
        self.payload.viewport
    }

    pub fn values(&self) -> &[f32] {
        &self.payload.values
    }

    fn create_gpu_resources(&self, ctx: &FrameContext<'_>) {
        use wgpu::util::DeviceExt;
        let mut raw = Vec::with_capacity(self.payload.values.len() * 4);
        for v in &self.payload.values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let vertex_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("plot-vertex-buffer"),
            contents: &raw,
            usage: wgpu::BufferUsages::VERTEX,
        });

        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("plot-line-shader"),
            source: wgpu::ShaderSource::Wgsl(PLOT_SHADER.into()),
        });
        let layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("plot-pipeline-layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("plot-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 4,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute { format: wgpu::VertexFormat::Float32, offset: 0, shader_location: 0 }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        *self.gpu.borrow_mut() = Some(GpuState { pipeline, vertex_buffer });
    }
}

impl Widget for PlotWidget {
    fn id(&self) -> ObjectId {
        self.id
    }
    fn visible(&self) -> bool {
        self.visible.get()
    }
    fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }
    fn has_focus(&self) -> bool {
        self.focus.get()
    }
    fn set_focus(&self, focus: bool) {
        self.focus.set(focus);
    }
    fn position_mode(&self) -> PositionMode {
        PositionMode::Relative
    }
    fn screen_type(&self) -> ScreenType {
        ScreenType::Main
    }

    fn prepare_frame(&self, ctx: &FrameContext<'_>, on: bool) {
        if self.failed.get() {
            return;
        }
        let (rising, falling) = self.edge.update(on);
        if rising {
            self.create_gpu_resources(ctx);
        } else if falling {
            *self.gpu.borrow_mut() = None;
        }
    }

    fn render(&self, pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {
        if self.failed.get() {
            return;
        }
        if let Some(gpu) = self.gpu.borrow().as_ref() {
            pass.set_pipeline(&gpu.pipeline);
            pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
            pass.draw(0..self.payload.values.len() as u32, 0..1);
        }
    }

    fn dispose(&self) {
        *self.gpu.borrow_mut() = None;
    }
}

const PLOT_SHADER: &str = r#"
@vertex
fn vs_main(@location(0) y: f32, @builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    let x = f32(idx) / 32.0 * 2.0 - 1.0;
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.2, 0.9, 0.4, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_header(n: u32, m: u32, xmin: f32, xmax: f32, ymin: f32, ymax: f32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&n.to_le_bytes());
        out.extend_from_slice(&m.to_le_bytes());
        out.extend_from_slice(&xmin.to_le_bytes());
        out.extend_from_slice(&xmax.to_le_bytes());
        out.extend_from_slice(&ymin.to_le_bytes());
        out.extend_from_slice(&ymax.to_le_bytes());
        out
    }

    #[test]
    fn scenario_5_plot_widget_init() {
        let mut payload = encode_header(2, 4, 0.0, 1.0, -1.0, 1.0);
        let values: [f32; 8] = [0.0, 0.5, 1.0, 0.5, -1.0, -0.5, 0.0, 0.5];
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let widget = PlotWidget::create(&payload).unwrap();
        assert_eq!(widget.num_plots(), 2);
        assert_eq!(widget.num_points(), 4);
        assert_eq!(widget.viewport(), Viewport { xmin: 0.0, xmax: 1.0, ymin: -1.0, ymax: 1.0 });
        assert_eq!(widget.values().len(), 8);
        assert_eq!(widget.values(), &values);
    }

    #[test]
    fn short_header_is_rejected() {
        let err = PlotPayload::parse(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn text_fallback_without_viewport() {
        let payload = PlotPayload::parse(b"2,3").unwrap();
        assert_eq!(payload.num_plots, 2);
        assert_eq!(payload.num_points, 3);
        assert_eq!(payload.values.len(), 6);
    }

    #[test]
    fn text_fallback_with_viewport() {
        let payload = PlotPayload::parse(b"1,4,0,10,-5,5").unwrap();
        assert_eq!(payload.viewport, Viewport { xmin: 0.0, xmax: 10.0, ymin: -5.0, ymax: 5.0 });
    }
}
