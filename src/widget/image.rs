//! Still-image widget: decodes an arbitrary image file format to RGBA8 via the
//! `image` crate and packs it into the card buffer manager's shared image atlas
//! on first visibility, rendering as a single textured quad sampling that atlas.

use std::cell::{Cell, RefCell};

use wgpu::util::DeviceExt;

use crate::error::{Error, Result};
use crate::gpu::atlas::AtlasRegion;
use crate::object::ObjectId;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, OnOffEdge, PositionMode, ScreenType, Widget};

struct GpuState {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uv_buffer: wgpu::Buffer,
}

pub struct ImageWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    edge: OnOffEdge,
    region: Cell<Option<AtlasRegion>>,
    gpu: RefCell<Option<GpuState>>,
    failed: Cell<bool>,
}

impl ImageWidget {
    /// `bytes` are the raw file bytes of any format the `image` crate supports
    /// (PNG, JPEG, GIF, …) — decoded eagerly to an RGBA8 buffer.
    pub fn create(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(|e| Error::invalid_argument(format!("image decode failed: {e}")))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = (rgba.width(), rgba.height());
        Ok(Self {
            id: ObjectId::next(),
            visible: Cell::new(true),
            focus: Cell::new(false),
            width,
            height,
            rgba: rgba.into_raw(),
            edge: OnOffEdge::new(),
            region: Cell::new(None),
            gpu: RefCell::new(None),
            failed: Cell::new(false),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Packs into the shared atlas and builds the quad pipeline/bind group.
    /// A full atlas or missing card buffer marks the widget failed — it then
    /// renders as empty space, matching the "failed widgets" policy.
    fn create_gpu_resources(&self, ctx: &FrameContext<'_>) {
        let Some(card_buffer) = ctx.card_buffer else {
            self.failed.set(true);
            return;
        };
        let region = {
            let mut manager = card_buffer.borrow_mut();
            match manager.allocate_image_data(ctx.queue, self.width, self.height, &self.rgba) {
                Ok(region) => region,
                Err(_) => {
                    self.failed.set(true);
                    return;
                }
            }
        };
        self.region.set(Some(region));
        let atlas_size = card_buffer.borrow().image_atlas_size();
        let uv = region.uv(atlas_size);

        let uv_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("image-widget-uv"),
            contents: bytes_of_uv(uv),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let manager = card_buffer.borrow();
        let bind_group_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("image-widget-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: wgpu::BufferSize::new(16) },
                    count: None,
                },
            ],
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("image-widget-bind-group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(manager.image_atlas_view()) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(manager.image_atlas_sampler()) },
                wgpu::BindGroupEntry { binding: 2, resource: uv_buffer.as_entire_binding() },
            ],
        });

        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("image-widget-shader"),
            source: wgpu::ShaderSource::Wgsl(IMAGE_SHADER.into()),
        });
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("image-widget-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("image-widget-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
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
            primitive: wgpu::PrimitiveState { topology: wgpu::PrimitiveTopology::TriangleStrip, ..Default::default() },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        *self.gpu.borrow_mut() = Some(GpuState { pipeline, bind_group, uv_buffer });
    }
}

fn bytes_of_uv(uv: [f32; 4]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    for v in uv {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

impl Widget for ImageWidget {
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
            pass.set_bind_group(0, &gpu.bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
    }

    fn dispose(&self) {
        *self.gpu.borrow_mut() = None;
    }
}

const IMAGE_SHADER: &str = r#"
@group(0) @binding(0) var atlas_tex: texture_2d<f32>;
@group(0) @binding(1) var atlas_samp: sampler;
@group(0) @binding(2) var<uniform> uv_rect: vec4<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, 1.0), vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0),
    );
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(0.0, 0.0), vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0), vec2<f32>(1.0, 1.0),
    );
    var out: VertexOutput;
    out.position = vec4<f32>(positions[vi], 0.0, 1.0);
    out.uv = uv_rect.xy + corners[vi] * uv_rect.zw;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(atlas_tex, atlas_samp, input.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = ImageWidget::create(b"not an image").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn one_pixel_png_decodes_to_expected_dimensions() {
        // A minimal 1x1 red PNG, generated once and embedded as a literal.
        const ONE_PX_RED_PNG: &[u8] = &[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x5D, 0x3A, 0x5B, 0xDC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
            0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ];
        let widget = ImageWidget::create(ONE_PX_RED_PNG).unwrap();
        assert_eq!(widget.dimensions(), (1, 1));
    }

    #[test]
    fn widget_starts_without_a_packed_region() {
        const ONE_PX_RED_PNG: &[u8] = &[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x5D, 0x3A, 0x5B, 0xDC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
            0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ];
        let widget = ImageWidget::create(ONE_PX_RED_PNG).unwrap();
        assert!(widget.region.get().is_none());
    }
}
