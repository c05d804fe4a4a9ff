//! Shader widget: a WGSL fragment snippet run full-screen within the widget's
//! bounds, optionally split into multiple buffer passes by `//--- Name` markers.

use std::cell::{Cell, RefCell};

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::shader::ShaderProvider;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, OnOffEdge, PositionMode, ScreenType, Widget};

const PASS_MARKERS: [&str; 5] = ["//--- BufferA", "//--- BufferB", "//--- BufferC", "//--- BufferD", "//--- Image"];

/// One named pass extracted from a multipass shader payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderPass {
    pub name: String,
    pub code: String,
}

/// Splits a multipass shader payload on the fixed `//--- Name` section markers.
/// A payload with no markers is treated as a single unnamed `Image` pass.
pub fn split_passes(source: &str) -> Vec<ShaderPass> {
    let mut marker_positions: Vec<(usize, &str)> =
        PASS_MARKERS.iter().filter_map(|m| source.find(m).map(|pos| (pos, *m))).collect();
    marker_positions.sort_by_key(|(pos, _)| *pos);

    if marker_positions.is_empty() {
        return vec![ShaderPass { name: "Image".to_string(), code: source.to_string() }];
    }

    let mut passes = Vec::with_capacity(marker_positions.len());
    for (i, (pos, marker)) in marker_positions.iter().enumerate() {
        let start = pos + marker.len();
        let end = marker_positions.get(i + 1).map(|(p, _)| *p).unwrap_or(source.len());
        let name = marker.trim_start_matches("//--- ").to_string();
        passes.push(ShaderPass { name, code: source[start..end].trim().to_string() });
    }
    passes
}

struct CompiledPass {
    code: String,
    dirty: Cell<bool>,
}

impl ShaderProvider for CompiledPass {
    fn code(&self) -> String {
        self.code.clone()
    }
    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
    fn clear_dirty(&self) {
        self.dirty.set(false);
    }
    fn function_count(&self) -> usize {
        // Each multipass section compiles to exactly one entry-point function.
        1
    }
}

pub struct ShaderWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    passes: Vec<ShaderPass>,
    edge: OnOffEdge,
    compiled: RefCell<Option<wgpu::ShaderModule>>,
    failed: Cell<bool>,
}

impl ShaderWidget {
    pub fn create(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| Error::invalid_argument(format!("shader payload is not valid UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Err(Error::invalid_argument("shader payload is empty"));
        }
        let passes = split_passes(text);
        Ok(Self {
            id: ObjectId::next(),
            visible: Cell::new(true),
            focus: Cell::new(false),
            passes,
            edge: OnOffEdge::new(),
            compiled: RefCell::new(None),
            failed: Cell::new(false),
        })
    }

    pub fn passes(&self) -> &[ShaderPass] {
        &self.passes
    }

    pub fn is_multipass(&self) -> bool {
        self.passes.len() > 1
    }

    fn compile(&self, ctx: &FrameContext<'_>) {
        let image_pass = self.passes.iter().find(|p| p.name == "Image").unwrap_or(&self.passes[0]);
        let wrapped = format!("{}\n{}", SHADER_PRELUDE, image_pass.code);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("shader-widget-module"),
                source: wgpu::ShaderSource::Wgsl(wrapped.into()),
            })
        }));
        match result {
            Ok(module) => {
                *self.compiled.borrow_mut() = Some(module);
                self.failed.set(false);
            }
            Err(_) => {
                tracing::error!(target: "yetty.widget.shader", "shader widget compile panicked, keeping previous module");
                self.failed.set(true);
            }
        }
    }
}

impl Widget for ShaderWidget {
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
            self.compile(ctx);
        } else if falling {
            *self.compiled.borrow_mut() = None;
        }
    }

    fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {
        // No pipeline sampling `compiled` exists yet in this crate; this widget
        // currently renders as empty space and only owns shader compilation.
    }

    fn dispose(&self) {
        *self.compiled.borrow_mut() = None;
    }
}

const SHADER_PRELUDE: &str = r#"
struct ShaderUniforms {
    time: f32,
    resolution: vec2<f32>,
    mouse: vec2<f32>,
}
@group(0) @binding(0) var<uniform> uniforms: ShaderUniforms;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pass_with_no_markers() {
        let passes = split_passes("fn fs_main() {}");
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].name, "Image");
    }

    #[test]
    fn multipass_splits_on_markers_in_order() {
        let source = "//--- BufferA\ncode a\n//--- Image\ncode image";
        let passes = split_passes(source);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].name, "BufferA");
        assert_eq!(passes[0].code, "code a");
        assert_eq!(passes[1].name, "Image");
        assert_eq!(passes[1].code, "code image");
    }

    #[test]
    fn markers_out_of_textual_order_are_sorted_by_position() {
        let source = "//--- Image\ncode image\n//--- BufferA\ncode a";
        let passes = split_passes(source);
        assert_eq!(passes[0].name, "Image");
        assert_eq!(passes[1].name, "BufferA");
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(ShaderWidget::create(b"   ").is_err());
    }

    #[test]
    fn multipass_widget_reports_is_multipass() {
        let widget = ShaderWidget::create(b"//--- BufferA\na\n//--- Image\nb").unwrap();
        assert!(widget.is_multipass());
    }

    #[test]
    fn single_pass_widget_is_not_multipass() {
        let widget = ShaderWidget::create(b"fn fs_main() {}").unwrap();
        assert!(!widget.is_multipass());
    }
}
