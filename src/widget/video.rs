//! Video widget: holds only a file path, decoding lazily through a pluggable
//! [`VideoSource`] so this crate doesn't bundle a particular decoder.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, OnOffEdge, PositionMode, ScreenType, Widget};

/// One decoded video frame, already in RGBA8.
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Supplies decoded frames for a video path. Implementations own the actual
/// codec (ffmpeg bindings, a platform media framework, …); this crate only
/// defines the seam.
pub trait VideoSource: Send + Sync {
    fn open(&self, path: &std::path::Path) -> Result<()>;
    /// Returns the next frame due for presentation at `time_seconds`, or
    /// `None` if no new frame is ready yet.
    fn next_frame(&self, time_seconds: f32) -> Option<VideoFrame>;
}

struct GpuState {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

pub struct VideoWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    path: PathBuf,
    /// Host-supplied decoder. `None` means no decoder is available for this
    /// session — `prepare_frame` is then a no-op and the widget renders as
    /// empty space, matching the "failed widgets render as empty space" policy
    /// rather than treating "no decoder" as a constructor error.
    source: Option<Arc<dyn VideoSource>>,
    edge: OnOffEdge,
    opened: Cell<bool>,
    gpu: RefCell<Option<GpuState>>,
}

impl VideoWidget {
    /// `payload` is the raw card payload: the file path as UTF-8 bytes.
    /// `source` is optional — callers without a decoder pass `None` and the
    /// widget simply never produces frames.
    pub fn create(payload: &[u8], source: Option<Arc<dyn VideoSource>>) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| Error::invalid_argument(format!("video path is not valid UTF-8: {e}")))?;
        if text.is_empty() {
            return Err(Error::invalid_argument("video payload is an empty path"));
        }
        Ok(Self {
            id: ObjectId::next(),
            visible: Cell::new(true),
            focus: Cell::new(false),
            path: PathBuf::from(text),
            source,
            edge: OnOffEdge::new(),
            opened: Cell::new(false),
            gpu: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn ensure_opened(&self) {
        let Some(source) = &self.source else { return };
        if !self.opened.get() {
            if let Err(e) = source.open(&self.path) {
                tracing::error!(target: "yetty.widget.video", error = %crate::error::chain_to_string(&e), path = %self.path.display(), "failed to open video source");
                return;
            }
            self.opened.set(true);
        }
    }

    fn upload_frame(&self, ctx: &FrameContext<'_>, frame: VideoFrame) {
        let needs_new_texture = self.gpu.borrow().as_ref().is_none_or(|g| g.size != (frame.width, frame.height));
        if needs_new_texture {
            let size = wgpu::Extent3d { width: frame.width, height: frame.height, depth_or_array_layers: 1 };
            let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("video-widget-texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            *self.gpu.borrow_mut() = Some(GpuState { texture, view, size: (frame.width, frame.height) });
        }
        if let Some(gpu) = self.gpu.borrow().as_ref() {
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo { texture: &gpu.texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
                &frame.rgba,
                wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * frame.width), rows_per_image: Some(frame.height) },
                wgpu::Extent3d { width: frame.width, height: frame.height, depth_or_array_layers: 1 },
            );
        }
    }
}

impl Widget for VideoWidget {
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
            self.ensure_opened();
        } else if falling {
            *self.gpu.borrow_mut() = None;
            self.opened.set(false);
        }
        if on && self.opened.get() {
            if let Some(source) = &self.source {
                if let Some(frame) = source.next_frame(ctx.time_seconds) {
                    self.upload_frame(ctx, frame);
                }
            }
        }
    }

    fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {
        // No host pipeline samples `gpu`'s texture yet; this widget currently
        // renders as empty space and only owns frame decode/upload.
    }

    fn dispose(&self) {
        *self.gpu.borrow_mut() = None;
        self.opened.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        opened: Mutex<Vec<PathBuf>>,
    }

    impl VideoSource for FakeSource {
        fn open(&self, path: &std::path::Path) -> Result<()> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
        fn next_frame(&self, _time_seconds: f32) -> Option<VideoFrame> {
            None
        }
    }

    fn fake_source() -> Option<Arc<dyn VideoSource>> {
        Some(Arc::new(FakeSource { opened: Mutex::new(Vec::new()) }))
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(VideoWidget::create(b"", fake_source()).is_err());
    }

    #[test]
    fn non_utf8_path_is_rejected() {
        assert!(VideoWidget::create(&[0xFF, 0xFE], fake_source()).is_err());
    }

    #[test]
    fn stores_path_verbatim() {
        let widget = VideoWidget::create(b"/tmp/clip.mp4", fake_source()).unwrap();
        assert_eq!(widget.path(), std::path::Path::new("/tmp/clip.mp4"));
    }

    #[test]
    fn no_source_is_a_valid_construction() {
        let widget = VideoWidget::create(b"/tmp/clip.mp4", None).unwrap();
        assert_eq!(widget.path(), std::path::Path::new("/tmp/clip.mp4"));
    }

    #[test]
    fn without_a_source_ensure_opened_is_a_no_op() {
        let widget = VideoWidget::create(b"/tmp/clip.mp4", None).unwrap();
        widget.ensure_opened();
        assert!(!widget.opened.get());
    }
}
