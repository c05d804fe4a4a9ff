//! Widget abstraction and the lifecycle every concrete widget kind follows.

pub mod image;
pub mod piano;
pub mod plot;
pub mod richtext;
pub mod shader_widget;
pub mod video;

use std::cell::{Cell, RefCell};

use crate::card::CardBufferManager;
use crate::object::ObjectId;
use crate::tile::PixelBounds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMode {
    /// Moves with scroll.
    Relative,
    /// Stays pinned regardless of scroll.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenType {
    Main,
    Alternate,
}

/// Per-frame context passed to [`Widget::prepare_frame`]. Carries only what a
/// widget needs to decide whether it has work to do; GPU device/queue access for
/// resource creation is threaded in separately by each concrete widget's
/// lazy-init path, since not every widget needs it every frame.
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub target_format: wgpu::TextureFormat,
    pub time_seconds: f32,
    /// Shared card buffer manager, for widgets (e.g. Image) that pack into its
    /// image atlas rather than owning private GPU resources. `None` in contexts
    /// that don't wire one up (e.g. most unit tests).
    pub card_buffer: Option<&'a RefCell<CardBufferManager>>,
}

/// Tracks the "is this widget currently visible" edge so GPU resources are
/// created/released exactly on the off→on / on→off transitions, per spec.
#[derive(Default)]
pub struct OnOffEdge {
    was_on: Cell<bool>,
}

impl OnOffEdge {
    pub fn new() -> Self {
        Self { was_on: Cell::new(false) }
    }

    /// Returns `(rising, falling)` for this frame's `on` state.
    pub fn update(&self, on: bool) -> (bool, bool) {
        let was = self.was_on.get();
        self.was_on.set(on);
        (on && !was, !on && was)
    }
}

/// An interactive entity occupying a rectangular region of the workspace, owning
/// its CPU state and, lazily, any GPU resources it needs.
///
/// Lifecycle: `create()` parses the widget's payload and allocates CPU-side
/// state only. GPU resources are created lazily on the first `prepare_frame`
/// where `on` is true, and released on the transition back to `on == false`.
/// `dispose` is the final release and must be idempotent.
pub trait Widget {
    fn id(&self) -> ObjectId;

    fn visible(&self) -> bool;
    fn set_visible(&self, visible: bool);

    fn has_focus(&self) -> bool;
    fn set_focus(&self, focus: bool);

    fn position_mode(&self) -> PositionMode;
    fn screen_type(&self) -> ScreenType;

    fn wants_mouse(&self) -> bool {
        false
    }
    fn wants_keyboard(&self) -> bool {
        false
    }

    /// CPU-side per-frame work: decode, layout, lazy GPU resource creation on the
    /// off→on edge, release on the on→off edge. `on` reflects whether the widget
    /// is currently eligible to render (visible and within a live pane).
    fn prepare_frame(&self, ctx: &FrameContext<'_>, on: bool);

    /// Records draw calls into the caller-supplied pass. Must not begin its own
    /// pass unless it targets a private offscreen texture prepared earlier in
    /// `prepare_frame`.
    fn render(&self, pass: &mut wgpu::RenderPass<'_>, bounds: PixelBounds);

    /// Final release of any owned resources. Idempotent.
    fn dispose(&self);
}

/// Minimal widget-test helpers shared by the tile-tree and host tests — not part
/// of this crate's public widget catalogue.
pub mod test_support {
    use super::*;
    use std::cell::Cell;

    pub struct NullWidget {
        id: ObjectId,
        visible: Cell<bool>,
        focus: Cell<bool>,
        screen_type: Cell<ScreenType>,
        /// Records the `on` flag the tile tree last called `prepare_frame` with, so
        /// tests can observe active-screen filtering without a real render pass.
        last_on: Cell<Option<bool>>,
    }

    impl NullWidget {
        pub fn new() -> Self {
            Self {
                id: ObjectId::next(),
                visible: Cell::new(true),
                focus: Cell::new(false),
                screen_type: Cell::new(ScreenType::Main),
                last_on: Cell::new(None),
            }
        }

        pub fn with_screen_type(screen_type: ScreenType) -> Self {
            let w = Self::new();
            w.screen_type.set(screen_type);
            w
        }

        pub fn last_on(&self) -> Option<bool> {
            self.last_on.get()
        }
    }

    impl Widget for NullWidget {
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
            self.screen_type.get()
        }
        fn prepare_frame(&self, _ctx: &FrameContext<'_>, on: bool) {
            self.last_on.set(Some(on));
        }
        fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {}
        fn dispose(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_off_edge_detects_rising_then_falling() {
        let edge = OnOffEdge::new();
        assert_eq!(edge.update(true), (true, false));
        assert_eq!(edge.update(true), (false, false));
        assert_eq!(edge.update(false), (false, true));
        assert_eq!(edge.update(false), (false, false));
    }
}
