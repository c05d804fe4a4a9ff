//! Piano-roll widget: parses `"octaves[,startOctave]"` and clamps both fields.

use std::cell::Cell;

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, PositionMode, ScreenType, Widget};

const OCTAVES_MIN: u8 = 1;
const OCTAVES_MAX: u8 = 8;
const START_OCTAVE_MIN: u8 = 0;
const START_OCTAVE_MAX: u8 = 9;
const DEFAULT_OCTAVES: u8 = 2;
const DEFAULT_START_OCTAVE: u8 = 4;

pub struct PianoWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    octaves: u8,
    start_octave: u8,
}

impl PianoWidget {
    pub fn create(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| Error::invalid_argument(format!("piano payload is not valid UTF-8: {e}")))?;
        let text = text.trim();

        let (octaves, start_octave) = if text.is_empty() {
            (DEFAULT_OCTAVES, DEFAULT_START_OCTAVE)
        } else {
            let mut parts = text.split(',');
            let octaves = parts
                .next()
                .unwrap()
                .trim()
                .parse::<i32>()
                .map_err(|_| Error::invalid_argument("piano payload octaves field is not an integer"))?;
            let start_octave = match parts.next() {
                Some(s) => s.trim().parse::<i32>().map_err(|_| Error::invalid_argument("piano payload startOctave field is not an integer"))?,
                None => i32::from(DEFAULT_START_OCTAVE),
            };
            (clamp_i32(octaves, OCTAVES_MIN, OCTAVES_MAX), clamp_i32(start_octave, START_OCTAVE_MIN, START_OCTAVE_MAX))
        };

        Ok(Self { id: ObjectId::next(), visible: Cell::new(true), focus: Cell::new(false), octaves, start_octave })
    }

    pub fn octaves(&self) -> u8 {
        self.octaves
    }

    pub fn start_octave(&self) -> u8 {
        self.start_octave
    }
}

fn clamp_i32(v: i32, min: u8, max: u8) -> u8 {
    v.clamp(i32::from(min), i32::from(max)) as u8
}

impl Widget for PianoWidget {
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
    fn wants_mouse(&self) -> bool {
        true
    }
    fn wants_keyboard(&self) -> bool {
        true
    }

    fn prepare_frame(&self, _ctx: &FrameContext<'_>, _on: bool) {}

    fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {
        // No card-drawing pipeline exists yet in this crate; this widget
        // currently renders as empty space and only owns the octave layout.
    }

    fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_uses_defaults() {
        let widget = PianoWidget::create(b"").unwrap();
        assert_eq!(widget.octaves(), DEFAULT_OCTAVES);
        assert_eq!(widget.start_octave(), DEFAULT_START_OCTAVE);
    }

    #[test]
    fn octaves_only() {
        let widget = PianoWidget::create(b"5").unwrap();
        assert_eq!(widget.octaves(), 5);
        assert_eq!(widget.start_octave(), DEFAULT_START_OCTAVE);
    }

    #[test]
    fn octaves_and_start_octave() {
        let widget = PianoWidget::create(b"3,2").unwrap();
        assert_eq!(widget.octaves(), 3);
        assert_eq!(widget.start_octave(), 2);
    }

    #[test]
    fn octaves_clamped_above_max() {
        let widget = PianoWidget::create(b"20,0").unwrap();
        assert_eq!(widget.octaves(), OCTAVES_MAX);
    }

    #[test]
    fn octaves_clamped_below_min() {
        let widget = PianoWidget::create(b"0,0").unwrap();
        assert_eq!(widget.octaves(), OCTAVES_MIN);
    }

    #[test]
    fn start_octave_clamped_above_max() {
        let widget = PianoWidget::create(b"2,15").unwrap();
        assert_eq!(widget.start_octave(), START_OCTAVE_MAX);
    }

    #[test]
    fn non_integer_payload_is_rejected() {
        assert!(PianoWidget::create(b"abc").is_err());
    }
}
