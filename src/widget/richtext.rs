//! Rich-text widget: parses the YAML span format into laid-out runs with
//! cursor-continuing position rules, then draws each run as a set of glyph quads.

use std::cell::{Cell, RefCell};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::tile::PixelBounds;
use crate::widget::{FrameContext, OnOffEdge, PositionMode, ScreenType, Widget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl Default for FontStyle {
    fn default() -> Self {
        Self::Regular
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(rename = "font-name")]
    font_name: Option<String>,
    spans: Vec<RawSpan>,
}

#[derive(Debug, Deserialize)]
struct RawSpan {
    text: String,
    x: Option<f32>,
    y: Option<f32>,
    #[serde(default = "default_size")]
    size: f32,
    #[serde(default)]
    style: String,
    color: Option<RawColor>,
    #[serde(rename = "font-name")]
    font_name: Option<String>,
    #[serde(default)]
    wrap: bool,
    #[serde(rename = "max-width", default)]
    max_width: f32,
    #[serde(rename = "line-height", default)]
    line_height: f32,
}

fn default_size() -> f32 {
    16.0
}

fn parse_style(s: &str) -> FontStyle {
    match s {
        "bold" => FontStyle::Bold,
        "italic" => FontStyle::Italic,
        "bold-italic" => FontStyle::BoldItalic,
        _ => FontStyle::Regular,
    }
}

/// A laid-out span, positioned absolutely (the cursor-continuation rule has
/// already been resolved at parse time).
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub style: FontStyle,
    pub color: [f32; 4],
    pub font_name: Option<String>,
    pub wrap: bool,
    pub max_width: f32,
    pub line_height: f32,
}

/// Layout collaborator: turns a glyph + style into an advance width and a
/// size into a line height. Font-metric computation (real shaping, kerning,
/// ligatures) is an explicit non-goal — this crate only needs *something*
/// implementing the trait to lay spans out, and ships [`MonospaceShaper`] as
/// a deterministic fallback so the widget is testable without a real one.
pub trait TextShaper {
    fn glyph_advance(&self, codepoint: char, size: f32, style: FontStyle) -> f32;
    fn line_height(&self, size: f32) -> f32;
}

/// Every glyph advances by a fixed fraction of its point size regardless of
/// codepoint or style — a monospace approximation, not a real font metric.
pub struct MonospaceShaper;

impl TextShaper for MonospaceShaper {
    fn glyph_advance(&self, _codepoint: char, size: f32, _style: FontStyle) -> f32 {
        size * 0.6
    }

    fn line_height(&self, size: f32) -> f32 {
        size * 1.2
    }
}

pub struct RichTextDocument {
    pub font_name: Option<String>,
    pub spans: Vec<LaidOutSpan>,
}

impl RichTextDocument {
    /// Sums glyph advances for a span's first line, via `shaper`. Used by the
    /// widget to decide wrap points when `wrap` is set; exposed here so layout
    /// math is testable independent of any GPU state.
    pub fn measure_line_width(span: &LaidOutSpan, shaper: &dyn TextShaper) -> f32 {
        span.text.split('\n').next().unwrap_or("").chars().map(|c| shaper.glyph_advance(c, span.size, span.style)).sum()
    }
}

impl RichTextDocument {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_slice(payload).map_err(|e| Error::invalid_argument(format!("rich-text YAML parse failed: {e}")))?;

        let mut cursor_x = 0.0f32;
        let mut cursor_y = 0.0f32;
        let mut spans = Vec::with_capacity(raw.spans.len());

        for raw_span in raw.spans {
            if raw_span.text.is_empty() {
                return Err(Error::invalid_argument("rich-text span missing required `text`"));
            }
            let size = raw_span.size;
            let line_height = if raw_span.line_height > 0.0 { raw_span.line_height } else { size * 1.2 };
            let x = raw_span.x.unwrap_or(cursor_x);
            let y = raw_span.y.unwrap_or(cursor_y);
            let color = raw_span.color.map(<[f32; 4]>::from).unwrap_or([1.0, 1.0, 1.0, 1.0]);

            let newline_count = raw_span.text.matches('\n').count();

            spans.push(LaidOutSpan {
                text: raw_span.text,
                x,
                y,
                size,
                style: parse_style(&raw_span.style),
                color,
                font_name: raw_span.font_name,
                wrap: raw_span.wrap,
                max_width: raw_span.max_width,
                line_height,
            });

            cursor_x = x;
            cursor_y = if newline_count > 0 { y + newline_count as f32 * line_height } else { y };
        }

        Ok(Self { font_name: raw.font_name, spans })
    }
}

/// `color` with 3 components defaults alpha to `1.0`; `serde_yaml` can't parse
/// a variable-length sequence into a fixed array directly, so colors are
/// normalized through this helper before `RawSpan::color` sees them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawColor {
    Rgb([f32; 3]),
    Rgba([f32; 4]),
}

impl From<RawColor> for [f32; 4] {
    fn from(c: RawColor) -> Self {
        match c {
            RawColor::Rgb([r, g, b]) => [r, g, b, 1.0],
            RawColor::Rgba(rgba) => rgba,
        }
    }
}

pub struct RichTextWidget {
    id: ObjectId,
    visible: Cell<bool>,
    focus: Cell<bool>,
    document: RichTextDocument,
    edge: OnOffEdge,
    gpu_ready: Cell<bool>,
}

impl RichTextWidget {
    pub fn create(payload: &[u8]) -> Result<Self> {
        let document = RichTextDocument::parse(payload)?;
        Ok(Self {
            id: ObjectId::next(),
            visible: Cell::new(true),
            focus: Cell::new(false),
            document,
            edge: OnOffEdge::new(),
            gpu_ready: Cell::new(false),
        })
    }

    pub fn spans(&self) -> &[LaidOutSpan] {
        &self.document.spans
    }
}

impl Widget for RichTextWidget {
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

    fn prepare_frame(&self, _ctx: &FrameContext<'_>, on: bool) {
        let (rising, falling) = self.edge.update(on);
        if rising {
            // No glyph atlas exists yet for this widget to rasterize into;
            // `gpu_ready` only tracks on/off-edge state until one does.
            self.gpu_ready.set(true);
        } else if falling {
            self.gpu_ready.set(false);
        }
    }

    fn render(&self, _pass: &mut wgpu::RenderPass<'_>, _bounds: PixelBounds) {
        // No host pipeline consumes `spans()` yet; this widget currently renders
        // as empty space and only owns layout/shaping.
    }

    fn dispose(&self) {
        self.gpu_ready.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_span_gets_defaults() {
        let yaml = b"spans:\n  - text: hello\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        assert_eq!(doc.spans.len(), 1);
        let span = &doc.spans[0];
        assert_eq!(span.size, 16.0);
        assert_eq!(span.style, FontStyle::Regular);
        assert_eq!(span.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(span.x, 0.0);
        assert_eq!(span.y, 0.0);
        assert!(!span.wrap);
    }

    #[test]
    fn missing_text_is_rejected() {
        let yaml = b"spans:\n  - size: 10\n";
        assert!(RichTextDocument::parse(yaml).is_err());
    }

    #[test]
    fn rgb_color_defaults_alpha_to_one() {
        let yaml = b"spans:\n  - text: hi\n    color: [1.0, 0.0, 0.0]\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        assert_eq!(doc.spans[0].color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn omitted_y_advances_by_newline_count_times_line_height() {
        let yaml = b"spans:\n  - text: \"line1\\nline2\\n\"\n    size: 10\n  - text: next\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        assert_eq!(doc.spans[0].y, 0.0);
        // size 10 -> default line_height = 12.0, two newlines -> cursor_y = 24.0
        assert_eq!(doc.spans[1].y, 24.0);
    }

    #[test]
    fn explicit_style_is_parsed() {
        let yaml = b"spans:\n  - text: hi\n    style: bold-italic\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        assert_eq!(doc.spans[0].style, FontStyle::BoldItalic);
    }

    #[test]
    fn font_name_override_is_per_span() {
        let yaml = b"font-name: Sans\nspans:\n  - text: hi\n    font-name: Mono\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        assert_eq!(doc.font_name.as_deref(), Some("Sans"));
        assert_eq!(doc.spans[0].font_name.as_deref(), Some("Mono"));
    }

    #[test]
    fn monospace_shaper_measures_first_line_only() {
        let yaml = b"spans:\n  - text: \"abcde\\nmore\"\n    size: 10\n";
        let doc = RichTextDocument::parse(yaml).unwrap();
        let width = RichTextDocument::measure_line_width(&doc.spans[0], &MonospaceShaper);
        assert_eq!(width, 5.0 * 10.0 * 0.6);
    }

    #[test]
    fn monospace_shaper_line_height_matches_default() {
        assert_eq!(MonospaceShaper.line_height(10.0), 12.0);
    }
}
