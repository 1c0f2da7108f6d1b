use serde::Serialize;

use crate::terminal::cell::{Blink, Style, StyleFlags, UnderlineStyle};
use crate::terminal::color::SerializableColor;

/// A complete render frame handed to the renderer sink. A frame reflects
/// exactly one consistent grid state; it is assembled under the screen
/// lock and immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RenderFrame {
    /// Monotonic sequence for frame ordering.
    pub frame_seq: u64,
    /// Monotonic resize generation. Increments on each terminal resize.
    pub resize_epoch: u64,
    /// Dirty viewport lines that need repainting.
    pub lines: Vec<RenderedLine>,
    /// Lines that scrolled off the top of the page into history since the
    /// previous frame, in eviction order.
    pub scrolled_lines: Vec<RenderedLine>,
    /// Absolute line id shown on viewport row 0.
    pub viewport_base: u64,
    /// Lines of history between the viewport and the live page bottom.
    pub display_offset: usize,
    pub rows: u16,
    pub cols: u16,
    pub cursor: CursorOverlay,
    pub selection: Option<SelectionOverlay>,
    /// Render the whole screen with fg/bg swapped (DECSCNM).
    pub reverse_video: bool,
    /// Frame updates may be held back while the application batches
    /// output (synchronized output, mode 2026).
    pub synchronized: bool,
    /// Terminal events (title, bell, mode reports, images).
    pub events: Vec<TermEvent>,
}

/// A single rendered line with pre-segmented styled spans.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedLine {
    /// Viewport-relative row index (0 = top of viewport).
    pub index: u16,
    /// Absolute line id, for scrollback-stable consumers.
    pub abs: u64,
    pub spans: Vec<StyledSpan>,
    /// Marked by the application (prompt marks).
    pub marked: bool,
}

/// A contiguous run of text sharing one rendition and hyperlink.
#[derive(Debug, Clone, Serialize)]
pub struct StyledSpan {
    pub text: String,
    pub fg: SerializableColor,
    pub bg: SerializableColor,
    pub underline_color: SerializableColor,
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: Underline,
    pub blink: BlinkRate,
    pub strikethrough: bool,
    pub overline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Underline {
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlinkRate {
    None,
    Slow,
    Rapid,
}

impl StyledSpan {
    pub fn new(text: &str, style: Style, url: Option<String>) -> Self {
        // Inverse swaps foreground and background; hidden text renders as
        // its own background.
        let (mut fg, bg) = if style.flags.contains(StyleFlags::INVERSE) {
            (style.bg, style.fg)
        } else {
            (style.fg, style.bg)
        };
        if style.flags.contains(StyleFlags::HIDDEN) {
            fg = bg;
        }

        Self {
            text: text.to_string(),
            fg: fg.into(),
            bg: bg.into(),
            underline_color: style.underline_color.into(),
            bold: style.flags.contains(StyleFlags::BOLD),
            faint: style.flags.contains(StyleFlags::FAINT),
            italic: style.flags.contains(StyleFlags::ITALIC),
            underline: match style.underline {
                UnderlineStyle::None => Underline::None,
                UnderlineStyle::Single => Underline::Single,
                UnderlineStyle::Double => Underline::Double,
                UnderlineStyle::Curly => Underline::Curly,
                UnderlineStyle::Dotted => Underline::Dotted,
                UnderlineStyle::Dashed => Underline::Dashed,
            },
            blink: match style.blink {
                Blink::None => BlinkRate::None,
                Blink::Slow => BlinkRate::Slow,
                Blink::Rapid => BlinkRate::Rapid,
            },
            strikethrough: style.flags.contains(StyleFlags::STRIKETHROUGH),
            overline: style.flags.contains(StyleFlags::OVERLINE),
            url,
        }
    }
}

/// Cursor rendering information.
#[derive(Debug, Clone, Serialize)]
pub struct CursorOverlay {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
    /// Blink phase already resolved: false while a blinking cursor is in
    /// its off phase.
    pub on: bool,
    pub shape: CursorShapeRender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorShapeRender {
    Block,
    Underline,
    Bar,
}

/// Selection overlay in viewport coordinates, clipped to the viewport.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOverlay {
    /// Inclusive cell ranges per viewport row: (row, start_col, end_col).
    pub rows: Vec<(u16, u16, u16)>,
}

/// Events emitted alongside render frames for state changes the renderer
/// or host shell cares about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TermEvent {
    /// Terminal title changed (OSC 0 or OSC 2).
    TitleChanged { title: String },
    /// Entered the alternate screen (vim, less, ...).
    AltScreenEntered,
    /// Left the alternate screen.
    AltScreenExited,
    /// BEL received.
    Bell,
    /// Mouse/keyboard reporting configuration changed; the host input
    /// path re-reads the mode set.
    InputModesChanged,
    /// Scrollback was cleared (CSI 3 J).
    ScrollbackCleared,
    /// The application asked for a 80/132 column switch (DECCOLM); the
    /// host decides whether to resize.
    ColumnsRequested { cols: u16 },
    /// Desktop notification (OSC 9).
    Notification { body: String },
    /// The application wrote to a clipboard selection (OSC 52).
    ClipboardWrite { selection: String, text: String },
    /// A prompt mark was placed on the current line (OSC 133).
    PromptMark { abs: u64 },
    /// Command finished with an exit code (OSC 133;D).
    CommandCompleted { exit_code: i32, abs: u64 },
    /// Sixel image data, passed through undecoded.
    SixelImage {
        data_base64: String,
        row: u16,
        col: u16,
    },
}
