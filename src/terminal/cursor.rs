use super::cell::Style;
use super::charset::Charsets;

/// Cursor shape selected by DECSCUSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

/// Resolved cursor visibility, combining DECTCEM, DECSCUSR blink
/// selection, and the blink timer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorVisibility {
    VisibleSteady,
    VisibleBlinkOn,
    VisibleBlinkOff,
    Hidden,
}

/// Cursor presentation state machine. Transitions come from DECTCEM
/// (show/hide), DECSCUSR (shape + blink selection), and `tick()` driven by
/// the host's blink timer.
#[derive(Debug, Clone)]
pub struct CursorStyle {
    pub shape: CursorShape,
    blinking: bool,
    visible: bool,
    phase_on: bool,
}

impl Default for CursorStyle {
    fn default() -> Self {
        Self {
            shape: CursorShape::Block,
            blinking: true,
            visible: true,
            phase_on: true,
        }
    }
}

impl CursorStyle {
    pub fn state(&self) -> CursorVisibility {
        if !self.visible {
            CursorVisibility::Hidden
        } else if !self.blinking {
            CursorVisibility::VisibleSteady
        } else if self.phase_on {
            CursorVisibility::VisibleBlinkOn
        } else {
            CursorVisibility::VisibleBlinkOff
        }
    }

    /// DECTCEM set/reset.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.phase_on = true;
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn blinking(&self) -> bool {
        self.blinking
    }

    /// DECSCUSR selection. Even parameters are steady, odd are blinking;
    /// 0 restores the default blinking block.
    pub fn select(&mut self, param: u16) {
        let (shape, blinking) = match param {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underline, true),
            4 => (CursorShape::Underline, false),
            5 => (CursorShape::Bar, true),
            6 => (CursorShape::Bar, false),
            _ => return,
        };
        self.shape = shape;
        self.blinking = blinking;
        self.phase_on = true;
    }

    /// ATT610 / mode 12 style blink control.
    pub fn set_blinking(&mut self, blinking: bool) {
        self.blinking = blinking;
        self.phase_on = true;
    }

    /// Advance the blink phase; call from the host blink timer. Returns
    /// true when the rendered cursor changed.
    pub fn tick(&mut self) -> bool {
        if self.visible && self.blinking {
            self.phase_on = !self.phase_on;
            true
        } else {
            false
        }
    }

    /// Phase resolved for rendering: false only for a blinking cursor in
    /// its off phase.
    pub fn phase_on(&self) -> bool {
        !self.blinking || self.phase_on
    }
}

/// The shared cursor: position, current rendition, and the DECSC save
/// slot. Column may sit at `cols` as the autowrap-pending sentinel.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub row: u16,
    pub col: u16,
    pub style: Style,
    saved: Option<SavedCursor>,
}

/// Everything DECSC captures.
#[derive(Debug, Clone)]
struct SavedCursor {
    row: u16,
    col: u16,
    style: Style,
    origin_mode: bool,
    charsets: Charsets,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the DECSC slot is occupied (reported by DECRQM 1048).
    pub fn is_saved(&self) -> bool {
        self.saved.is_some()
    }

    pub fn save(&mut self, origin_mode: bool, charsets: &Charsets) {
        self.saved = Some(SavedCursor {
            row: self.row,
            col: self.col,
            style: self.style,
            origin_mode,
            charsets: charsets.clone(),
        });
    }

    /// Restore the DECSC slot. Returns the saved origin mode and charsets
    /// for the screen to reinstate; defaults when nothing was saved.
    pub fn restore(&mut self) -> (bool, Charsets) {
        match self.saved.take() {
            Some(saved) => {
                self.row = saved.row;
                self.col = saved.col;
                self.style = saved.style;
                // Keep the slot so repeated DECRC is idempotent.
                let out = (saved.origin_mode, saved.charsets.clone());
                self.saved = Some(saved);
                out
            }
            None => {
                self.row = 0;
                self.col = 0;
                self.style = Style::default();
                (false, Charsets::default())
            }
        }
    }
}
