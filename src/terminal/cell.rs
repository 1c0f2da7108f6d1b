use bitflags::bitflags;

use super::color::Color;
use super::hyperlink::HyperlinkId;

bitflags! {
    /// Boolean graphic attributes as a compact bitflag set. Underline
    /// shape and blink rate carry more than one bit of state and live in
    /// [`Style`] proper.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct StyleFlags: u16 {
        const BOLD          = 1 << 0;
        const FAINT         = 1 << 1;
        const ITALIC        = 1 << 2;
        const INVERSE       = 1 << 3;
        const HIDDEN        = 1 << 4;
        const STRIKETHROUGH = 1 << 5;
        const OVERLINE      = 1 << 6;
    }
}

bitflags! {
    /// Per-cell flags for wide character pair tracking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct CellFlags: u8 {
        /// This cell holds a wide (2-column) character.
        const WIDE        = 1 << 0;
        /// This cell is the trailing spacer of a wide character.
        const WIDE_SPACER = 1 << 1;
    }
}

/// Underline shape selected by SGR 4, 4:0..4:5, and 21.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

/// Blink rate selected by SGR 5 and 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Blink {
    #[default]
    None,
    Slow,
    Rapid,
}

/// The full graphic rendition applied to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    /// Underline color from SGR 58/59; `Default` means "same as fg".
    pub underline_color: Color,
    pub flags: StyleFlags,
    pub underline: UnderlineStyle,
    pub blink: Blink,
}

impl Style {
    /// The fill style for erased regions: background color erase keeps
    /// only the background of the current rendition.
    pub fn fill(&self) -> Style {
        Style {
            bg: self.bg,
            ..Style::default()
        }
    }
}

/// A single terminal cell: a base character plus an out-of-line combining
/// tail, its rendition, wide-pair flags, and an optional hyperlink.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub c: char,
    /// Zero-width characters (combining marks, variation selectors)
    /// following the base character. Boxed: nearly always absent.
    pub tail: Option<Box<Vec<char>>>,
    pub style: Style,
    pub flags: CellFlags,
    pub link: Option<HyperlinkId>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            c: ' ',
            tail: None,
            style: Style::default(),
            flags: CellFlags::empty(),
            link: None,
        }
    }
}

impl Cell {
    pub fn new(c: char, style: Style) -> Self {
        Self {
            c,
            tail: None,
            style,
            flags: CellFlags::empty(),
            link: None,
        }
    }

    /// A blank cell carrying an erase fill.
    pub fn blank(fill: Style) -> Self {
        Self {
            c: ' ',
            tail: None,
            style: fill,
            flags: CellFlags::empty(),
            link: None,
        }
    }

    /// The trailing spacer of a wide character pair.
    pub fn wide_spacer(style: Style, link: Option<HyperlinkId>) -> Self {
        Self {
            c: ' ',
            tail: None,
            style,
            flags: CellFlags::WIDE_SPACER,
            link,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE)
    }

    pub fn is_wide_spacer(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_SPACER)
    }

    /// Display width: 0 for spacers, 2 for wide cells, 1 otherwise.
    pub fn width(&self) -> u16 {
        if self.is_wide_spacer() {
            0
        } else if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// True for a blank cell with no rendition worth keeping: used when
    /// trimming trailing cells during reflow and text extraction.
    pub fn is_trailing_blank(&self) -> bool {
        self.c == ' '
            && self.tail.is_none()
            && self.style == Style::default()
            && self.link.is_none()
            && !self.is_wide_spacer()
    }

    /// Append a zero-width character to this cell's cluster.
    pub fn push_zerowidth(&mut self, c: char) {
        self.tail.get_or_insert_with(Default::default).push(c);
    }

    /// Write the full cluster into `out`.
    pub fn append_text(&self, out: &mut String) {
        out.push(self.c);
        if let Some(tail) = &self.tail {
            out.extend(tail.iter());
        }
    }
}
