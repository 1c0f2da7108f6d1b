use bitflags::bitflags;

use super::cell::{Cell, CellFlags, Style};
use super::hyperlink::{HyperlinkId, Hyperlinks};
use crate::render::frame::StyledSpan;

bitflags! {
    /// Per-line flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct LineFlags: u8 {
        /// Participates in reflow on column resize.
        const WRAPPABLE = 1 << 0;
        /// The cursor wrapped out of this line; its logical content
        /// continues on the next line.
        const WRAPPED   = 1 << 1;
        /// Marked by the application (prompt marks, OSC 133).
        const MARKED    = 1 << 2;
    }
}

/// Line storage. A line starts in the trivial representation — a uniform
/// run of width-1 text over a blank fill — and inflates to a cell vector
/// on the first write the trivial form cannot express.
#[derive(Debug, Clone, PartialEq)]
enum Storage {
    Trivial {
        /// Text starting at column 0; every char is width 1.
        text: String,
        /// Display width of `text` in columns (chars, not bytes).
        width: u16,
        /// Rendition of the text run.
        style: Style,
        /// Rendition of the blank remainder (background color erase).
        fill: Style,
    },
    Inflated(Vec<Cell>),
}

/// One grid row. The displayed width always equals the column count the
/// line was created or resized with.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    storage: Storage,
    pub flags: LineFlags,
    pub dirty: bool,
    cols: u16,
}

impl Line {
    /// A blank line with the given erase fill.
    pub fn blank(cols: u16, fill: Style) -> Self {
        Self {
            storage: Storage::Trivial {
                text: String::new(),
                width: 0,
                style: Style::default(),
                fill,
            },
            flags: LineFlags::WRAPPABLE,
            dirty: true,
            cols,
        }
    }

    /// Build an inflated line from cells, padded or truncated to `cols`.
    pub fn from_cells(mut cells: Vec<Cell>, cols: u16, fill: Style) -> Self {
        cells.resize(cols as usize, Cell::blank(fill));
        Self {
            storage: Storage::Inflated(cells),
            flags: LineFlags::WRAPPABLE,
            dirty: true,
            cols,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    #[cfg(test)]
    pub fn is_trivial(&self) -> bool {
        matches!(self.storage, Storage::Trivial { .. })
    }

    /// Cell at `col`, materialized on demand for trivial lines.
    pub fn cell(&self, col: u16) -> Cell {
        match &self.storage {
            Storage::Trivial {
                text,
                width,
                style,
                fill,
            } => {
                if col < *width {
                    let c = text.chars().nth(col as usize).unwrap_or(' ');
                    Cell::new(c, *style)
                } else {
                    Cell::blank(*fill)
                }
            }
            Storage::Inflated(cells) => cells
                .get(col as usize)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Mutable access to a cell; inflates the line.
    pub fn cell_mut(&mut self, col: u16) -> &mut Cell {
        self.inflate();
        self.dirty = true;
        match &mut self.storage {
            Storage::Inflated(cells) => &mut cells[col as usize],
            Storage::Trivial { .. } => unreachable!("line inflated above"),
        }
    }

    /// Fast path for sequential uniform writes: append a width-1 char at
    /// the end of the trivial text run. Returns false when the write does
    /// not fit the trivial representation; the caller falls back to
    /// `cell_mut`.
    pub fn try_trivial_append(&mut self, col: u16, c: char, style: Style) -> bool {
        if col >= self.cols {
            return false;
        }
        match &mut self.storage {
            Storage::Trivial {
                text,
                width,
                style: text_style,
                ..
            } => {
                if col != *width {
                    return false;
                }
                if *width > 0 && *text_style != style {
                    return false;
                }
                if *width == 0 {
                    *text_style = style;
                }
                text.push(c);
                *width += 1;
                self.dirty = true;
                true
            }
            Storage::Inflated(_) => false,
        }
    }

    fn inflate(&mut self) {
        if let Storage::Trivial {
            text,
            style,
            fill,
            ..
        } = &self.storage
        {
            let mut cells = Vec::with_capacity(self.cols as usize);
            for c in text.chars() {
                cells.push(Cell::new(c, *style));
            }
            cells.resize(self.cols as usize, Cell::blank(*fill));
            self.storage = Storage::Inflated(cells);
        }
    }

    /// Consume the line into its cell vector.
    pub fn into_cells(mut self) -> Vec<Cell> {
        self.inflate();
        match self.storage {
            Storage::Inflated(cells) => cells,
            Storage::Trivial { .. } => unreachable!("line inflated above"),
        }
    }

    /// Reset to a blank trivial line, dropping content flags.
    pub fn reset(&mut self, fill: Style) {
        self.storage = Storage::Trivial {
            text: String::new(),
            width: 0,
            style: Style::default(),
            fill,
        };
        self.flags.remove(LineFlags::WRAPPED | LineFlags::MARKED);
        self.dirty = true;
    }

    /// Hyperlink ids referenced by cells in `[start, end)`.
    pub fn links_in(&self, start: u16, end: u16) -> Vec<HyperlinkId> {
        match &self.storage {
            Storage::Trivial { .. } => Vec::new(),
            Storage::Inflated(cells) => cells
                [start.min(self.cols) as usize..end.min(self.cols) as usize]
                .iter()
                .filter_map(|c| c.link)
                .collect(),
        }
    }

    /// Blank `[start, end)` with `fill`, widening to keep wide-cell pairs
    /// atomic. A full-width erase collapses back to the trivial form.
    pub fn erase(&mut self, start: u16, end: u16, fill: Style) {
        let end = end.min(self.cols);
        if start == 0 && end == self.cols {
            let flags = self.flags & LineFlags::WRAPPABLE;
            self.reset(fill);
            self.flags = flags;
            return;
        }
        if start >= end {
            return;
        }
        self.inflate();
        self.dirty = true;
        if let Storage::Inflated(cells) = &mut self.storage {
            let mut lo = start as usize;
            let mut hi = end as usize;
            if cells[lo].is_wide_spacer() && lo > 0 {
                lo -= 1;
            }
            if hi < cells.len() && cells[hi].is_wide_spacer() {
                hi += 1;
            }
            for cell in &mut cells[lo..hi] {
                *cell = Cell::blank(fill);
            }
        }
    }

    /// Insert `n` blank cells at `col`, shifting right within
    /// `[col, limit)`; cells pushed past `limit` are dropped.
    pub fn insert_blanks(&mut self, col: u16, n: u16, limit: u16, fill: Style) {
        let limit = limit.min(self.cols);
        if col >= limit {
            return;
        }
        self.split_wide_at(col);
        self.split_wide_at(limit);
        self.inflate();
        self.dirty = true;
        if let Storage::Inflated(cells) = &mut self.storage {
            let n = (n as usize).min((limit - col) as usize);
            for _ in 0..n {
                cells.remove(limit as usize - 1);
                cells.insert(col as usize, Cell::blank(fill));
            }
        }
    }

    /// Delete `n` cells at `col`, shifting left within `[col, limit)` and
    /// filling the gap at the right edge of the window.
    pub fn delete_cells(&mut self, col: u16, n: u16, limit: u16, fill: Style) {
        let limit = limit.min(self.cols);
        if col >= limit {
            return;
        }
        self.split_wide_at(col);
        self.split_wide_at(limit);
        self.inflate();
        self.dirty = true;
        if let Storage::Inflated(cells) = &mut self.storage {
            let n = (n as usize).min((limit - col) as usize);
            for _ in 0..n {
                cells.remove(col as usize);
                cells.insert(limit as usize - 1, Cell::blank(fill));
            }
        }
    }

    /// If a wide pair straddles `col`, blank both halves so shifts and
    /// region edits never leave half a character behind.
    pub(crate) fn split_wide_at(&mut self, col: u16) {
        if col == 0 || col >= self.cols {
            return;
        }
        // Peek cheaply; trivial lines hold no wide cells.
        let straddle = match &self.storage {
            Storage::Inflated(cells) if cells[col as usize].is_wide_spacer() => {
                Some(cells[col as usize - 1].style.fill())
            }
            _ => None,
        };
        if let Some(fill) = straddle {
            self.erase(col - 1, col + 1, fill);
        }
    }

    /// Grow or shrink to `cols`. Content beyond the new width is dropped;
    /// new columns are blank with the line's fill.
    pub fn set_cols(&mut self, cols: u16, fill: Style) {
        if cols == self.cols {
            return;
        }
        match &mut self.storage {
            Storage::Trivial { text, width, .. } => {
                while *width > cols {
                    text.pop();
                    *width -= 1;
                }
            }
            Storage::Inflated(cells) => {
                cells.resize(cols as usize, Cell::blank(fill));
                // Never leave a dangling wide cell at the new edge.
                if let Some(last) = cells.last() {
                    if last.is_wide() {
                        let fill = last.style.fill();
                        *cells.last_mut().unwrap() = Cell::blank(fill);
                    }
                }
            }
        }
        self.cols = cols;
        self.dirty = true;
    }

    /// Number of columns up to and including the last non-blank cell.
    pub fn occupied(&self) -> u16 {
        match &self.storage {
            Storage::Trivial { width, fill, .. } => {
                if *fill == Style::default() {
                    *width
                } else {
                    self.cols
                }
            }
            Storage::Inflated(cells) => {
                let mut occ = cells.len();
                while occ > 0 && cells[occ - 1].is_trailing_blank() {
                    occ -= 1;
                }
                occ as u16
            }
        }
    }

    /// Plain text content, spacers skipped, trailing blanks trimmed.
    pub fn to_string_trimmed(&self) -> String {
        match &self.storage {
            Storage::Trivial { text, .. } => text.trim_end().to_string(),
            Storage::Inflated(cells) => {
                let mut out = String::new();
                for cell in cells {
                    if cell.is_wide_spacer() {
                        continue;
                    }
                    cell.append_text(&mut out);
                }
                out.truncate(out.trim_end().len());
                out
            }
        }
    }

    /// Characters as displayed per column (spacers skipped), for search.
    pub fn chars(&self) -> Vec<(u16, char)> {
        match &self.storage {
            Storage::Trivial { text, .. } => text
                .chars()
                .enumerate()
                .map(|(i, c)| (i as u16, c))
                .collect(),
            Storage::Inflated(cells) => cells
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_wide_spacer())
                .map(|(i, c)| (i as u16, c.c))
                .collect(),
        }
    }

    /// Convert this line into styled spans for the render pipeline.
    /// Adjacent cells with matching rendition and hyperlink coalesce into
    /// a single span.
    pub fn to_styled_spans(&self, links: &Hyperlinks) -> Vec<StyledSpan> {
        match &self.storage {
            Storage::Trivial {
                text,
                width,
                style,
                fill,
            } => {
                let mut spans = Vec::new();
                if *width > 0 {
                    spans.push(StyledSpan::new(text, *style, None));
                }
                if *width < self.cols {
                    let pad = " ".repeat((self.cols - width) as usize);
                    spans.push(StyledSpan::new(&pad, *fill, None));
                }
                spans
            }
            Storage::Inflated(cells) => {
                let mut spans = Vec::new();
                let mut text = String::new();
                let mut cur_style = Style::default();
                let mut cur_link: Option<HyperlinkId> = None;
                let mut initialized = false;

                for cell in cells {
                    if cell.flags.contains(CellFlags::WIDE_SPACER) {
                        continue;
                    }
                    if !initialized {
                        cur_style = cell.style;
                        cur_link = cell.link;
                        initialized = true;
                    } else if cell.style != cur_style || cell.link != cur_link {
                        if !text.is_empty() {
                            let url = cur_link
                                .and_then(|id| links.uri(id))
                                .map(str::to_string);
                            spans.push(StyledSpan::new(&text, cur_style, url));
                            text.clear();
                        }
                        cur_style = cell.style;
                        cur_link = cell.link;
                    }
                    cell.append_text(&mut text);
                }

                if !text.is_empty() {
                    let url = cur_link.and_then(|id| links.uri(id)).map(str::to_string);
                    spans.push(StyledSpan::new(&text, cur_style, url));
                }
                spans
            }
        }
    }
}
