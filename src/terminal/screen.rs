use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use unicode_width::UnicodeWidthChar;

use crate::parser::{Params, Perform};
use crate::render::frame::{
    CursorOverlay, CursorShapeRender, RenderFrame, RenderedLine, SelectionOverlay, TermEvent,
};

use super::cell::{Blink, Cell, CellFlags, Style, StyleFlags, UnderlineStyle};
use super::charset::{Charsets, StandardCharset};
use super::color::{indexed_to_rgb, Color};
use super::cursor::{Cursor, CursorShape, CursorStyle};
use super::grid::{AbsPoint, Grid, Region};
use super::hyperlink::{HyperlinkId, Hyperlinks};
use super::line::{Line, LineFlags};
use super::modes::Modes;
use super::search::Search;
use super::selection::{Selection, SelectionKind};

/// Default scrollback bound for the primary screen.
pub const DEFAULT_HISTORY_LINES: usize = 10_000;

/// Upper bound on buffered DCS payloads (Sixel streams included).
const MAX_DCS_PAYLOAD: usize = 16 * 1024 * 1024;

/// Word boundary characters used for word-wise selection unless the host
/// overrides them.
const DEFAULT_WORD_DELIMITERS: &str = ",│`|:\"'()[]{}<>\t";

/// The screen: cursor, margins, tab stops, charsets, and the primary and
/// alternate grids. Implements [`Perform`] and executes every decoded
/// control function. One instance is driven by the session's I/O thread
/// under the screen lock; the renderer takes frames from the same lock.
pub struct Screen {
    grid: Grid,
    alt_grid: Grid,
    modes: Modes,
    cursor: Cursor,
    cursor_style: CursorStyle,
    charsets: Charsets,
    tab_stops: Vec<bool>,
    /// Vertical scroll region, rows `[top, bottom)`.
    scroll_top: u16,
    scroll_bottom: u16,
    /// Horizontal margins `[left, right)`, honored while DECLRMM is set.
    margin_left: u16,
    margin_right: u16,
    rows: u16,
    cols: u16,
    pixel_width: u16,
    pixel_height: u16,
    max_history: usize,

    title: String,
    title_stack: Vec<String>,
    title_changed: bool,

    hyperlinks: Hyperlinks,
    active_link: Option<HyperlinkId>,
    /// OSC 4 palette overrides.
    palette: [Option<(u8, u8, u8)>; 256],

    selection: Option<Selection>,
    word_delimiters: String,
    search: Option<Search>,

    /// Response bytes queued by reports (DSR, DA, DECRQM, ...) for the
    /// session to write back to the PTY after the current chunk.
    pending_responses: Vec<Vec<u8>>,
    pending_events: Vec<TermEvent>,
    /// Lines that moved from the page into history since the last frame.
    scrolled_off: Vec<RenderedLine>,

    frame_seq: u64,
    resize_epoch: u64,
    bell_pending: bool,

    dcs_action: Option<char>,
    dcs_intermediates: Vec<u8>,
    dcs_buffer: Vec<u8>,
    sixel_active: bool,

    /// Base cell of the most recent graphic write, for combining marks
    /// and CSI REP.
    last_cell: Option<(u16, u16)>,
    last_printed: char,
    /// Finals of sequences already logged as unhandled.
    logged_unhandled: HashSet<String>,
    /// Cursor state included in the last emitted frame, so cursor-only
    /// changes still produce one.
    last_emitted_cursor: (u16, u16, bool),
}

impl Screen {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self::with_history(rows, cols, DEFAULT_HISTORY_LINES)
    }

    pub fn with_history(rows: u16, cols: u16, max_history: usize) -> Self {
        Self {
            grid: Grid::new(rows, cols, max_history),
            alt_grid: Grid::new(rows, cols, 0),
            modes: Modes::default(),
            cursor: Cursor::new(),
            cursor_style: CursorStyle::default(),
            charsets: Charsets::default(),
            tab_stops: default_tab_stops(cols),
            scroll_top: 0,
            scroll_bottom: rows,
            margin_left: 0,
            margin_right: cols,
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
            max_history,
            title: String::new(),
            title_stack: Vec::new(),
            title_changed: false,
            hyperlinks: Hyperlinks::new(),
            active_link: None,
            palette: [None; 256],
            selection: None,
            word_delimiters: DEFAULT_WORD_DELIMITERS.to_string(),
            search: None,
            pending_responses: Vec::new(),
            pending_events: Vec::new(),
            scrolled_off: Vec::new(),
            frame_seq: 0,
            resize_epoch: 0,
            bell_pending: false,
            dcs_action: None,
            dcs_intermediates: Vec::new(),
            dcs_buffer: Vec::new(),
            sixel_active: false,
            last_cell: None,
            last_printed: ' ',
            logged_unhandled: HashSet::new(),
            last_emitted_cursor: (0, 0, true),
        }
    }

    // --- accessors ---------------------------------------------------------

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cursor_position(&self) -> (u16, u16) {
        (self.cursor.row, self.cursor.col.min(self.cols.saturating_sub(1)))
    }

    pub fn grid(&self) -> &Grid {
        self.active_grid()
    }

    pub fn primary_grid(&self) -> &Grid {
        &self.grid
    }

    pub fn hyperlinks(&self) -> &Hyperlinks {
        &self.hyperlinks
    }

    /// Visible page text, trailing blank lines trimmed.
    pub fn page_text(&self) -> String {
        self.active_grid().page_text()
    }

    pub fn line_text(&self, row: u16) -> String {
        self.active_grid().page_row(row).to_string_trimmed()
    }

    /// Drain queued report responses for the session to write to the PTY.
    pub fn take_pending_responses(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending_responses)
    }

    fn active_grid(&self) -> &Grid {
        if self.modes.alt_screen {
            &self.alt_grid
        } else {
            &self.grid
        }
    }

    fn active_grid_mut(&mut self) -> &mut Grid {
        if self.modes.alt_screen {
            &mut self.alt_grid
        } else {
            &mut self.grid
        }
    }

    fn fill_style(&self) -> Style {
        self.cursor.style.fill()
    }

    // --- margins and limits -------------------------------------------------

    fn margins_left(&self) -> u16 {
        if self.modes.left_right_margins {
            self.margin_left
        } else {
            0
        }
    }

    fn margins_right(&self) -> u16 {
        if self.modes.left_right_margins {
            self.margin_right
        } else {
            self.cols
        }
    }

    fn scroll_region(&self) -> Region {
        Region {
            top: self.scroll_top,
            bottom: self.scroll_bottom,
            left: self.margins_left(),
            right: self.margins_right(),
        }
    }

    /// Exclusive right limit for writes at the current cursor position.
    /// The autowrap-pending sentinel (col == right) is still inside the
    /// margin window.
    fn write_right(&self) -> u16 {
        let right = self.margins_right();
        if self.cursor.col <= right {
            right
        } else {
            self.cols
        }
    }

    /// Column a carriage return homes to.
    fn write_left(&self) -> u16 {
        let left = self.margins_left();
        if self.cursor.col >= left {
            left
        } else {
            0
        }
    }

    // --- selection / viewport / search -------------------------------------

    pub fn start_selection(&mut self, kind: SelectionKind, row: u16, col: u16) {
        let point = AbsPoint {
            line: self.active_grid().abs_of_viewport_row(row.min(self.rows - 1)),
            col: col.min(self.cols - 1),
        };
        self.selection = Some(Selection::new(kind, point));
    }

    pub fn extend_selection(&mut self, row: u16, col: u16) {
        let point = AbsPoint {
            line: self.active_grid().abs_of_viewport_row(row.min(self.rows - 1)),
            col: col.min(self.cols - 1),
        };
        if let Some(selection) = &mut self.selection {
            selection.extend(point);
            self.active_grid_mut().mark_all_dirty();
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.active_grid_mut().mark_all_dirty();
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn selection_text(&self) -> Option<String> {
        let selection = self.selection.as_ref()?;
        if !selection.still_valid(self.active_grid()) {
            return None;
        }
        Some(selection.to_text(self.active_grid(), &self.word_delimiters))
    }

    pub fn set_word_delimiters(&mut self, delimiters: &str) {
        self.word_delimiters = delimiters.to_string();
    }

    /// Scroll the viewport into history; positive moves toward older
    /// lines.
    pub fn scroll_display(&mut self, delta: i32) {
        self.active_grid_mut().scroll_display(delta);
    }

    pub fn reset_display_offset(&mut self) {
        self.active_grid_mut().reset_display_offset();
    }

    pub fn set_search(&mut self, pattern: &str, direction: super::search::Direction) {
        self.search = if pattern.is_empty() {
            None
        } else {
            Some(Search::new(pattern, direction))
        };
    }

    pub fn search_next(&mut self) -> Option<(AbsPoint, AbsPoint)> {
        let grid = if self.modes.alt_screen {
            &self.alt_grid
        } else {
            &self.grid
        };
        self.search.as_mut()?.next(grid)
    }

    /// Drop the selection when a write lands on one of its lines.
    fn damage_selection_row(&mut self, row: u16) {
        let abs = self.active_grid().abs_of_page_row(row);
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.intersects_line(abs))
        {
            self.selection = None;
        }
    }

    fn damage_selection_rows(&mut self, top: u16, bottom: u16) {
        if bottom <= top {
            return;
        }
        let from = self.active_grid().abs_of_page_row(top);
        let to = self.active_grid().abs_of_page_row(bottom - 1);
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.intersects_lines(from, to))
        {
            self.selection = None;
        }
    }

    // --- hyperlink accounting ----------------------------------------------

    fn release_links_in_row(&mut self, row: u16, start: u16, end: u16) {
        let links = self.active_grid().page_row(row).links_in(start, end);
        for id in links {
            self.hyperlinks.decref(id);
        }
    }

    fn release_line_links(&mut self, line: &Line) {
        for id in line.links_in(0, line.cols()) {
            self.hyperlinks.decref(id);
        }
    }

    fn release_lines(&mut self, lines: Vec<Line>) {
        for line in lines {
            self.release_line_links(&line);
        }
    }

    // --- writing -----------------------------------------------------------

    fn put_char(&mut self, c: char, width: u16) {
        let right = self.write_right();
        if self.cursor.col + width > right {
            if self.modes.autowrap {
                let row = self.cursor.row;
                self.active_grid_mut()
                    .page_row_mut(row)
                    .flags
                    .insert(LineFlags::WRAPPED);
                self.cursor.col = self.write_left();
                self.linefeed();
            } else {
                self.cursor.col = right.saturating_sub(width);
            }
        }

        let row = self.cursor.row;
        let col = self.cursor.col;
        let style = self.cursor.style;
        let link = self.active_link;
        let right = self.write_right();

        self.damage_selection_row(row);
        self.release_links_in_row(row, col, col + width);

        if self.modes.insert {
            let fill = self.fill_style();
            self.active_grid_mut()
                .page_row_mut(row)
                .insert_blanks(col, width, right, fill);
        }

        if let Some(id) = link {
            self.hyperlinks.incref(id);
        }

        let line = self.active_grid_mut().page_row_mut(row);
        if width == 1 && link.is_none() && line.try_trivial_append(col, c, style) {
            // Compact path: uniform sequential text stays trivial.
        } else {
            line.split_wide_at(col);
            line.split_wide_at(col + width);
            let cell = line.cell_mut(col);
            *cell = Cell::new(c, style);
            cell.link = link;
            if width == 2 {
                cell.flags.insert(CellFlags::WIDE);
                if col + 1 < right {
                    *line.cell_mut(col + 1) = Cell::wide_spacer(style, link);
                }
            }
        }

        self.last_cell = Some((row, col));
        self.cursor.col += width;
    }

    fn linefeed(&mut self) {
        if self.cursor.row + 1 == self.scroll_bottom {
            self.scroll_up_at_region(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    fn reverse_index(&mut self) {
        if self.cursor.row == self.scroll_top {
            self.scroll_down_at_region(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
    }

    fn scroll_up_at_region(&mut self, n: u16) {
        self.scroll_up_lines(self.scroll_region(), n);
    }

    fn scroll_down_at_region(&mut self, n: u16) {
        let region = self.scroll_region();
        let fill = self.fill_style();
        self.damage_selection_rows(region.top, region.bottom);
        if !region.is_full_width(self.cols) {
            self.release_region_links(region);
        }
        let removed = self.active_grid_mut().scroll_down(region, n, fill);
        self.release_lines(removed);
    }

    fn scroll_up_lines(&mut self, region: Region, n: u16) {
        let fill = self.fill_style();
        let whole_page = region.top == 0
            && region.bottom == self.rows
            && region.is_full_width(self.cols)
            && !self.modes.alt_screen
            && self.max_history > 0;

        if whole_page {
            // Capture the lines entering history for incremental
            // scrollback consumers.
            for i in 0..n.min(self.rows) {
                let abs = self.grid.abs_of_page_row(i);
                let line = self.grid.page_row(i);
                let rendered = RenderedLine {
                    index: 0,
                    abs,
                    spans: line.to_styled_spans(&self.hyperlinks),
                    marked: line.flags.contains(LineFlags::MARKED),
                };
                self.scrolled_off.push(rendered);
            }
        } else {
            self.damage_selection_rows(region.top, region.bottom);
            if !region.is_full_width(self.cols) {
                self.release_region_links(region);
            }
        }

        let dropped = self.active_grid_mut().scroll_up(region, n, fill);
        self.release_lines(dropped);

        if let Some(selection) = &self.selection {
            if !selection.still_valid(self.active_grid()) {
                self.selection = None;
            }
        }
    }

    fn release_region_links(&mut self, region: Region) {
        for row in region.top..region.bottom {
            self.release_links_in_row(row, region.left, region.right);
        }
    }

    // --- cursor motion ------------------------------------------------------

    fn carriage_return(&mut self) {
        self.cursor.col = self.write_left();
    }

    fn backspace(&mut self) {
        let left = self.write_left();
        if self.cursor.col > left {
            self.cursor.col -= 1;
        }
    }

    fn tab(&mut self, count: u16) {
        for _ in 0..count {
            let mut col = self.cursor.col as usize + 1;
            let limit = self.cols as usize;
            while col < limit && !self.tab_stops.get(col).copied().unwrap_or(false) {
                col += 1;
            }
            self.cursor.col = (col as u16).min(self.cols.saturating_sub(1));
        }
    }

    fn back_tab(&mut self, count: u16) {
        for _ in 0..count {
            let mut col = self.cursor.col.min(self.cols.saturating_sub(1)) as i32 - 1;
            while col > 0 && !self.tab_stops.get(col as usize).copied().unwrap_or(false) {
                col -= 1;
            }
            self.cursor.col = col.max(0) as u16;
        }
    }

    fn cursor_up(&mut self, n: u16) {
        let min_row = if self.cursor.row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(min_row);
        self.clamp_cursor_col();
    }

    fn cursor_down(&mut self, n: u16) {
        let max_row = if self.cursor.row < self.scroll_bottom {
            self.scroll_bottom.saturating_sub(1)
        } else {
            self.rows.saturating_sub(1)
        };
        self.cursor.row = (self.cursor.row.saturating_add(n)).min(max_row);
        self.clamp_cursor_col();
    }

    fn cursor_forward(&mut self, n: u16) {
        let right = self.write_right();
        self.cursor.col = (self.cursor.col.saturating_add(n)).min(right.saturating_sub(1));
    }

    fn cursor_backward(&mut self, n: u16) {
        let left = self.write_left();
        self.cursor.col = self
            .cursor
            .col
            .min(self.cols.saturating_sub(1))
            .saturating_sub(n)
            .max(left);
    }

    fn clamp_cursor_col(&mut self) {
        // Vertical motion discharges the autowrap-pending sentinel.
        self.cursor.col = self.cursor.col.min(self.cols.saturating_sub(1));
    }

    /// CUP/HVP/VPA target, honoring origin mode.
    fn move_to(&mut self, row: u16, col: u16) {
        if self.modes.origin {
            self.cursor.row =
                (self.scroll_top + row).min(self.scroll_bottom.saturating_sub(1));
            self.cursor.col =
                (self.margins_left() + col).min(self.margins_right().saturating_sub(1));
        } else {
            self.cursor.row = row.min(self.rows.saturating_sub(1));
            self.cursor.col = col.min(self.cols.saturating_sub(1));
        }
    }

    // --- erase / edit -------------------------------------------------------

    fn erase_in_row(&mut self, row: u16, start: u16, end: u16) {
        let fill = self.fill_style();
        self.damage_selection_row(row);
        self.release_links_in_row(row, start, end);
        self.active_grid_mut()
            .page_row_mut(row)
            .erase(start, end, fill);
    }

    fn erase_display(&mut self, mode: u16) {
        let (crow, ccol) = (self.cursor.row, self.cursor.col.min(self.cols.saturating_sub(1)));
        match mode {
            0 => {
                self.erase_in_row(crow, ccol, self.cols);
                for row in crow + 1..self.rows {
                    self.erase_in_row(row, 0, self.cols);
                }
            }
            1 => {
                for row in 0..crow {
                    self.erase_in_row(row, 0, self.cols);
                }
                self.erase_in_row(crow, 0, ccol + 1);
            }
            2 => {
                for row in 0..self.rows {
                    self.erase_in_row(row, 0, self.cols);
                }
            }
            3 => {
                let drained = self.active_grid_mut().clear_history();
                self.release_lines(drained);
                self.pending_events.push(TermEvent::ScrollbackCleared);
            }
            _ => {}
        }
    }

    fn erase_line(&mut self, mode: u16) {
        let (crow, ccol) = (self.cursor.row, self.cursor.col.min(self.cols.saturating_sub(1)));
        match mode {
            0 => self.erase_in_row(crow, ccol, self.cols),
            1 => self.erase_in_row(crow, 0, ccol + 1),
            2 => self.erase_in_row(crow, 0, self.cols),
            _ => {}
        }
    }

    fn insert_lines(&mut self, n: u16) {
        let region = self.scroll_region();
        if !region.contains_row(self.cursor.row)
            || (self.modes.left_right_margins
                && (self.cursor.col < region.left || self.cursor.col >= region.right))
        {
            return;
        }
        let sub = Region {
            top: self.cursor.row,
            ..region
        };
        let fill = self.fill_style();
        self.damage_selection_rows(sub.top, sub.bottom);
        if !sub.is_full_width(self.cols) {
            self.release_region_links(sub);
        }
        let removed = self.active_grid_mut().scroll_down(sub, n, fill);
        self.release_lines(removed);
        self.cursor.col = self.write_left();
    }

    fn delete_lines(&mut self, n: u16) {
        let region = self.scroll_region();
        if !region.contains_row(self.cursor.row)
            || (self.modes.left_right_margins
                && (self.cursor.col < region.left || self.cursor.col >= region.right))
        {
            return;
        }
        let sub = Region {
            top: self.cursor.row,
            ..region
        };
        let fill = self.fill_style();
        self.damage_selection_rows(sub.top, sub.bottom);
        if !sub.is_full_width(self.cols) {
            self.release_region_links(sub);
        }
        let removed = self.active_grid_mut().scroll_up(sub, n, fill);
        self.release_lines(removed);
        self.cursor.col = self.write_left();
    }

    fn insert_chars(&mut self, n: u16) {
        let row = self.cursor.row;
        let col = self.cursor.col.min(self.cols.saturating_sub(1));
        let right = self.write_right();
        let fill = self.fill_style();
        self.damage_selection_row(row);
        self.release_links_in_row(row, right.saturating_sub(n).max(col), right);
        self.active_grid_mut()
            .page_row_mut(row)
            .insert_blanks(col, n, right, fill);
    }

    fn delete_chars(&mut self, n: u16) {
        let row = self.cursor.row;
        let col = self.cursor.col.min(self.cols.saturating_sub(1));
        let right = self.write_right();
        let fill = self.fill_style();
        self.damage_selection_row(row);
        self.release_links_in_row(row, col, (col + n).min(right));
        self.active_grid_mut()
            .page_row_mut(row)
            .delete_cells(col, n, right, fill);
    }

    fn erase_chars(&mut self, n: u16) {
        let row = self.cursor.row;
        let col = self.cursor.col.min(self.cols.saturating_sub(1));
        let end = (col.saturating_add(n)).min(self.cols);
        self.erase_in_row(row, col, end);
    }

    fn repeat_last(&mut self, count: u16) {
        let c = self.last_printed;
        let width = UnicodeWidthChar::width(c).unwrap_or(1).max(1) as u16;
        for _ in 0..count.min(self.cols.saturating_mul(4)) {
            self.put_char(c, width);
        }
    }

    /// DECALN: fill the page with 'E' and reset margins.
    fn alignment_test(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows;
        self.margin_left = 0;
        self.margin_right = self.cols;
        self.selection = None;
        for row in 0..self.rows {
            self.release_links_in_row(row, 0, self.cols);
            let cols = self.cols;
            let line = self.active_grid_mut().page_row_mut(row);
            line.reset(Style::default());
            for col in 0..cols {
                *line.cell_mut(col) = Cell::new('E', Style::default());
            }
        }
        self.cursor.row = 0;
        self.cursor.col = 0;
    }

    // --- screens ------------------------------------------------------------

    // Mode 1047/1049 clear the alternate buffer on entry; bare mode 47
    // re-enters whatever it held before.
    fn enter_alt_screen(&mut self, clear: bool) {
        if self.modes.alt_screen {
            return;
        }
        self.modes.alt_screen = true;
        self.selection = None;
        if clear {
            self.release_alt_links();
            self.alt_grid = Grid::new(self.rows, self.cols, 0);
        } else {
            if self.alt_grid.screen_rows() != self.rows || self.alt_grid.cols() != self.cols {
                let (_, dropped) = self.alt_grid.resize(self.rows, self.cols, (0, 0), false);
                self.release_lines(dropped);
            }
            self.alt_grid.mark_all_dirty();
        }
        self.pending_events.push(TermEvent::AltScreenEntered);
    }

    fn exit_alt_screen(&mut self) {
        if !self.modes.alt_screen {
            return;
        }
        // The alternate buffer keeps its content (and its hyperlink
        // references) so mode 47 can re-enter it; references drop when
        // the buffer is cleared or resized away.
        self.modes.alt_screen = false;
        self.selection = None;
        self.grid.mark_all_dirty();
        self.pending_events.push(TermEvent::AltScreenExited);
    }

    /// Drop the hyperlink references held by alternate-screen cells;
    /// called before the alternate grid is discarded.
    fn release_alt_links(&mut self) {
        for row in 0..self.alt_grid.screen_rows() {
            let links = self
                .alt_grid
                .page_row(row)
                .links_in(0, self.alt_grid.cols());
            for id in links {
                self.hyperlinks.decref(id);
            }
        }
    }

    fn clear_screen(&mut self) {
        for row in 0..self.rows {
            self.erase_in_row(row, 0, self.cols);
        }
        self.cursor.row = if self.modes.origin { self.scroll_top } else { 0 };
        self.cursor.col = self.write_left();
    }

    /// RIS: reset to initial state. Keeps identity counters so frames
    /// stay ordered for the renderer.
    fn full_reset(&mut self) {
        let was_alt = self.modes.alt_screen;
        let mut fresh = Screen::with_history(self.rows, self.cols, self.max_history);
        fresh.pixel_width = self.pixel_width;
        fresh.pixel_height = self.pixel_height;
        fresh.frame_seq = self.frame_seq;
        fresh.resize_epoch = self.resize_epoch;
        fresh.word_delimiters = std::mem::take(&mut self.word_delimiters);
        *self = fresh;
        self.grid.mark_all_dirty();
        if was_alt {
            self.pending_events.push(TermEvent::AltScreenExited);
        }
    }

    /// DECSTR: soft reset.
    fn soft_reset(&mut self) {
        self.cursor_style = CursorStyle::default();
        self.cursor.style = Style::default();
        self.modes.origin = false;
        self.modes.insert = false;
        self.modes.autowrap = true;
        self.modes.left_right_margins = false;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows;
        self.margin_left = 0;
        self.margin_right = self.cols;
        self.charsets = Charsets::default();
        self.active_link = None;
    }

    // --- resize -------------------------------------------------------------

    /// Resize both screens. Pixel dimensions feed the CSI 14/18 t text
    /// sizing reports.
    pub fn resize(&mut self, rows: u16, cols: u16, pixel_width: u16, pixel_height: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        if rows == self.rows && cols == self.cols {
            self.pixel_width = pixel_width;
            self.pixel_height = pixel_height;
            return;
        }

        // Selections reference a layout that no longer exists after a
        // reflow; drop them rather than track torn ranges.
        self.selection = None;
        self.search = None;

        let cursor = (self.cursor.row, self.cursor.col);
        let ((crow, ccol), dropped) = self.grid.resize(rows, cols, cursor, true);
        self.release_lines(dropped);

        // The alternate screen never reflows: full-screen applications
        // repaint from scratch on resize.
        self.release_alt_links();
        self.alt_grid = Grid::new(rows, cols, 0);

        if self.modes.alt_screen {
            self.cursor.row = self.cursor.row.min(rows - 1);
            self.cursor.col = self.cursor.col.min(cols - 1);
        } else {
            self.cursor.row = crow;
            self.cursor.col = ccol;
        }

        // Tab stops persist; columns beyond the old width pick up the
        // default every-8 stops.
        let old_cols = self.cols;
        self.tab_stops.resize(cols as usize, false);
        for col in old_cols..cols {
            if col % 8 == 0 {
                self.tab_stops[col as usize] = true;
            }
        }

        self.rows = rows;
        self.cols = cols;
        self.pixel_width = pixel_width;
        self.pixel_height = pixel_height;
        self.scroll_top = 0;
        self.scroll_bottom = rows;
        self.margin_left = 0;
        self.margin_right = cols;
        self.resize_epoch = self.resize_epoch.saturating_add(1);
        self.grid.mark_all_dirty();
        self.alt_grid.mark_all_dirty();
    }

    // --- SGR ----------------------------------------------------------------

    fn handle_sgr(&mut self, params: &Params) {
        let groups: Vec<&[u16]> = params.iter().collect();
        if groups.is_empty() {
            self.cursor.style = Style::default();
            return;
        }

        let mut i = 0;
        while i < groups.len() {
            let g = groups[i];
            match g[0] {
                0 => self.cursor.style = Style::default(),
                1 => self.cursor.style.flags.insert(StyleFlags::BOLD),
                2 => self.cursor.style.flags.insert(StyleFlags::FAINT),
                3 => self.cursor.style.flags.insert(StyleFlags::ITALIC),
                4 => {
                    self.cursor.style.underline = match g.get(1).copied() {
                        Some(0) => UnderlineStyle::None,
                        Some(2) => UnderlineStyle::Double,
                        Some(3) => UnderlineStyle::Curly,
                        Some(4) => UnderlineStyle::Dotted,
                        Some(5) => UnderlineStyle::Dashed,
                        _ => UnderlineStyle::Single,
                    };
                }
                5 => self.cursor.style.blink = Blink::Slow,
                6 => self.cursor.style.blink = Blink::Rapid,
                7 => self.cursor.style.flags.insert(StyleFlags::INVERSE),
                8 => self.cursor.style.flags.insert(StyleFlags::HIDDEN),
                9 => self.cursor.style.flags.insert(StyleFlags::STRIKETHROUGH),
                21 => self.cursor.style.underline = UnderlineStyle::Double,
                22 => self
                    .cursor
                    .style
                    .flags
                    .remove(StyleFlags::BOLD | StyleFlags::FAINT),
                23 => self.cursor.style.flags.remove(StyleFlags::ITALIC),
                24 => self.cursor.style.underline = UnderlineStyle::None,
                25 => self.cursor.style.blink = Blink::None,
                27 => self.cursor.style.flags.remove(StyleFlags::INVERSE),
                28 => self.cursor.style.flags.remove(StyleFlags::HIDDEN),
                29 => self.cursor.style.flags.remove(StyleFlags::STRIKETHROUGH),
                30..=37 => self.cursor.style.fg = Color::Indexed(g[0] as u8 - 30),
                38 => match extended_color(&groups, &mut i) {
                    Some(color) => self.cursor.style.fg = color,
                    None => break,
                },
                39 => self.cursor.style.fg = Color::Default,
                40..=47 => self.cursor.style.bg = Color::Indexed(g[0] as u8 - 40),
                48 => match extended_color(&groups, &mut i) {
                    Some(color) => self.cursor.style.bg = color,
                    None => break,
                },
                49 => self.cursor.style.bg = Color::Default,
                53 => self.cursor.style.flags.insert(StyleFlags::OVERLINE),
                55 => self.cursor.style.flags.remove(StyleFlags::OVERLINE),
                58 => match extended_color(&groups, &mut i) {
                    Some(color) => self.cursor.style.underline_color = color,
                    None => break,
                },
                59 => self.cursor.style.underline_color = Color::Default,
                90..=97 => self.cursor.style.fg = Color::Indexed(g[0] as u8 - 90 + 8),
                100..=107 => self.cursor.style.bg = Color::Indexed(g[0] as u8 - 100 + 8),
                _ => {}
            }
            i += 1;
        }
    }

    // --- modes --------------------------------------------------------------

    fn input_modes_changed(&mut self) {
        self.pending_events.push(TermEvent::InputModesChanged);
    }

    fn set_dec_mode(&mut self, params: &Params, enable: bool) {
        for group in params.iter() {
            match group[0] {
                1 => {
                    self.modes.cursor_keys_application = enable;
                    self.input_modes_changed();
                }
                3 => {
                    self.modes.column_132 = enable;
                    self.clear_screen();
                    self.scroll_top = 0;
                    self.scroll_bottom = self.rows;
                    self.margin_left = 0;
                    self.margin_right = self.cols;
                    self.pending_events.push(TermEvent::ColumnsRequested {
                        cols: if enable { 132 } else { 80 },
                    });
                }
                5 => {
                    if self.modes.reverse_video != enable {
                        self.modes.reverse_video = enable;
                        self.active_grid_mut().mark_all_dirty();
                    }
                }
                6 => {
                    self.modes.origin = enable;
                    self.cursor.row = if enable { self.scroll_top } else { 0 };
                    self.cursor.col = if enable { self.margins_left() } else { 0 };
                }
                7 => self.modes.autowrap = enable,
                9 => {
                    self.modes.x10_mouse = enable;
                    self.input_modes_changed();
                }
                12 => self.cursor_style.set_blinking(enable),
                25 => self.cursor_style.set_visible(enable),
                66 => {
                    self.modes.keypad_application = enable;
                    self.input_modes_changed();
                }
                69 => {
                    self.modes.left_right_margins = enable;
                    if !enable {
                        self.margin_left = 0;
                        self.margin_right = self.cols;
                    }
                }
                47 => {
                    if enable {
                        self.enter_alt_screen(false);
                    } else {
                        self.exit_alt_screen();
                    }
                }
                1000 => {
                    self.modes.mouse_click = enable;
                    self.input_modes_changed();
                }
                1002 => {
                    self.modes.mouse_motion = enable;
                    self.input_modes_changed();
                }
                1003 => {
                    self.modes.mouse_all_motion = enable;
                    self.input_modes_changed();
                }
                1004 => {
                    self.modes.focus_events = enable;
                    self.input_modes_changed();
                }
                1005 => {
                    self.modes.utf8_mouse = enable;
                    self.input_modes_changed();
                }
                1006 => {
                    self.modes.sgr_mouse = enable;
                    self.input_modes_changed();
                }
                1007 => {
                    self.modes.alternate_scroll = enable;
                    self.input_modes_changed();
                }
                1015 => {
                    self.modes.urxvt_mouse = enable;
                    self.input_modes_changed();
                }
                1047 => {
                    if enable {
                        self.enter_alt_screen(true);
                    } else {
                        self.exit_alt_screen();
                    }
                }
                1048 => {
                    if enable {
                        self.cursor.save(self.modes.origin, &self.charsets);
                    } else {
                        let (origin, charsets) = self.cursor.restore();
                        self.modes.origin = origin;
                        self.charsets = charsets;
                        self.clamp_cursor();
                    }
                }
                1049 => {
                    if enable {
                        self.cursor.save(self.modes.origin, &self.charsets);
                        self.enter_alt_screen(true);
                        self.cursor.row = 0;
                        self.cursor.col = 0;
                    } else {
                        self.exit_alt_screen();
                        let (origin, charsets) = self.cursor.restore();
                        self.modes.origin = origin;
                        self.charsets = charsets;
                        self.clamp_cursor();
                    }
                }
                2004 => {
                    self.modes.bracketed_paste = enable;
                    self.input_modes_changed();
                }
                2026 => self.modes.synchronized_output = enable,
                other => self.log_unhandled(format!("DECSET/DECRST ?{other}")),
            }
        }
    }

    fn set_ansi_mode(&mut self, params: &Params, enable: bool) {
        for group in params.iter() {
            match group[0] {
                4 => self.modes.insert = enable,
                20 => self.modes.linefeed_newline = enable,
                other => self.log_unhandled(format!("SM/RM {other}")),
            }
        }
    }

    fn report_mode(&mut self, mode: u16, dec_private: bool) {
        let status = if dec_private {
            self.modes.dec_mode_status(
                mode,
                self.cursor_style.visible(),
                self.cursor_style.blinking(),
                self.cursor.is_saved(),
            )
        } else {
            self.modes.ansi_mode_status(mode)
        };
        let prefix = if dec_private { "?" } else { "" };
        let response = format!("\x1b[{}{};{}$y", prefix, mode, status.code());
        self.pending_responses.push(response.into_bytes());
    }

    // --- reports ------------------------------------------------------------

    fn device_status(&mut self, params: &Params, dec_private: bool) {
        match params.get_raw(0) {
            5 => self.pending_responses.push(b"\x1b[0n".to_vec()),
            6 => {
                let row = if self.modes.origin {
                    self.cursor.row.saturating_sub(self.scroll_top)
                } else {
                    self.cursor.row
                };
                let col = self.cursor.col.min(self.cols.saturating_sub(1));
                let response = if dec_private {
                    format!("\x1b[?{};{}R", row + 1, col + 1)
                } else {
                    format!("\x1b[{};{}R", row + 1, col + 1)
                };
                self.pending_responses.push(response.into_bytes());
            }
            _ => {}
        }
    }

    fn window_op(&mut self, params: &Params) {
        match params.get_raw(0) {
            14 => {
                let response =
                    format!("\x1b[4;{};{}t", self.pixel_height, self.pixel_width);
                self.pending_responses.push(response.into_bytes());
            }
            18 => {
                let response = format!("\x1b[8;{};{}t", self.rows, self.cols);
                self.pending_responses.push(response.into_bytes());
            }
            22 => {
                self.title_stack.push(self.title.clone());
                // A deep stack means an application pushing without
                // popping; bound it.
                if self.title_stack.len() > 16 {
                    self.title_stack.remove(0);
                }
            }
            23 => {
                if let Some(title) = self.title_stack.pop() {
                    self.title = title;
                    self.title_changed = true;
                }
            }
            other => self.log_unhandled(format!("window op {other}")),
        }
    }

    // --- OSC ----------------------------------------------------------------

    fn handle_osc(&mut self, params: &[&[u8]]) {
        if params.is_empty() {
            return;
        }
        let code = std::str::from_utf8(params[0]).unwrap_or("");

        match code {
            "0" | "2" => {
                if params.len() >= 2 {
                    self.title = String::from_utf8_lossy(params[1]).to_string();
                    self.title_changed = true;
                }
            }
            "1" => {} // icon name only
            "4" => self.osc_color(params),
            "8" => self.osc_hyperlink(params),
            "9" => {
                if params.len() >= 2 {
                    let body = params[1..]
                        .iter()
                        .map(|p| String::from_utf8_lossy(p))
                        .collect::<Vec<_>>()
                        .join(";");
                    self.pending_events.push(TermEvent::Notification { body });
                }
            }
            "10" | "11" | "12" => {
                if params.len() >= 2 && params[1] == b"?" {
                    let (r, g, b): (u8, u8, u8) = match code {
                        "10" => (0xe5, 0xe5, 0xe5),
                        "11" => (0x00, 0x00, 0x00),
                        _ => (0xe5, 0xe5, 0xe5),
                    };
                    let response = format!(
                        "\x1b]{};rgb:{:04x}/{:04x}/{:04x}\x1b\\",
                        code,
                        r as u16 * 0x0101,
                        g as u16 * 0x0101,
                        b as u16 * 0x0101
                    );
                    self.pending_responses.push(response.into_bytes());
                }
            }
            "52" => self.osc_clipboard(params),
            "104" => {
                if params.len() < 2 || params[1].is_empty() {
                    self.palette = [None; 256];
                } else {
                    for p in &params[1..] {
                        if let Ok(idx) = std::str::from_utf8(p).unwrap_or("").parse::<u8>() {
                            self.palette[idx as usize] = None;
                        }
                    }
                }
            }
            "110" | "111" | "112" => {}
            "133" => self.osc_prompt_mark(params),
            other => self.log_unhandled(format!("OSC {other}")),
        }
    }

    fn osc_color(&mut self, params: &[&[u8]]) {
        // OSC 4 ; index ; spec [; index ; spec ...]
        let mut i = 1;
        while i + 1 < params.len() {
            let index = std::str::from_utf8(params[i]).ok().and_then(|s| s.parse::<u8>().ok());
            let spec = params[i + 1];
            if let Some(index) = index {
                if spec == b"?" {
                    let (r, g, b) = self.palette[index as usize]
                        .unwrap_or_else(|| indexed_to_rgb(index));
                    let response = format!(
                        "\x1b]4;{};rgb:{:04x}/{:04x}/{:04x}\x1b\\",
                        index,
                        r as u16 * 0x0101,
                        g as u16 * 0x0101,
                        b as u16 * 0x0101
                    );
                    self.pending_responses.push(response.into_bytes());
                } else if let Some(rgb) = parse_color_spec(spec) {
                    self.palette[index as usize] = Some(rgb);
                }
            }
            i += 2;
        }
    }

    fn osc_hyperlink(&mut self, params: &[&[u8]]) {
        // OSC 8 ; params ; URI — an empty URI closes the link. URIs may
        // contain `;`, so everything past the second separator is URI.
        let uri = if params.len() >= 3 {
            params[2..]
                .iter()
                .map(|p| String::from_utf8_lossy(p))
                .collect::<Vec<_>>()
                .join(";")
        } else {
            String::new()
        };

        if let Some(old) = self.active_link.take() {
            self.hyperlinks.decref(old);
        }
        if !uri.is_empty() {
            let id_param = params
                .get(1)
                .map(|p| String::from_utf8_lossy(p).to_string())
                .unwrap_or_default();
            let id_key = id_param
                .split(':')
                .find_map(|kv| kv.strip_prefix("id="))
                .unwrap_or("");
            self.active_link = Some(self.hyperlinks.open(id_key, &uri));
        }
    }

    fn osc_clipboard(&mut self, params: &[&[u8]]) {
        // OSC 52 ; Pc ; Pd
        if params.len() < 3 {
            return;
        }
        let selection = std::str::from_utf8(params[1]).unwrap_or("c").to_string();
        let payload = params[2];

        if payload == b"?" {
            // The core holds no clipboard; answer with an empty payload
            // so querying applications terminate cleanly.
            let response = format!("\x1b]52;{};\x1b\\", selection);
            self.pending_responses.push(response.into_bytes());
            return;
        }
        if let Ok(decoded) = BASE64_STANDARD.decode(payload) {
            let text = String::from_utf8_lossy(&decoded).to_string();
            self.pending_events
                .push(TermEvent::ClipboardWrite { selection, text });
        }
    }

    fn osc_prompt_mark(&mut self, params: &[&[u8]]) {
        if params.len() < 2 {
            return;
        }
        let marker = std::str::from_utf8(params[1]).unwrap_or("");
        let row = self.cursor.row;
        let abs = self.active_grid().abs_of_page_row(row);
        match marker {
            "A" => {
                self.active_grid_mut()
                    .page_row_mut(row)
                    .flags
                    .insert(LineFlags::MARKED);
                self.pending_events.push(TermEvent::PromptMark { abs });
            }
            "D" => {
                let exit_code = params
                    .get(2)
                    .and_then(|p| std::str::from_utf8(p).ok())
                    .and_then(|s| s.parse::<i32>().ok())
                    .unwrap_or(0);
                self.pending_events
                    .push(TermEvent::CommandCompleted { exit_code, abs });
            }
            _ => {}
        }
    }

    // --- DCS ----------------------------------------------------------------

    fn handle_dcs(&mut self, action: Option<char>, intermediates: &[u8], data: &[u8]) {
        match (action, intermediates) {
            // DECRQSS: DCS $ q Pt ST
            (Some('q'), [b'$']) => self.handle_decrqss(data),
            // XTGETTCAP: DCS + q Pt ST
            (Some('q'), [b'+']) => self.handle_xtgettcap(data),
            // ReGIS: accepted and discarded.
            (Some('p'), []) => {}
            _ => self.log_unhandled(format!(
                "DCS {:?} {:?}",
                intermediates,
                action.unwrap_or(' ')
            )),
        }
    }

    fn handle_decrqss(&mut self, data: &[u8]) {
        let query = String::from_utf8_lossy(data).to_string();
        let status = match query.as_str() {
            "m" => Some(self.sgr_report()),
            " q" => {
                let shape = match (self.cursor_style.shape, self.cursor_style.blinking()) {
                    (CursorShape::Block, true) => 1,
                    (CursorShape::Block, false) => 2,
                    (CursorShape::Underline, true) => 3,
                    (CursorShape::Underline, false) => 4,
                    (CursorShape::Bar, true) => 5,
                    (CursorShape::Bar, false) => 6,
                };
                Some(format!("{} q", shape))
            }
            "r" => Some(format!("{};{}r", self.scroll_top + 1, self.scroll_bottom)),
            "s" => Some(format!("{};{}s", self.margin_left + 1, self.margin_right)),
            _ => None,
        };

        let response = match status {
            Some(pt) => format!("\x1bP1$r{}\x1b\\", pt),
            None => "\x1bP0$r\x1b\\".to_string(),
        };
        self.pending_responses.push(response.into_bytes());
    }

    /// Current SGR state rendered as a parameter string for DECRQSS.
    fn sgr_report(&self) -> String {
        let style = &self.cursor.style;
        let mut parts = vec!["0".to_string()];
        if style.flags.contains(StyleFlags::BOLD) {
            parts.push("1".into());
        }
        if style.flags.contains(StyleFlags::FAINT) {
            parts.push("2".into());
        }
        if style.flags.contains(StyleFlags::ITALIC) {
            parts.push("3".into());
        }
        if style.underline != UnderlineStyle::None {
            parts.push("4".into());
        }
        if style.blink != Blink::None {
            parts.push("5".into());
        }
        if style.flags.contains(StyleFlags::INVERSE) {
            parts.push("7".into());
        }
        match style.fg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => parts.push(format!("{}", 30 + i)),
            Color::Indexed(i) if i < 16 => parts.push(format!("{}", 90 + i - 8)),
            Color::Indexed(i) => parts.push(format!("38:5:{i}")),
            Color::Rgb(r, g, b) => parts.push(format!("38:2::{r}:{g}:{b}")),
        }
        match style.bg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => parts.push(format!("{}", 40 + i)),
            Color::Indexed(i) if i < 16 => parts.push(format!("{}", 100 + i - 8)),
            Color::Indexed(i) => parts.push(format!("48:5:{i}")),
            Color::Rgb(r, g, b) => parts.push(format!("48:2::{r}:{g}:{b}")),
        }
        format!("{}m", parts.join(";"))
    }

    fn handle_xtgettcap(&mut self, data: &[u8]) {
        let raw = String::from_utf8_lossy(data);
        let mut pairs: Vec<String> = Vec::new();
        for item in raw.split(';') {
            if item.is_empty() {
                continue;
            }
            let Some(name) = decode_hex_ascii(item) else {
                self.pending_responses.push(b"\x1bP0+r\x1b\\".to_vec());
                return;
            };
            let Some(value) = tcap_capability_value(&name) else {
                self.pending_responses.push(b"\x1bP0+r\x1b\\".to_vec());
                return;
            };
            pairs.push(format!(
                "{}={}",
                encode_hex_ascii(&name),
                encode_hex_ascii(value)
            ));
        }

        if pairs.is_empty() {
            self.pending_responses.push(b"\x1bP0+r\x1b\\".to_vec());
            return;
        }
        let response = format!("\x1bP1+r{}\x1b\\", pairs.join(";"));
        self.pending_responses.push(response.into_bytes());
    }

    // --- frame assembly -----------------------------------------------------

    /// Assemble a render frame if anything changed since the last one.
    /// Called under the screen lock; the returned frame is immutable.
    pub fn take_render_frame(&mut self) -> Option<RenderFrame> {
        let cursor_overlay = self.cursor_overlay();
        let cursor_state = (
            cursor_overlay.row,
            cursor_overlay.col,
            cursor_overlay.visible && cursor_overlay.on,
        );

        let grid = if self.modes.alt_screen {
            &mut self.alt_grid
        } else {
            &mut self.grid
        };

        let mut dirty_indexes = Vec::new();
        for row in 0..grid.screen_rows() {
            let idx = grid.viewport_index(row);
            if grid.line_dirty(idx) {
                dirty_indexes.push((row, idx));
            }
        }

        let scrolled_lines = std::mem::take(&mut self.scrolled_off);
        let mut events = std::mem::take(&mut self.pending_events);
        if self.title_changed {
            events.push(TermEvent::TitleChanged {
                title: self.title.clone(),
            });
            self.title_changed = false;
        }
        if self.bell_pending {
            events.push(TermEvent::Bell);
            self.bell_pending = false;
        }

        if dirty_indexes.is_empty()
            && events.is_empty()
            && scrolled_lines.is_empty()
            && cursor_state == self.last_emitted_cursor
        {
            return None;
        }

        let grid = if self.modes.alt_screen {
            &self.alt_grid
        } else {
            &self.grid
        };
        let mut lines = Vec::with_capacity(dirty_indexes.len());
        for &(row, idx) in &dirty_indexes {
            let line = grid.viewport_line(row);
            lines.push(RenderedLine {
                index: row,
                abs: grid.abs_of_viewport_row(row),
                spans: line.to_styled_spans(&self.hyperlinks),
                marked: line.flags.contains(LineFlags::MARKED),
            });
        }
        let selection = self.selection_overlay();
        let viewport_base = grid.abs_of_viewport_row(0);
        let display_offset = grid.display_offset();

        let grid = if self.modes.alt_screen {
            &mut self.alt_grid
        } else {
            &mut self.grid
        };
        for &(_, idx) in &dirty_indexes {
            grid.clear_line_dirty(idx);
        }

        self.frame_seq = self.frame_seq.saturating_add(1);
        self.last_emitted_cursor = cursor_state;

        Some(RenderFrame {
            frame_seq: self.frame_seq,
            resize_epoch: self.resize_epoch,
            lines,
            scrolled_lines,
            viewport_base,
            display_offset,
            rows: self.rows,
            cols: self.cols,
            cursor: cursor_overlay,
            selection,
            reverse_video: self.modes.reverse_video,
            synchronized: self.modes.synchronized_output,
            events,
        })
    }

    fn cursor_overlay(&self) -> CursorOverlay {
        let offset = self.active_grid().display_offset() as u32;
        let viewport_row = self.cursor.row as u32 + offset;
        let on_screen = viewport_row < self.rows as u32;
        CursorOverlay {
            row: viewport_row.min(self.rows.saturating_sub(1) as u32) as u16,
            col: self.cursor.col.min(self.cols.saturating_sub(1)),
            visible: self.cursor_style.visible() && on_screen,
            on: self.cursor_style.phase_on(),
            shape: match self.cursor_style.shape {
                CursorShape::Block => CursorShapeRender::Block,
                CursorShape::Underline => CursorShapeRender::Underline,
                CursorShape::Bar => CursorShapeRender::Bar,
            },
        }
    }

    fn selection_overlay(&self) -> Option<SelectionOverlay> {
        let selection = self.selection.as_ref()?;
        let grid = self.active_grid();
        if !selection.still_valid(grid) {
            return None;
        }
        let mut rows = Vec::new();
        for row in 0..self.rows {
            let abs = grid.abs_of_viewport_row(row);
            if let Some((from, to)) = selection.columns_on_line(grid, abs, &self.word_delimiters)
            {
                rows.push((row, from, to));
            }
        }
        if rows.is_empty() {
            None
        } else {
            Some(SelectionOverlay { rows })
        }
    }

    /// Advance the cursor blink phase (host blink timer).
    pub fn tick_cursor_blink(&mut self) -> bool {
        self.cursor_style.tick()
    }

    // --- misc ---------------------------------------------------------------

    fn clamp_cursor(&mut self) {
        self.cursor.row = self.cursor.row.min(self.rows.saturating_sub(1));
        self.cursor.col = self.cursor.col.min(self.cols.saturating_sub(1));
    }

    fn log_unhandled(&mut self, what: String) {
        if self.logged_unhandled.len() < 64 && self.logged_unhandled.insert(what.clone()) {
            tracing::debug!("unhandled sequence: {what}");
        }
    }
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        let c = self.charsets.map(c);
        let width = UnicodeWidthChar::width(c).unwrap_or(0) as u16;

        if width == 0 {
            // Combining mark: attach to the preceding base cell.
            if let Some((row, col)) = self.last_cell {
                if row < self.rows && col < self.cols {
                    self.active_grid_mut()
                        .page_row_mut(row)
                        .cell_mut(col)
                        .push_zerowidth(c);
                }
            }
            return;
        }

        self.put_char(c, width.min(2));
        self.last_printed = c;
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.bell_pending = true,
            0x08 => self.backspace(),
            0x09 => self.tab(1),
            0x0A | 0x0B | 0x0C => {
                self.linefeed();
                if self.modes.linefeed_newline {
                    self.carriage_return();
                }
            }
            0x0D => self.carriage_return(),
            0x0E => self.charsets.invoke_gl(1),
            0x0F => self.charsets.invoke_gl(0),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let private = intermediates.contains(&b'?');
        let gt = intermediates.contains(&b'>');
        let dollar = intermediates.contains(&b'$');
        let space = intermediates.contains(&b' ');
        let bang = intermediates.contains(&b'!');

        // DECRQM mode reports.
        if action == 'p' && dollar {
            for group in params.iter() {
                self.report_mode(group[0], private);
            }
            return;
        }
        // DECSTR soft reset.
        if action == 'p' && bang {
            self.soft_reset();
            return;
        }
        // Secondary device attributes.
        if action == 'c' && gt {
            if params.get_raw(0) == 0 {
                self.pending_responses.push(b"\x1b[>0;10;0c".to_vec());
            }
            return;
        }
        // XTMODKEYS.
        if action == 'm' && gt {
            if params.get_raw(0) == 4 {
                self.modes.modify_other_keys = params.get_raw(1).min(2) as u8;
                self.input_modes_changed();
            }
            return;
        }
        // DECSCUSR.
        if action == 'q' && space {
            self.cursor_style.select(params.get_raw(0));
            return;
        }

        match (action, private) {
            ('A', false) => {
                self.cursor_up(params.get_or(0, 1));
            }
            ('B', false) | ('e', false) => {
                self.cursor_down(params.get_or(0, 1));
            }
            ('C', false) | ('a', false) => {
                self.cursor_forward(params.get_or(0, 1));
            }
            ('D', false) => {
                self.cursor_backward(params.get_or(0, 1));
            }
            ('E', false) => {
                self.cursor_down(params.get_or(0, 1));
                self.cursor.col = self.write_left();
            }
            ('F', false) => {
                self.cursor_up(params.get_or(0, 1));
                self.cursor.col = self.write_left();
            }
            ('G', false) | ('`', false) => {
                let col = params.get_or(0, 1) - 1;
                self.cursor.col = col.min(self.cols.saturating_sub(1));
            }
            ('H', false) | ('f', false) => {
                let row = params.get_or(0, 1) - 1;
                let col = params.get_or(1, 1) - 1;
                self.move_to(row, col);
            }
            ('I', false) => self.tab(params.get_or(0, 1)),
            ('J', false) => self.erase_display(params.get_raw(0)),
            ('K', false) => self.erase_line(params.get_raw(0)),
            ('L', false) => self.insert_lines(params.get_or(0, 1)),
            ('M', false) => self.delete_lines(params.get_or(0, 1)),
            ('P', false) => self.delete_chars(params.get_or(0, 1)),
            ('S', false) => self.scroll_up_at_region(params.get_or(0, 1)),
            ('T', false) => self.scroll_down_at_region(params.get_or(0, 1)),
            ('X', false) => self.erase_chars(params.get_or(0, 1)),
            ('Z', false) => self.back_tab(params.get_or(0, 1)),
            ('@', false) => self.insert_chars(params.get_or(0, 1)),
            ('b', false) => self.repeat_last(params.get_or(0, 1)),
            ('d', false) => {
                let row = params.get_or(0, 1) - 1;
                let col = self.cursor.col.min(self.cols.saturating_sub(1));
                self.move_to(row, if self.modes.origin { col.saturating_sub(self.margins_left()) } else { col });
            }
            ('g', false) => match params.get_raw(0) {
                0 => {
                    let col = self.cursor.col.min(self.cols.saturating_sub(1)) as usize;
                    if let Some(stop) = self.tab_stops.get_mut(col) {
                        *stop = false;
                    }
                }
                3 => self.tab_stops.iter_mut().for_each(|stop| *stop = false),
                _ => {}
            },
            ('h', true) => self.set_dec_mode(params, true),
            ('l', true) => self.set_dec_mode(params, false),
            ('h', false) => self.set_ansi_mode(params, true),
            ('l', false) => self.set_ansi_mode(params, false),
            ('m', false) => self.handle_sgr(params),
            ('n', _) => self.device_status(params, private),
            ('c', false) => {
                if params.get_raw(0) == 0 {
                    self.pending_responses.push(b"\x1b[?62;22c".to_vec());
                }
            }
            ('r', false) => {
                let top = params.get_or(0, 1) - 1;
                let bottom = params.get_or(1, self.rows);
                if top + 1 < bottom && bottom <= self.rows {
                    self.scroll_top = top;
                    self.scroll_bottom = bottom;
                    self.move_to(0, 0);
                }
            }
            ('s', false) => {
                if self.modes.left_right_margins {
                    // DECSLRM.
                    let left = params.get_or(0, 1) - 1;
                    let right = params.get_or(1, self.cols);
                    if left + 1 < right && right <= self.cols {
                        self.margin_left = left;
                        self.margin_right = right;
                        self.move_to(0, 0);
                    }
                } else {
                    self.cursor.save(self.modes.origin, &self.charsets);
                }
            }
            ('u', false) => {
                let (origin, charsets) = self.cursor.restore();
                self.modes.origin = origin;
                self.charsets = charsets;
                self.clamp_cursor();
            }
            ('t', false) => self.window_op(params),
            (other, _) => self.log_unhandled(format!("CSI {}{}", if private { "?" } else { "" }, other)),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore {
            return;
        }
        match (byte, intermediates) {
            (b'D', []) => self.linefeed(),
            (b'E', []) => {
                self.linefeed();
                self.carriage_return();
            }
            (b'H', []) => {
                let col = self.cursor.col.min(self.cols.saturating_sub(1)) as usize;
                if let Some(stop) = self.tab_stops.get_mut(col) {
                    *stop = true;
                }
            }
            (b'M', []) => self.reverse_index(),
            (b'c', []) => self.full_reset(),
            (b'7', []) => self.cursor.save(self.modes.origin, &self.charsets),
            (b'8', []) => {
                let (origin, charsets) = self.cursor.restore();
                self.modes.origin = origin;
                self.charsets = charsets;
                self.clamp_cursor();
            }
            (b'8', [b'#']) => self.alignment_test(),
            (b'=', []) => {
                self.modes.keypad_application = true;
                self.input_modes_changed();
            }
            (b'>', []) => {
                self.modes.keypad_application = false;
                self.input_modes_changed();
            }
            (b'N', []) => self.charsets.single_shift(2),
            (b'O', []) => self.charsets.single_shift(3),
            (b'n', []) => self.charsets.invoke_gl(2),
            (b'o', []) => self.charsets.invoke_gl(3),
            (b'|', []) => self.charsets.invoke_gr(3),
            (b'}', []) => self.charsets.invoke_gr(2),
            (b'~', []) => self.charsets.invoke_gr(1),
            (b'\\', []) => {} // string terminator tail
            (designate, &[slot]) if matches!(slot, b'(' | b')' | b'*' | b'+') => {
                let slot = match slot {
                    b'(' => 0,
                    b')' => 1,
                    b'*' => 2,
                    _ => 3,
                };
                let charset = match designate {
                    b'B' => Some(StandardCharset::Ascii),
                    b'0' => Some(StandardCharset::SpecialGraphics),
                    b'A' => Some(StandardCharset::UnitedKingdom),
                    _ => None,
                };
                match charset {
                    Some(charset) => self.charsets.designate(slot, charset),
                    None => self.log_unhandled(format!("SCS {designate:02x}")),
                }
            }
            (other, _) => self.log_unhandled(format!("ESC {:02x}", other)),
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        self.handle_osc(params);
    }

    fn hook(&mut self, _params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        self.dcs_buffer.clear();
        self.dcs_intermediates.clear();
        self.dcs_intermediates.extend_from_slice(intermediates);
        self.dcs_action = Some(action);
        // A bare `q` (no intermediates) begins a Sixel stream; DCS+q and
        // DCS$q carry intermediates and stay on the report path.
        self.sixel_active = action == 'q' && intermediates.is_empty();
    }

    fn put(&mut self, byte: u8) {
        if self.dcs_buffer.len() < MAX_DCS_PAYLOAD {
            self.dcs_buffer.push(byte);
        }
    }

    fn unhook(&mut self) {
        let data = std::mem::take(&mut self.dcs_buffer);
        let intermediates = std::mem::take(&mut self.dcs_intermediates);
        let action = self.dcs_action.take();

        if self.sixel_active {
            self.sixel_active = false;
            if !data.is_empty() {
                self.pending_events.push(TermEvent::SixelImage {
                    data_base64: BASE64_STANDARD.encode(&data),
                    row: self.cursor.row,
                    col: self.cursor.col.min(self.cols.saturating_sub(1)),
                });
            }
            return;
        }
        self.handle_dcs(action, &intermediates, &data);
    }
}

fn default_tab_stops(cols: u16) -> Vec<bool> {
    (0..cols).map(|col| col % 8 == 0).collect()
}

/// Parse SGR 38/48/58 extended color parameters, both the `;`-separated
/// legacy form (consuming following groups) and the `:` sub-parameter
/// form. `i` indexes the current group and is advanced past consumed
/// groups.
fn extended_color(groups: &[&[u16]], i: &mut usize) -> Option<Color> {
    let g = groups[*i];
    if g.len() > 1 {
        // Sub-parameter form: 38:5:idx, 38:2:r:g:b, or 38:2::r:g:b with a
        // color-space id.
        match g[1] {
            5 => g.get(2).map(|&idx| Color::Indexed(idx as u8)),
            2 => {
                let rgb: &[u16] = if g.len() >= 6 { &g[3..6] } else { g.get(2..5)? };
                Some(Color::Rgb(
                    rgb[0].min(255) as u8,
                    rgb[1].min(255) as u8,
                    rgb[2].min(255) as u8,
                ))
            }
            _ => None,
        }
    } else {
        // Legacy form: parameters follow as separate groups.
        match groups.get(*i + 1).map(|g| g[0]) {
            Some(5) => {
                let idx = groups.get(*i + 2).map(|g| g[0])?;
                *i += 2;
                Some(Color::Indexed(idx.min(255) as u8))
            }
            Some(2) => {
                let r = groups.get(*i + 2).map(|g| g[0])?;
                let g_ = groups.get(*i + 3).map(|g| g[0])?;
                let b = groups.get(*i + 4).map(|g| g[0])?;
                *i += 4;
                Some(Color::Rgb(
                    r.min(255) as u8,
                    g_.min(255) as u8,
                    b.min(255) as u8,
                ))
            }
            _ => None,
        }
    }
}

/// Parse an OSC color spec: `rgb:RR/GG/BB` (4/8/12/16-bit components) or
/// `#RRGGBB`.
fn parse_color_spec(spec: &[u8]) -> Option<(u8, u8, u8)> {
    let s = std::str::from_utf8(spec).ok()?;
    if let Some(rest) = s.strip_prefix("rgb:") {
        let mut parts = rest.split('/');
        let mut component = || -> Option<u8> {
            let p = parts.next()?;
            let v = u16::from_str_radix(p, 16).ok()?;
            Some(match p.len() {
                1 => (v * 17) as u8,
                2 => v as u8,
                3 => (v >> 4) as u8,
                4 => (v >> 8) as u8,
                _ => return None,
            })
        };
        let r = component()?;
        let g = component()?;
        let b = component()?;
        Some((r, g, b))
    } else if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some((r, g, b))
    } else {
        None
    }
}

fn decode_hex_ascii(input: &str) -> Option<String> {
    if input.len() % 2 != 0 {
        return None;
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut i = 0;
    while i + 1 < bytes.len() {
        let pair = std::str::from_utf8(&bytes[i..i + 2]).ok()?;
        out.push(u8::from_str_radix(pair, 16).ok()?);
        i += 2;
    }
    String::from_utf8(out).ok()
}

fn encode_hex_ascii(input: &str) -> String {
    input.as_bytes().iter().map(|b| format!("{:02x}", b)).collect()
}

fn tcap_capability_value(name: &str) -> Option<&'static str> {
    // Capability set queried by tmux and modern TUIs.
    match name {
        "TN" | "name" => Some("xterm-256color"),
        "Co" | "colors" => Some("256"),
        "RGB" | "Tc" => Some("8"),
        "Ms" => Some("\x1b]52;%p1%s;%p2%s\x07"),
        "Ss" => Some("\x1b[%p1%d q"),
        "Se" => Some("\x1b[2 q"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::terminal::search::Direction;

    fn feed(screen: &mut Screen, bytes: &[u8]) {
        let mut parser = Parser::new();
        parser.advance(screen, bytes);
    }

    fn screen(rows: u16, cols: u16) -> Screen {
        Screen::new(rows, cols)
    }

    #[test]
    fn plain_write_wraps_and_marks_lines() {
        let mut screen = screen(24, 5);
        feed(&mut screen, b"Hello, World");

        assert_eq!(screen.line_text(0), "Hello");
        assert_eq!(screen.line_text(1), ", Wor");
        assert_eq!(screen.line_text(2), "ld");
        assert!(screen.grid().page_row(0).flags.contains(LineFlags::WRAPPED));
        assert!(screen.grid().page_row(1).flags.contains(LineFlags::WRAPPED));
        assert!(!screen.grid().page_row(2).flags.contains(LineFlags::WRAPPED));
        assert_eq!(screen.cursor_position(), (2, 2));
    }

    #[test]
    fn sgr_subparam_rgb_applies_to_cell() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[38:2::10:20:30mX");
        let cell = screen.grid().page_row(0).cell(0);
        assert_eq!(cell.c, 'X');
        assert_eq!(cell.style.fg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn sgr_semicolon_rgb_and_indexed() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[38;2;128;64;32m");
        assert_eq!(screen.cursor.style.fg, Color::Rgb(128, 64, 32));
        feed(&mut screen, b"\x1b[48;5;196m");
        assert_eq!(screen.cursor.style.bg, Color::Indexed(196));
        feed(&mut screen, b"\x1b[0m");
        assert_eq!(screen.cursor.style, Style::default());
    }

    #[test]
    fn sgr_underline_styles() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[4:3m");
        assert_eq!(screen.cursor.style.underline, UnderlineStyle::Curly);
        feed(&mut screen, b"\x1b[21m");
        assert_eq!(screen.cursor.style.underline, UnderlineStyle::Double);
        feed(&mut screen, b"\x1b[24m");
        assert_eq!(screen.cursor.style.underline, UnderlineStyle::None);
        feed(&mut screen, b"\x1b[58:2::1:2:3m");
        assert_eq!(screen.cursor.style.underline_color, Color::Rgb(1, 2, 3));
    }

    #[test]
    fn decrqm_unknown_mode_reports_zero() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[?2022$p");
        let responses = screen.take_pending_responses();
        assert_eq!(responses, vec![b"\x1b[?2022;0$y".to_vec()]);
    }

    #[test]
    fn decrqm_reports_live_mode_state() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[?1004h\x1b[?1004$p");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1b[?1004;1$y".to_vec()));

        feed(&mut screen, b"\x1b[4h\x1b[4$p");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1b[4;1$y".to_vec()));
    }

    #[test]
    fn decrqm_1048_reports_save_slot() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[?1048$p");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1b[?1048;2$y".to_vec()));

        feed(&mut screen, b"\x1b7\x1b[?1048$p");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1b[?1048;1$y".to_vec()));
    }

    #[test]
    fn alt_screen_switch_preserves_primary() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"A");
        assert_eq!(screen.cursor_position(), (0, 1));

        feed(&mut screen, b"\x1b[?1049h");
        assert!(screen.modes().alt_screen);
        feed(&mut screen, b"B");
        assert_eq!(screen.line_text(0), "B");

        feed(&mut screen, b"\x1b[?1049l");
        assert!(!screen.modes().alt_screen);
        assert_eq!(screen.line_text(0), "A");
        assert_eq!(screen.cursor_position(), (0, 1));
    }

    #[test]
    fn mode_47_preserves_alt_content_across_toggles() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[?47h");
        feed(&mut screen, b"alt text");
        feed(&mut screen, b"\x1b[?47l\x1b[?47h");
        assert_eq!(screen.line_text(0), "alt text");

        // 1047 still clears the buffer on entry.
        feed(&mut screen, b"\x1b[?47l\x1b[?1047h");
        assert_eq!(screen.line_text(0), "");
    }

    #[test]
    fn alt_screen_hyperlinks_survive_until_buffer_cleared() {
        let mut screen = screen(4, 40);
        feed(&mut screen, b"\x1b[?47h");
        feed(&mut screen, b"\x1b]8;;https://example.com\x1b\\a\x1b]8;;\x1b\\");
        assert_eq!(screen.hyperlinks().len(), 1);

        // Leaving and re-entering via mode 47 keeps the reference alive.
        feed(&mut screen, b"\x1b[?47l\x1b[?47h");
        assert_eq!(screen.hyperlinks().len(), 1);

        // A clearing entry drops the buffer and its references.
        feed(&mut screen, b"\x1b[?47l\x1b[?1049h");
        assert!(screen.hyperlinks().is_empty());
        feed(&mut screen, b"\x1b[?1049l");
    }

    #[test]
    fn resize_after_selection_never_references_dead_lines() {
        let mut screen = screen(4, 5);
        feed(&mut screen, b"Hello, World");
        screen.start_selection(SelectionKind::Linear, 0, 0);
        screen.extend_selection(1, 3);
        assert!(screen.selection().is_some());

        screen.resize(4, 20, 0, 0);
        assert!(screen.selection().is_none());
        assert_eq!(screen.line_text(0), "Hello, World");
    }

    #[test]
    fn round_trip_text_matches_input() {
        let mut screen = screen(5, 20);
        feed(&mut screen, b"foo\r\nbar baz\r\nqux");
        assert_eq!(screen.page_text(), "foo\nbar baz\nqux");
    }

    #[test]
    fn scrollback_holds_evicted_lines_in_order() {
        let mut screen = screen(2, 10);
        for i in 0..6 {
            feed(&mut screen, format!("l{i}\r\n").as_bytes());
        }
        let grid = screen.primary_grid();
        assert_eq!(grid.history_len(), 5);
        // Offset -1 is the most recently evicted line.
        for (slot, expect) in (1..=5).zip((0..5).rev()) {
            assert_eq!(
                grid.line_at_offset(-(slot as i32)).unwrap().to_string_trimmed(),
                format!("l{expect}")
            );
        }
    }

    #[test]
    fn bce_fill_uses_current_background() {
        let mut screen = screen(4, 10);
        feed(&mut screen, b"\x1b[41m\x1b[2K");
        let cell = screen.grid().page_row(0).cell(3);
        assert_eq!(cell.style.bg, Color::Indexed(1));
        assert_eq!(cell.style.fg, Color::Default);
        assert_eq!(cell.c, ' ');
    }

    #[test]
    fn origin_mode_offsets_cup_into_region() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[6;21r");
        assert_eq!(screen.scroll_top, 5);
        assert_eq!(screen.scroll_bottom, 21);

        feed(&mut screen, b"\x1b[?6h");
        assert_eq!(screen.cursor_position(), (5, 0));
        feed(&mut screen, b"\x1b[3;1H");
        assert_eq!(screen.cursor_position(), (7, 0));

        feed(&mut screen, b"\x1b[?6l\x1b[3;1H");
        assert_eq!(screen.cursor_position(), (2, 0));
    }

    #[test]
    fn scroll_region_contains_linefeed() {
        let mut screen = screen(10, 20);
        for i in 0..10u8 {
            feed(
                &mut screen,
                format!("\x1b[{};1H{}", i + 1, (b'A' + i) as char).as_bytes(),
            );
        }
        feed(&mut screen, b"\x1b[3;6r\x1b[6;1H\n");

        assert_eq!(screen.line_text(0), "A");
        assert_eq!(screen.line_text(2), "D");
        assert_eq!(screen.line_text(5), "");
        assert_eq!(screen.line_text(6), "G");
    }

    #[test]
    fn wide_cell_pair_is_atomic() {
        let mut screen = screen(4, 10);
        feed(&mut screen, "漢".as_bytes());
        let head = screen.grid().page_row(0).cell(0);
        let tail = screen.grid().page_row(0).cell(1);
        assert!(head.is_wide());
        assert!(tail.is_wide_spacer());
        assert_eq!(screen.cursor_position(), (0, 2));

        // Overwriting the spacer clears both halves.
        feed(&mut screen, b"\x1b[1;2Hx");
        assert_eq!(screen.grid().page_row(0).cell(0).c, ' ');
        assert_eq!(screen.grid().page_row(0).cell(1).c, 'x');
        assert!(!screen.grid().page_row(0).cell(0).is_wide());
    }

    #[test]
    fn wide_char_wraps_as_a_unit() {
        let mut screen = screen(4, 5);
        feed(&mut screen, "ab漢漢".as_bytes());
        // Second wide char does not fit in the last column of row 0.
        assert_eq!(screen.line_text(0), "ab漢");
        assert_eq!(screen.line_text(1), "漢");
    }

    #[test]
    fn insert_mode_shifts_existing_text() {
        let mut screen = screen(4, 10);
        feed(&mut screen, b"abc\x1b[1;1H\x1b[4hX\x1b[4l");
        assert_eq!(screen.line_text(0), "Xabc");
        assert!(!screen.modes().insert);
    }

    #[test]
    fn rep_repeats_last_graphic_char() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"A\x1b[3b");
        assert_eq!(screen.line_text(0), "AAAA");
    }

    #[test]
    fn tab_stops_set_clear_and_navigate() {
        let mut screen = screen(6, 40);
        feed(&mut screen, b"\t");
        assert_eq!(screen.cursor_position(), (0, 8));
        feed(&mut screen, b"\x1b[5;1H\x1b[4G\x1bH\x1b[1G\t");
        assert_eq!(screen.cursor_position(), (4, 3));
        feed(&mut screen, b"\x1b[g\x1b[1G\t");
        assert_eq!(screen.cursor_position(), (4, 8));
        feed(&mut screen, b"\x1b[3g\x1b[1G\t");
        assert_eq!(screen.cursor_position(), (4, 39));
    }

    #[test]
    fn dec_special_graphics_charset() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b(0qx\x1b(Bq");
        assert_eq!(screen.line_text(0), "─│q");
    }

    #[test]
    fn shift_out_uses_g1() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b)0\x0eq\x0fq");
        assert_eq!(screen.line_text(0), "─q");
    }

    #[test]
    fn title_stack_push_pop() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b]2;first\x07\x1b[22t\x1b]2;second\x07");
        assert_eq!(screen.title(), "second");
        feed(&mut screen, b"\x1b[23t");
        assert_eq!(screen.title(), "first");
    }

    #[test]
    fn hyperlinks_tag_cells_and_release() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b]8;;https://example.com\x1b\\ab\x1b]8;;\x1b\\");
        let cell = screen.grid().page_row(0).cell(0);
        assert!(cell.link.is_some());
        assert_eq!(
            screen.hyperlinks().uri(cell.link.unwrap()),
            Some("https://example.com")
        );
        assert_eq!(screen.hyperlinks().len(), 1);

        // Overwriting both cells drops the last references.
        feed(&mut screen, b"\x1b[1;1Hxy");
        assert!(screen.hyperlinks().is_empty());
    }

    #[test]
    fn cpr_reports_cursor_position() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[5;10H\x1b[6n");
        let responses = screen.take_pending_responses();
        assert_eq!(responses, vec![b"\x1b[5;10R".to_vec()]);
    }

    #[test]
    fn device_attributes_reports() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[c\x1b[>c");
        let responses = screen.take_pending_responses();
        assert_eq!(responses[0], b"\x1b[?62;22c".to_vec());
        assert_eq!(responses[1], b"\x1b[>0;10;0c".to_vec());
    }

    #[test]
    fn window_size_reports() {
        let mut screen = screen(24, 80);
        screen.resize(24, 80, 1280, 720);
        feed(&mut screen, b"\x1b[18t\x1b[14t");
        let responses = screen.take_pending_responses();
        assert_eq!(responses[0], b"\x1b[8;24;80t".to_vec());
        assert_eq!(responses[1], b"\x1b[4;720;1280t".to_vec());
    }

    #[test]
    fn decrqss_round_trips_state() {
        let mut screen = screen(24, 80);
        feed(&mut screen, b"\x1b[5;20r\x1bP$qr\x1b\\");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1bP1$r5;20r\x1b\\".to_vec()));

        feed(&mut screen, b"\x1bP$qz\x1b\\");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1bP0$r\x1b\\".to_vec()));
    }

    #[test]
    fn xtgettcap_answers_known_names() {
        let mut screen = screen(24, 80);
        // "TN" hex-encoded.
        feed(&mut screen, b"\x1bP+q544e\x1b\\");
        let responses = screen.take_pending_responses();
        let text = String::from_utf8_lossy(&responses[0]).to_string();
        assert!(text.starts_with("\x1bP1+r"));
        assert!(text.contains("544e="));
    }

    #[test]
    fn ed3_clears_history_only() {
        let mut screen = screen(2, 10);
        for i in 0..5 {
            feed(&mut screen, format!("l{i}\r\n").as_bytes());
        }
        assert!(screen.primary_grid().history_len() > 0);
        feed(&mut screen, b"\x1b[3J");
        assert_eq!(screen.primary_grid().history_len(), 0);
        assert_eq!(screen.line_text(0), "l4");
    }

    #[test]
    fn overlapping_write_clears_selection() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"hello world");
        screen.start_selection(SelectionKind::Linear, 0, 0);
        screen.extend_selection(0, 4);
        assert_eq!(screen.selection_text().as_deref(), Some("hello"));

        feed(&mut screen, b"\x1b[1;1Hx");
        assert!(screen.selection().is_none());
    }

    #[test]
    fn selection_survives_scroll_into_history() {
        let mut screen = screen(3, 20);
        feed(&mut screen, b"target\r\n");
        screen.start_selection(SelectionKind::Word, 0, 2);
        feed(&mut screen, b"\r\nmore\r\nlines\r\n");
        // The selected line is in history now; the text is unchanged.
        assert_eq!(screen.selection_text().as_deref(), Some("target"));
    }

    #[test]
    fn alignment_test_fills_page() {
        let mut screen = screen(3, 4);
        feed(&mut screen, b"\x1b#8");
        for row in 0..3 {
            assert_eq!(screen.line_text(row), "EEEE");
        }
        assert_eq!(screen.cursor_position(), (0, 0));
    }

    #[test]
    fn full_reset_restores_initial_state() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b[31mtext\x1b[?25l\x1b[5;1r\x1bc");
        assert_eq!(screen.page_text(), "");
        assert_eq!(screen.cursor.style, Style::default());
        assert!(screen.cursor_style.visible());
        assert_eq!(screen.scroll_bottom, 4);
    }

    #[test]
    fn decscusr_and_decrqss_cursor_style() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b[4 q\x1bP$q q\x1b\\");
        let responses = screen.take_pending_responses();
        assert_eq!(responses.last(), Some(&b"\x1bP1$r4 q\x1b\\".to_vec()));
    }

    #[test]
    fn left_right_margins_constrain_wrap() {
        let mut screen = screen(6, 10);
        feed(&mut screen, b"\x1b[?69h\x1b[3;6s\x1b[1;3Habcdefgh");
        assert_eq!(screen.line_text(0), "  abcd");
        assert_eq!(screen.line_text(1), "  efgh");
    }

    #[test]
    fn margin_scroll_preserves_outside_columns() {
        let mut screen = screen(3, 8);
        feed(&mut screen, b"aaaaaaaa\r\nbbbbbbbb\r\ncccccccc");
        feed(&mut screen, b"\x1b[?69h\x1b[3;6s\x1b[1;3H\x1b[2S");
        // Columns 1-2 and 7-8 untouched; the margin window scrolled by 2.
        assert_eq!(screen.line_text(0), "aaccccaa");
        assert_eq!(screen.line_text(1), "bb    bb");
        assert_eq!(screen.line_text(2), "cc    cc");
    }

    #[test]
    fn sixel_stream_surfaces_as_event() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1bPq#0;2;97;97;97~~\x1b\\");
        let frame = screen.take_render_frame().expect("frame");
        assert!(frame
            .events
            .iter()
            .any(|e| matches!(e, TermEvent::SixelImage { .. })));
    }

    #[test]
    fn frames_coalesce_until_changes() {
        let mut screen = screen(4, 20);
        let first = screen.take_render_frame().expect("initial frame");
        assert_eq!(first.lines.len(), 4);
        assert!(screen.take_render_frame().is_none());

        // Cursor-only movement still produces a frame.
        feed(&mut screen, b"\x1b[2;2H");
        let frame = screen.take_render_frame().expect("cursor frame");
        assert!(frame.lines.is_empty());
        assert_eq!((frame.cursor.row, frame.cursor.col), (1, 1));
        assert!(screen.take_render_frame().is_none());
    }

    #[test]
    fn scrolled_lines_captured_for_history_consumers() {
        let mut screen = screen(2, 10);
        screen.take_render_frame();
        feed(&mut screen, b"one\r\ntwo\r\n");
        let frame = screen.take_render_frame().expect("frame");
        assert_eq!(frame.scrolled_lines.len(), 1);
        assert_eq!(frame.scrolled_lines[0].spans[0].text.trim_end(), "one");
    }

    #[test]
    fn search_finds_text_in_page() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"alpha\r\nbeta\r\ngamma");
        screen.set_search("beta", Direction::Forward);
        let (start, end) = screen.search_next().expect("match");
        assert_eq!(start.col, 0);
        assert_eq!(end.col, 3);
    }

    #[test]
    fn osc52_write_surfaces_event() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b]52;c;aGVsbG8=\x07");
        let frame = screen.take_render_frame().expect("frame");
        assert!(frame.events.iter().any(|e| matches!(
            e,
            TermEvent::ClipboardWrite { text, .. } if text == "hello"
        )));
    }

    #[test]
    fn osc4_palette_set_and_query() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b]4;1;rgb:ff/00/00\x07\x1b]4;1;?\x07");
        let responses = screen.take_pending_responses();
        assert_eq!(
            String::from_utf8_lossy(&responses[0]),
            "\x1b]4;1;rgb:ffff/0000/0000\x1b\\"
        );
    }

    #[test]
    fn prompt_mark_sets_line_flag() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"\x1b]133;A\x07$ ");
        assert!(screen.grid().page_row(0).flags.contains(LineFlags::MARKED));
        let frame = screen.take_render_frame().expect("frame");
        assert!(frame
            .events
            .iter()
            .any(|e| matches!(e, TermEvent::PromptMark { .. })));
    }

    #[test]
    fn deccolm_requests_column_change_and_clears() {
        let mut screen = screen(4, 20);
        feed(&mut screen, b"text\x1b[?3h");
        assert_eq!(screen.page_text(), "");
        let frame = screen.take_render_frame().expect("frame");
        assert!(frame
            .events
            .iter()
            .any(|e| matches!(e, TermEvent::ColumnsRequested { cols: 132 })));
    }

    #[test]
    fn reflow_on_resize_preserves_content() {
        let mut screen = screen(4, 10);
        feed(&mut screen, b"Hello, World");
        screen.resize(4, 5, 0, 0);
        assert_eq!(screen.line_text(0), "Hello");
        assert_eq!(screen.line_text(1), ", Wor");
        assert_eq!(screen.line_text(2), "ld");
        screen.resize(4, 12, 0, 0);
        assert_eq!(screen.line_text(0), "Hello, World");
    }

    #[test]
    fn combining_mark_attaches_to_cell() {
        let mut screen = screen(4, 20);
        feed(&mut screen, "e\u{0301}x".as_bytes());
        assert_eq!(screen.line_text(0), "e\u{0301}x");
        assert_eq!(screen.cursor_position(), (0, 2));
    }
}
