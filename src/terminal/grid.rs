use std::collections::VecDeque;

use super::cell::{Cell, Style};
use super::line::{Line, LineFlags};

/// Scroll region: rows `[top, bottom)` and columns `[left, right)`.
/// `left`/`right` differ from the full width only while DECLRMM margins
/// are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub top: u16,
    pub bottom: u16,
    pub left: u16,
    pub right: u16,
}

impl Region {
    pub fn contains_row(&self, row: u16) -> bool {
        row >= self.top && row < self.bottom
    }

    pub fn is_full_width(&self, cols: u16) -> bool {
        self.left == 0 && self.right == cols
    }
}

/// A grid position in absolute line coordinates. Absolute line ids count
/// from the first line the terminal ever produced, so they stay stable
/// while lines scroll into (and out of) history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AbsPoint {
    pub line: u64,
    pub col: u16,
}

/// The line store: scrollback and page in one ring, the page being the
/// last `screen_rows` entries. History is bounded; the oldest lines fall
/// off the front and the `evicted` counter keeps absolute ids stable.
#[derive(Debug)]
pub struct Grid {
    rows: VecDeque<Line>,
    cols: u16,
    screen_rows: u16,
    max_history: usize,
    /// Total lines dropped from the front of the ring.
    evicted: u64,
    /// Viewport scroll position: lines of history between the viewport
    /// top and the page top. Zero means "at the bottom".
    display_offset: usize,
}

impl Grid {
    pub fn new(screen_rows: u16, cols: u16, max_history: usize) -> Self {
        let mut rows = VecDeque::with_capacity(screen_rows as usize);
        for _ in 0..screen_rows {
            rows.push_back(Line::blank(cols, Style::default()));
        }
        Self {
            rows,
            cols,
            screen_rows,
            max_history,
            evicted: 0,
            display_offset: 0,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn screen_rows(&self) -> u16 {
        self.screen_rows
    }

    pub fn history_len(&self) -> usize {
        self.rows.len() - self.screen_rows as usize
    }

    pub fn total_lines(&self) -> usize {
        self.rows.len()
    }

    fn page_top(&self) -> usize {
        self.rows.len() - self.screen_rows as usize
    }

    /// Page row (interpreter coordinates, 0 = top of page).
    pub fn page_row(&self, row: u16) -> &Line {
        &self.rows[self.page_top() + row as usize]
    }

    pub fn page_row_mut(&mut self, row: u16) -> &mut Line {
        let idx = self.page_top() + row as usize;
        &mut self.rows[idx]
    }

    /// Line by signed offset: 0 is the top of the page, negative offsets
    /// reach into scrollback.
    pub fn line_at_offset(&self, offset: i32) -> Option<&Line> {
        let idx = self.page_top() as i64 + offset as i64;
        if idx < 0 || idx >= self.rows.len() as i64 {
            None
        } else {
            Some(&self.rows[idx as usize])
        }
    }

    /// Absolute id of a page row.
    pub fn abs_of_page_row(&self, row: u16) -> u64 {
        self.evicted + (self.page_top() + row as usize) as u64
    }

    /// Absolute id of the first line still in the ring.
    pub fn first_abs(&self) -> u64 {
        self.evicted
    }

    /// Absolute id one past the last line.
    pub fn end_abs(&self) -> u64 {
        self.evicted + self.rows.len() as u64
    }

    pub fn line_by_abs(&self, abs: u64) -> Option<&Line> {
        if abs < self.evicted {
            return None;
        }
        self.rows.get((abs - self.evicted) as usize)
    }

    // --- viewport ----------------------------------------------------------

    pub fn display_offset(&self) -> usize {
        self.display_offset
    }

    /// Scroll the viewport; positive moves toward older history.
    pub fn scroll_display(&mut self, delta: i32) {
        let offset = self.display_offset as i64 + delta as i64;
        self.display_offset = offset.clamp(0, self.history_len() as i64) as usize;
        self.mark_all_dirty();
    }

    pub fn reset_display_offset(&mut self) {
        if self.display_offset != 0 {
            self.display_offset = 0;
            self.mark_all_dirty();
        }
    }

    /// Line shown on viewport row `row` given the current display offset.
    pub fn viewport_line(&self, row: u16) -> &Line {
        &self.rows[self.viewport_index(row)]
    }

    pub fn viewport_index(&self, row: u16) -> usize {
        self.page_top() - self.display_offset + row as usize
    }

    pub fn abs_of_viewport_row(&self, row: u16) -> u64 {
        self.evicted + self.viewport_index(row) as u64
    }

    pub(crate) fn line_dirty(&self, index: usize) -> bool {
        self.rows[index].dirty
    }

    pub(crate) fn clear_line_dirty(&mut self, index: usize) {
        self.rows[index].dirty = false;
    }

    // --- scrolling ---------------------------------------------------------

    /// Scroll `region` up by `n`. Lines leaving the whole-page region move
    /// into history; otherwise they are discarded. Returns lines evicted
    /// past the history cap so the caller can release their hyperlinks.
    pub fn scroll_up(&mut self, region: Region, n: u16, fill: Style) -> Vec<Line> {
        let n = n.min(region.bottom.saturating_sub(region.top));
        if n == 0 {
            return Vec::new();
        }

        if !region.is_full_width(self.cols) {
            self.scroll_cells_up(region, n, fill);
            return Vec::new();
        }

        let whole_page = region.top == 0 && region.bottom == self.screen_rows;
        if whole_page && self.max_history > 0 {
            for _ in 0..n {
                let at = self.page_top() + region.bottom as usize;
                self.rows.insert(at, Line::blank(self.cols, fill));
            }
            // The page window slid down; a pinned viewport keeps showing
            // the same lines.
            if self.display_offset != 0 {
                self.display_offset = (self.display_offset + n as usize).min(self.history_len());
            }
            let mut dropped = Vec::new();
            while self.rows.len() > self.screen_rows as usize + self.max_history {
                if let Some(line) = self.rows.pop_front() {
                    dropped.push(line);
                }
                self.evicted += 1;
                self.display_offset = self.display_offset.min(self.history_len());
            }
            self.mark_page_dirty(region.top, region.bottom);
            return dropped;
        }

        let top_idx = self.page_top() + region.top as usize;
        let bottom_idx = self.page_top() + region.bottom as usize;
        let mut removed = Vec::new();
        for _ in 0..n {
            if let Some(line) = self.rows.remove(top_idx) {
                removed.push(line);
            }
            self.rows
                .insert(bottom_idx - 1, Line::blank(self.cols, fill));
        }
        self.mark_page_dirty(region.top, region.bottom);
        removed
    }

    /// Scroll `region` down by `n`; the bottom lines are discarded and
    /// blanks enter at the top. Returns the discarded lines.
    pub fn scroll_down(&mut self, region: Region, n: u16, fill: Style) -> Vec<Line> {
        let n = n.min(region.bottom.saturating_sub(region.top));
        if n == 0 {
            return Vec::new();
        }

        if !region.is_full_width(self.cols) {
            self.scroll_cells_down(region, n, fill);
            return Vec::new();
        }

        let top_idx = self.page_top() + region.top as usize;
        let bottom_idx = self.page_top() + region.bottom as usize;
        let mut removed = Vec::new();
        for _ in 0..n {
            if let Some(line) = self.rows.remove(bottom_idx - 1) {
                removed.push(line);
            }
            self.rows.insert(top_idx, Line::blank(self.cols, fill));
        }
        self.mark_page_dirty(region.top, region.bottom);
        removed
    }

    /// Margin-limited upward scroll: shift the cell window of each row.
    fn scroll_cells_up(&mut self, region: Region, n: u16, fill: Style) {
        for row in region.top..region.bottom {
            let src_row = row + n;
            if src_row < region.bottom {
                let cells: Vec<Cell> = (region.left..region.right)
                    .map(|col| self.page_row(src_row).cell(col))
                    .collect();
                let line = self.page_row_mut(row);
                for (i, cell) in cells.into_iter().enumerate() {
                    *line.cell_mut(region.left + i as u16) = cell;
                }
            } else {
                self.page_row_mut(row).erase(region.left, region.right, fill);
            }
        }
        self.mark_page_dirty(region.top, region.bottom);
    }

    fn scroll_cells_down(&mut self, region: Region, n: u16, fill: Style) {
        for row in (region.top..region.bottom).rev() {
            if row >= region.top + n {
                let src_row = row - n;
                let cells: Vec<Cell> = (region.left..region.right)
                    .map(|col| self.page_row(src_row).cell(col))
                    .collect();
                let line = self.page_row_mut(row);
                for (i, cell) in cells.into_iter().enumerate() {
                    *line.cell_mut(region.left + i as u16) = cell;
                }
            } else {
                self.page_row_mut(row).erase(region.left, region.right, fill);
            }
        }
        self.mark_page_dirty(region.top, region.bottom);
    }

    // --- dirty tracking ----------------------------------------------------

    pub fn mark_all_dirty(&mut self) {
        for line in &mut self.rows {
            line.dirty = true;
        }
    }

    fn mark_page_dirty(&mut self, top: u16, bottom: u16) {
        for row in top..bottom {
            self.page_row_mut(row).dirty = true;
        }
    }

    /// Drop all history lines (CSI 3 J). Returns them for hyperlink
    /// release.
    pub fn clear_history(&mut self) -> Vec<Line> {
        let n = self.page_top();
        let drained: Vec<Line> = self.rows.drain(..n).collect();
        self.evicted += n as u64;
        self.display_offset = 0;
        drained
    }

    // --- resize and reflow -------------------------------------------------

    /// Resize to `new_rows` x `new_cols`, reflowing wrappable content when
    /// `reflow` is set. `cursor` is in page coordinates; the adjusted
    /// cursor is returned. Lines evicted past the history cap are
    /// returned for hyperlink release.
    pub fn resize(
        &mut self,
        new_rows: u16,
        new_cols: u16,
        cursor: (u16, u16),
        reflow: bool,
    ) -> ((u16, u16), Vec<Line>) {
        let mut cursor_index = self.page_top() + cursor.0 as usize;
        let mut cursor_col = cursor.1;

        if new_cols != self.cols {
            if reflow {
                let (idx, col) = self.reflow(new_cols, cursor_index, cursor_col);
                cursor_index = idx;
                cursor_col = col;
            } else {
                for line in &mut self.rows {
                    line.set_cols(new_cols, Style::default());
                }
            }
            self.cols = new_cols;
        }

        if new_rows > self.screen_rows {
            for _ in 0..(new_rows - self.screen_rows) {
                self.rows.push_back(Line::blank(new_cols, Style::default()));
            }
        }
        self.screen_rows = new_rows;
        while self.rows.len() < new_rows as usize {
            self.rows.push_back(Line::blank(new_cols, Style::default()));
        }

        let mut dropped = Vec::new();
        while self.rows.len() > self.screen_rows as usize + self.max_history {
            if let Some(line) = self.rows.pop_front() {
                dropped.push(line);
            }
            self.evicted += 1;
            cursor_index = cursor_index.saturating_sub(1);
        }

        let page_top = self.page_top();
        let row = cursor_index
            .saturating_sub(page_top)
            .min(self.screen_rows as usize - 1) as u16;
        // The autowrap-pending sentinel column (== cols) survives a resize
        // that keeps it in range.
        let col = cursor_col.min(new_cols);
        self.display_offset = self.display_offset.min(self.history_len());
        self.mark_all_dirty();
        ((row, col), dropped)
    }

    /// Rebuild the ring at a new width: join each wrapped run into its
    /// logical cell sequence, lay it out again, and re-mark `WRAPPED` on
    /// every row but the last of each run.
    fn reflow(&mut self, new_cols: u16, cursor_index: usize, cursor_col: u16) -> (usize, u16) {
        let old: Vec<Line> = std::mem::take(&mut self.rows).into_iter().collect();
        let mut rebuilt: VecDeque<Line> = VecDeque::with_capacity(old.len());
        let mut new_cursor = (0usize, cursor_col);
        let mut cursor_found = false;

        let mut i = 0;
        while i < old.len() {
            let line = &old[i];
            if !line.flags.contains(LineFlags::WRAPPABLE) {
                let mut kept = line.clone();
                kept.set_cols(new_cols, Style::default());
                if i == cursor_index {
                    new_cursor = (rebuilt.len(), cursor_col.min(new_cols));
                    cursor_found = true;
                }
                rebuilt.push_back(kept);
                i += 1;
                continue;
            }

            // Gather one wrapped run into its logical cell sequence.
            let mut cells: Vec<Cell> = Vec::new();
            let mut cursor_offset: Option<usize> = None;
            let mut marked = false;
            loop {
                let line = &old[i];
                marked |= line.flags.contains(LineFlags::MARKED);
                let is_last = !line.flags.contains(LineFlags::WRAPPED) || i + 1 >= old.len();
                let take = if is_last { line.occupied() } else { line.cols() };
                if i == cursor_index {
                    cursor_offset = Some(cells.len() + cursor_col as usize);
                }
                for col in 0..take {
                    cells.push(line.cell(col));
                }
                i += 1;
                if is_last {
                    break;
                }
            }

            let cells_len = cells.len();
            let cursor_offset = cursor_offset.map(|off| off.min(cells_len));
            let mut segs: Vec<Vec<Cell>> = vec![Vec::new()];
            let mut cursor_pos: Option<(usize, u16)> = None;
            for (idx, cell) in cells.into_iter().enumerate() {
                let seg_full = {
                    let cur = segs.last().unwrap();
                    cur.len() == new_cols as usize
                        || (cell.is_wide() && new_cols >= 2 && cur.len() == new_cols as usize - 1)
                };
                if seg_full {
                    segs.push(Vec::new());
                }
                if cursor_offset == Some(idx) {
                    cursor_pos = Some((segs.len() - 1, segs.last().unwrap().len() as u16));
                }
                segs.last_mut().unwrap().push(cell);
            }
            if cursor_offset == Some(cells_len) {
                cursor_pos = Some((segs.len() - 1, segs.last().unwrap().len() as u16));
            }

            let seg_count = segs.len();
            for (seg_idx, seg) in segs.into_iter().enumerate() {
                let mut line = Line::from_cells(seg, new_cols, Style::default());
                if seg_idx + 1 < seg_count {
                    line.flags.insert(LineFlags::WRAPPED);
                }
                if seg_idx == 0 && marked {
                    line.flags.insert(LineFlags::MARKED);
                }
                if let Some((cseg, ccol)) = cursor_pos {
                    if cseg == seg_idx {
                        new_cursor = (rebuilt.len(), ccol);
                        cursor_found = true;
                    }
                }
                rebuilt.push_back(line);
            }
        }

        if rebuilt.is_empty() {
            rebuilt.push_back(Line::blank(new_cols, Style::default()));
        }

        // Drop trailing blank rows the re-layout produced, so content does
        // not creep up into history when the run count changes. The caller
        // pads the page back out to the screen height.
        let cursor_line = if cursor_found { new_cursor.0 } else { 0 };
        while rebuilt.len() > 1 && rebuilt.len() - 1 > cursor_line {
            let last = rebuilt.back().expect("non-empty");
            if last.occupied() == 0
                && !last.flags.intersects(LineFlags::WRAPPED | LineFlags::MARKED)
            {
                rebuilt.pop_back();
            } else {
                break;
            }
        }

        if !cursor_found {
            new_cursor = (rebuilt.len() - 1, cursor_col.min(new_cols));
        }
        self.rows = rebuilt;
        new_cursor
    }

    /// Text of the ring between two indexes, one line per row, trailing
    /// blank lines dropped.
    pub fn text_range(&self, from_index: usize, to_index: usize) -> String {
        let mut lines: Vec<String> = Vec::new();
        for idx in from_index..to_index.min(self.rows.len()) {
            lines.push(self.rows[idx].to_string_trimmed());
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    /// Plain text of the page, trailing blank lines dropped.
    pub fn page_text(&self) -> String {
        self.text_range(self.page_top(), self.rows.len())
    }

    /// Logical text of the page: wrapped runs joined without newlines.
    pub fn logical_text(&self) -> String {
        let mut out = String::new();
        let mut idx = self.page_top();
        while idx < self.rows.len() {
            let line = &self.rows[idx];
            out.push_str(&line.to_string_trimmed());
            if !line.flags.contains(LineFlags::WRAPPED) {
                out.push('\n');
            }
            idx += 1;
        }
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_region(grid: &Grid) -> Region {
        Region {
            top: 0,
            bottom: grid.screen_rows(),
            left: 0,
            right: grid.cols(),
        }
    }

    fn write_str(grid: &mut Grid, row: u16, s: &str) {
        for (i, c) in s.chars().enumerate() {
            *grid.page_row_mut(row).cell_mut(i as u16) = Cell::new(c, Style::default());
        }
    }

    #[test]
    fn whole_page_scroll_moves_top_into_history() {
        let mut grid = Grid::new(3, 10, 100);
        write_str(&mut grid, 0, "first");
        let region = full_region(&grid);
        grid.scroll_up(region, 1, Style::default());

        assert_eq!(grid.history_len(), 1);
        assert_eq!(grid.line_at_offset(-1).unwrap().to_string_trimmed(), "first");
        assert_eq!(grid.page_row(0).to_string_trimmed(), "");
    }

    #[test]
    fn history_cap_evicts_oldest_in_order() {
        let mut grid = Grid::new(2, 8, 3);
        let region = full_region(&grid);
        for i in 0..8 {
            write_str(&mut grid, 0, &format!("l{i}"));
            grid.scroll_up(region, 1, Style::default());
        }
        // 8 lines scrolled out, cap 3: l5, l6, l7 remain, in order.
        assert_eq!(grid.history_len(), 3);
        assert_eq!(grid.line_at_offset(-3).unwrap().to_string_trimmed(), "l5");
        assert_eq!(grid.line_at_offset(-2).unwrap().to_string_trimmed(), "l6");
        assert_eq!(grid.line_at_offset(-1).unwrap().to_string_trimmed(), "l7");
        assert_eq!(grid.first_abs(), 5);
    }

    #[test]
    fn inner_region_scroll_discards() {
        let mut grid = Grid::new(4, 8, 100);
        for row in 0..4 {
            write_str(&mut grid, row, &format!("r{row}"));
        }
        let region = Region {
            top: 1,
            bottom: 3,
            left: 0,
            right: 8,
        };
        grid.scroll_up(region, 1, Style::default());
        assert_eq!(grid.history_len(), 0);
        assert_eq!(grid.page_row(0).to_string_trimmed(), "r0");
        assert_eq!(grid.page_row(1).to_string_trimmed(), "r2");
        assert_eq!(grid.page_row(2).to_string_trimmed(), "");
        assert_eq!(grid.page_row(3).to_string_trimmed(), "r3");
    }

    #[test]
    fn margin_limited_scroll_shifts_cells_only() {
        let mut grid = Grid::new(3, 6, 100);
        write_str(&mut grid, 0, "aaaaaa");
        write_str(&mut grid, 1, "bbbbbb");
        write_str(&mut grid, 2, "cccccc");
        let region = Region {
            top: 0,
            bottom: 3,
            left: 2,
            right: 4,
        };
        grid.scroll_up(region, 1, Style::default());
        assert_eq!(grid.page_row(0).to_string_trimmed(), "aabbaa");
        assert_eq!(grid.page_row(1).to_string_trimmed(), "bbccbb");
        assert_eq!(grid.page_row(2).to_string_trimmed(), "cc  cc");
        assert_eq!(grid.history_len(), 0);
    }

    #[test]
    fn scroll_down_inserts_blank_at_top() {
        let mut grid = Grid::new(3, 8, 100);
        for row in 0..3 {
            write_str(&mut grid, row, &format!("r{row}"));
        }
        let region = full_region(&grid);
        grid.scroll_down(region, 1, Style::default());
        assert_eq!(grid.page_row(0).to_string_trimmed(), "");
        assert_eq!(grid.page_row(1).to_string_trimmed(), "r0");
        assert_eq!(grid.page_row(2).to_string_trimmed(), "r1");
    }

    fn reflow_grid(cols: u16, text: &str) -> Grid {
        // Lay `text` out as wrapped lines of `cols`.
        let mut grid = Grid::new(4, cols, 100);
        let chars: Vec<char> = text.chars().collect();
        let mut row = 0u16;
        for (i, chunk) in chars.chunks(cols as usize).enumerate() {
            for (col, &c) in chunk.iter().enumerate() {
                *grid.page_row_mut(row).cell_mut(col as u16) = Cell::new(c, Style::default());
            }
            if (i + 1) * (cols as usize) < chars.len() {
                grid.page_row_mut(row).flags.insert(LineFlags::WRAPPED);
            }
            row += 1;
        }
        grid
    }

    #[test]
    fn reflow_narrower_preserves_logical_text() {
        let mut grid = reflow_grid(10, "Hello, World");
        grid.resize(4, 5, (1, 2), true);
        assert_eq!(grid.logical_text(), "Hello, World");
        assert!(grid.page_row(0).flags.contains(LineFlags::WRAPPED));
        assert!(grid.page_row(1).flags.contains(LineFlags::WRAPPED));
        assert!(!grid.page_row(2).flags.contains(LineFlags::WRAPPED));
    }

    #[test]
    fn reflow_round_trip_is_identity() {
        let original = "The quick brown fox jumps over the lazy dog";
        let mut grid = reflow_grid(12, original);
        grid.resize(4, 7, (0, 0), true);
        grid.resize(4, 30, (0, 0), true);
        grid.resize(4, 12, (0, 0), true);
        assert_eq!(grid.logical_text(), original);
    }

    #[test]
    fn reflow_tracks_cursor_char() {
        // "Hello, World" at 10 cols: row 0 "Hello, Wor" (wrapped), row 1 "ld".
        // Cursor on 'W' (row 0, col 7). At 5 cols the 'W' lands on row 1 col 2.
        let mut grid = reflow_grid(10, "Hello, World");
        let ((row, col), _) = grid.resize(4, 5, (0, 7), true);
        assert_eq!((row, col), (1, 2));
    }

    #[test]
    fn resize_rows_shrink_moves_top_into_history() {
        let mut grid = Grid::new(4, 8, 100);
        for row in 0..4 {
            write_str(&mut grid, row, &format!("r{row}"));
        }
        let ((row, _), _) = grid.resize(2, 8, (3, 0), false);
        assert_eq!(grid.history_len(), 2);
        assert_eq!(row, 1);
        assert_eq!(grid.page_row(0).to_string_trimmed(), "r2");
        assert_eq!(grid.line_at_offset(-1).unwrap().to_string_trimmed(), "r1");
    }

    #[test]
    fn viewport_pins_while_page_scrolls() {
        let mut grid = Grid::new(2, 8, 100);
        let region = full_region(&grid);
        write_str(&mut grid, 0, "old");
        grid.scroll_up(region, 1, Style::default());
        grid.scroll_display(1);
        assert_eq!(grid.viewport_line(0).to_string_trimmed(), "old");

        write_str(&mut grid, 1, "new");
        grid.scroll_up(region, 1, Style::default());
        // Still anchored on the same line.
        assert_eq!(grid.viewport_line(0).to_string_trimmed(), "old");
        grid.reset_display_offset();
        assert_eq!(grid.display_offset(), 0);
    }
}
