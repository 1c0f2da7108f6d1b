use super::grid::{AbsPoint, Grid};
use super::line::LineFlags;

/// Selection shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// Character range between two points, in reading order.
    Linear,
    /// Linear, with endpoints expanded to word boundaries.
    Word,
    /// Rectangular block between the two corners.
    Rectangular,
    /// Whole lines between the two points.
    Lines,
}

/// An active selection, anchored in absolute line coordinates so it
/// survives scrolling of the underlying grid.
#[derive(Debug, Clone)]
pub struct Selection {
    pub kind: SelectionKind,
    anchor: AbsPoint,
    head: AbsPoint,
}

impl Selection {
    pub fn new(kind: SelectionKind, point: AbsPoint) -> Self {
        Self {
            kind,
            anchor: point,
            head: point,
        }
    }

    /// Move the free endpoint (drag).
    pub fn extend(&mut self, point: AbsPoint) {
        self.head = point;
    }

    /// Endpoints in document order.
    pub fn range(&self) -> (AbsPoint, AbsPoint) {
        if self.head < self.anchor {
            (self.head, self.anchor)
        } else {
            (self.anchor, self.head)
        }
    }

    /// True when `abs` lies on a line the selection touches.
    pub fn intersects_line(&self, abs: u64) -> bool {
        let (start, end) = self.range();
        abs >= start.line && abs <= end.line
    }

    /// True when a whole line range overlaps the selection.
    pub fn intersects_lines(&self, from: u64, to: u64) -> bool {
        let (start, end) = self.range();
        from <= end.line && to >= start.line
    }

    /// Drop the selection if its lines were evicted from the grid.
    /// Returns false when the selection no longer references live lines.
    pub fn still_valid(&self, grid: &Grid) -> bool {
        let (start, end) = self.range();
        start.line >= grid.first_abs() && end.line < grid.end_abs()
    }

    /// Resolved endpoints with word/line expansion applied.
    pub fn resolved_range(&self, grid: &Grid, word_delimiters: &str) -> (AbsPoint, AbsPoint) {
        let (mut start, mut end) = self.range();
        match self.kind {
            SelectionKind::Linear | SelectionKind::Rectangular => {}
            SelectionKind::Word => {
                start = expand_left(grid, start, word_delimiters);
                end = expand_right(grid, end, word_delimiters);
            }
            SelectionKind::Lines => {
                start.col = 0;
                end.col = grid.cols().saturating_sub(1);
            }
        }
        (start, end)
    }

    /// Cell range selected on line `abs`, if any: inclusive columns.
    pub fn columns_on_line(
        &self,
        grid: &Grid,
        abs: u64,
        word_delimiters: &str,
    ) -> Option<(u16, u16)> {
        let (start, end) = self.resolved_range(grid, word_delimiters);
        if abs < start.line || abs > end.line {
            return None;
        }
        let last = grid.cols().saturating_sub(1);
        let range = match self.kind {
            SelectionKind::Rectangular => {
                (start.col.min(end.col), start.col.max(end.col))
            }
            _ => {
                let from = if abs == start.line { start.col } else { 0 };
                let to = if abs == end.line { end.col } else { last };
                (from, to)
            }
        };
        Some((range.0.min(last), range.1.min(last)))
    }

    /// Extract the selected text.
    pub fn to_text(&self, grid: &Grid, word_delimiters: &str) -> String {
        let (start, end) = self.resolved_range(grid, word_delimiters);
        let mut out = String::new();
        for abs in start.line..=end.line {
            let Some(line) = grid.line_by_abs(abs) else {
                continue;
            };
            let Some((from, to)) = self.columns_on_line(grid, abs, word_delimiters) else {
                continue;
            };
            let text: String = line
                .chars()
                .iter()
                .filter(|(col, _)| *col >= from && *col <= to)
                .map(|&(_, c)| c)
                .collect();
            if to >= line.occupied().saturating_sub(1) {
                out.push_str(text.trim_end());
            } else {
                out.push_str(&text);
            }
            let join_without_newline = line.flags.contains(LineFlags::WRAPPED)
                && self.kind != SelectionKind::Rectangular;
            if abs != end.line && !join_without_newline {
                out.push('\n');
            }
        }
        out
    }
}

fn is_word_char(c: char, delimiters: &str) -> bool {
    c != ' ' && !delimiters.contains(c)
}

/// Walk left from `point` to the start of the word under it, following
/// wrapped-line joins into the previous row.
fn expand_left(grid: &Grid, mut point: AbsPoint, delimiters: &str) -> AbsPoint {
    loop {
        let Some(line) = grid.line_by_abs(point.line) else {
            return point;
        };
        let chars = line.chars();
        let mut col = point.col;
        let char_at = |chars: &[(u16, char)], col: u16| {
            chars.iter().find(|(c, _)| *c == col).map(|&(_, c)| c)
        };
        if !char_at(&chars, col).map_or(false, |c| is_word_char(c, delimiters)) {
            return point;
        }
        while col > 0 {
            match char_at(&chars, col - 1) {
                Some(c) if is_word_char(c, delimiters) => col -= 1,
                _ => {
                    point.col = col;
                    return point;
                }
            }
        }
        point.col = 0;
        // Continue onto the previous row only across a wrap join.
        let prev_wrapped = point
            .line
            .checked_sub(1)
            .and_then(|abs| grid.line_by_abs(abs))
            .is_some_and(|prev| prev.flags.contains(LineFlags::WRAPPED));
        if !prev_wrapped {
            return point;
        }
        point.line -= 1;
        point.col = grid.cols().saturating_sub(1);
    }
}

/// Walk right from `point` to the end of the word under it.
fn expand_right(grid: &Grid, mut point: AbsPoint, delimiters: &str) -> AbsPoint {
    loop {
        let Some(line) = grid.line_by_abs(point.line) else {
            return point;
        };
        let chars = line.chars();
        let last = grid.cols().saturating_sub(1);
        let mut col = point.col;
        let char_at = |chars: &[(u16, char)], col: u16| {
            chars.iter().find(|(c, _)| *c == col).map(|&(_, c)| c)
        };
        if !char_at(&chars, col).map_or(false, |c| is_word_char(c, delimiters)) {
            return point;
        }
        while col < last {
            match char_at(&chars, col + 1) {
                Some(c) if is_word_char(c, delimiters) => col += 1,
                _ => {
                    point.col = col;
                    return point;
                }
            }
        }
        point.col = last;
        if !line.flags.contains(LineFlags::WRAPPED) {
            return point;
        }
        point.line += 1;
        point.col = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::cell::{Cell, Style};

    fn grid_with(lines: &[&str]) -> Grid {
        let cols = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(12) as u16;
        let mut grid = Grid::new(lines.len() as u16, cols, 100);
        for (row, text) in lines.iter().enumerate() {
            for (col, c) in text.chars().enumerate() {
                *grid.page_row_mut(row as u16).cell_mut(col as u16) =
                    Cell::new(c, Style::default());
            }
        }
        grid
    }

    #[test]
    fn linear_selection_extracts_range() {
        let grid = grid_with(&["hello world", "second line"]);
        let mut sel = Selection::new(
            SelectionKind::Linear,
            AbsPoint { line: 0, col: 6 },
        );
        sel.extend(AbsPoint { line: 1, col: 5 });
        assert_eq!(sel.to_text(&grid, ""), "world\nsecond");
    }

    #[test]
    fn reversed_drag_normalizes() {
        let grid = grid_with(&["hello world"]);
        let mut sel = Selection::new(
            SelectionKind::Linear,
            AbsPoint { line: 0, col: 4 },
        );
        sel.extend(AbsPoint { line: 0, col: 0 });
        assert_eq!(sel.to_text(&grid, ""), "hello");
    }

    #[test]
    fn word_selection_expands_to_delimiters() {
        let grid = grid_with(&["foo bar/baz q"]);
        let sel = Selection::new(SelectionKind::Word, AbsPoint { line: 0, col: 5 });
        assert_eq!(sel.to_text(&grid, "/"), "bar");
    }

    #[test]
    fn rectangular_selection_takes_columns() {
        let grid = grid_with(&["abcdef", "ghijkl", "mnopqr"]);
        let mut sel = Selection::new(
            SelectionKind::Rectangular,
            AbsPoint { line: 0, col: 1 },
        );
        sel.extend(AbsPoint { line: 2, col: 3 });
        assert_eq!(sel.to_text(&grid, ""), "bcd\nhij\nnop");
    }

    #[test]
    fn line_selection_takes_full_lines() {
        let grid = grid_with(&["first", "second"]);
        let mut sel = Selection::new(SelectionKind::Lines, AbsPoint { line: 0, col: 3 });
        sel.extend(AbsPoint { line: 1, col: 0 });
        assert_eq!(sel.to_text(&grid, ""), "first\nsecond");
    }

    #[test]
    fn intersection_checks_lines() {
        let mut sel = Selection::new(SelectionKind::Linear, AbsPoint { line: 3, col: 0 });
        sel.extend(AbsPoint { line: 5, col: 2 });
        assert!(sel.intersects_line(4));
        assert!(!sel.intersects_line(6));
        assert!(sel.intersects_lines(5, 9));
        assert!(!sel.intersects_lines(6, 9));
    }
}
