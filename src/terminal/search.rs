use super::grid::{AbsPoint, Grid};
use super::line::LineFlags;

/// Search direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A compiled search over the grid. The pattern is kept as UTF-32 so
/// matching walks cells directly; matches may span wrapped-line
/// boundaries but never hard line breaks.
#[derive(Debug, Clone)]
pub struct Search {
    pattern: Vec<char>,
    pub direction: Direction,
    /// The current match, advanced by `next`.
    pub focus: Option<(AbsPoint, AbsPoint)>,
}

impl Search {
    pub fn new(pattern: &str, direction: Direction) -> Self {
        Self {
            pattern: pattern.chars().collect(),
            direction,
            focus: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// First occurrence at or after `from` (reading order).
    pub fn find_forward(&self, grid: &Grid, from: AbsPoint) -> Option<(AbsPoint, AbsPoint)> {
        self.matches(grid)
            .into_iter()
            .find(|(start, _)| *start >= from)
    }

    /// Last occurrence at or before `from`.
    pub fn find_backward(&self, grid: &Grid, from: AbsPoint) -> Option<(AbsPoint, AbsPoint)> {
        self.matches(grid)
            .into_iter()
            .rev()
            .find(|(start, _)| *start <= from)
    }

    /// Advance the focused match in the configured direction, wrapping
    /// around the grid.
    pub fn next(&mut self, grid: &Grid) -> Option<(AbsPoint, AbsPoint)> {
        let found = match (self.direction, self.focus) {
            (Direction::Forward, Some((start, _))) => self
                .find_forward(
                    grid,
                    AbsPoint {
                        line: start.line,
                        col: start.col + 1,
                    },
                )
                .or_else(|| {
                    self.find_forward(
                        grid,
                        AbsPoint {
                            line: grid.first_abs(),
                            col: 0,
                        },
                    )
                }),
            (Direction::Forward, None) => self.find_forward(
                grid,
                AbsPoint {
                    line: grid.first_abs(),
                    col: 0,
                },
            ),
            (Direction::Backward, Some((start, _))) => {
                let before = if start.col > 0 {
                    AbsPoint {
                        line: start.line,
                        col: start.col - 1,
                    }
                } else if start.line > grid.first_abs() {
                    AbsPoint {
                        line: start.line - 1,
                        col: grid.cols().saturating_sub(1),
                    }
                } else {
                    AbsPoint {
                        line: grid.end_abs().saturating_sub(1),
                        col: grid.cols().saturating_sub(1),
                    }
                };
                self.find_backward(grid, before).or_else(|| {
                    self.find_backward(
                        grid,
                        AbsPoint {
                            line: grid.end_abs().saturating_sub(1),
                            col: grid.cols().saturating_sub(1),
                        },
                    )
                })
            }
            (Direction::Backward, None) => self.find_backward(
                grid,
                AbsPoint {
                    line: grid.end_abs().saturating_sub(1),
                    col: grid.cols().saturating_sub(1),
                },
            ),
        };
        self.focus = found;
        found
    }

    /// All matches in the grid, in reading order. Wrapped runs are
    /// concatenated before matching so occurrences crossing a soft wrap
    /// are found.
    fn matches(&self, grid: &Grid) -> Vec<(AbsPoint, AbsPoint)> {
        if self.pattern.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut abs = grid.first_abs();
        let end = grid.end_abs();
        while abs < end {
            // Gather one logical run.
            let mut run: Vec<(AbsPoint, char)> = Vec::new();
            let run_start = abs;
            loop {
                let Some(line) = grid.line_by_abs(abs) else {
                    break;
                };
                for (col, c) in line.chars() {
                    run.push((AbsPoint { line: abs, col }, c));
                }
                let wrapped = line.flags.contains(LineFlags::WRAPPED);
                abs += 1;
                if !wrapped || abs >= end {
                    break;
                }
            }
            debug_assert!(abs > run_start);

            if run.len() >= self.pattern.len() {
                for start in 0..=(run.len() - self.pattern.len()) {
                    if run[start..start + self.pattern.len()]
                        .iter()
                        .map(|&(_, c)| c)
                        .eq(self.pattern.iter().copied())
                    {
                        let begin = run[start].0;
                        let last = run[start + self.pattern.len() - 1].0;
                        out.push((begin, last));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::cell::{Cell, Style};

    fn grid_with(lines: &[(&str, bool)]) -> Grid {
        let mut grid = Grid::new(lines.len() as u16, 10, 100);
        for (row, (text, wrapped)) in lines.iter().enumerate() {
            for (col, c) in text.chars().enumerate() {
                *grid.page_row_mut(row as u16).cell_mut(col as u16) =
                    Cell::new(c, Style::default());
            }
            if *wrapped {
                grid.page_row_mut(row as u16)
                    .flags
                    .insert(LineFlags::WRAPPED);
            }
        }
        grid
    }

    #[test]
    fn finds_match_on_single_line() {
        let grid = grid_with(&[("hello", false), ("world", false)]);
        let search = Search::new("orl", Direction::Forward);
        let (start, end) = search
            .find_forward(&grid, AbsPoint { line: 0, col: 0 })
            .expect("match");
        assert_eq!(start, AbsPoint { line: 1, col: 1 });
        assert_eq!(end, AbsPoint { line: 1, col: 3 });
    }

    #[test]
    fn match_spans_wrapped_boundary() {
        // "terminal em" + "ulator" wrapped at 10 cols... here: row 0 wraps.
        let grid = grid_with(&[("terminalXX", true), ("emulator", false)]);
        let search = Search::new("XXemu", Direction::Forward);
        let (start, end) = search
            .find_forward(&grid, AbsPoint { line: 0, col: 0 })
            .expect("match across wrap");
        assert_eq!(start, AbsPoint { line: 0, col: 8 });
        assert_eq!(end, AbsPoint { line: 1, col: 2 });
    }

    #[test]
    fn no_match_across_hard_newline() {
        let grid = grid_with(&[("abc", false), ("def", false)]);
        let search = Search::new("cdef", Direction::Forward);
        assert!(search
            .find_forward(&grid, AbsPoint { line: 0, col: 0 })
            .is_none());
    }

    #[test]
    fn backward_finds_last_occurrence() {
        let grid = grid_with(&[("abab", false)]);
        let search = Search::new("ab", Direction::Backward);
        let (start, _) = search
            .find_backward(&grid, AbsPoint { line: 0, col: 9 })
            .expect("match");
        assert_eq!(start.col, 2);
    }

    #[test]
    fn next_wraps_around() {
        let grid = grid_with(&[("xx", false), ("xx", false)]);
        let mut search = Search::new("xx", Direction::Forward);
        let first = search.next(&grid).expect("first");
        assert_eq!(first.0.line, 0);
        let second = search.next(&grid).expect("second");
        assert_eq!(second.0.line, 1);
        let third = search.next(&grid).expect("wraps to first");
        assert_eq!(third.0.line, 0);
    }
}
