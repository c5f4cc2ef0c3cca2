//! Round-robin assignment of output cells to workers.

/// Worker that computes every cell of output row `row`.
///
/// Rows are dealt out starting at worker 1 and wrapping, so with three
/// workers rows 0, 1, 2, 3 go to workers 1, 2, 0, 1. Trace output depends
/// on this exact offset.
pub fn worker_for_row(row: usize, workers: usize) -> usize {
    (row + 1) % workers
}

/// One output cell and the worker it is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub worker: usize,
}

/// Iterator over the cells of a `rows`×`cols` product in dispatch order:
/// row-major, one worker per row.
#[derive(Debug, Clone)]
pub struct Schedule {
    rows: usize,
    cols: usize,
    workers: usize,
    next: usize,
}

impl Schedule {
    pub fn new(rows: usize, cols: usize, workers: usize) -> Self {
        assert!(workers > 0, "schedule needs at least one worker");
        Self {
            rows,
            cols,
            workers,
            next: 0,
        }
    }
}

impl Iterator for Schedule {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.cols == 0 || self.next >= self.rows * self.cols {
            return None;
        }
        let row = self.next / self.cols;
        let col = self.next % self.cols;
        self.next += 1;
        Some(Cell {
            row,
            col,
            worker: worker_for_row(row, self.workers),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.rows * self.cols).saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Schedule {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_start_at_worker_one() {
        let workers: Vec<usize> = (0..7).map(|row| worker_for_row(row, 3)).collect();
        assert_eq!(workers, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn single_worker_takes_every_row() {
        assert!((0..10).all(|row| worker_for_row(row, 1) == 0));
    }

    #[test]
    fn cells_are_row_major() {
        let cells: Vec<Cell> = Schedule::new(2, 3, 2).collect();
        let coords: Vec<(usize, usize, usize)> =
            cells.iter().map(|c| (c.row, c.col, c.worker)).collect();
        assert_eq!(
            coords,
            vec![
                (0, 0, 1),
                (0, 1, 1),
                (0, 2, 1),
                (1, 0, 0),
                (1, 1, 0),
                (1, 2, 0),
            ]
        );
    }

    #[test]
    fn schedule_is_deterministic() {
        let first: Vec<Cell> = Schedule::new(5, 4, 3).collect();
        let second: Vec<Cell> = Schedule::new(5, 4, 3).collect();
        assert_eq!(first, second);
        assert_eq!(Schedule::new(5, 4, 3).len(), 20);
    }

    #[test]
    fn empty_product_has_no_cells() {
        assert_eq!(Schedule::new(0, 4, 2).count(), 0);
        assert_eq!(Schedule::new(4, 0, 2).count(), 0);
    }
}
