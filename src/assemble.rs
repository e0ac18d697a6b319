use crate::error::{MatmulError, Result};
use crate::matrix::{Matrix, Row};
use crate::worker::PartialResult;

/// Rebuilds the output matrix from partial results in any arrival order.
///
/// Each partial lands at its own `[start_row, end_row)`; a row may be filled
/// once and only once.
pub struct ResultAssembler {
    rows: Vec<Option<Row>>,
    cols: usize,
    accepted: usize,
}

impl ResultAssembler {
    pub fn new(total_rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![None; total_rows],
            cols,
            accepted: 0,
        }
    }

    /// Number of partial results taken so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn filled_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    pub fn accept(&mut self, partial: PartialResult) -> Result<()> {
        let PartialResult {
            start_row,
            end_row,
            rows,
            ..
        } = partial;

        if start_row > end_row || end_row > self.rows.len() {
            return Err(MatmulError::ShardOutOfBounds {
                start: start_row,
                end: end_row,
                total: self.rows.len(),
            });
        }
        if rows.len() != end_row - start_row {
            return Err(MatmulError::MalformedPartial {
                start: start_row,
                end: end_row,
                reason: format!("carries {} rows", rows.len()),
            });
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != self.cols) {
            return Err(MatmulError::MalformedPartial {
                start: start_row,
                end: end_row,
                reason: format!("row has {} columns, expected {}", bad.len(), self.cols),
            });
        }
        if let Some(row) = (start_row..end_row).find(|&row| self.rows[row].is_some()) {
            return Err(MatmulError::OverlappingShard {
                start: start_row,
                end: end_row,
                row,
            });
        }

        for (slot, row) in self.rows[start_row..end_row].iter_mut().zip(rows) {
            *slot = Some(row);
        }
        self.accepted += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Matrix> {
        let total = self.rows.len();
        let missing = total - self.filled_rows();
        if missing > 0 {
            return Err(MatmulError::IncompleteResult { missing, total });
        }
        let cols = self.cols;
        let rows: Vec<Row> = self.rows.into_iter().flatten().collect();
        if rows.is_empty() {
            return Ok(Matrix::zeros(0, cols));
        }
        Matrix::from_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(worker_id: usize, start_row: usize, rows: Vec<Row>) -> PartialResult {
        PartialResult {
            worker_id,
            start_row,
            end_row: start_row + rows.len(),
            rows,
        }
    }

    #[test]
    fn test_out_of_order_arrival() {
        let mut assembler = ResultAssembler::new(4, 2);
        assembler
            .accept(partial(1, 2, vec![vec![5, 6], vec![7, 8]]))
            .unwrap();
        assembler
            .accept(partial(0, 0, vec![vec![1, 2], vec![3, 4]]))
            .unwrap();
        assert_eq!(assembler.accepted(), 2);

        let matrix = assembler.finish().unwrap();
        assert_eq!(
            matrix.into_rows(),
            vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8]]
        );
    }

    #[test]
    fn test_overlap_rejected() {
        let mut assembler = ResultAssembler::new(4, 1);
        assembler.accept(partial(0, 0, vec![vec![1], vec![2]])).unwrap();
        let result = assembler.accept(partial(1, 1, vec![vec![9], vec![9]]));
        assert!(matches!(
            result,
            Err(MatmulError::OverlappingShard { row: 1, .. })
        ));
        assert_eq!(assembler.filled_rows(), 2);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut assembler = ResultAssembler::new(2, 1);
        let result = assembler.accept(partial(0, 1, vec![vec![1], vec![2]]));
        assert!(matches!(result, Err(MatmulError::ShardOutOfBounds { .. })));
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let mut assembler = ResultAssembler::new(3, 1);
        let result = assembler.accept(PartialResult {
            worker_id: 0,
            start_row: 0,
            end_row: 3,
            rows: vec![vec![1]],
        });
        assert!(matches!(result, Err(MatmulError::MalformedPartial { .. })));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let mut assembler = ResultAssembler::new(1, 3);
        let result = assembler.accept(partial(0, 0, vec![vec![1, 2]]));
        assert!(matches!(
            result,
            Err(MatmulError::MalformedPartial { reason, .. }) if reason.contains("expected 3")
        ));
    }

    #[test]
    fn test_incomplete_result_rejected() {
        let mut assembler = ResultAssembler::new(3, 1);
        assembler.accept(partial(0, 0, vec![vec![1]])).unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(MatmulError::IncompleteResult { missing: 2, total: 3 })
        ));
    }
}
