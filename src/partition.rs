use crate::error::{MatmulError, Result};
use std::fmt;
use std::ops::Range;

/// A contiguous row range `[start_row, end_row)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shard {
    pub worker_id: usize,
    pub start_row: usize,
    pub end_row: usize,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.end_row - self.start_row
    }

    pub fn is_empty(&self) -> bool {
        self.start_row == self.end_row
    }

    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.end_row
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} rows [{}, {})",
            self.worker_id, self.start_row, self.end_row
        )
    }
}

/// Worker count actually used for `total_rows`: never more workers than
/// rows, so no shard is empty.
pub fn effective_workers(total_rows: usize, num_workers: usize) -> usize {
    num_workers.min(total_rows)
}

/// Splits `[0, total_rows)` into contiguous shards of `total_rows /
/// num_workers` rows each; the last shard also takes the remainder.
///
/// `num_workers` is clamped to `total_rows`.
pub fn partition(total_rows: usize, num_workers: usize) -> Result<Vec<Shard>> {
    if total_rows == 0 {
        return Err(MatmulError::InvalidDimension {
            name: "total rows",
            value: total_rows,
        });
    }
    if num_workers == 0 {
        return Err(MatmulError::WorkerCountOutOfRange {
            requested: num_workers,
            max: total_rows,
        });
    }

    let workers = effective_workers(total_rows, num_workers);
    let base = total_rows / workers;
    let remainder = total_rows % workers;

    let shards = (0..workers)
        .map(|worker_id| {
            let start_row = worker_id * base;
            let mut end_row = start_row + base;
            if worker_id == workers - 1 {
                end_row += remainder;
            }
            Shard {
                worker_id,
                start_row,
                end_row,
            }
        })
        .collect();
    Ok(shards)
}
