use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatmulError {
    #[error("Invalid dimension '{name}': {value} (must be a positive integer)")]
    InvalidDimension { name: &'static str, value: usize },

    #[error("Matrix dimensions incompatible: A is {a_rows}x{a_cols}, B is {b_rows}x{b_cols} (A columns must equal B rows)")]
    DimensionMismatch {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },

    #[error("Row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Product element ({row}, {col}) overflows a 64-bit integer")]
    Overflow { row: usize, col: usize },

    #[error("Worker count {requested} is out of range (min: 1, max: {max})")]
    WorkerCountOutOfRange { requested: usize, max: usize },

    #[error("Partial result rows {start}-{end} fall outside the {total}-row output")]
    ShardOutOfBounds { start: usize, end: usize, total: usize },

    #[error("Partial result for rows {start}-{end} overlaps row {row}, which is already filled")]
    OverlappingShard { start: usize, end: usize, row: usize },

    #[error("Partial result for rows {start}-{end} is malformed: {reason}")]
    MalformedPartial { start: usize, end: usize, reason: String },

    #[error("Result matrix is incomplete: {missing} of {total} rows were never filled")]
    IncompleteResult { missing: usize, total: usize },

    #[error("Worker {worker_id} failed: {reason}")]
    WorkerFailed { worker_id: usize, reason: String },

    #[error("Timed out after {waited:?} waiting for partial results ({received} of {expected} received)")]
    WorkerTimeout {
        received: usize,
        expected: usize,
        waited: Duration,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MatmulError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Errors the interactive front end recovers from by asking again.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimension { .. }
                | Self::DimensionMismatch { .. }
                | Self::WorkerCountOutOfRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MatmulError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let error = MatmulError::DimensionMismatch {
            a_rows: 2,
            a_cols: 3,
            b_rows: 4,
            b_cols: 2,
        };
        let display = error.to_string();
        assert!(display.contains("A is 2x3"));
        assert!(display.contains("B is 4x2"));
    }

    #[test]
    fn test_worker_count_display() {
        let error = MatmulError::WorkerCountOutOfRange {
            requested: 9,
            max: 4,
        };
        let display = error.to_string();
        assert!(display.contains("9"));
        assert!(display.contains("max: 4"));
    }

    #[test]
    fn test_io_error_mentions_path() {
        let error = MatmulError::io(
            "/nonexistent/final_result.txt",
            io::Error::new(io::ErrorKind::NotFound, "no such directory"),
        );
        let display = error.to_string();
        assert!(display.contains("/nonexistent/final_result.txt"));
        assert!(display.contains("no such directory"));
    }

    #[test]
    fn test_input_errors_are_recoverable() {
        assert!(MatmulError::InvalidDimension {
            name: "rows of A",
            value: 0
        }
        .is_input_error());
        assert!(MatmulError::WorkerCountOutOfRange {
            requested: 0,
            max: 2
        }
        .is_input_error());
        assert!(!MatmulError::WorkerFailed {
            worker_id: 1,
            reason: "boom".to_string()
        }
        .is_input_error());
    }

    #[test]
    fn test_overflow_display_names_element() {
        let display = MatmulError::Overflow { row: 1, col: 0 }.to_string();
        assert!(display.contains("(1, 0)"));
        assert!(display.contains("overflows"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<MatmulError>();
        assert_sync::<MatmulError>();
    }
}
