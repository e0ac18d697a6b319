use crate::error::{MatmulError, Result};
use rand::Rng;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub type Row = Vec<i64>;

/// Dense row-major integer matrix. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Row>,
}

impl Matrix {
    /// Builds a matrix from rows; every row must have the same length.
    pub fn from_rows(data: Vec<Row>) -> Result<Self> {
        let rows = data.len();
        let cols = data.first().map_or(0, Vec::len);
        if let Some((index, row)) = data.iter().enumerate().find(|(_, row)| row.len() != cols) {
            return Err(MatmulError::RaggedRow {
                row: index,
                found: row.len(),
                expected: cols,
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Skips the shape check, for tests that need a matrix whose rows
    /// disagree with its declared shape.
    #[cfg(test)]
    pub(crate) fn from_parts_unchecked(rows: usize, cols: usize, data: Vec<Row>) -> Self {
        Self { rows, cols, data }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![vec![0; cols]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[i64] {
        &self.data[index]
    }

    pub fn as_rows(&self) -> &[Row] {
        &self.data
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.data
    }

    pub fn check_multipliable(&self, other: &Matrix) -> Result<()> {
        if self.cols != other.rows {
            return Err(MatmulError::DimensionMismatch {
                a_rows: self.rows,
                a_cols: self.cols,
                b_rows: other.rows,
                b_cols: other.cols,
            });
        }
        Ok(())
    }

    /// Row `i` of `self * other`: the dot product of row `i` with every
    /// column of `other`. Fails instead of wrapping when an element does not
    /// fit in `i64`.
    pub fn product_row(&self, i: usize, other: &Matrix) -> Result<Row> {
        let left = &self.data[i];
        (0..other.cols)
            .map(|j| {
                left.iter()
                    .zip(other.data.iter())
                    .try_fold(0i64, |sum, (&a, b_row)| {
                        a.checked_mul(b_row[j]).and_then(|term| sum.checked_add(term))
                    })
                    .ok_or(MatmulError::Overflow { row: i, col: j })
            })
            .collect()
    }

    /// Sequential triple-loop product, the reference every parallel run
    /// must reproduce.
    pub fn multiply_naive(&self, other: &Matrix) -> Result<Matrix> {
        self.check_multipliable(other)?;
        let mut data = vec![vec![0i64; other.cols]; self.rows];
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = 0i64;
                for k in 0..self.cols {
                    sum = self.data[i][k]
                        .checked_mul(other.data[k][j])
                        .and_then(|term| sum.checked_add(term))
                        .ok_or(MatmulError::Overflow { row: i, col: j })?;
                }
                data[i][j] = sum;
            }
        }
        Ok(Matrix {
            rows: self.rows,
            cols: other.cols,
            data,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        write_rows(path, &self.data).map_err(|err| MatmulError::io(path, err))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.data {
            writeln!(f, "{}", format_row(row))?;
        }
        Ok(())
    }
}

/// Space-separated values, as written to every result file.
pub fn format_row(row: &[i64]) -> String {
    row.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One row per line. Creates or truncates `path`.
pub fn write_rows(path: &Path, rows: &[Row]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        writeln!(writer, "{}", format_row(row))?;
    }
    writer.flush()
}

/// Parses the text written by [`write_rows`].
pub fn parse_rows(content: &str) -> std::result::Result<Vec<Row>, std::num::ParseIntError> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(str::parse::<i64>)
                .collect::<std::result::Result<Row, _>>()
        })
        .collect()
}

pub struct MatrixGenerator {
    min_value: i64,
    max_value: i64,
}

impl MatrixGenerator {
    pub fn new(min_value: i64, max_value: i64) -> Self {
        Self {
            min_value,
            max_value,
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rows: usize, cols: usize, rng: &mut R) -> Matrix {
        let data = (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| rng.gen_range(self.min_value..=self.max_value))
                    .collect()
            })
            .collect();
        Matrix { rows, cols, data }
    }
}

impl Default for MatrixGenerator {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    fn m(rows: &[&[i64]]) -> Matrix {
        Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_known_product() {
        let a = m(&[&[1, 2, 3], &[4, 5, 6]]);
        let b = m(&[&[7, 8], &[9, 10], &[11, 12]]);
        let c = a.multiply_naive(&b).unwrap();
        assert_eq!(c, m(&[&[58, 64], &[139, 154]]));
    }

    #[test]
    fn test_product_row_matches_naive() {
        let mut rng = StdRng::seed_from_u64(7);
        let generator = MatrixGenerator::default();
        let a = generator.generate(5, 4, &mut rng);
        let b = generator.generate(4, 3, &mut rng);
        let c = a.multiply_naive(&b).unwrap();
        for i in 0..a.rows() {
            assert_eq!(a.product_row(i, &b).unwrap(), c.row(i));
        }
    }

    #[test]
    fn test_mismatch_rejected() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(4, 2);
        assert!(matches!(
            a.multiply_naive(&b),
            Err(MatmulError::DimensionMismatch { a_cols: 3, b_rows: 4, .. })
        ));
    }

    #[test]
    fn test_overflow_is_an_error_not_a_wrapped_value() {
        // each term fits, the sum of two does not
        let big = 3_000_000_000;
        let a = m(&[&[big, big]]);
        let b = m(&[&[big], &[big]]);
        assert!(matches!(
            a.product_row(0, &b),
            Err(MatmulError::Overflow { row: 0, col: 0 })
        ));
        assert!(matches!(
            a.multiply_naive(&b),
            Err(MatmulError::Overflow { row: 0, col: 0 })
        ));

        let single = m(&[&[i64::MAX]]);
        let two = m(&[&[2]]);
        assert!(single.product_row(0, &two).is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = Matrix::from_rows(vec![vec![1, 2], vec![3]]);
        assert!(matches!(
            result,
            Err(MatmulError::RaggedRow { row: 1, found: 1, expected: 2 })
        ));
    }

    #[test]
    fn test_generator_respects_range_and_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        let matrix = MatrixGenerator::new(1, 100).generate(6, 9, &mut rng);
        assert_eq!((matrix.rows(), matrix.cols()), (6, 9));
        assert!(matrix
            .as_rows()
            .iter()
            .flatten()
            .all(|&value| (1..=100).contains(&value)));
    }

    #[test]
    fn test_generator_is_deterministic_for_seed() {
        let generator = MatrixGenerator::default();
        let first = generator.generate(3, 3, &mut StdRng::seed_from_u64(1));
        let second = generator.generate(3, 3, &mut StdRng::seed_from_u64(1));
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_and_parse_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("final_result.txt");
        let matrix = m(&[&[1, 22, 333], &[-4, 0, 6]]);
        matrix.save_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "1 22 333\n-4 0 6\n");
        assert_eq!(parse_rows(&content).unwrap(), matrix.into_rows());
    }

    #[test]
    fn test_save_into_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("final_result.txt");
        assert!(matches!(
            Matrix::zeros(1, 1).save_to_file(&path),
            Err(MatmulError::Io { .. })
        ));
    }

    #[test]
    fn test_display_uses_row_format() {
        assert_eq!(m(&[&[1, 2], &[3, 4]]).to_string(), "1 2\n3 4\n");
    }
}
