/// Square integer matrices used as operands and results.
/// Stored flat in row-major order with exact integer arithmetic, so results
/// from different schedules can be compared with `==`.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Largest supported matrix dimension.
pub const MAX_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    n: usize,
    data: Vec<i64>,
}

/// Reject sizes the simulator cannot represent.
pub fn check_size(n: usize) -> Result<()> {
    if n == 0 || n > MAX_SIZE {
        return Err(SimError::InvalidSize { size: n, max: MAX_SIZE });
    }
    Ok(())
}

impl Matrix {
    /// An n×n matrix of zeros.
    pub fn zeros(n: usize) -> Result<Self> {
        check_size(n)?;
        Ok(Matrix { n, data: vec![0; n * n] })
    }

    /// Build from explicit rows. Every row must have as many entries as
    /// there are rows.
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Self> {
        let n = rows.len();
        check_size(n)?;
        let mut data = Vec::with_capacity(n * n);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n {
                return Err(SimError::ShapeMismatch(format!(
                    "row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            data.extend(row);
        }
        Ok(Matrix { n, data })
    }

    /// Random entries drawn uniformly from the inclusive range [min, max].
    pub fn random<R: Rng + ?Sized>(n: usize, min: i64, max: i64, rng: &mut R) -> Result<Self> {
        check_size(n)?;
        if min > max {
            return Err(SimError::InvalidRange { min, max });
        }
        let data = (0..n * n).map(|_| rng.gen_range(min..=max)).collect();
        Ok(Matrix { n, data })
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Entry (i, j). Panics unless both indices are below `size()`.
    pub fn get(&self, i: usize, j: usize) -> i64 {
        self.data[i * self.n + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: i64) {
        self.data[i * self.n + j] = value;
    }

    /// Panics unless both indices are below `size()`.
    pub fn add_at(&mut self, i: usize, j: usize, value: i64) {
        self.data[i * self.n + j] += value;
    }

    /// Copy out as nested rows (for JSON snapshots and display).
    pub fn rows(&self) -> Vec<Vec<i64>> {
        self.data.chunks(self.n).map(|r| r.to_vec()).collect()
    }

    /// Exact product self × rhs computed directly, used as the ground truth
    /// both step models are checked against.
    pub fn multiply(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.n != rhs.n {
            return Err(SimError::ShapeMismatch(format!(
                "cannot multiply {0}x{0} by {1}x{1}",
                self.n, rhs.n
            )));
        }
        check_operands(self, rhs)?;
        let n = self.n;
        let mut out = Matrix::zeros(n)?;
        for i in 0..n {
            for j in 0..n {
                let dot = (0..n).map(|k| self.get(i, k) * rhs.get(k, j)).sum();
                out.set(i, j, dot);
            }
        }
        Ok(out)
    }

    /// Largest absolute entry. `i64::MIN` maps to 2^63, not `i64::MAX`.
    pub fn max_abs(&self) -> u64 {
        self.data.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0)
    }

    /// Smallest and largest entries.
    pub fn value_range(&self) -> (i64, i64) {
        let min = self.data.iter().copied().min().unwrap_or(0);
        let max = self.data.iter().copied().max().unwrap_or(0);
        (min, max)
    }
}

/// Whether an N-term dot product with operands bounded by `a_bound` and
/// `b_bound` in absolute value always fits in i64.
pub fn dot_fits(n: usize, a_bound: u64, b_bound: u64) -> bool {
    (a_bound as u128)
        .checked_mul(b_bound as u128)
        .and_then(|v| v.checked_mul(n as u128))
        .is_some_and(|worst| worst <= i64::MAX as u128)
}

/// Check that an N-term dot product of values in [min, max] cannot overflow.
pub fn check_dot_range(n: usize, min: i64, max: i64) -> Result<()> {
    let bound = min.unsigned_abs().max(max.unsigned_abs());
    if !dot_fits(n, bound, bound) {
        return Err(SimError::ValueOverflow { size: n, min, max });
    }
    Ok(())
}

/// Check that every dot product of `a`'s rows with `b`'s columns fits in i64.
pub fn check_operands(a: &Matrix, b: &Matrix) -> Result<()> {
    if dot_fits(a.n, a.max_abs(), b.max_abs()) {
        return Ok(());
    }
    let (a_min, a_max) = a.value_range();
    let (b_min, b_max) = b.value_range();
    Err(SimError::ValueOverflow {
        size: a.n,
        min: a_min.min(b_min),
        max: a_max.max(b_max),
    })
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .data
            .iter()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);
        for row in self.data.chunks(self.n) {
            let cells: Vec<String> = row.iter().map(|v| format!("{:>width$}", v)).collect();
            writeln!(f, "[ {} ]", cells.join(" "))?;
        }
        Ok(())
    }
}
