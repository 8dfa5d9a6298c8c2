/// Sequential reference matmul: the textbook i/j/k triple loop, one
/// multiply-accumulate per step. Both operands are fetched from memory on
/// every step, so it is the no-reuse baseline for the systolic array.
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix::{self, Matrix};
use crate::phase::Phase;

/// Reads charged per MAC: one for A[i][k], one for B[k][j].
pub const READS_PER_MAC: u64 = 2;

/// Position of the next multiply-accumulate in loop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

/// Read-only view of the reference model for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceState {
    pub phase: Phase,
    pub step: usize,
    pub total_steps: usize,
    pub macs: u64,
    pub reads: u64,
    /// Next (i,j,k) to compute; None once terminal
    pub cursor: Option<Cursor>,
    pub result: Matrix,
}

pub struct ReferenceMatmul {
    n: usize,
    a: Matrix,
    b: Matrix,
    cursor: Cursor,
    done: bool,
    step: usize,
    result: Matrix,
    macs: u64,
    reads: u64,
}

/// Steps needed to finish an n×n multiply.
pub fn total_steps(n: usize) -> usize {
    n * n * n
}

impl ReferenceMatmul {
    pub fn new(a: Matrix, b: Matrix) -> Result<Self> {
        let n = a.size();
        if b.size() != n {
            return Err(SimError::ShapeMismatch(format!(
                "left operand is {0}x{0} but right is {1}x{1}",
                n,
                b.size()
            )));
        }
        matrix::check_operands(&a, &b)?;
        Ok(ReferenceMatmul {
            n,
            result: Matrix::zeros(n)?,
            a,
            b,
            cursor: Cursor::default(),
            done: false,
            step: 0,
            macs: 0,
            reads: 0,
        })
    }

    /// Perform one MAC and move the cursor. Returns false (and changes
    /// nothing) once all N³ steps are done.
    pub fn advance_step(&mut self) -> bool {
        if self.done {
            return false;
        }
        let Cursor { i, j, k } = self.cursor;
        self.result.add_at(i, j, self.a.get(i, k) * self.b.get(k, j));
        self.macs += 1;
        self.reads += READS_PER_MAC;
        self.step += 1;

        let n = self.n;
        self.cursor.k += 1;
        if self.cursor.k == n {
            self.cursor.k = 0;
            self.cursor.j += 1;
            debug!("reference finished C[{}][{}] = {}", i, j, self.result.get(i, j));
            if self.cursor.j == n {
                self.cursor.j = 0;
                self.cursor.i += 1;
                if self.cursor.i == n {
                    self.done = true;
                    info!(
                        "reference loop finished {0}x{0} multiply in {1} steps ({2} reads)",
                        n, self.step, self.reads
                    );
                }
            }
        }
        true
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn total_steps(&self) -> usize {
        total_steps(self.n)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_progress(self.step, self.total_steps())
    }

    pub fn cursor(&self) -> Option<Cursor> {
        if self.done { None } else { Some(self.cursor) }
    }

    pub fn result(&self) -> &Matrix {
        &self.result
    }

    pub fn macs(&self) -> u64 {
        self.macs
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Whether the dot product for C[i][j] is complete.
    pub fn cell_complete(&self, i: usize, j: usize) -> bool {
        self.done || (i, j) < (self.cursor.i, self.cursor.j)
    }

    pub fn state(&self) -> ReferenceState {
        ReferenceState {
            phase: self.phase(),
            step: self.step,
            total_steps: self.total_steps(),
            macs: self.macs,
            reads: self.reads,
            cursor: self.cursor(),
            result: self.result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> ReferenceMatmul {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
        ReferenceMatmul::new(a, b).unwrap()
    }

    #[test]
    fn cursor_walks_in_loop_order() {
        let mut r = scenario();
        let mut seen = Vec::new();
        while let Some(c) = r.cursor() {
            seen.push((c.i, c.j, c.k));
            r.advance_step();
        }
        assert_eq!(
            seen,
            vec![
                (0, 0, 0), (0, 0, 1), (0, 1, 0), (0, 1, 1),
                (1, 0, 0), (1, 0, 1), (1, 1, 0), (1, 1, 1),
            ]
        );
        assert_eq!(r.result().rows(), vec![vec![19, 22], vec![43, 50]]);
    }

    #[test]
    fn every_step_charges_two_reads() {
        let mut r = scenario();
        r.advance_step();
        assert_eq!((r.macs(), r.reads()), (1, 2));
        while r.advance_step() {}
        assert_eq!((r.macs(), r.reads()), (8, 16));
        assert_eq!(r.step(), 8);
    }

    #[test]
    fn most_negative_operand_is_rejected() {
        let a = Matrix::from_rows(vec![vec![i64::MIN]]).unwrap();
        let b = Matrix::from_rows(vec![vec![-1]]).unwrap();
        assert!(matches!(ReferenceMatmul::new(a, b), Err(SimError::ValueOverflow { .. })));
    }

    #[test]
    fn terminal_is_absorbing() {
        let mut r = scenario();
        assert_eq!(r.phase(), Phase::Idle);
        r.advance_step();
        assert_eq!(r.phase(), Phase::Running);
        while r.advance_step() {}
        assert_eq!(r.phase(), Phase::Terminal);
        let before = r.state();
        assert!(!r.advance_step());
        assert_eq!(r.state(), before);
        assert_eq!(before.cursor, None);
    }

    #[test]
    fn completed_cells_track_the_cursor() {
        let mut r = scenario();
        assert!(!r.cell_complete(0, 0));
        r.advance_step();
        r.advance_step();
        assert!(r.cell_complete(0, 0));
        assert!(!r.cell_complete(0, 1));
        assert!(!r.cell_complete(1, 0));
    }
}
