/// Systolic array timing model.
///
/// An N×N grid of multiply-accumulate cells computes C = A × B. Weights B are
/// pre-loaded into the array, activations A stream in from the left and each
/// cell keeps its own partial sum (output-stationary).
///
/// Inputs are skewed so that a diagonal wavefront sweeps the grid:
///
///   cell (i,j) consumes A[i][k] and B[k][j] at cycle t = i + j + k
///
/// so it is active exactly during cycles [i+j, i+j+N). The last cell
/// (N-1,N-1) finishes at cycle 3(N-1), giving 3N-2 cycles in total.
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix::{self, Matrix};
use crate::phase::Phase;

/// How memory reads are charged to the systolic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadAccounting {
    /// One read per activation, charged when it enters its row at column 0.
    /// Weights are treated as already resident. N² reads per run.
    #[default]
    RowEntry,
    /// Row-entry activation reads plus one read per weight, charged when row
    /// 0 of its column consumes it. 2N² reads per run.
    RowEntryWithWeightLoad,
}

impl ReadAccounting {
    pub fn counts_weights(&self) -> bool {
        *self == ReadAccounting::RowEntryWithWeightLoad
    }
}

impl std::fmt::Display for ReadAccounting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadAccounting::RowEntry               => write!(f, "row-entry"),
            ReadAccounting::RowEntryWithWeightLoad => write!(f, "row-entry+weights"),
        }
    }
}

/// The operand pair a cell multiplied on the last applied cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operands {
    /// Inner-product index
    pub k: usize,
    /// A[i][k]
    pub activation: i64,
    /// B[k][j]
    pub weight: i64,
}

/// Display status of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// The wavefront has not reached the cell yet
    Waiting,
    /// Operands were in flight on the last applied cycle
    Active,
    /// All N contributions received
    Done,
}

/// Whether cell (i,j) of an n×n array is active at cycle t.
pub fn cell_active(n: usize, t: usize, i: usize, j: usize) -> bool {
    t >= i + j && t - i - j < n
}

/// Cycles needed to finish an n×n multiply.
pub fn total_cycles(n: usize) -> usize {
    3 * n - 2
}

/// Read-only view of the systolic model for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystolicState {
    pub phase: Phase,
    pub cycle: usize,
    pub total_cycles: usize,
    pub macs: u64,
    pub reads: u64,
    pub activation_reads: u64,
    pub weight_reads: u64,
    pub accumulators: Matrix,
}

pub struct SystolicArray {
    n: usize,
    a: Matrix,
    b: Matrix,
    accounting: ReadAccounting,
    /// Cycles applied so far; the next cycle to apply
    cycle: usize,
    accumulators: Matrix,
    in_flight: Vec<Option<Operands>>,
    contributions: Vec<usize>,
    macs: u64,
    activation_reads: u64,
    weight_reads: u64,
}

impl SystolicArray {
    /// Build an array for A × B with zeroed accumulators at cycle 0.
    pub fn new(a: Matrix, b: Matrix, accounting: ReadAccounting) -> Result<Self> {
        let n = a.size();
        if b.size() != n {
            return Err(SimError::ShapeMismatch(format!(
                "activations are {0}x{0} but weights are {1}x{1}",
                n,
                b.size()
            )));
        }
        matrix::check_operands(&a, &b)?;

        Ok(SystolicArray {
            n,
            accumulators: Matrix::zeros(n)?,
            in_flight: vec![None; n * n],
            contributions: vec![0; n * n],
            a,
            b,
            accounting,
            cycle: 0,
            macs: 0,
            activation_reads: 0,
            weight_reads: 0,
        })
    }

    /// Apply one cycle of the wavefront. Returns false (and changes nothing)
    /// once the run is terminal, so callers may over-call.
    pub fn advance_cycle(&mut self) -> bool {
        let n = self.n;
        if self.cycle >= total_cycles(n) {
            return false;
        }
        let t = self.cycle;
        let mut active = 0usize;

        for i in 0..n {
            for j in 0..n {
                let idx = i * n + j;
                if !cell_active(n, t, i, j) {
                    self.in_flight[idx] = None;
                    continue;
                }
                let k = t - i - j;
                let activation = self.a.get(i, k);
                let weight = self.b.get(k, j);
                self.accumulators.add_at(i, j, activation * weight);
                self.in_flight[idx] = Some(Operands { k, activation, weight });
                self.contributions[idx] += 1;
                self.macs += 1;
                active += 1;

                // An activation is fetched once on entering its row and then
                // passed rightwards cell to cell.
                if j == 0 {
                    self.activation_reads += 1;
                }
                if i == 0 && self.accounting.counts_weights() {
                    self.weight_reads += 1;
                }
                trace!("cycle {} cell ({},{}) k={} {}x{}", t, i, j, k, activation, weight);
            }
        }

        self.cycle += 1;

        // Cells whose window closed on this cycle show as done right away.
        for i in 0..n {
            for j in 0..n {
                if self.cycle >= i + j + n {
                    self.in_flight[i * n + j] = None;
                }
            }
        }

        debug!(
            "systolic cycle {}/{}: {} active cells, {} MACs, {} reads",
            self.cycle,
            total_cycles(n),
            active,
            self.macs,
            self.reads()
        );
        if self.cycle == total_cycles(n) {
            info!(
                "systolic array finished {0}x{0} multiply in {1} cycles ({2} reads)",
                n,
                self.cycle,
                self.reads()
            );
        }
        true
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn total_cycles(&self) -> usize {
        total_cycles(self.n)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_progress(self.cycle, self.total_cycles())
    }

    pub fn accounting(&self) -> ReadAccounting {
        self.accounting
    }

    pub fn operands(&self) -> (&Matrix, &Matrix) {
        (&self.a, &self.b)
    }

    pub fn accumulators(&self) -> &Matrix {
        &self.accumulators
    }

    pub fn macs(&self) -> u64 {
        self.macs
    }

    pub fn reads(&self) -> u64 {
        self.activation_reads + self.weight_reads
    }

    /// Cells active at cycle t, in row-major order.
    pub fn active_cells(&self, t: usize) -> Vec<(usize, usize)> {
        let n = self.n;
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| cell_active(n, t, i, j))
            .collect()
    }

    /// Operands cell (i,j) multiplied on the last applied cycle, if any.
    /// Panics unless `i, j < n`.
    pub fn in_flight(&self, i: usize, j: usize) -> Option<Operands> {
        self.in_flight[i * self.n + j]
    }

    /// Number of products accumulated into cell (i,j) so far. Panics unless
    /// `i, j < n`.
    pub fn contributions(&self, i: usize, j: usize) -> usize {
        self.contributions[i * self.n + j]
    }

    pub fn cell_status(&self, i: usize, j: usize) -> CellStatus {
        if self.cycle >= i + j + self.n {
            CellStatus::Done
        } else if self.in_flight(i, j).is_some() {
            CellStatus::Active
        } else {
            CellStatus::Waiting
        }
    }

    pub fn state(&self) -> SystolicState {
        SystolicState {
            phase: self.phase(),
            cycle: self.cycle,
            total_cycles: self.total_cycles(),
            macs: self.macs,
            reads: self.reads(),
            activation_reads: self.activation_reads,
            weight_reads: self.weight_reads,
            accumulators: self.accumulators.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> SystolicArray {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
        SystolicArray::new(a, b, ReadAccounting::RowEntry).unwrap()
    }

    #[test]
    fn two_by_two_finishes_on_cycle_four() {
        let mut array = scenario();
        let expected = vec![vec![19, 22], vec![43, 50]];
        for _ in 0..3 {
            assert!(array.advance_cycle());
        }
        assert_eq!(array.cycle(), 3);
        assert_ne!(array.accumulators().rows(), expected);
        // Only (1,1) is still missing its second product.
        assert_eq!(array.accumulators().rows(), vec![vec![19, 22], vec![43, 18]]);

        assert!(array.advance_cycle());
        assert_eq!(array.cycle(), 4);
        assert_eq!(array.accumulators().rows(), expected);
        assert_eq!(array.phase(), Phase::Terminal);
    }

    #[test]
    fn advancing_past_terminal_is_a_no_op() {
        let mut array = scenario();
        while array.advance_cycle() {}
        let before = array.state();
        assert!(!array.advance_cycle());
        assert!(!array.advance_cycle());
        assert_eq!(array.state(), before);
    }

    #[test]
    fn phase_moves_idle_running_terminal() {
        let mut array = scenario();
        assert_eq!(array.phase(), Phase::Idle);
        array.advance_cycle();
        assert_eq!(array.phase(), Phase::Running);
        while array.advance_cycle() {}
        assert_eq!(array.phase(), Phase::Terminal);
    }

    #[test]
    fn in_flight_operands_follow_the_wavefront() {
        let mut array = scenario();
        array.advance_cycle();
        assert_eq!(
            array.in_flight(0, 0),
            Some(Operands { k: 0, activation: 1, weight: 5 })
        );
        assert_eq!(array.cell_status(0, 0), CellStatus::Active);
        assert_eq!(array.cell_status(1, 1), CellStatus::Waiting);

        array.advance_cycle();
        // (0,0) used k=1 on cycle 1 and its window is now closed.
        assert_eq!(array.in_flight(0, 0), None);
        assert_eq!(array.cell_status(0, 0), CellStatus::Done);
        assert_eq!(
            array.in_flight(0, 1),
            Some(Operands { k: 0, activation: 1, weight: 6 })
        );
        assert_eq!(
            array.in_flight(1, 0),
            Some(Operands { k: 0, activation: 3, weight: 5 })
        );
    }

    #[test]
    fn weight_loads_double_the_read_count() {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
        let mut plain = SystolicArray::new(a.clone(), b.clone(), ReadAccounting::RowEntry).unwrap();
        let mut loaded = SystolicArray::new(a, b, ReadAccounting::RowEntryWithWeightLoad).unwrap();
        while plain.advance_cycle() {}
        while loaded.advance_cycle() {}
        assert_eq!(plain.reads(), 4);
        assert_eq!(loaded.reads(), 8);
        assert_eq!(loaded.state().weight_reads, 4);
        assert_eq!(plain.accumulators(), loaded.accumulators());
    }

    #[test]
    fn mismatched_operands_are_rejected() {
        let a = Matrix::zeros(2).unwrap();
        let b = Matrix::zeros(3).unwrap();
        assert!(matches!(
            SystolicArray::new(a, b, ReadAccounting::RowEntry),
            Err(SimError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn most_negative_operand_is_rejected_before_stepping() {
        let a = Matrix::from_rows(vec![vec![i64::MIN]]).unwrap();
        let b = Matrix::from_rows(vec![vec![-1]]).unwrap();
        assert!(matches!(
            SystolicArray::new(a, b, ReadAccounting::RowEntry),
            Err(SimError::ValueOverflow { size: 1, min: i64::MIN, max: -1 })
        ));

        let a = Matrix::from_rows(vec![vec![i64::MAX]]).unwrap();
        let b = Matrix::from_rows(vec![vec![-1]]).unwrap();
        let mut array = SystolicArray::new(a, b, ReadAccounting::RowEntry).unwrap();
        assert!(array.advance_cycle());
        assert_eq!(array.accumulators().get(0, 0), -i64::MAX);
    }

    #[test]
    fn one_by_one_takes_a_single_cycle() {
        let a = Matrix::from_rows(vec![vec![3]]).unwrap();
        let b = Matrix::from_rows(vec![vec![4]]).unwrap();
        let mut array = SystolicArray::new(a, b, ReadAccounting::RowEntry).unwrap();
        assert_eq!(array.total_cycles(), 1);
        assert!(array.advance_cycle());
        assert!(!array.advance_cycle());
        assert_eq!(array.accumulators().get(0, 0), 12);
    }
}
