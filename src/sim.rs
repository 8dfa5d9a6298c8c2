/// One comparison run: a pair of operand matrices driven through both the
/// systolic array and the sequential reference loop.
///
/// The simulation never steps itself. A driver (the CLI loop, a test) calls
/// `step()` at whatever cadence it likes; everything else is a read-only
/// query.
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::matrix::Matrix;
use crate::reference::{ReferenceMatmul, ReferenceState};
use crate::systolic::{ReadAccounting, SystolicArray, SystolicState};

/// Side-by-side totals for the two schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub size: usize,
    pub accounting: ReadAccounting,
    pub systolic_cycles: usize,
    pub reference_steps: usize,
    pub systolic_macs: u64,
    pub reference_macs: u64,
    pub systolic_reads: u64,
    pub reference_reads: u64,
    /// Both models are terminal and produced the same matrix
    pub results_match: bool,
}

impl ComparisonSummary {
    /// How many times more reads the reference loop needed.
    pub fn read_reduction(&self) -> f64 {
        if self.systolic_reads == 0 {
            return 0.0;
        }
        self.reference_reads as f64 / self.systolic_reads as f64
    }

    /// Reference steps per systolic cycle.
    pub fn step_ratio(&self) -> f64 {
        if self.systolic_cycles == 0 {
            return 0.0;
        }
        self.reference_steps as f64 / self.systolic_cycles as f64
    }
}

impl std::fmt::Display for ComparisonSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{0}x{0} matmul, read accounting: {1}", self.size, self.accounting)?;
        writeln!(
            f,
            "  systolic : {:>6} cycles  {:>6} MACs  {:>6} reads",
            self.systolic_cycles, self.systolic_macs, self.systolic_reads
        )?;
        writeln!(
            f,
            "  reference: {:>6} steps   {:>6} MACs  {:>6} reads",
            self.reference_steps, self.reference_macs, self.reference_reads
        )?;
        write!(
            f,
            "  {:.1}x fewer reads, {:.1}x fewer steps, results {}",
            self.read_reduction(),
            self.step_ratio(),
            if self.results_match { "match" } else { "differ" }
        )
    }
}

pub struct Simulation {
    config: SimConfig,
    rng: StdRng,
    systolic: SystolicArray,
    reference: ReferenceMatmul,
}

impl Simulation {
    /// Validate the config and generate the first pair of matrices.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (systolic, reference) = Self::build(&config, &mut rng)?;
        info!(
            "new {0}x{0} simulation, entries in [{1}, {2}], {3} accounting",
            config.size, config.value_min, config.value_max, config.accounting
        );
        Ok(Simulation { config, rng, systolic, reference })
    }

    /// A run over fixed operands. Later resets draw random matrices of the
    /// same size from the demo value range.
    pub fn with_matrices(a: Matrix, b: Matrix, accounting: ReadAccounting) -> Result<Self> {
        if a.size() != b.size() {
            return Err(SimError::ShapeMismatch(format!(
                "operands are {0}x{0} and {1}x{1}",
                a.size(),
                b.size()
            )));
        }
        let config = SimConfig { size: a.size(), accounting, ..SimConfig::demo() };
        config.validate()?;
        let systolic = SystolicArray::new(a.clone(), b.clone(), accounting)?;
        let reference = ReferenceMatmul::new(a, b)?;
        Ok(Simulation { config, rng: StdRng::from_entropy(), systolic, reference })
    }

    fn build(config: &SimConfig, rng: &mut StdRng) -> Result<(SystolicArray, ReferenceMatmul)> {
        let a = Matrix::random(config.size, config.value_min, config.value_max, rng)?;
        let b = Matrix::random(config.size, config.value_min, config.value_max, rng)?;
        let systolic = SystolicArray::new(a.clone(), b.clone(), config.accounting)?;
        let reference = ReferenceMatmul::new(a, b)?;
        Ok((systolic, reference))
    }

    /// Discard the current run and start over with fresh matrices. Both
    /// models are replaced together, so no half-reset state is observable.
    pub fn reset(&mut self) -> Result<(&Matrix, &Matrix)> {
        let (systolic, reference) = Self::build(&self.config, &mut self.rng)?;
        (self.systolic, self.reference) = (systolic, reference);
        info!("simulation reset with fresh {0}x{0} matrices", self.config.size);
        Ok(self.operands())
    }

    /// Advance the systolic array one cycle and the reference loop one MAC.
    /// Returns false once both are terminal.
    pub fn step(&mut self) -> bool {
        let systolic = self.systolic.advance_cycle();
        let reference = self.reference.advance_step();
        systolic || reference
    }

    pub fn is_complete(&self) -> bool {
        self.systolic.phase().is_terminal() && self.reference.phase().is_terminal()
    }

    /// Step until both models are terminal.
    pub fn run_to_completion(&mut self) -> ComparisonSummary {
        while self.step() {}
        self.summary()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn operands(&self) -> (&Matrix, &Matrix) {
        self.systolic.operands()
    }

    pub fn systolic(&self) -> &SystolicArray {
        &self.systolic
    }

    pub fn reference(&self) -> &ReferenceMatmul {
        &self.reference
    }

    pub fn systolic_state(&self) -> SystolicState {
        self.systolic.state()
    }

    pub fn reference_state(&self) -> ReferenceState {
        self.reference.state()
    }

    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            size: self.config.size,
            accounting: self.systolic.accounting(),
            systolic_cycles: self.systolic.cycle(),
            reference_steps: self.reference.step(),
            systolic_macs: self.systolic.macs(),
            reference_macs: self.reference.macs(),
            systolic_reads: self.systolic.reads(),
            reference_reads: self.reference.reads(),
            results_match: self.is_complete()
                && self.systolic.accumulators() == self.reference.result(),
        }
    }
}
