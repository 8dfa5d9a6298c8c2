/// Layer pipeline model: fused hardware stages vs kernel-per-stage.
///
/// On the TPU, matrix multiply, accumulate, activation and normalize/pool
/// are wired back to back, so a new layer enters every cycle and layers
/// overlap. A CPU runs each stage as its own kernel with a memory round
/// trip in between, so one layer must leave the last stage before the next
/// can start.
///
///   fused:       layer l is in stage (c - l)        finishes at L + S - 1
///   sequential:  layer l is in stage (c - l·S)      finishes at L · S
use serde::{Deserialize, Serialize};

use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Compute,
    Buffer,
    /// Write to and read back from DRAM
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
}

impl Stage {
    fn new(name: &str, kind: StageKind) -> Self {
        Stage { name: name.to_string(), kind }
    }
}

/// Where a layer is on a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Not started
    Waiting,
    /// Occupying this stage index
    InStage(usize),
    /// Left the last stage
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSchedule {
    pub name: String,
    pub stages: Vec<Stage>,
    pub layers: usize,
    /// Whether a new layer may enter before the previous one leaves
    pub fused: bool,
}

impl PipelineSchedule {
    /// The TPU's fused matmul → accumulate → activate → normalize path.
    pub fn tpu(layers: usize) -> Self {
        PipelineSchedule {
            name: "TPU fused pipeline".to_string(),
            stages: vec![
                Stage::new("MatMul", StageKind::Compute),
                Stage::new("Accum", StageKind::Buffer),
                Stage::new("Act", StageKind::Compute),
                Stage::new("Norm", StageKind::Compute),
            ],
            layers,
            fused: true,
        }
    }

    /// A CPU running one kernel per stage with DRAM round trips between them.
    pub fn cpu(layers: usize) -> Self {
        PipelineSchedule {
            name: "CPU sequential kernels".to_string(),
            stages: vec![
                Stage::new("MatMul", StageKind::Compute),
                Stage::new("Mem", StageKind::Memory),
                Stage::new("Act", StageKind::Compute),
                Stage::new("Mem", StageKind::Memory),
                Stage::new("Norm", StageKind::Compute),
            ],
            layers,
            fused: false,
        }
    }

    /// Cycle a layer enters the first stage.
    fn start_cycle(&self, layer: usize) -> usize {
        if self.fused { layer } else { layer * self.stages.len() }
    }

    pub fn position(&self, cycle: usize, layer: usize) -> Position {
        let start = self.start_cycle(layer);
        if cycle < start {
            Position::Waiting
        } else if cycle - start >= self.stages.len() {
            Position::Done
        } else {
            Position::InStage(cycle - start)
        }
    }

    /// Position of every layer on `cycle`.
    pub fn snapshot(&self, cycle: usize) -> Vec<Position> {
        (0..self.layers).map(|l| self.position(cycle, l)).collect()
    }

    /// First cycle on which every layer is done.
    pub fn finish_cycle(&self) -> usize {
        if self.layers == 0 {
            return 0;
        }
        self.start_cycle(self.layers - 1) + self.stages.len()
    }

    /// DRAM round trips over the whole run.
    pub fn memory_round_trips(&self) -> usize {
        let per_layer = self.stages.iter().filter(|s| s.kind == StageKind::Memory).count();
        per_layer * self.layers
    }

    pub fn phase(&self, cycle: usize) -> Phase {
        Phase::from_progress(cycle, self.finish_cycle())
    }
}
