/// Live metrics for the TUI visualizer.
///
/// The CLI driver writes a JSON snapshot after every step. The viz binary
/// polls the file and re-renders the dashboard. Writes are atomic (write to
/// .tmp then rename) to avoid torn reads.
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::reference::Cursor;
use crate::sim::Simulation;
use crate::systolic::{CellStatus, Operands};

/// One systolic cell as the dashboard draws it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CellSnapshot {
    pub status: CellStatus,
    /// Running partial sum
    pub partial: i64,
    /// Operands multiplied on the last applied cycle
    #[serde(default)]
    pub operands: Option<Operands>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct LiveMetrics {
    /// "idle" | "running" | "complete"
    pub status: String,
    pub size: usize,
    pub accounting: String,
    /// Operands, as rows
    pub activations: Vec<Vec<i64>>,
    pub weights: Vec<Vec<i64>>,

    // ------------------------------------------------------------------
    // Systolic array
    // ------------------------------------------------------------------
    pub cycle: usize,
    pub total_cycles: usize,
    pub systolic_macs: u64,
    pub systolic_reads: u64,
    /// Row-major grid of cells
    pub cells: Vec<Vec<CellSnapshot>>,

    // ------------------------------------------------------------------
    // Sequential reference
    // ------------------------------------------------------------------
    pub reference_step: usize,
    pub total_steps: usize,
    pub reference_macs: u64,
    pub reference_reads: u64,
    #[serde(default)]
    pub reference_cursor: Option<Cursor>,
    pub reference_result: Vec<Vec<i64>>,
    /// Which result cells hold a finished dot product
    pub reference_complete: Vec<Vec<bool>>,

    /// Unix timestamp in ms when this snapshot was written
    pub timestamp_ms: u64,
}

impl LiveMetrics {
    /// Capture the current state of a simulation.
    pub fn capture(sim: &Simulation) -> Self {
        let systolic = sim.systolic();
        let reference = sim.reference();
        let n = systolic.size();
        let (a, b) = sim.operands();

        let status = if sim.is_complete() {
            "complete"
        } else if systolic.cycle() == 0 && reference.step() == 0 {
            "idle"
        } else {
            "running"
        };

        let cells = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| CellSnapshot {
                        status: systolic.cell_status(i, j),
                        partial: systolic.accumulators().get(i, j),
                        operands: systolic.in_flight(i, j),
                    })
                    .collect()
            })
            .collect();

        let reference_complete = (0..n)
            .map(|i| (0..n).map(|j| reference.cell_complete(i, j)).collect())
            .collect();

        LiveMetrics {
            status: status.to_string(),
            size: n,
            accounting: systolic.accounting().to_string(),
            activations: a.rows(),
            weights: b.rows(),
            cycle: systolic.cycle(),
            total_cycles: systolic.total_cycles(),
            systolic_macs: systolic.macs(),
            systolic_reads: systolic.reads(),
            cells,
            reference_step: reference.step(),
            total_steps: reference.total_steps(),
            reference_macs: reference.macs(),
            reference_reads: reference.reads(),
            reference_cursor: reference.cursor(),
            reference_result: reference.result().rows(),
            reference_complete,
            timestamp_ms: now_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

/// Atomically write metrics to `path`.
/// Uses a .tmp intermediate file + rename to avoid torn reads by the viz.
pub fn write_metrics(path: &str, metrics: &LiveMetrics) -> Result<()> {
    let json = serde_json::to_string(metrics)?;
    let tmp = format!("{}.tmp", path);
    let wrap = |source| SimError::Metrics { path: path.to_string(), source };
    std::fs::write(&tmp, &json).map_err(wrap)?;
    std::fs::rename(&tmp, path).map_err(wrap)
}

/// Read the latest metrics snapshot. Returns None if the file doesn't exist
/// or can't be parsed (e.g. no simulation has run yet).
pub fn read_metrics(path: &str) -> Option<LiveMetrics> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Returns current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::systolic::ReadAccounting;

    fn scenario() -> Simulation {
        let a = Matrix::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap();
        Simulation::with_matrices(a, b, ReadAccounting::RowEntry).unwrap()
    }

    #[test]
    fn capture_reflects_progress() {
        let mut sim = scenario();
        assert_eq!(LiveMetrics::capture(&sim).status, "idle");

        sim.step();
        let m = LiveMetrics::capture(&sim);
        assert_eq!(m.status, "running");
        assert_eq!(m.cycle, 1);
        assert_eq!(m.cells[0][0].status, CellStatus::Active);
        assert_eq!(m.cells[0][0].partial, 5);
        assert_eq!(m.reference_cursor, Some(Cursor { i: 0, j: 0, k: 1 }));

        sim.run_to_completion();
        let m = LiveMetrics::capture(&sim);
        assert_eq!(m.status, "complete");
        assert!(m.cells.iter().flatten().all(|c| c.status == CellStatus::Done));
        assert!(m.reference_complete.iter().flatten().all(|&done| done));
        assert_eq!(m.reference_result, vec![vec![19, 22], vec![43, 50]]);
    }

    #[test]
    fn snapshot_survives_write_and_read() {
        let mut sim = scenario();
        sim.step();
        sim.step();
        let metrics = LiveMetrics::capture(&sim);

        let path = std::env::temp_dir().join(format!("tpusim_metrics_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        write_metrics(&path, &metrics).unwrap();
        let back = read_metrics(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, metrics);
    }

    #[test]
    fn missing_snapshot_reads_as_none() {
        assert!(read_metrics("/nonexistent/tpusim_live.json").is_none());
    }
}
