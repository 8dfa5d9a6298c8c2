/// Performance summaries from the TPU paper: relative performance per die
/// (Table 6), performance per Watt (Figure 9) and MLP0 latency against
/// throughput (Table 4).
use serde::{Deserialize, Serialize};

use crate::roofline::{Application, NetworkKind};

/// A GPU and TPU figure relative to the Haswell CPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relative {
    pub gpu: f64,
    pub tpu: f64,
}

/// Table 6 summary rows as published.
pub const PUBLISHED_GEOMETRIC_MEAN: Relative = Relative { gpu: 1.1, tpu: 14.5 };
pub const PUBLISHED_WEIGHTED_MEAN: Relative = Relative { gpu: 1.9, tpu: 29.2 };

/// Weighted arithmetic mean. None when the inputs differ in length, are
/// empty, or the weights do not sum to something positive.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.is_empty() || values.len() != weights.len() || weights.iter().any(|&w| w < 0.0) {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let sum: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Some(sum / total)
}

/// Per-application weights from the deployment mix. Each network type's
/// share is split evenly between the benchmarks of that type.
pub fn deployment_weights(apps: &[Application]) -> Vec<f64> {
    let count = |kind: NetworkKind| apps.iter().filter(|a| a.kind == kind).count() as f64;
    apps.iter()
        .map(|a| a.deploy_pct as f64 / count(a.kind))
        .collect()
}

/// Whether host server power is charged to the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerBasis {
    /// Includes the host server
    Total,
    /// Accelerator power only
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeanKind {
    Geometric,
    Weighted,
}

impl std::fmt::Display for PowerBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerBasis::Total       => write!(f, "total"),
            PowerBasis::Incremental => write!(f, "incremental"),
        }
    }
}

impl std::fmt::Display for MeanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeanKind::Geometric => write!(f, "GM"),
            MeanKind::Weighted  => write!(f, "WM"),
        }
    }
}

/// One bar group of Figure 9: performance/Watt relative to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerfPerWatt {
    pub basis: PowerBasis,
    pub mean: MeanKind,
    pub gpu: f64,
    pub tpu: f64,
    pub tpu_prime: f64,
}

pub fn perf_per_watt() -> Vec<PerfPerWatt> {
    let row = |basis, mean, gpu, tpu, tpu_prime| PerfPerWatt { basis, mean, gpu, tpu, tpu_prime };
    vec![
        row(PowerBasis::Total, MeanKind::Geometric, 1.2, 17.0, 31.0),
        row(PowerBasis::Total, MeanKind::Weighted, 2.1, 34.0, 86.0),
        row(PowerBasis::Incremental, MeanKind::Geometric, 1.7, 41.0, 69.0),
        row(PowerBasis::Incremental, MeanKind::Weighted, 2.9, 83.0, 196.0),
    ]
}

/// One measured MLP0 operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    /// Chip key: "cpu", "gpu" or "tpu"
    pub chip: String,
    pub batch: u32,
    /// 99th-percentile response time
    pub latency_ms: f64,
    /// Inferences per second
    pub ips: u32,
    /// Throughput as a percentage of the chip's best
    pub pct_max: u32,
}

pub fn latency_throughput() -> Vec<LatencyPoint> {
    let point = |chip: &str, batch, latency_ms, ips, pct_max| LatencyPoint {
        chip: chip.to_string(),
        batch,
        latency_ms,
        ips,
        pct_max,
    };
    vec![
        point("cpu", 16, 7.2, 5_482, 42),
        point("cpu", 64, 21.3, 13_194, 100),
        point("gpu", 16, 6.7, 13_461, 37),
        point("gpu", 64, 8.3, 36_465, 100),
        point("tpu", 200, 7.0, 225_000, 80),
        point("tpu", 250, 10.0, 280_000, 100),
    ]
}

/// Largest-batch point for `chip` that still meets `deadline_ms`.
pub fn best_within_deadline<'a>(
    points: &'a [LatencyPoint],
    chip: &str,
    deadline_ms: f64,
) -> Option<&'a LatencyPoint> {
    points
        .iter()
        .filter(|p| p.chip == chip && p.latency_ms <= deadline_ms)
        .max_by_key(|p| p.batch)
}

/// Highest-throughput point for `chip`, ignoring latency.
pub fn peak_throughput<'a>(points: &'a [LatencyPoint], chip: &str) -> Option<&'a LatencyPoint> {
    points.iter().filter(|p| p.chip == chip).max_by_key(|p| p.ips)
}
