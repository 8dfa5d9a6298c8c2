/// Roofline model for the three chips compared in the TPU paper
/// (Jouppi et al., ISCA '17, Tables 1, 2 and 6).
///
/// The x axis is operational intensity in MAC ops per weight byte. One MAC
/// is two ops, so for a chip with peak P TOPS and memory bandwidth W GB/s:
///
///   attainable(x) = min(P, 2·W·x / 1000)      TOPS
///   ridge         = P / (2·W) · 1000          MACs/byte
///
/// Workloads left of the ridge are memory-bound; right of it, compute-bound.
use serde::{Deserialize, Serialize};

/// Hardware description of one chip (per die).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    pub key: String,
    pub name: String,
    pub die_mm2: u32,
    pub process_nm: u32,
    pub clock_mhz: u32,
    pub tdp_watts: u32,
    /// Peak throughput used for the roofline, in TOPS
    pub peak_tops: f64,
    /// Off-chip memory bandwidth in GB/s
    pub mem_bw_gb_s: f64,
    /// On-chip memory in MiB
    pub on_chip_mib: u32,
}

impl Chip {
    /// Haswell E5-2699 v3 server CPU. Peak is the FP figure the paper plots.
    pub fn haswell() -> Self {
        Chip {
            key: "cpu".to_string(),
            name: "Haswell CPU".to_string(),
            die_mm2: 662,
            process_nm: 22,
            clock_mhz: 2300,
            tdp_watts: 145,
            peak_tops: 1.3,
            mem_bw_gb_s: 51.0,
            on_chip_mib: 51,
        }
    }

    /// NVIDIA K80, one die.
    pub fn k80() -> Self {
        Chip {
            key: "gpu".to_string(),
            name: "K80 GPU".to_string(),
            die_mm2: 561,
            process_nm: 28,
            clock_mhz: 560,
            tdp_watts: 150,
            peak_tops: 2.8,
            mem_bw_gb_s: 160.0,
            on_chip_mib: 8,
        }
    }

    /// First-generation TPU: 256×256 8-bit MAC array at 700 MHz on DDR3.
    pub fn tpu() -> Self {
        Chip {
            key: "tpu".to_string(),
            name: "TPU".to_string(),
            die_mm2: 331,
            process_nm: 28,
            clock_mhz: 700,
            tdp_watts: 75,
            peak_tops: 92.0,
            mem_bw_gb_s: 34.0,
            on_chip_mib: 28,
        }
    }

    /// The paper's hypothetical TPU' with GDDR5 memory.
    pub fn tpu_prime() -> Self {
        Chip {
            key: "tpu_prime".to_string(),
            name: "TPU'".to_string(),
            ..Self::tpu()
        }
        .with_mem_bw(180.0)
    }

    pub fn all() -> Vec<Chip> {
        vec![Self::haswell(), Self::k80(), Self::tpu()]
    }

    /// Same chip with different memory bandwidth.
    pub fn with_mem_bw(mut self, mem_bw_gb_s: f64) -> Self {
        self.mem_bw_gb_s = mem_bw_gb_s;
        self
    }

    /// Peak throughput per Watt of TDP, in GOPS/W.
    pub fn peak_gops_per_watt(&self) -> f64 {
        self.peak_tops * 1e3 / self.tdp_watts as f64
    }

    /// Best achievable TOPS at `macs_per_byte`.
    pub fn attainable_tops(&self, macs_per_byte: f64) -> f64 {
        self.peak_tops.min(2.0 * self.mem_bw_gb_s * macs_per_byte / 1e3)
    }

    /// Operational intensity where the bandwidth slope meets the compute roof.
    pub fn ridge_point(&self) -> f64 {
        self.peak_tops / (2.0 * self.mem_bw_gb_s) * 1e3
    }

    pub fn bound(&self, macs_per_byte: f64) -> Bound {
        if macs_per_byte < self.ridge_point() {
            Bound::Memory
        } else {
            Bound::Compute
        }
    }

    /// `points` samples of the roofline, log-spaced over [x_min, x_max].
    pub fn curve(&self, x_min: f64, x_max: f64, points: usize) -> Vec<(f64, f64)> {
        if points < 2 || x_min <= 0.0 || x_max <= x_min {
            return Vec::new();
        }
        let (lo, hi) = (x_min.log10(), x_max.log10());
        (0..points)
            .map(|i| {
                let x = 10f64.powf(lo + (hi - lo) * i as f64 / (points - 1) as f64);
                (x, self.attainable_tops(x))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    Memory,
    Compute,
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Memory  => write!(f, "memory-bound"),
            Bound::Compute => write!(f, "compute-bound"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    Mlp,
    Lstm,
    Cnn,
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Mlp  => write!(f, "MLP"),
            NetworkKind::Lstm => write!(f, "LSTM"),
            NetworkKind::Cnn  => write!(f, "CNN"),
        }
    }
}

/// Measured TOPS per die for one application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measured {
    pub cpu: f64,
    pub gpu: f64,
    pub tpu: f64,
}

impl Measured {
    pub fn for_chip(&self, key: &str) -> Option<f64> {
        match key {
            "cpu" => Some(self.cpu),
            "gpu" => Some(self.gpu),
            "tpu" => Some(self.tpu),
            // TPU' was never built, so it has no measurements.
            _ => None,
        }
    }
}

/// One of the six production inference workloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub kind: NetworkKind,
    pub layers: u32,
    /// Weights, in millions
    pub weights_m: u32,
    /// Operational intensity, MAC ops per weight byte
    pub macs_per_byte: f64,
    pub batch_size: u32,
    /// Share of deployed TPUs running this network type, in percent
    pub deploy_pct: u32,
    pub measured: Measured,
}

/// The paper's six benchmark applications.
pub fn applications() -> Vec<Application> {
    let app = |name: &str,
               kind: NetworkKind,
               layers: u32,
               weights_m: u32,
               macs_per_byte: f64,
               batch_size: u32,
               deploy_pct: u32,
               measured: Measured| {
        Application {
            name: name.to_string(),
            kind,
            layers,
            weights_m,
            macs_per_byte,
            batch_size,
            deploy_pct,
            measured,
        }
    };
    vec![
        app("MLP0", NetworkKind::Mlp, 5, 20, 200.0, 200, 61,
            Measured { cpu: 0.30, gpu: 0.75, tpu: 12.3 }),
        app("MLP1", NetworkKind::Mlp, 4, 5, 168.0, 168, 61,
            Measured { cpu: 0.52, gpu: 0.16, tpu: 9.7 }),
        app("LSTM0", NetworkKind::Lstm, 58, 52, 64.0, 64, 29,
            Measured { cpu: 1.06, gpu: 0.42, tpu: 3.7 }),
        app("LSTM1", NetworkKind::Lstm, 56, 34, 96.0, 96, 29,
            Measured { cpu: 0.58, gpu: 0.70, tpu: 2.8 }),
        app("CNN0", NetworkKind::Cnn, 16, 8, 2888.0, 8, 5,
            Measured { cpu: 1.34, gpu: 2.15, tpu: 86.0 }),
        app("CNN1", NetworkKind::Cnn, 89, 100, 1750.0, 32, 5,
            Measured { cpu: 0.20, gpu: 0.54, tpu: 14.1 }),
    ]
}

/// Where one application lands on one chip's roofline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RooflinePoint {
    pub app: String,
    pub chip: String,
    pub macs_per_byte: f64,
    pub attainable_tops: f64,
    pub measured_tops: Option<f64>,
    pub bound: Bound,
}

impl RooflinePoint {
    /// Measured throughput as a fraction of the roofline ceiling.
    pub fn efficiency(&self) -> Option<f64> {
        let measured = self.measured_tops?;
        if self.attainable_tops <= 0.0 {
            return None;
        }
        Some(measured / self.attainable_tops)
    }
}

/// Place every application on `chip`'s roofline.
pub fn analyze(chip: &Chip, apps: &[Application]) -> Vec<RooflinePoint> {
    apps.iter()
        .map(|a| RooflinePoint {
            app: a.name.clone(),
            chip: chip.key.clone(),
            macs_per_byte: a.macs_per_byte,
            attainable_tops: chip.attainable_tops(a.macs_per_byte),
            measured_tops: a.measured.for_chip(&chip.key),
            bound: chip.bound(a.macs_per_byte),
        })
        .collect()
}

/// Per-die performance relative to the Haswell CPU (Table 6), in
/// application order MLP0, MLP1, LSTM0, LSTM1, CNN0, CNN1.
pub const RELATIVE_PERF_GPU: [f64; 6] = [2.5, 0.3, 0.4, 1.2, 1.6, 2.7];
pub const RELATIVE_PERF_TPU: [f64; 6] = [41.0, 18.5, 3.5, 1.2, 40.3, 71.0];

pub fn geometric_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|&v| v <= 0.0) {
        return None;
    }
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    Some((log_sum / values.len() as f64).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ridge_points_match_the_paper() {
        assert!((Chip::tpu().ridge_point() - 1352.9).abs() < 0.1);
        assert!((Chip::haswell().ridge_point() - 12.7).abs() < 0.1);
        assert!((Chip::k80().ridge_point() - 8.75).abs() < 1e-9);
    }

    #[test]
    fn attainable_is_capped_by_peak() {
        let tpu = Chip::tpu();
        assert!((tpu.attainable_tops(200.0) - 13.6).abs() < 1e-9);
        assert_eq!(tpu.attainable_tops(5000.0), 92.0);
    }

    #[test]
    fn most_workloads_are_memory_bound_on_the_tpu() {
        let points = analyze(&Chip::tpu(), &applications());
        let bound: Vec<(&str, Bound)> = points.iter().map(|p| (p.app.as_str(), p.bound)).collect();
        assert_eq!(
            bound,
            vec![
                ("MLP0", Bound::Memory),
                ("MLP1", Bound::Memory),
                ("LSTM0", Bound::Memory),
                ("LSTM1", Bound::Memory),
                ("CNN0", Bound::Compute),
                ("CNN1", Bound::Compute),
            ]
        );
        for p in &points {
            assert!(p.measured_tops.unwrap() <= p.attainable_tops + 1e-9, "{}", p.app);
        }
    }

    #[test]
    fn more_bandwidth_lifts_memory_bound_apps() {
        let base = Chip::tpu();
        let prime = Chip::tpu_prime();
        assert!(prime.ridge_point() < base.ridge_point());
        assert!(prime.attainable_tops(200.0) > base.attainable_tops(200.0));
        assert_eq!(prime.attainable_tops(2888.0), base.attainable_tops(2888.0));
    }

    #[test]
    fn tpu_leads_on_peak_efficiency() {
        assert!((Chip::tpu().peak_gops_per_watt() - 1226.7).abs() < 0.1);
        assert!((Chip::k80().peak_gops_per_watt() - 18.67).abs() < 0.01);
        assert!(Chip::haswell().peak_gops_per_watt() < Chip::k80().peak_gops_per_watt());
    }

    #[test]
    fn curve_is_monotonic_and_bounded() {
        let curve = Chip::haswell().curve(5.0, 5000.0, 50);
        assert_eq!(curve.len(), 50);
        assert!((curve[0].0 - 5.0).abs() < 1e-9);
        assert!((curve[49].0 - 5000.0).abs() < 1e-6);
        assert!(curve.windows(2).all(|w| w[1].1 >= w[0].1));
        assert!(curve.iter().all(|&(_, y)| y <= 1.3));
        assert!(Chip::haswell().curve(0.0, 10.0, 10).is_empty());
    }

    #[test]
    fn geometric_means_match_table_six() {
        let tpu = geometric_mean(&RELATIVE_PERF_TPU).unwrap();
        let gpu = geometric_mean(&RELATIVE_PERF_GPU).unwrap();
        assert!((tpu - 14.5).abs() < 0.1, "{}", tpu);
        assert!((gpu - 1.1).abs() < 0.05, "{}", gpu);
        assert_eq!(geometric_mean(&[]), None);
    }
}
