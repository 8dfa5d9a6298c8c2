use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use tpusim::config::SimConfig;
use tpusim::metrics::{write_metrics, LiveMetrics};
use tpusim::performance;
use tpusim::pipeline::{PipelineSchedule, Position};
use tpusim::roofline::{self, Chip};
use tpusim::sim::Simulation;
use tpusim::systolic::ReadAccounting;

/// tpusim - systolic array vs sequential matmul, step by step
#[derive(Parser, Debug)]
#[command(name = "tpusim")]
#[command(version = "0.1.0")]
#[command(about = "Educational TPU simulator: systolic timing, roofline and pipeline models", long_about = None)]
struct Args {
    /// JSON config file; command-line flags override its fields
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Matrix dimension N
    #[arg(short = 'n', long)]
    size: Option<usize>,

    /// Smallest random entry
    #[arg(long)]
    min: Option<i64>,

    /// Largest random entry
    #[arg(long)]
    max: Option<i64>,

    /// RNG seed for reproducible matrices
    #[arg(short, long)]
    seed: Option<u64>,

    /// Playback speed, 1 (slow) to 10 (fast)
    #[arg(long)]
    speed: Option<u32>,

    /// How reads are charged to the systolic array
    #[arg(long, value_enum)]
    accounting: Option<Accounting>,

    /// Where to publish live snapshots for the viz binary
    #[arg(long, value_name = "FILE")]
    metrics_path: Option<String>,

    /// Pace steps at the configured speed (watch with `cargo run --bin viz`)
    #[arg(short, long)]
    live: bool,

    /// Print the roofline analysis of the paper's benchmarks
    #[arg(long)]
    roofline: bool,

    /// TPU memory bandwidth in GB/s for the roofline (34 = shipped DDR3)
    #[arg(long, value_name = "GB_S")]
    tpu_mem_bw: Option<f64>,

    /// Print relative performance, performance/Watt and latency tables
    #[arg(long)]
    performance: bool,

    /// MLP0 response-time deadline for the latency table
    #[arg(long, value_name = "MS", default_value_t = 7.0)]
    deadline_ms: f64,

    /// Print the fused vs sequential layer pipeline comparison
    #[arg(long)]
    pipeline: bool,

    /// Layers for the pipeline comparison
    #[arg(long, default_value_t = 4)]
    layers: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Accounting {
    RowEntry,
    WithWeights,
}

impl From<Accounting> for ReadAccounting {
    fn from(a: Accounting) -> Self {
        match a {
            Accounting::RowEntry => ReadAccounting::RowEntry,
            Accounting::WithWeights => ReadAccounting::RowEntryWithWeightLoad,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_config(args: &Args) -> tpusim::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::demo(),
    };
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(min) = args.min {
        config.value_min = min;
    }
    if let Some(max) = args.max {
        config.value_max = max;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if let Some(accounting) = args.accounting {
        config.accounting = accounting.into();
    }
    if let Some(path) = &args.metrics_path {
        config.metrics_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Returns Ok(false) when the two models disagree.
fn run(args: &Args) -> tpusim::Result<bool> {
    let config = build_config(args)?;
    let mut sim = Simulation::new(config.clone())?;

    let (a, b) = sim.operands();
    println!("Activations A:\n{}", a);
    println!("Weights B:\n{}", b);
    let expected = a.multiply(b)?;

    if args.live {
        info!(
            "stepping every {:?}, snapshots at {}",
            config.step_interval(),
            config.metrics_path
        );
    }
    publish(&sim, &config.metrics_path);
    while sim.step() {
        publish(&sim, &config.metrics_path);
        if args.live {
            std::thread::sleep(config.step_interval());
        }
    }

    let summary = sim.summary();
    println!("Result C = A x B:\n{}", sim.systolic().accumulators());
    println!("{}", summary);

    let verified = summary.results_match && sim.systolic().accumulators() == &expected;
    if verified {
        println!("Verification PASSED: systolic and reference results equal A x B");
    } else {
        println!("Verification FAILED");
    }

    if args.roofline {
        print_roofline(args.tpu_mem_bw);
    }
    if args.performance {
        print_performance(args.deadline_ms);
    }
    if args.pipeline {
        print_pipeline(args.layers);
    }

    Ok(verified)
}

fn publish(sim: &Simulation, path: &str) {
    if let Err(e) = write_metrics(path, &LiveMetrics::capture(sim)) {
        warn!("{}", e);
    }
}

fn print_roofline(tpu_mem_bw: Option<f64>) {
    let mut chips = Chip::all();
    if let Some(bw) = tpu_mem_bw {
        if let Some(tpu) = chips.iter_mut().find(|c| c.key == "tpu") {
            *tpu = tpu.clone().with_mem_bw(bw);
        }
    }
    chips.push(Chip::tpu_prime());
    let apps = roofline::applications();

    println!();
    println!("Benchmarks:");
    for app in &apps {
        println!(
            "  {:<6} {:<4} {:>3} layers {:>4}M weights  batch {:>3}  {:>2}% of deployed TPUs",
            app.name,
            app.kind.to_string(),
            app.layers,
            app.weights_m,
            app.batch_size,
            app.deploy_pct
        );
    }
    for chip in &chips {
        println!();
        println!(
            "{}: {} mm², {} nm, {} MHz, {} W TDP, {} MiB on chip",
            chip.name, chip.die_mm2, chip.process_nm, chip.clock_mhz, chip.tdp_watts, chip.on_chip_mib
        );
        println!(
            "  peak {:.1} TOPS ({:.0} GOPS/W), {:.0} GB/s, ridge at {:.0} MACs/byte",
            chip.peak_tops,
            chip.peak_gops_per_watt(),
            chip.mem_bw_gb_s,
            chip.ridge_point()
        );
        let curve: Vec<String> = chip
            .curve(1.0, 10_000.0, 5)
            .iter()
            .map(|(x, y)| format!("{:.0}→{:.2}", x, y))
            .collect();
        println!("  roof (MACs/B→TOPS): {}", curve.join("  "));
        for p in roofline::analyze(chip, &apps) {
            let measured = match (p.measured_tops, p.efficiency()) {
                (Some(m), Some(eff)) => format!("measured {:>6.2} ({:>5.1}%)", m, eff * 100.0),
                _ => "measured      -".to_string(),
            };
            println!(
                "  {:<6} {:>6.0} MACs/B  roof {:>6.2} TOPS  {}  {}",
                p.app, p.macs_per_byte, p.attainable_tops, measured, p.bound
            );
        }
    }
    if let (Some(gpu), Some(tpu)) = (
        roofline::geometric_mean(&roofline::RELATIVE_PERF_GPU),
        roofline::geometric_mean(&roofline::RELATIVE_PERF_TPU),
    ) {
        println!();
        println!("Relative to CPU (geometric mean): GPU {:.1}x, TPU {:.1}x", gpu, tpu);
    }
}

fn print_performance(deadline_ms: f64) {
    let apps = roofline::applications();
    let weights = performance::deployment_weights(&apps);

    println!();
    println!("Relative performance per die (CPU = 1.0):");
    for (i, app) in apps.iter().enumerate() {
        println!(
            "  {:<6} GPU {:>5.1}x  TPU {:>5.1}x",
            app.name,
            roofline::RELATIVE_PERF_GPU[i],
            roofline::RELATIVE_PERF_TPU[i]
        );
    }
    let gm = performance::PUBLISHED_GEOMETRIC_MEAN;
    let wm = performance::PUBLISHED_WEIGHTED_MEAN;
    println!("  GM     GPU {:>5.1}x  TPU {:>5.1}x", gm.gpu, gm.tpu);
    println!("  WM     GPU {:>5.1}x  TPU {:>5.1}x", wm.gpu, wm.tpu);
    if let (Some(gpu), Some(tpu)) = (
        performance::weighted_mean(&roofline::RELATIVE_PERF_GPU, &weights),
        performance::weighted_mean(&roofline::RELATIVE_PERF_TPU, &weights),
    ) {
        println!("  by deployment mix: GPU {:.1}x, TPU {:.1}x", gpu, tpu);
    }

    println!();
    println!("Performance/Watt relative to CPU:");
    for row in performance::perf_per_watt() {
        println!(
            "  {} ({:<11}) GPU {:>5.1}x  TPU {:>5.1}x  TPU' {:>5.1}x",
            row.mean,
            row.basis.to_string(),
            row.gpu,
            row.tpu,
            row.tpu_prime
        );
    }

    println!();
    println!("MLP0 throughput within a {:.1} ms deadline:", deadline_ms);
    let points = performance::latency_throughput();
    for chip in ["cpu", "gpu", "tpu"] {
        let peak = performance::peak_throughput(&points, chip).map_or(0, |p| p.ips);
        match performance::best_within_deadline(&points, chip, deadline_ms) {
            Some(p) => println!(
                "  {:<3} batch {:>3}  {:>4.1} ms  {:>7} IPS  {:>3}% of peak {}",
                chip.to_uppercase(),
                p.batch,
                p.latency_ms,
                p.ips,
                p.pct_max,
                peak
            ),
            None => println!(
                "  {:<3} cannot meet the deadline (peak {} IPS)",
                chip.to_uppercase(),
                peak
            ),
        }
    }
}

fn print_pipeline(layers: usize) {
    println!();
    for schedule in [PipelineSchedule::tpu(layers), PipelineSchedule::cpu(layers)] {
        println!(
            "{}: {} layers x {} stages, done at cycle {}, {} DRAM round trips",
            schedule.name,
            schedule.layers,
            schedule.stages.len(),
            schedule.finish_cycle(),
            schedule.memory_round_trips()
        );
        for cycle in 0..schedule.finish_cycle() {
            let row: Vec<String> = schedule
                .snapshot(cycle)
                .iter()
                .map(|p| match p {
                    Position::Waiting => "  .   ".to_string(),
                    Position::InStage(s) => format!("{:^6}", schedule.stages[*s].name),
                    Position::Done => "  ok  ".to_string(),
                })
                .collect();
            println!("  cycle {:>3} | {}", cycle, row.join("|"));
        }
    }
}
