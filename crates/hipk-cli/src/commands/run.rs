//! `hipk run`: launch the AMax kernel once and validate it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use hipk_harness::{
    Backend, HarnessConfig, HarnessError, InputFill, RunReport, ScaleConvention, ValidationOutcome,
    run_amax,
};
use tracing::info;

/// Run command arguments. Every flag overrides the loaded configuration.
#[derive(Args, Debug, Default)]
pub struct RunCommand {
    /// Path to the precompiled code object
    #[arg(short, long, value_name = "PATH")]
    pub artifact: Option<PathBuf>,

    /// Kernel entry point name
    #[arg(short, long, value_name = "NAME")]
    pub entry_point: Option<String>,

    /// Number of rows
    #[arg(short, long, value_name = "M")]
    pub m: Option<u32>,

    /// Number of columns
    #[arg(short, long, value_name = "N")]
    pub n: Option<u32>,

    /// Scale factor uploaded to the kernel
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f32>,

    /// Fill every input element with this value
    #[arg(long, value_name = "VALUE", conflicts_with = "seed")]
    pub fill: Option<f32>,

    /// Use seeded random input in [-1, 1) instead of a constant
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Absolute tolerance
    #[arg(long, value_name = "TOL")]
    pub abs_tol: Option<f32>,

    /// Relative tolerance
    #[arg(long, value_name = "TOL")]
    pub rel_tol: Option<f32>,

    /// Scale convention of the reference (unscaled, pre-scaled)
    #[arg(long, value_name = "CONVENTION")]
    pub convention: Option<ScaleConvention>,

    /// Runtime backend (hip, emulated, auto)
    #[arg(short, long, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Device ordinal
    #[arg(short, long, value_name = "INDEX")]
    pub device: Option<i32>,

    /// Do not block after the launch; wait only when reading results
    #[arg(long = "async")]
    pub no_sync: bool,

    /// Additional timed runs for throughput measurement
    #[arg(long, value_name = "N")]
    pub runs: Option<u32>,
}

impl RunCommand {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(artifact) = &self.artifact {
            config.kernel.artifact = artifact.clone();
        }
        if let Some(entry_point) = &self.entry_point {
            config.kernel.entry_point = entry_point.clone();
        }
        if let Some(m) = self.m {
            config.problem.m = m;
        }
        if let Some(n) = self.n {
            config.problem.n = n;
        }
        if let Some(scale) = self.scale {
            config.problem.scale = scale;
        }
        if let Some(value) = self.fill {
            config.problem.fill = InputFill::Constant { value };
        }
        if let Some(seed) = self.seed {
            config.problem.fill = InputFill::Random { seed };
        }
        if let Some(abs) = self.abs_tol {
            config.validation.tolerance.abs = abs;
        }
        if let Some(rel) = self.rel_tol {
            config.validation.tolerance.rel = rel;
        }
        if let Some(convention) = self.convention {
            config.validation.convention = convention;
        }
        if let Some(backend) = self.backend {
            config.launch.backend = backend;
        }
        if let Some(device) = self.device {
            config.launch.device = device;
        }
        if self.no_sync {
            config.launch.synchronous = false;
        }
        if let Some(runs) = self.runs {
            config.launch.runs = runs;
        }
    }

    pub fn execute(&self, config: &HarnessConfig) -> Result<()> {
        info!(
            artifact = %config.kernel.artifact.display(),
            entry_point = %config.kernel.entry_point,
            m = config.problem.m,
            n = config.problem.n,
            "starting run"
        );
        let report = run_amax(config).context("AMax run failed")?;
        print_report(&report);
        report.outcome.into_result().map_err(HarnessError::from)?;
        Ok(())
    }
}

fn print_report(report: &RunReport) {
    let (gx, _, _) = report.config.grid;
    let (bx, _, _) = report.config.block;
    println!("{}", style("AMax kernel run").bold().cyan());
    println!("  Backend:      {} (device {})", report.backend, report.device);
    println!(
        "  Launch:       grid {gx} x block {bx}, {} B shared",
        report.config.shared_mem_bytes
    );
    println!("  Time:         {:.4} ms", report.elapsed_ms);
    println!("  Intermediate: {}", report.intermediate_first);
    println!("  Device:       {}", report.device_result);
    println!("  Reference:    {}", report.reference);
    match &report.outcome {
        ValidationOutcome::Pass => println!("  Result:       {}", style("PASS").green().bold()),
        ValidationOutcome::Fail(m) => {
            println!("  Result:       {}", style("FAIL").red().bold());
            println!("  Index:        {}", m.index);
            println!("  Values:       {} vs {}", m.produced, m.expected);
            println!("  Diff:         {}", m.abs_diff);
        }
    }
    if let Some(bench) = &report.benchmark {
        println!("  Runs:         {}", bench.runs);
        println!("  Mean time:    {:.4} ms", bench.mean_ms);
        match bench.throughput_gbps {
            Some(gbps) => println!("  Throughput:   {gbps:.2} GB/s"),
            None => println!("  Throughput:   n/a"),
        }
    }
}
