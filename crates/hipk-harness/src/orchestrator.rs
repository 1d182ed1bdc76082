//! Module preparation, timed launches and repeated-launch benchmarking.
//!
//! A launch is bracketed by two events on the context's stream: start record,
//! launch, end record. The launch call itself only queues work; the returned
//! [`PendingLaunch`] is the single point where the host waits for the device.

use std::path::Path;

use hipk_runtime::{DeviceContext, Event, KernelFunction, LaunchConfig, Module};
use tracing::{debug, info};

use crate::args::KernelArguments;
use crate::error::{HarnessError, Result};
use crate::kernels::amax::{self, AmaxBuffers};
use crate::launch::tiled_launch_config;
use crate::signature::KernelSignature;

/// A loaded code object with one resolved entry point.
///
/// The module stays loaded for as long as this value lives.
#[derive(Debug)]
pub struct PreparedKernel<'ctx> {
    _module: Module<'ctx>,
    function: KernelFunction,
}

impl PreparedKernel<'_> {
    pub fn function(&self) -> &KernelFunction {
        &self.function
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }
}

/// Load `binary_path` and resolve `kernel_name` in it.
pub fn prepare<'ctx>(
    ctx: &'ctx DeviceContext,
    kernel_name: &str,
    binary_path: impl AsRef<Path>,
) -> Result<PreparedKernel<'ctx>> {
    let binary_path = binary_path.as_ref();
    let module = ctx.load_module(binary_path)?;
    let function = module.function(kernel_name)?;
    info!(kernel = kernel_name, path = %binary_path.display(), "kernel prepared");
    Ok(PreparedKernel { _module: module, function })
}

/// Timing of a completed launch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchTiming {
    /// Event-measured time between start and end records. Advisory.
    pub elapsed_ms: f32,
    pub config: LaunchConfig,
}

/// An issued launch that may still be running.
#[derive(Debug)]
#[must_use = "a pending launch must be synchronized before reading results"]
pub struct PendingLaunch<'ctx> {
    ctx: &'ctx DeviceContext,
    start: Event<'ctx>,
    end: Event<'ctx>,
    config: LaunchConfig,
    synchronized: bool,
}

impl PendingLaunch<'_> {
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Non-blocking poll of the end event.
    pub fn is_complete(&self) -> Result<bool> {
        if self.synchronized {
            return Ok(true);
        }
        Ok(self.end.is_complete()?)
    }

    /// Block until the launch has finished and the device has drained.
    pub fn synchronize(self) -> Result<LaunchTiming> {
        if !self.synchronized {
            self.end.synchronize()?;
            self.ctx.synchronize()?;
        }
        let elapsed_ms = self.end.elapsed_since(&self.start)?;
        debug!(elapsed_ms, "launch complete");
        Ok(LaunchTiming { elapsed_ms, config: self.config })
    }
}

/// Launch `kernel` with a prepared argument buffer and geometry.
///
/// In debug builds the buffer is checked against `signature` first.
pub fn launch_with<'ctx>(
    ctx: &'ctx DeviceContext,
    kernel: &PreparedKernel<'_>,
    config: LaunchConfig,
    args: &KernelArguments,
    signature: Option<&KernelSignature>,
    synchronous: bool,
) -> Result<PendingLaunch<'ctx>> {
    if cfg!(debug_assertions)
        && let Some(signature) = signature
    {
        signature.check(args)?;
    }
    debug!(
        kernel = kernel.name(),
        grid = ?config.grid,
        block = ?config.block,
        shared_mem_bytes = config.shared_mem_bytes,
        arg_bytes = args.size(),
        "launching"
    );

    let start = ctx.create_event()?;
    let end = ctx.create_event()?;
    start.record()?;
    ctx.runtime().ext_module_launch_kernel(
        kernel.function().handle(),
        &config,
        ctx.stream(),
        args.buffer(),
    )?;
    end.record()?;

    let mut pending = PendingLaunch { ctx, start, end, config, synchronized: false };
    if synchronous {
        pending.end.synchronize()?;
        ctx.synchronize()?;
        pending.synchronized = true;
    }
    Ok(pending)
}

/// Total element count `m × n`, rejecting overflow.
fn element_count(m: u32, n: u32) -> Result<u32> {
    m.checked_mul(n).ok_or_else(|| {
        HarnessError::InvalidArgument(format!("m × n overflows u32 (m={m}, n={n})"))
    })
}

/// Launch the AMax kernel over an `m × n` problem.
///
/// Arguments are packed as `dst, dst_intermediate, src, scale, m·n`.
pub fn launch<'ctx>(
    ctx: &'ctx DeviceContext,
    kernel: &PreparedKernel<'_>,
    buffers: &AmaxBuffers<'_>,
    m: u32,
    n: u32,
    synchronous: bool,
) -> Result<PendingLaunch<'ctx>> {
    let num_elements = element_count(m, n)?;
    let args = buffers.args(num_elements).to_kernel_arguments();
    let config =
        tiled_launch_config(m, n, amax::TILE, amax::WORKGROUP_SIZE, amax::SHARED_MEM_BYTES)?;
    launch_with(ctx, kernel, config, &args, Some(&amax::SIGNATURE), synchronous)
}

/// Result of a repeated-launch measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkReport {
    pub runs: u32,
    pub total_ms: f32,
    pub mean_ms: f32,
    /// `None` when the measured time is zero.
    pub throughput_gbps: Option<f64>,
}

/// Read-plus-write throughput in GiB/s for `runs` passes over `m × n` f32s.
pub fn throughput_gbps(runs: u32, m: u32, n: u32, total_ms: f32) -> Option<f64> {
    if total_ms <= 0.0 {
        return None;
    }
    let bytes = f64::from(runs) * f64::from(m) * f64::from(n) * 2.0 * size_of::<f32>() as f64;
    Some(bytes * 1e3 / 1024f64.powi(3) / f64::from(total_ms))
}

/// Issue `runs` AMax launches between a single pair of events.
///
/// The reduced output accumulates across runs; only timing is reported.
pub fn benchmark(
    ctx: &DeviceContext,
    kernel: &PreparedKernel<'_>,
    buffers: &AmaxBuffers<'_>,
    m: u32,
    n: u32,
    runs: u32,
) -> Result<BenchmarkReport> {
    if runs == 0 {
        return Err(HarnessError::InvalidArgument("benchmark needs at least one run".into()));
    }
    let num_elements = element_count(m, n)?;
    let args = buffers.args(num_elements).to_kernel_arguments();
    if cfg!(debug_assertions) {
        amax::SIGNATURE.check(&args)?;
    }
    let config =
        tiled_launch_config(m, n, amax::TILE, amax::WORKGROUP_SIZE, amax::SHARED_MEM_BYTES)?;

    let start = ctx.create_event()?;
    let end = ctx.create_event()?;
    start.record()?;
    for _ in 0..runs {
        ctx.runtime().ext_module_launch_kernel(
            kernel.function().handle(),
            &config,
            ctx.stream(),
            args.buffer(),
        )?;
    }
    end.record()?;
    end.synchronize()?;
    ctx.synchronize()?;

    let total_ms = end.elapsed_since(&start)?;
    let report = BenchmarkReport {
        runs,
        total_ms,
        mean_ms: total_ms / runs as f32,
        throughput_gbps: throughput_gbps(runs, m, n, total_ms),
    };
    info!(runs, mean_ms = report.mean_ms, gbps = ?report.throughput_gbps, "benchmark complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_rejects_overflow() {
        assert_eq!(element_count(256, 4).unwrap(), 1024);
        assert!(element_count(u32::MAX, 2).is_err());
    }

    #[test]
    fn throughput_formula() {
        // 1 GiB moved in 1 s.
        let elems = 1024 * 1024 * 1024 / 8;
        let gbps = throughput_gbps(1, elems, 1, 1000.0).unwrap();
        assert!((gbps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_undefined_for_zero_time() {
        assert_eq!(throughput_gbps(4, 256, 4, 0.0), None);
    }
}
