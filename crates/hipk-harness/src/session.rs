//! End-to-end AMax validation run: upload, launch, read back, compare.

use std::sync::Arc;

use hipk_runtime::{
    DeviceContext, DeviceRuntime, EmulatedRuntime, HipRuntime, LaunchConfig, hip_runtime_available,
};
use tracing::{info, warn};

use crate::config::{Backend, HarnessConfig};
use crate::error::{HarnessError, Result};
use crate::kernels::amax::AmaxBuffers;
use crate::kernels::register_host_kernels;
use crate::orchestrator::{self, BenchmarkReport};
use crate::reference::{ScaleConvention, amax_reference};
use crate::validate::{ValidationOutcome, validate};

/// Open the requested backend.
///
/// `Auto` falls back to the emulator when the HIP library cannot be loaded.
/// `convention` selects the emulated kernels' scale behaviour.
pub fn open_runtime(
    backend: Backend,
    convention: ScaleConvention,
) -> Result<Arc<dyn DeviceRuntime>> {
    let emulated = || {
        let runtime = EmulatedRuntime::new();
        register_host_kernels(&runtime, convention);
        Arc::new(runtime) as Arc<dyn DeviceRuntime>
    };
    match backend {
        Backend::Hip => Ok(Arc::new(HipRuntime::load()?)),
        Backend::Emulated => Ok(emulated()),
        Backend::Auto if hip_runtime_available() => match HipRuntime::load() {
            Ok(rt) => Ok(Arc::new(rt)),
            Err(e) => {
                warn!(error = %e, "HIP runtime present but unusable, using emulator");
                Ok(emulated())
            }
        },
        Backend::Auto => {
            info!("HIP runtime not found, using emulator");
            Ok(emulated())
        }
    }
}

/// Everything observed during one validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub backend: &'static str,
    pub device: i32,
    pub config: LaunchConfig,
    /// Event-measured launch time. Advisory.
    pub elapsed_ms: f32,
    /// `dst[0]` read back from the device.
    pub device_result: f32,
    /// First element of the intermediate output.
    pub intermediate_first: f32,
    pub reference: f32,
    pub outcome: ValidationOutcome,
    pub benchmark: Option<BenchmarkReport>,
}

/// Open the configured backend and run [`run_amax_on`].
pub fn run_amax(config: &HarnessConfig) -> Result<RunReport> {
    config.validate()?;
    let runtime = open_runtime(config.launch.backend, config.validation.convention)?;
    let ctx = DeviceContext::new(runtime, config.launch.device)?;
    run_amax_on(&ctx, config)
}

/// Validate the AMax kernel on an existing context.
pub fn run_amax_on(ctx: &DeviceContext, config: &HarnessConfig) -> Result<RunReport> {
    let problem = &config.problem;
    let num_elements = problem.num_elements().ok_or_else(|| {
        HarnessError::InvalidArgument(format!("{}x{} overflows u32", problem.m, problem.n))
    })?;
    let input = problem.fill.generate(num_elements as usize);

    let buffers = AmaxBuffers::allocate(ctx, &input, problem.scale)?;
    let kernel = orchestrator::prepare(ctx, &config.kernel.entry_point, &config.kernel.artifact)?;
    let sync = config.launch.synchronous;
    let pending = orchestrator::launch(ctx, &kernel, &buffers, problem.m, problem.n, sync)?;
    let timing = pending.synchronize()?;

    let device_result = buffers.read_reduced()?;
    let intermediate_first = buffers.read_intermediate()?.first().copied().unwrap_or_default();
    let reference = amax_reference(&input, problem.scale, config.validation.convention);
    let outcome = validate(&[device_result], &[reference], config.validation.tolerance)?;
    info!(
        elapsed_ms = timing.elapsed_ms,
        device_result,
        reference,
        pass = outcome.is_pass(),
        "amax validation finished"
    );

    let benchmark = match config.launch.runs {
        0 => None,
        runs => Some(orchestrator::benchmark(ctx, &kernel, &buffers, problem.m, problem.n, runs)?),
    };

    Ok(RunReport {
        backend: ctx.runtime().name(),
        device: ctx.device(),
        config: timing.config,
        elapsed_ms: timing.elapsed_ms,
        device_result,
        intermediate_first,
        reference,
        outcome,
        benchmark,
    })
}
