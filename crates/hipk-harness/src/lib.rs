//! `hipk-harness`: launch, time and validate precompiled HIP kernels.
//!
//! The pipeline for one kernel invocation:
//!
//! 1. [`args`] packs pointers and scalars into the opaque argument buffer the
//!    code object expects, checked against a [`signature::KernelSignature`].
//! 2. [`launch`] derives grid and block sizes from the problem shape.
//! 3. [`orchestrator`] loads the module, issues the event-bracketed launch and
//!    hands back a [`orchestrator::PendingLaunch`].
//! 4. [`validate`] compares the read-back output with a host [`reference`].
//!
//! [`session::run_amax`] strings these together for the AMax kernel.
//!
//! ```rust
//! use hipk_harness::{HarnessConfig, Backend, ValidationOutcome};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let artifact = dir.path().join("amax.co");
//! std::fs::write(&artifact, b"\x7fELF\0AMax_Ti_S_To_S_W_256_C_4\0").unwrap();
//!
//! let mut config = HarnessConfig::default();
//! config.kernel.artifact = artifact;
//! config.launch.backend = Backend::Emulated;
//!
//! let report = hipk_harness::run_amax(&config).unwrap();
//! assert_eq!(report.outcome, ValidationOutcome::Pass);
//! assert_eq!(report.device_result, 0.8);
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod input;
pub mod kernels;
pub mod launch;
pub mod orchestrator;
pub mod reference;
pub mod session;
pub mod signature;
pub mod validate;

pub use args::{ArgKind, DEFAULT_ALIGNMENT, KernelArg, KernelArguments};
pub use config::{Backend, HarnessConfig, LogFormat};
pub use error::{HarnessError, Result};
pub use input::InputFill;
pub use kernels::PrecompiledKernel;
pub use kernels::amax::{AmaxArgs, AmaxBuffers, AmaxHostKernel};
pub use launch::{TileShape, num_workgroups, tiled_launch_config};
pub use orchestrator::{
    BenchmarkReport, LaunchTiming, PendingLaunch, PreparedKernel, benchmark, launch, launch_with,
    prepare,
};
pub use reference::{ScaleConvention, amax_reference};
pub use session::{RunReport, open_runtime, run_amax, run_amax_on};
pub use signature::{KernelSignature, LayoutError, ParamSpec};
pub use validate::{Mismatch, Tolerance, ValidationOutcome, almost_equal, validate};
