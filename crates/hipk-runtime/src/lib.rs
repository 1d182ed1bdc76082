//! `hipk-runtime`: the accelerator runtime seam used by the hipk harness.
//!
//! The harness never calls HIP directly. It talks to a [`DeviceRuntime`],
//! which is either the real ROCm runtime opened at run time or an in-process
//! emulator that executes host kernels against emulated device memory:
//!
//! | Backend              | Module         | Needs a GPU |
//! |----------------------|----------------|-------------|
//! | [`HipRuntime`]       | [`hip`]        | yes         |
//! | [`EmulatedRuntime`]  | [`emulator`]   | no          |
//!
//! On top of the seam, [`resource`] provides scoped wrappers
//! ([`DeviceContext`], [`DeviceBuffer`], [`Module`], [`Event`]) that release
//! their handles on drop.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use hipk_runtime::{DeviceContext, EmulatedRuntime};
//!
//! let ctx = DeviceContext::new(Arc::new(EmulatedRuntime::new()), 0).unwrap();
//! let buf = ctx.upload(&[1.0f32, 2.0, 3.0]).unwrap();
//! assert_eq!(buf.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
//! ```

pub mod device;
pub mod emulator;
pub mod error;
pub mod handle;
pub mod hip;
pub mod kernel;
pub mod resource;
pub mod runtime;

pub use device::{DeviceInfo, enumerate_devices, hip_runtime_available};
pub use emulator::{EmulatedMemory, EmulatedRuntime, HostKernel, HostLaunch};
pub use error::{HipErrorCode, Result, RocmError, check_hip};
pub use handle::{DevicePtr, EventHandle, FunctionHandle, ModuleHandle, StreamHandle};
pub use hip::HipRuntime;
pub use kernel::LaunchConfig;
pub use resource::{DeviceBuffer, DeviceContext, Event, KernelFunction, Module};
pub use runtime::DeviceRuntime;
