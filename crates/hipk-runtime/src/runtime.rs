//! The device runtime seam.
//!
//! Everything the harness needs from an accelerator runtime goes through
//! [`DeviceRuntime`]. Two implementations exist: [`crate::hip::HipRuntime`]
//! talks to `libamdhip64` loaded at run time, [`crate::emulator::EmulatedRuntime`]
//! runs registered host kernels against emulated device memory.
//!
//! Calls mirror the HIP C API one-to-one and surface the runtime's status
//! verbatim; resource ownership is handled one level up in [`crate::resource`].

use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::handle::{DevicePtr, EventHandle, FunctionHandle, ModuleHandle, StreamHandle};
use crate::kernel::LaunchConfig;

pub trait DeviceRuntime: Send + Sync + fmt::Debug {
    /// Short backend name for logs (`"hip"`, `"emulated"`).
    fn name(&self) -> &'static str;

    fn device_count(&self) -> Result<usize>;
    fn set_device(&self, device: i32) -> Result<()>;
    fn device_name(&self, device: i32) -> Result<String>;

    fn malloc(&self, bytes: usize) -> Result<DevicePtr>;
    fn free(&self, ptr: DevicePtr) -> Result<()>;
    fn memcpy_htod(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;
    fn memcpy_dtoh(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;
    fn memset(&self, dst: DevicePtr, value: u8, bytes: usize) -> Result<()>;

    /// Load a precompiled code object from disk.
    fn module_load(&self, path: &Path) -> Result<ModuleHandle>;
    fn module_unload(&self, module: ModuleHandle) -> Result<()>;
    /// Resolve a named entry point; `SymbolNotFound` when absent.
    fn module_get_function(&self, module: ModuleHandle, name: &str) -> Result<FunctionHandle>;

    fn event_create(&self) -> Result<EventHandle>;
    fn event_destroy(&self, event: EventHandle) -> Result<()>;
    fn event_record(&self, event: EventHandle, stream: StreamHandle) -> Result<()>;
    fn event_synchronize(&self, event: EventHandle) -> Result<()>;
    /// `Ok(true)` once all work captured by the event has completed.
    fn event_query(&self, event: EventHandle) -> Result<bool>;
    fn event_elapsed_ms(&self, start: EventHandle, end: EventHandle) -> Result<f32>;

    /// Enqueue `function` with a packed argument buffer.
    ///
    /// The buffer is handed to the runtime through the extensible parameter
    /// list (`BUFFER_POINTER`, `BUFFER_SIZE`, `END`); its layout must match
    /// what the code object expects. The call returns once the launch is
    /// queued.
    fn ext_module_launch_kernel(
        &self,
        function: FunctionHandle,
        config: &LaunchConfig,
        stream: StreamHandle,
        args: &[u8],
    ) -> Result<()>;

    /// Block until all outstanding work on the current device has drained.
    fn device_synchronize(&self) -> Result<()>;
}
