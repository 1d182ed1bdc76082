//! Scoped device resources.
//!
//! Buffers, modules and events borrow the [`DeviceContext`] that created them
//! and release themselves on drop, on every exit path. Release failures cannot
//! be propagated from `Drop` and are logged at `warn` instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytemuck::Pod;
use tracing::{debug, warn};

use crate::error::{Result, RocmError};
use crate::handle::{DevicePtr, EventHandle, FunctionHandle, ModuleHandle, StreamHandle};
use crate::runtime::DeviceRuntime;

/// Explicit device + stream context threaded through every operation.
///
/// There is no implicit "current device": the context selects its device when
/// it is created and every resource is created through it.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    runtime: Arc<dyn DeviceRuntime>,
    device: i32,
    stream: StreamHandle,
}

impl DeviceContext {
    /// Bind `device` on `runtime`, using the default stream.
    pub fn new(runtime: Arc<dyn DeviceRuntime>, device: i32) -> Result<Self> {
        let count = runtime.device_count()?;
        if count == 0 {
            return Err(RocmError::NoDevice);
        }
        if device < 0 || device as usize >= count {
            return Err(RocmError::InvalidArgument(format!(
                "device {device} out of range ({count} visible)"
            )));
        }
        runtime.set_device(device)?;
        debug!(backend = runtime.name(), device, "device context created");
        Ok(Self { runtime, device, stream: StreamHandle::DEFAULT })
    }

    pub fn runtime(&self) -> &dyn DeviceRuntime {
        self.runtime.as_ref()
    }

    pub fn device(&self) -> i32 {
        self.device
    }

    pub fn stream(&self) -> StreamHandle {
        self.stream
    }

    /// Allocate `bytes` of device memory (contents unspecified).
    pub fn alloc(&self, bytes: usize) -> Result<DeviceBuffer<'_>> {
        let ptr = self.runtime.malloc(bytes)?;
        Ok(DeviceBuffer { ctx: self, ptr, len: bytes })
    }

    /// Allocate and zero `bytes` of device memory.
    pub fn alloc_zeroed(&self, bytes: usize) -> Result<DeviceBuffer<'_>> {
        let buf = self.alloc(bytes)?;
        buf.fill(0)?;
        Ok(buf)
    }

    /// Allocate a buffer sized for `data` and copy it over.
    pub fn upload<T: Pod>(&self, data: &[T]) -> Result<DeviceBuffer<'_>> {
        let mut buf = self.alloc(size_of_val(data))?;
        buf.copy_from_host(data)?;
        Ok(buf)
    }

    /// Load a precompiled code object.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<Module<'_>> {
        let path = path.as_ref();
        let handle = self.runtime.module_load(path)?;
        Ok(Module { ctx: self, handle, path: path.to_path_buf() })
    }

    pub fn create_event(&self) -> Result<Event<'_>> {
        let handle = self.runtime.event_create()?;
        Ok(Event { ctx: self, handle })
    }

    /// Wait for all outstanding work on this context's device.
    pub fn synchronize(&self) -> Result<()> {
        self.runtime.device_synchronize()
    }
}

/// Device memory owned for the lifetime of the borrow of its context.
#[derive(Debug)]
pub struct DeviceBuffer<'ctx> {
    ctx: &'ctx DeviceContext,
    ptr: DevicePtr,
    len: usize,
}

impl DeviceBuffer<'_> {
    pub fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy host data to the start of the buffer.
    pub fn copy_from_host<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() > self.len {
            return Err(RocmError::InvalidArgument(format!(
                "host data of {} bytes does not fit device buffer of {} bytes",
                bytes.len(),
                self.len
            )));
        }
        self.ctx.runtime.memcpy_htod(self.ptr, bytes)
    }

    /// Copy the start of the buffer into `out`.
    pub fn copy_to_host<T: Pod>(&self, out: &mut [T]) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        if bytes.len() > self.len {
            return Err(RocmError::InvalidArgument(format!(
                "host buffer of {} bytes exceeds device buffer of {} bytes",
                bytes.len(),
                self.len
            )));
        }
        self.ctx.runtime.memcpy_dtoh(bytes, self.ptr)
    }

    /// Read the whole buffer back as elements of `T`.
    pub fn to_vec<T: Pod>(&self) -> Result<Vec<T>> {
        let elem = size_of::<T>();
        if elem == 0 || self.len % elem != 0 {
            return Err(RocmError::InvalidArgument(format!(
                "buffer of {} bytes is not a whole number of {elem}-byte elements",
                self.len
            )));
        }
        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); self.len / elem];
        self.copy_to_host(&mut out)?;
        Ok(out)
    }

    /// Set every byte to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.ctx.runtime.memset(self.ptr, value, self.len)
    }
}

impl Drop for DeviceBuffer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.runtime.free(self.ptr) {
            warn!(error = %e, ptr = self.ptr.0, "failed to free device buffer");
        }
    }
}

/// A loaded code object; unloaded on drop.
#[derive(Debug)]
pub struct Module<'ctx> {
    ctx: &'ctx DeviceContext,
    handle: ModuleHandle,
    path: PathBuf,
}

impl Module<'_> {
    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a named entry point.
    pub fn function(&self, name: &str) -> Result<KernelFunction> {
        let handle = self.ctx.runtime.module_get_function(self.handle, name)?;
        Ok(KernelFunction { handle, name: name.to_string() })
    }
}

impl Drop for Module<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.runtime.module_unload(self.handle) {
            warn!(error = %e, path = %self.path.display(), "failed to unload module");
        }
    }
}

/// A resolved entry point. Valid only while its [`Module`] is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelFunction {
    handle: FunctionHandle,
    name: String,
}

impl KernelFunction {
    pub fn handle(&self) -> FunctionHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Timing event; destroyed on drop.
#[derive(Debug)]
pub struct Event<'ctx> {
    ctx: &'ctx DeviceContext,
    handle: EventHandle,
}

impl Event<'_> {
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// Record on the context's stream.
    pub fn record(&self) -> Result<()> {
        self.ctx.runtime.event_record(self.handle, self.ctx.stream)
    }

    pub fn synchronize(&self) -> Result<()> {
        self.ctx.runtime.event_synchronize(self.handle)
    }

    /// Non-blocking completion poll.
    pub fn is_complete(&self) -> Result<bool> {
        self.ctx.runtime.event_query(self.handle)
    }

    /// Milliseconds between `start` and this event.
    pub fn elapsed_since(&self, start: &Event<'_>) -> Result<f32> {
        self.ctx.runtime.event_elapsed_ms(start.handle, self.handle)
    }
}

impl Drop for Event<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.runtime.event_destroy(self.handle) {
            warn!(error = %e, "failed to destroy event");
        }
    }
}
