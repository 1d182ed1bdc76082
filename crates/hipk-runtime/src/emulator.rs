//! In-process host emulation of the device runtime.
//!
//! Device memory is a set of host byte vectors addressed by synthetic device
//! pointers. A code object "loads" by reading the artifact from disk; an entry
//! point resolves when its NUL-terminated name is present in the image (the
//! ELF string-table convention) and a [`HostKernel`] is registered under that
//! name. Launches execute the host kernel synchronously and hand it the raw
//! argument buffer, so it decodes exactly the bytes a device kernel would.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use bytemuck::Pod;
use tracing::{debug, info, trace, warn};

use crate::error::{HipErrorCode, Result, RocmError};
use crate::handle::{DevicePtr, EventHandle, FunctionHandle, ModuleHandle, StreamHandle};
use crate::kernel::LaunchConfig;
use crate::runtime::DeviceRuntime;

/// First synthetic device address; keeps null distinguishable.
const HEAP_BASE: u64 = 0x7f00_0000_0000;
/// Allocation granularity, matching the HIP allocator's minimum alignment.
const ALLOC_ALIGN: u64 = 256;

/// A launch as seen by a host kernel.
#[derive(Debug)]
pub struct HostLaunch<'a> {
    pub entry_point: &'a str,
    pub config: LaunchConfig,
    pub args: &'a [u8],
}

/// A kernel body executed on the host in place of device code.
pub trait HostKernel: Send + Sync {
    fn execute(&self, launch: &HostLaunch<'_>, memory: &mut EmulatedMemory<'_>) -> Result<()>;
}

/// View of emulated device memory handed to a running [`HostKernel`].
pub struct EmulatedMemory<'a> {
    allocations: &'a mut BTreeMap<u64, Vec<u8>>,
}

impl EmulatedMemory<'_> {
    /// Copy `len` bytes starting at `ptr`.
    pub fn read(&self, ptr: DevicePtr, len: usize) -> Result<Vec<u8>> {
        let (base, bytes) = locate(&*self.allocations, ptr, len)?;
        let start = (ptr.0 - base) as usize;
        Ok(bytes[start..start + len].to_vec())
    }

    pub fn write(&mut self, ptr: DevicePtr, data: &[u8]) -> Result<()> {
        let base = locate(&*self.allocations, ptr, data.len())?.0;
        let start = (ptr.0 - base) as usize;
        let bytes = self
            .allocations
            .get_mut(&base)
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidValue, "emulated write"))?;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read `count` elements of `T`.
    pub fn read_slice<T: Pod>(&self, ptr: DevicePtr, count: usize) -> Result<Vec<T>> {
        let bytes = self.read(ptr, count * size_of::<T>())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn write_slice<T: Pod>(&mut self, ptr: DevicePtr, data: &[T]) -> Result<()> {
        self.write(ptr, bytemuck::cast_slice(data))
    }
}

/// Find the allocation containing `[ptr, ptr + len)`.
fn locate(
    allocations: &BTreeMap<u64, Vec<u8>>,
    ptr: DevicePtr,
    len: usize,
) -> Result<(u64, &Vec<u8>)> {
    let out_of_bounds = || {
        RocmError::device(
            HipErrorCode::InvalidValue,
            format!("emulated access of {len} bytes at {:#x} is out of bounds", ptr.0),
        )
    };
    let (&base, bytes) = allocations.range(..=ptr.0).next_back().ok_or_else(out_of_bounds)?;
    let end = ptr.0.checked_add(len as u64).ok_or_else(out_of_bounds)?;
    if end > base + bytes.len() as u64 {
        return Err(out_of_bounds());
    }
    Ok((base, bytes))
}

#[derive(Debug)]
struct LoadedModule {
    path: PathBuf,
    image: Vec<u8>,
}

#[derive(Debug, Default)]
struct EmulatorState {
    next_addr: u64,
    next_handle: u64,
    current_device: i32,
    allocations: BTreeMap<u64, Vec<u8>>,
    modules: HashMap<u64, LoadedModule>,
    functions: HashMap<u64, String>,
    events: HashMap<u64, Option<Instant>>,
    launches: u64,
}

impl EmulatorState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// [`DeviceRuntime`] that runs registered host kernels against host memory.
pub struct EmulatedRuntime {
    devices: usize,
    state: Mutex<EmulatorState>,
    kernels: RwLock<HashMap<String, Arc<dyn HostKernel>>>,
}

impl std::fmt::Debug for EmulatedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kernels: Vec<String> =
            self.kernels.read().map(|k| k.keys().cloned().collect()).unwrap_or_default();
        f.debug_struct("EmulatedRuntime")
            .field("devices", &self.devices)
            .field("kernels", &kernels)
            .finish_non_exhaustive()
    }
}

impl Default for EmulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedRuntime {
    /// A single emulated device with no kernels registered.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    pub fn with_devices(devices: usize) -> Self {
        Self {
            devices,
            state: Mutex::new(EmulatorState { next_addr: HEAP_BASE, ..Default::default() }),
            kernels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a host kernel under an entry-point name.
    pub fn register_kernel(&self, entry_point: &str, kernel: Arc<dyn HostKernel>) {
        match self.kernels.write() {
            Ok(mut kernels) => {
                kernels.insert(entry_point.to_string(), kernel);
            }
            Err(_) => warn!(entry_point, "kernel registry poisoned; host kernel not registered"),
        }
    }

    /// Builder form of [`register_kernel`](Self::register_kernel).
    #[must_use]
    pub fn with_kernel(self, entry_point: &str, kernel: Arc<dyn HostKernel>) -> Self {
        self.register_kernel(entry_point, kernel);
        self
    }

    /// Number of kernels launched so far.
    pub fn launch_count(&self) -> u64 {
        self.counter("launch_count", |s| s.launches)
    }

    /// Number of live device allocations.
    pub fn live_allocations(&self) -> usize {
        self.counter("live_allocations", |s| s.allocations.len())
    }

    /// Number of modules currently loaded.
    pub fn loaded_modules(&self) -> usize {
        self.counter("loaded_modules", |s| s.modules.len())
    }

    /// Read a counter from the state; zero (with a warning) if it is poisoned.
    fn counter<T: Default>(&self, what: &str, read: impl FnOnce(&EmulatorState) -> T) -> T {
        match self.state() {
            Ok(state) => read(&state),
            Err(e) => {
                warn!(counter = what, error = %e, "emulator state unavailable, reporting zero");
                T::default()
            }
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, EmulatorState>> {
        self.state
            .lock()
            .map_err(|_| RocmError::device(HipErrorCode::Unknown, "emulator state poisoned"))
    }

    fn kernel(&self, name: &str) -> Option<Arc<dyn HostKernel>> {
        self.kernels.read().ok().and_then(|k| k.get(name).cloned())
    }
}

/// `true` when `image` holds `name` as a NUL-terminated string.
fn image_exports(image: &[u8], name: &str) -> bool {
    let mut needle = name.as_bytes().to_vec();
    needle.push(0);
    !name.is_empty() && image.windows(needle.len()).any(|w| w == needle.as_slice())
}

impl DeviceRuntime for EmulatedRuntime {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn device_count(&self) -> Result<usize> {
        Ok(self.devices)
    }

    fn set_device(&self, device: i32) -> Result<()> {
        if device < 0 || device as usize >= self.devices {
            return Err(RocmError::device(HipErrorCode::InvalidDevice, "hipSetDevice"));
        }
        self.state()?.current_device = device;
        Ok(())
    }

    fn device_name(&self, device: i32) -> Result<String> {
        if device < 0 || device as usize >= self.devices {
            return Err(RocmError::device(HipErrorCode::InvalidDevice, "hipDeviceGetName"));
        }
        Ok(format!("hipk emulated device {device}"))
    }

    fn malloc(&self, bytes: usize) -> Result<DevicePtr> {
        let mut state = self.state()?;
        let addr = state.next_addr;
        let span = (bytes as u64).max(1).div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN;
        // A guard gap between allocations turns overruns into errors.
        state.next_addr += span + ALLOC_ALIGN;
        state.allocations.insert(addr, vec![0u8; bytes]);
        trace!(
            device = state.current_device,
            bytes,
            addr = %format!("{addr:#x}"),
            "emulated malloc"
        );
        Ok(DevicePtr(addr))
    }

    fn free(&self, ptr: DevicePtr) -> Result<()> {
        self.state()?
            .allocations
            .remove(&ptr.0)
            .map(|_| ())
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidValue, "hipFree"))
    }

    fn memcpy_htod(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut state = self.state()?;
        EmulatedMemory { allocations: &mut state.allocations }.write(dst, src)
    }

    fn memcpy_dtoh(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let mut state = self.state()?;
        let bytes = EmulatedMemory { allocations: &mut state.allocations }.read(src, dst.len())?;
        dst.copy_from_slice(&bytes);
        Ok(())
    }

    fn memset(&self, dst: DevicePtr, value: u8, bytes: usize) -> Result<()> {
        let mut state = self.state()?;
        EmulatedMemory { allocations: &mut state.allocations }.write(dst, &vec![value; bytes])
    }

    fn module_load(&self, path: &Path) -> Result<ModuleHandle> {
        let load_error = |code: HipErrorCode| RocmError::Load {
            path: path.to_path_buf(),
            code,
            raw: code.raw(),
        };
        let image = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => load_error(HipErrorCode::FileNotFound),
            _ => load_error(HipErrorCode::InvalidImage),
        })?;
        if image.is_empty() {
            return Err(load_error(HipErrorCode::InvalidImage));
        }
        let mut state = self.state()?;
        let id = state.handle();
        info!(path = %path.display(), bytes = image.len(), "emulated module load");
        state.modules.insert(id, LoadedModule { path: path.to_path_buf(), image });
        Ok(ModuleHandle(id))
    }

    fn module_unload(&self, module: ModuleHandle) -> Result<()> {
        self.state()?
            .modules
            .remove(&module.0)
            .map(|_| ())
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidHandle, "hipModuleUnload"))
    }

    fn module_get_function(&self, module: ModuleHandle, name: &str) -> Result<FunctionHandle> {
        let mut state = self.state()?;
        let loaded = state
            .modules
            .get(&module.0)
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidHandle, "hipModuleGetFunction"))?;
        if !image_exports(&loaded.image, name) || self.kernel(name).is_none() {
            debug!(module = %loaded.path.display(), symbol = name, "entry point not resolved");
            return Err(RocmError::SymbolNotFound { symbol: name.to_string() });
        }
        let id = state.handle();
        state.functions.insert(id, name.to_string());
        Ok(FunctionHandle(id))
    }

    fn event_create(&self) -> Result<EventHandle> {
        let mut state = self.state()?;
        let id = state.handle();
        state.events.insert(id, None);
        Ok(EventHandle(id))
    }

    fn event_destroy(&self, event: EventHandle) -> Result<()> {
        self.state()?
            .events
            .remove(&event.0)
            .map(|_| ())
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidHandle, "hipEventDestroy"))
    }

    fn event_record(&self, event: EventHandle, _stream: StreamHandle) -> Result<()> {
        let mut state = self.state()?;
        let slot = state
            .events
            .get_mut(&event.0)
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidHandle, "hipEventRecord"))?;
        *slot = Some(Instant::now());
        Ok(())
    }

    fn event_synchronize(&self, event: EventHandle) -> Result<()> {
        // Launches complete before `ext_module_launch_kernel` returns.
        self.event_query(event).map(|_| ())
    }

    fn event_query(&self, event: EventHandle) -> Result<bool> {
        let state = self.state()?;
        let slot = state
            .events
            .get(&event.0)
            .ok_or_else(|| RocmError::device(HipErrorCode::InvalidHandle, "hipEventQuery"))?;
        Ok(slot.is_some())
    }

    fn event_elapsed_ms(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        let state = self.state()?;
        let recorded = |event: EventHandle| -> Result<Instant> {
            let err = |code| RocmError::device(code, "hipEventElapsedTime");
            state
                .events
                .get(&event.0)
                .copied()
                .ok_or_else(|| err(HipErrorCode::InvalidHandle))?
                .ok_or_else(|| err(HipErrorCode::NotReady))
        };
        let (start, end) = (recorded(start)?, recorded(end)?);
        Ok(end.saturating_duration_since(start).as_secs_f32() * 1e3)
    }

    fn ext_module_launch_kernel(
        &self,
        function: FunctionHandle,
        config: &LaunchConfig,
        _stream: StreamHandle,
        args: &[u8],
    ) -> Result<()> {
        config.validate()?;
        let mut state = self.state()?;
        let entry_point = state
            .functions
            .get(&function.0)
            .cloned()
            .ok_or_else(|| {
                RocmError::device(HipErrorCode::InvalidHandle, "hipExtModuleLaunchKernel")
            })?;
        let kernel = self.kernel(&entry_point).ok_or_else(|| {
            let msg = format!("no host kernel for {entry_point}");
            RocmError::device(HipErrorCode::LaunchFailure, msg)
        })?;
        debug!(
            entry_point = %entry_point,
            grid = ?config.grid,
            block = ?config.block,
            args = args.len(),
            "emulated launch"
        );
        let launch = HostLaunch { entry_point: &entry_point, config: *config, args };
        kernel.execute(&launch, &mut EmulatedMemory { allocations: &mut state.allocations })?;
        state.launches += 1;
        Ok(())
    }

    fn device_synchronize(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fill(u8);

    impl HostKernel for Fill {
        fn execute(&self, launch: &HostLaunch<'_>, memory: &mut EmulatedMemory<'_>) -> Result<()> {
            let ptr = DevicePtr(u64::from_le_bytes(launch.args[..8].try_into().unwrap()));
            let len = u32::from_le_bytes(launch.args[8..12].try_into().unwrap()) as usize;
            memory.write(ptr, &vec![self.0; len])
        }
    }

    struct Double;

    impl HostKernel for Double {
        fn execute(&self, launch: &HostLaunch<'_>, memory: &mut EmulatedMemory<'_>) -> Result<()> {
            let ptr = DevicePtr(u64::from_le_bytes(launch.args[..8].try_into().unwrap()));
            let len = u32::from_le_bytes(launch.args[8..12].try_into().unwrap()) as usize;
            let values: Vec<f32> = memory.read_slice(ptr, len)?;
            let doubled: Vec<f32> = values.iter().map(|v| v * 2.0).collect();
            memory.write_slice(ptr, &doubled)
        }
    }

    #[test]
    fn image_export_requires_nul_terminator() {
        let image = b"\x7fELF....my_kernel\0other";
        assert!(image_exports(image, "my_kernel"));
        assert!(!image_exports(image, "my_kern"));
        assert!(!image_exports(image, "other"));
        assert!(!image_exports(image, ""));
    }

    #[test]
    fn allocations_do_not_overlap_and_overruns_fail() {
        let rt = EmulatedRuntime::new();
        let a = rt.malloc(10).unwrap();
        let b = rt.malloc(10).unwrap();
        assert!(b.0 >= a.0 + 256);
        assert!(rt.memcpy_htod(a, &[1u8; 11]).is_err());
        assert!(rt.memcpy_htod(a.offset(5), &[1u8; 5]).is_ok());
    }

    #[test]
    fn free_twice_is_an_error() {
        let rt = EmulatedRuntime::new();
        let a = rt.malloc(4).unwrap();
        rt.free(a).unwrap();
        assert!(rt.free(a).is_err());
    }

    #[test]
    fn launch_runs_host_kernel_against_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fill.co");
        std::fs::write(&path, b"\x7fELF\0fill_kernel\0").unwrap();

        let rt = EmulatedRuntime::new().with_kernel("fill_kernel", Arc::new(Fill(7)));
        let buf = rt.malloc(16).unwrap();
        let module = rt.module_load(&path).unwrap();
        let func = rt.module_get_function(module, "fill_kernel").unwrap();

        let mut args = buf.to_le_bytes().to_vec();
        args.extend_from_slice(&16u32.to_le_bytes());
        rt.ext_module_launch_kernel(func, &LaunchConfig::default(), StreamHandle::DEFAULT, &args)
            .unwrap();

        let mut out = [0u8; 16];
        rt.memcpy_dtoh(&mut out, buf).unwrap();
        assert_eq!(out, [7u8; 16]);
        assert_eq!(rt.launch_count(), 1);
    }

    #[test]
    fn host_kernel_reads_typed_slices_at_unaligned_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("double.co");
        std::fs::write(&path, b"\x7fELF\0double\0").unwrap();

        let rt = EmulatedRuntime::new().with_kernel("double", Arc::new(Double));
        let buf = rt.malloc(4 + 3 * 4).unwrap();
        let values = [0.5f32, -1.25, 3.0];
        // Start one f32 in so the slice does not begin at the allocation base.
        let target = buf.offset(4);
        rt.memcpy_htod(target, bytemuck::cast_slice(&values)).unwrap();
        let module = rt.module_load(&path).unwrap();
        let func = rt.module_get_function(module, "double").unwrap();

        let mut args = target.to_le_bytes().to_vec();
        args.extend_from_slice(&3u32.to_le_bytes());
        rt.ext_module_launch_kernel(func, &LaunchConfig::default(), StreamHandle::DEFAULT, &args)
            .unwrap();

        let mut out = [0u8; 12];
        rt.memcpy_dtoh(&mut out, target).unwrap();
        let got: Vec<f32> = bytemuck::pod_collect_to_vec(&out);
        assert_eq!(got, vec![1.0, -2.5, 6.0]);
    }

    #[test]
    fn poisoned_state_still_reports_counters_without_panicking() {
        let rt = Arc::new(EmulatedRuntime::new());
        rt.malloc(8).unwrap();
        let poisoner = Arc::clone(&rt);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.lock().unwrap();
            panic!("poison emulator state");
        })
        .join();
        assert_eq!(rt.live_allocations(), 0);
        assert!(rt.malloc(8).is_err());
    }

    #[test]
    fn elapsed_requires_recorded_events() {
        let rt = EmulatedRuntime::new();
        let start = rt.event_create().unwrap();
        let end = rt.event_create().unwrap();
        rt.event_record(start, StreamHandle::DEFAULT).unwrap();
        let err = rt.event_elapsed_ms(start, end).unwrap_err();
        assert_eq!(err.status(), Some(HipErrorCode::NotReady.raw()));
        rt.event_record(end, StreamHandle::DEFAULT).unwrap();
        assert!(rt.event_elapsed_ms(start, end).unwrap() >= 0.0);
    }

    #[test]
    fn set_device_out_of_range() {
        let rt = EmulatedRuntime::with_devices(2);
        rt.set_device(1).unwrap();
        assert!(rt.set_device(2).is_err());
        assert!(rt.set_device(-1).is_err());
    }
}
