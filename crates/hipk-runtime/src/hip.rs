//! HIP backend, resolved from the ROCm shared library at run time.
//!
//! Nothing links against ROCm at build time: `libamdhip64` is opened with
//! `libloading` and every entry point is looked up by name. A missing library
//! or symbol is reported as [`RocmError::RuntimeNotFound`].

use std::ffi::{CStr, CString, OsStr, c_char, c_void};
use std::fmt;
use std::path::Path;

use libloading::Library;
use tracing::{debug, info, trace};

use crate::error::{HipErrorCode, Result, RocmError, check_hip};
use crate::handle::{DevicePtr, EventHandle, FunctionHandle, ModuleHandle, StreamHandle};
use crate::kernel::LaunchConfig;
use crate::runtime::DeviceRuntime;

/// Default shared library name for the current platform.
#[cfg(target_os = "windows")]
pub const HIP_LIBRARY: &str = "amdhip64.dll";
#[cfg(not(target_os = "windows"))]
pub const HIP_LIBRARY: &str = "libamdhip64.so";

type Status = i32;
type Raw = *mut c_void;

// Keys of the `extra` launch parameter list.
const HIP_LAUNCH_PARAM_BUFFER_POINTER: usize = 0x01;
const HIP_LAUNCH_PARAM_BUFFER_SIZE: usize = 0x02;
const HIP_LAUNCH_PARAM_END: usize = 0x03;

#[derive(Clone, Copy)]
struct HipApi {
    get_device_count: unsafe extern "C" fn(*mut i32) -> Status,
    set_device: unsafe extern "C" fn(i32) -> Status,
    device_get_name: unsafe extern "C" fn(*mut c_char, i32, i32) -> Status,
    malloc: unsafe extern "C" fn(*mut Raw, usize) -> Status,
    free: unsafe extern "C" fn(Raw) -> Status,
    memcpy_htod: unsafe extern "C" fn(Raw, *const c_void, usize) -> Status,
    memcpy_dtoh: unsafe extern "C" fn(Raw, Raw, usize) -> Status,
    memset: unsafe extern "C" fn(Raw, i32, usize) -> Status,
    module_load: unsafe extern "C" fn(*mut Raw, *const c_char) -> Status,
    module_unload: unsafe extern "C" fn(Raw) -> Status,
    module_get_function: unsafe extern "C" fn(*mut Raw, Raw, *const c_char) -> Status,
    event_create: unsafe extern "C" fn(*mut Raw) -> Status,
    event_destroy: unsafe extern "C" fn(Raw) -> Status,
    event_record: unsafe extern "C" fn(Raw, Raw) -> Status,
    event_synchronize: unsafe extern "C" fn(Raw) -> Status,
    event_query: unsafe extern "C" fn(Raw) -> Status,
    event_elapsed_time: unsafe extern "C" fn(*mut f32, Raw, Raw) -> Status,
    #[allow(clippy::type_complexity)]
    ext_module_launch_kernel: unsafe extern "C" fn(
        Raw,
        u32,
        u32,
        u32,
        u32,
        u32,
        u32,
        usize,
        Raw,
        *mut Raw,
        *mut Raw,
        Raw,
        Raw,
        u32,
    ) -> Status,
    device_synchronize: unsafe extern "C" fn() -> Status,
    get_error_string: unsafe extern "C" fn(Status) -> *const c_char,
}

/// Resolve one symbol and copy the function pointer out of the library.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    let mut key = name.as_bytes().to_vec();
    key.push(0);
    unsafe { lib.get::<T>(&key) }
        .map(|sym| *sym)
        .map_err(|e| RocmError::RuntimeNotFound(format!("missing HIP symbol {name}: {e}")))
}

impl HipApi {
    /// # Safety
    /// `lib` must be a HIP runtime exporting the documented C ABI.
    unsafe fn resolve(lib: &Library) -> Result<Self> {
        unsafe {
            Ok(Self {
                get_device_count: symbol(lib, "hipGetDeviceCount")?,
                set_device: symbol(lib, "hipSetDevice")?,
                device_get_name: symbol(lib, "hipDeviceGetName")?,
                malloc: symbol(lib, "hipMalloc")?,
                free: symbol(lib, "hipFree")?,
                memcpy_htod: symbol(lib, "hipMemcpyHtoD")?,
                memcpy_dtoh: symbol(lib, "hipMemcpyDtoH")?,
                memset: symbol(lib, "hipMemset")?,
                module_load: symbol(lib, "hipModuleLoad")?,
                module_unload: symbol(lib, "hipModuleUnload")?,
                module_get_function: symbol(lib, "hipModuleGetFunction")?,
                event_create: symbol(lib, "hipEventCreate")?,
                event_destroy: symbol(lib, "hipEventDestroy")?,
                event_record: symbol(lib, "hipEventRecord")?,
                event_synchronize: symbol(lib, "hipEventSynchronize")?,
                event_query: symbol(lib, "hipEventQuery")?,
                event_elapsed_time: symbol(lib, "hipEventElapsedTime")?,
                ext_module_launch_kernel: symbol(lib, "hipExtModuleLaunchKernel")?,
                device_synchronize: symbol(lib, "hipDeviceSynchronize")?,
                get_error_string: symbol(lib, "hipGetErrorString")?,
            })
        }
    }
}

fn raw(handle: u64) -> Raw {
    handle as usize as Raw
}

fn handle(ptr: Raw) -> u64 {
    ptr as usize as u64
}

/// [`DeviceRuntime`] backed by the real HIP runtime.
pub struct HipRuntime {
    api: HipApi,
    library: String,
    _lib: Library,
}

impl fmt::Debug for HipRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HipRuntime").field("library", &self.library).finish_non_exhaustive()
    }
}

impl HipRuntime {
    /// Open the platform default HIP library.
    pub fn load() -> Result<Self> {
        Self::load_from(HIP_LIBRARY)
    }

    /// Open a HIP library by name or path.
    pub fn load_from(library: impl AsRef<OsStr>) -> Result<Self> {
        let library = library.as_ref();
        let lib = unsafe { Library::new(library) }.map_err(|e| {
            RocmError::RuntimeNotFound(format!("{}: {e}", library.to_string_lossy()))
        })?;
        let api = unsafe { HipApi::resolve(&lib)? };
        info!(library = %library.to_string_lossy(), "HIP runtime loaded");
        Ok(Self { api, library: library.to_string_lossy().into_owned(), _lib: lib })
    }

    /// Check a status, attaching `hipGetErrorString` text to the context.
    fn check(&self, status: Status, call: &str) -> Result<()> {
        if status == 0 {
            return Ok(());
        }
        let text = unsafe {
            let ptr = (self.api.get_error_string)(status);
            if ptr.is_null() {
                String::new()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        };
        if text.is_empty() {
            check_hip(status, call)
        } else {
            check_hip(status, &format!("{call}: {text}"))
        }
    }
}

impl DeviceRuntime for HipRuntime {
    fn name(&self) -> &'static str {
        "hip"
    }

    fn device_count(&self) -> Result<usize> {
        let mut count = 0i32;
        self.check(unsafe { (self.api.get_device_count)(&mut count) }, "hipGetDeviceCount")?;
        Ok(count.max(0) as usize)
    }

    fn set_device(&self, device: i32) -> Result<()> {
        self.check(unsafe { (self.api.set_device)(device) }, "hipSetDevice")
    }

    fn device_name(&self, device: i32) -> Result<String> {
        let mut buf = [0 as c_char; 256];
        self.check(
            unsafe { (self.api.device_get_name)(buf.as_mut_ptr(), buf.len() as i32, device) },
            "hipDeviceGetName",
        )?;
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn malloc(&self, bytes: usize) -> Result<DevicePtr> {
        let mut ptr: Raw = std::ptr::null_mut();
        self.check(unsafe { (self.api.malloc)(&mut ptr, bytes) }, "hipMalloc")?;
        trace!(bytes, ptr = ?ptr, "hipMalloc");
        Ok(DevicePtr(handle(ptr)))
    }

    fn free(&self, ptr: DevicePtr) -> Result<()> {
        self.check(unsafe { (self.api.free)(raw(ptr.0)) }, "hipFree")
    }

    fn memcpy_htod(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        self.check(
            unsafe { (self.api.memcpy_htod)(raw(dst.0), src.as_ptr().cast(), src.len()) },
            "hipMemcpyHtoD",
        )
    }

    fn memcpy_dtoh(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        self.check(
            unsafe { (self.api.memcpy_dtoh)(dst.as_mut_ptr().cast(), raw(src.0), dst.len()) },
            "hipMemcpyDtoH",
        )
    }

    fn memset(&self, dst: DevicePtr, value: u8, bytes: usize) -> Result<()> {
        self.check(
            unsafe { (self.api.memset)(raw(dst.0), i32::from(value), bytes) },
            "hipMemset",
        )
    }

    fn module_load(&self, path: &Path) -> Result<ModuleHandle> {
        if !path.is_file() {
            return Err(RocmError::Load {
                path: path.to_path_buf(),
                code: HipErrorCode::FileNotFound,
                raw: HipErrorCode::FileNotFound.raw(),
            });
        }
        let c_path = path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| {
                RocmError::InvalidArgument(format!("unusable path {}", path.display()))
            })?;
        let mut module: Raw = std::ptr::null_mut();
        let status = unsafe { (self.api.module_load)(&mut module, c_path.as_ptr()) };
        if status != 0 {
            return Err(RocmError::Load {
                path: path.to_path_buf(),
                code: HipErrorCode::from_raw(status),
                raw: status,
            });
        }
        debug!(path = %path.display(), "hipModuleLoad");
        Ok(ModuleHandle(handle(module)))
    }

    fn module_unload(&self, module: ModuleHandle) -> Result<()> {
        self.check(unsafe { (self.api.module_unload)(raw(module.0)) }, "hipModuleUnload")
    }

    fn module_get_function(&self, module: ModuleHandle, name: &str) -> Result<FunctionHandle> {
        let c_name = CString::new(name)
            .map_err(|_| RocmError::InvalidArgument(format!("entry point {name:?} contains NUL")))?;
        let mut function: Raw = std::ptr::null_mut();
        let status = unsafe {
            (self.api.module_get_function)(&mut function, raw(module.0), c_name.as_ptr())
        };
        if HipErrorCode::from_raw(status) == HipErrorCode::NotFound {
            return Err(RocmError::SymbolNotFound { symbol: name.to_string() });
        }
        self.check(status, "hipModuleGetFunction")?;
        Ok(FunctionHandle(handle(function)))
    }

    fn event_create(&self) -> Result<EventHandle> {
        let mut event: Raw = std::ptr::null_mut();
        self.check(unsafe { (self.api.event_create)(&mut event) }, "hipEventCreate")?;
        Ok(EventHandle(handle(event)))
    }

    fn event_destroy(&self, event: EventHandle) -> Result<()> {
        self.check(unsafe { (self.api.event_destroy)(raw(event.0)) }, "hipEventDestroy")
    }

    fn event_record(&self, event: EventHandle, stream: StreamHandle) -> Result<()> {
        self.check(
            unsafe { (self.api.event_record)(raw(event.0), raw(stream.0)) },
            "hipEventRecord",
        )
    }

    fn event_synchronize(&self, event: EventHandle) -> Result<()> {
        self.check(unsafe { (self.api.event_synchronize)(raw(event.0)) }, "hipEventSynchronize")
    }

    fn event_query(&self, event: EventHandle) -> Result<bool> {
        let status = unsafe { (self.api.event_query)(raw(event.0)) };
        if HipErrorCode::from_raw(status) == HipErrorCode::NotReady {
            return Ok(false);
        }
        self.check(status, "hipEventQuery")?;
        Ok(true)
    }

    fn event_elapsed_ms(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        let mut ms = 0f32;
        self.check(
            unsafe { (self.api.event_elapsed_time)(&mut ms, raw(start.0), raw(end.0)) },
            "hipEventElapsedTime",
        )?;
        Ok(ms)
    }

    fn ext_module_launch_kernel(
        &self,
        function: FunctionHandle,
        config: &LaunchConfig,
        stream: StreamHandle,
        args: &[u8],
    ) -> Result<()> {
        config.validate()?;
        let mut args_size = args.len();
        let mut extra = launch_params(args, &mut args_size);
        let (gx, gy, gz) = config.grid;
        let (bx, by, bz) = config.block;
        debug!(
            grid = ?config.grid,
            block = ?config.block,
            shared_mem = config.shared_mem_bytes,
            args_size,
            "hipExtModuleLaunchKernel"
        );
        // SAFETY: `extra` and `args_size` outlive the call; the runtime copies
        // the argument buffer before returning.
        let status = unsafe {
            (self.api.ext_module_launch_kernel)(
                raw(function.0),
                gx,
                gy,
                gz,
                bx,
                by,
                bz,
                config.shared_mem_bytes as usize,
                raw(stream.0),
                std::ptr::null_mut(),
                extra.as_mut_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                0,
            )
        };
        self.check(status, "hipExtModuleLaunchKernel")
    }

    fn device_synchronize(&self) -> Result<()> {
        self.check(unsafe { (self.api.device_synchronize)() }, "hipDeviceSynchronize")
    }
}

/// The `extra` list for `hipExtModuleLaunchKernel`.
///
/// Key/value pairs terminated by `END`: the buffer address, then a pointer to
/// its length. Both `args` and `size` must outlive the launch call.
fn launch_params(args: &[u8], size: &mut usize) -> [Raw; 5] {
    *size = args.len();
    [
        std::ptr::without_provenance_mut(HIP_LAUNCH_PARAM_BUFFER_POINTER),
        args.as_ptr().cast_mut().cast(),
        std::ptr::without_provenance_mut(HIP_LAUNCH_PARAM_BUFFER_SIZE),
        std::ptr::from_mut(size).cast(),
        std::ptr::without_provenance_mut(HIP_LAUNCH_PARAM_END),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_params_follow_extra_protocol() {
        let args = [0xabu8; 40];
        let mut size = 0usize;
        let extra = launch_params(&args, &mut size);
        assert_eq!(size, 40);

        assert_eq!(extra[0].addr(), 0x01);
        assert_eq!(extra[1].cast_const().cast::<u8>(), args.as_ptr());
        assert_eq!(extra[2].addr(), 0x02);
        assert_eq!(extra[3].cast_const().cast::<usize>(), std::ptr::from_ref(&size));
        assert_eq!(extra[4].addr(), 0x03);
        // SAFETY: extra[3] points at `size`, which is still live.
        assert_eq!(unsafe { *extra[3].cast::<usize>() }, args.len());
    }

    #[test]
    fn launch_params_track_buffer_length() {
        let args = [0u8; 36];
        let mut size = usize::MAX;
        let extra = launch_params(&args, &mut size);
        assert_eq!(size, 36);
        assert_eq!(extra[1].cast_const().cast::<u8>(), args.as_ptr());
    }

    #[test]
    fn missing_library_is_runtime_not_found() {
        let err = HipRuntime::load_from("libhipk-definitely-not-here.so").unwrap_err();
        assert!(matches!(err, RocmError::RuntimeNotFound(_)));
    }

    #[test]
    fn handle_conversion_round_trips() {
        let value = 0xdead_beef_u64;
        assert_eq!(handle(raw(value)), value);
    }
}
