//! Device enumeration.

use tracing::{info, warn};

use crate::error::Result;
use crate::runtime::DeviceRuntime;

/// Information about a visible accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: i32,
    pub name: String,
    pub backend: &'static str,
}

/// Enumerate the devices a runtime exposes.
///
/// Returns an empty list when the runtime reports no devices.
pub fn enumerate_devices(runtime: &dyn DeviceRuntime) -> Result<Vec<DeviceInfo>> {
    let count = runtime.device_count()?;
    if count == 0 {
        warn!(backend = runtime.name(), "runtime present but no devices found");
        return Ok(vec![]);
    }

    let mut devices = Vec::with_capacity(count);
    for index in 0..count as i32 {
        let name = runtime.device_name(index)?;
        info!(index, name = %name, backend = runtime.name(), "discovered device");
        devices.push(DeviceInfo { index, name, backend: runtime.name() });
    }
    Ok(devices)
}

/// Check if the HIP shared library can be located.
pub fn hip_runtime_available() -> bool {
    #[cfg(any(target_os = "linux", target_os = "windows"))]
    {
        unsafe { libloading::Library::new(crate::hip::HIP_LIBRARY).is_ok() }
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedRuntime;

    #[test]
    fn enumerates_every_emulated_device() {
        let rt = EmulatedRuntime::with_devices(3);
        let devices = enumerate_devices(&rt).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].index, 2);
        assert_eq!(devices[0].backend, "emulated");
    }

    #[test]
    fn no_devices_is_empty_not_error() {
        let rt = EmulatedRuntime::with_devices(0);
        assert!(enumerate_devices(&rt).unwrap().is_empty());
    }
}
