//! Contracts for the precompiled kernels the harness knows how to drive.
//!
//! Each kernel module pins the entry point, default code object, launch
//! geometry and argument [`KernelSignature`] of one artifact, plus a
//! [`HostKernel`] emulation for running without a GPU.

pub mod amax;

use std::sync::Arc;

use hipk_runtime::{EmulatedRuntime, HostKernel};

use crate::reference::ScaleConvention;
use crate::signature::KernelSignature;

/// Enumeration of the known precompiled kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecompiledKernel {
    /// Absolute-max reduction with scaled intermediate output.
    Amax,
}

impl PrecompiledKernel {
    #[must_use]
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Amax => amax::ENTRY_POINT,
        }
    }

    #[must_use]
    pub fn default_code_object(self) -> &'static str {
        match self {
            Self::Amax => amax::CODE_OBJECT,
        }
    }

    #[must_use]
    pub fn signature(self) -> &'static KernelSignature {
        match self {
            Self::Amax => &amax::SIGNATURE,
        }
    }

    /// Host emulation registered with [`EmulatedRuntime`].
    pub fn host_kernel(self, convention: ScaleConvention) -> Arc<dyn HostKernel> {
        match self {
            Self::Amax => Arc::new(amax::AmaxHostKernel::new(convention)),
        }
    }

    pub const ALL: &[PrecompiledKernel] = &[Self::Amax];
}

/// Register every known kernel's host emulation under its entry point.
pub fn register_host_kernels(runtime: &EmulatedRuntime, convention: ScaleConvention) {
    for &kernel in PrecompiledKernel::ALL {
        runtime.register_kernel(kernel.entry_point(), kernel.host_kernel(convention));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_name_their_entry_points() {
        for &k in PrecompiledKernel::ALL {
            assert_eq!(k.signature().entry_point, k.entry_point(), "{k:?}");
            assert!(!k.default_code_object().is_empty());
        }
    }
}
