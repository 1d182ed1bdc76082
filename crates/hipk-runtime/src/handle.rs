//! Opaque runtime handles.
//!
//! Every handle is a plain `u64`. The HIP backend stores the driver's pointer
//! value; the emulator hands out synthetic ids. Handles carry no lifetime;
//! ownership lives in the scoped wrappers of [`crate::resource`].

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);
        }
    };
}

opaque_handle!(
    /// Address of accelerator-resident memory.
    DevicePtr
);
opaque_handle!(
    /// A loaded code object (`hipModule_t`).
    ModuleHandle
);
opaque_handle!(
    /// A resolved kernel entry point (`hipFunction_t`).
    FunctionHandle
);
opaque_handle!(
    /// A timing event (`hipEvent_t`).
    EventHandle
);
opaque_handle!(
    /// A command stream (`hipStream_t`); [`StreamHandle::DEFAULT`] is the null stream.
    StreamHandle
);

impl StreamHandle {
    pub const DEFAULT: Self = Self::NULL;
}

impl DevicePtr {
    /// Pointer `bytes` past this one.
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// Little-endian bytes as the kernel ABI sees a 64-bit device pointer.
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}
