//! Packed kernel argument buffers.
//!
//! A code object launched through the `extra` parameter list receives its
//! arguments as one opaque byte buffer. [`KernelArguments`] builds that buffer:
//! each value is written little-endian at the cursor with no padding between
//! values, and a single alignment pass pads the tail to the ABI boundary.
//!
//! ```
//! use hipk_harness::args::KernelArguments;
//! use hipk_runtime::DevicePtr;
//!
//! let mut args = KernelArguments::new();
//! args.append(DevicePtr(0x1000));
//! args.append(1024u32);
//! args.apply_alignment();
//! assert_eq!(args.size(), 16);
//! ```

use std::fmt;

use hipk_runtime::{DeviceBuffer, DevicePtr};

/// ABI alignment of the argument buffer for AMDGPU code objects.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// Wire type of a single kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Pointer,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ArgKind {
    /// Size in bytes inside the argument buffer.
    pub const fn size(self) -> usize {
        match self {
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::Pointer | Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pointer => "ptr",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A single tagged kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Pointer(DevicePtr),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl KernelArg {
    pub const fn kind(&self) -> ArgKind {
        match self {
            Self::Pointer(_) => ArgKind::Pointer,
            Self::U32(_) => ArgKind::U32,
            Self::I32(_) => ArgKind::I32,
            Self::U64(_) => ArgKind::U64,
            Self::I64(_) => ArgKind::I64,
            Self::F32(_) => ArgKind::F32,
            Self::F64(_) => ArgKind::F64,
        }
    }

    pub const fn size(&self) -> usize {
        self.kind().size()
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Pointer(p) => out.extend_from_slice(&p.to_le_bytes()),
            Self::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for KernelArg {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

impl_from_scalar!(
    DevicePtr => Pointer,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

impl From<&DeviceBuffer<'_>> for KernelArg {
    fn from(buffer: &DeviceBuffer<'_>) -> Self {
        Self::Pointer(buffer.ptr())
    }
}

/// Append-only argument buffer with a write cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelArguments {
    buffer: Vec<u8>,
    entries: Vec<(usize, KernelArg)>,
    alignment: usize,
    aligned: bool,
}

impl Default for KernelArguments {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelArguments {
    pub fn new() -> Self {
        Self::with_alignment(DEFAULT_ALIGNMENT)
    }

    /// # Panics
    /// If `alignment` is not a power of two.
    pub fn with_alignment(alignment: usize) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "argument alignment {alignment} is not a power of two"
        );
        Self { buffer: Vec::with_capacity(64), entries: Vec::new(), alignment, aligned: false }
    }

    /// Write `value` at the cursor and advance by its size.
    ///
    /// # Panics
    /// If called after [`apply_alignment`](Self::apply_alignment): the layout
    /// is sealed at that point.
    pub fn append(&mut self, value: impl Into<KernelArg>) -> &mut Self {
        assert!(!self.aligned, "KernelArguments::append called after apply_alignment");
        let value = value.into();
        self.entries.push((self.buffer.len(), value));
        value.write_le(&mut self.buffer);
        self
    }

    /// Zero-pad to the next multiple of the ABI alignment. Idempotent.
    pub fn apply_alignment(&mut self) -> &mut Self {
        let padded = self.buffer.len().next_multiple_of(self.alignment);
        self.buffer.resize(padded, 0);
        self.aligned = true;
        self
    }

    /// Current length in bytes.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Appended arguments with their byte offsets, in append order.
    pub fn arguments(&self) -> &[(usize, KernelArg)] {
        &self.entries
    }

    /// Sum of the argument sizes, excluding tail padding.
    pub fn packed_size(&self) -> usize {
        self.entries.iter().map(|(_, a)| a.size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_packed_without_interior_padding() {
        let mut args = KernelArguments::new();
        args.append(7u32).append(DevicePtr(0x1122_3344_5566_7788));
        let offsets: Vec<usize> = args.arguments().iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(args.size(), 12);
        assert_eq!(&args.buffer()[4..12], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn alignment_pads_tail_with_zeros() {
        let mut args = KernelArguments::new();
        args.append(DevicePtr(1)).append(1024u32);
        args.apply_alignment();
        assert_eq!(args.size(), 16);
        assert_eq!(&args.buffer()[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn alignment_is_idempotent() {
        let mut args = KernelArguments::new();
        args.append(1.5f32);
        args.apply_alignment();
        let once = args.size();
        args.apply_alignment();
        assert_eq!(args.size(), once);
        assert_eq!(once, 8);
    }

    #[test]
    fn empty_buffer_stays_empty_after_alignment() {
        let mut args = KernelArguments::new();
        args.apply_alignment();
        assert_eq!(args.size(), 0);
    }

    #[test]
    #[should_panic(expected = "after apply_alignment")]
    fn append_after_alignment_panics() {
        let mut args = KernelArguments::new();
        args.append(1u32);
        args.apply_alignment();
        args.append(2u32);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_alignment_panics() {
        let _ = KernelArguments::with_alignment(12);
    }

    #[test]
    fn scalars_use_little_endian() {
        let mut args = KernelArguments::new();
        args.append(-2i32).append(0.5f64);
        assert_eq!(&args.buffer()[..4], &(-2i32).to_le_bytes());
        assert_eq!(&args.buffer()[4..12], &0.5f64.to_le_bytes());
    }
}
