//! Declared parameter lists for precompiled kernels.
//!
//! A code object's expected argument order, types and sizes are an
//! out-of-band agreement that no compiler checks. Each kernel therefore ships a
//! [`KernelSignature`], versioned alongside the artifact, and a packed
//! [`KernelArguments`] can be checked against it before launch.

use thiserror::Error;

use crate::args::{ArgKind, KernelArguments};

/// One named parameter of a kernel signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl ParamSpec {
    pub const fn new(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind }
    }
}

/// Argument buffer layout divergence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("{entry_point} v{version}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        entry_point: &'static str,
        version: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{entry_point}: argument {index} `{name}` should be {expected}, got {actual}")]
    KindMismatch {
        entry_point: &'static str,
        index: usize,
        name: &'static str,
        expected: ArgKind,
        actual: ArgKind,
    },

    #[error("{entry_point}: argument `{name}` at offset {actual}, expected {expected}")]
    OffsetMismatch {
        entry_point: &'static str,
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{entry_point}: argument buffer not sealed with apply_alignment")]
    NotAligned { entry_point: &'static str },

    #[error("{entry_point}: argument buffer sealed to {actual} bytes, ABI requires {expected}")]
    AlignmentMismatch {
        entry_point: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{entry_point}: argument buffer is {actual} bytes, expected {expected}")]
    SizeMismatch {
        entry_point: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// The parameter list a code object entry point expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    pub entry_point: &'static str,
    /// Bumped whenever the artifact's argument list changes.
    pub version: u32,
    pub alignment: usize,
    pub params: &'static [ParamSpec],
}

impl KernelSignature {
    /// Byte offset of every parameter when packed back to back.
    pub fn offsets(&self) -> Vec<usize> {
        self.params
            .iter()
            .scan(0usize, |cursor, p| {
                let offset = *cursor;
                *cursor += p.kind.size();
                Some(offset)
            })
            .collect()
    }

    /// Total argument buffer size after the alignment pass.
    pub fn buffer_size(&self) -> usize {
        let packed: usize = self.params.iter().map(|p| p.kind.size()).sum();
        packed.next_multiple_of(self.alignment)
    }

    /// Verify a sealed argument buffer against this signature.
    ///
    /// Reports the first divergence: count, then per-argument kind and offset,
    /// then sealing, alignment and final size.
    pub fn check(&self, args: &KernelArguments) -> Result<(), LayoutError> {
        let entry_point = self.entry_point;
        let actual = args.arguments();
        if actual.len() != self.params.len() {
            return Err(LayoutError::ArgumentCount {
                entry_point,
                version: self.version,
                expected: self.params.len(),
                actual: actual.len(),
            });
        }
        for (index, ((param, expected_offset), (offset, arg))) in
            self.params.iter().zip(self.offsets()).zip(actual).enumerate()
        {
            if param.kind != arg.kind() {
                return Err(LayoutError::KindMismatch {
                    entry_point,
                    index,
                    name: param.name,
                    expected: param.kind,
                    actual: arg.kind(),
                });
            }
            if *offset != expected_offset {
                return Err(LayoutError::OffsetMismatch {
                    entry_point,
                    name: param.name,
                    expected: expected_offset,
                    actual: *offset,
                });
            }
        }
        if !args.is_aligned() {
            return Err(LayoutError::NotAligned { entry_point });
        }
        if args.alignment() != self.alignment {
            return Err(LayoutError::AlignmentMismatch {
                entry_point,
                expected: self.alignment,
                actual: args.alignment(),
            });
        }
        if args.size() != self.buffer_size() {
            return Err(LayoutError::SizeMismatch {
                entry_point,
                expected: self.buffer_size(),
                actual: args.size(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hipk_runtime::DevicePtr;

    const SIG: KernelSignature = KernelSignature {
        entry_point: "scale_kernel",
        version: 1,
        alignment: 8,
        params: &[
            ParamSpec::new("out", ArgKind::Pointer),
            ParamSpec::new("count", ArgKind::U32),
            ParamSpec::new("factor", ArgKind::F32),
        ],
    };

    #[test]
    fn offsets_and_size() {
        assert_eq!(SIG.offsets(), vec![0, 8, 12]);
        assert_eq!(SIG.buffer_size(), 16);
    }

    #[test]
    fn matching_buffer_passes() {
        let mut args = KernelArguments::new();
        args.append(DevicePtr(0x10)).append(4u32).append(2.0f32).apply_alignment();
        SIG.check(&args).unwrap();
    }

    #[test]
    fn swapped_scalars_are_reported() {
        let mut args = KernelArguments::new();
        args.append(DevicePtr(0x10)).append(2.0f32).append(4u32).apply_alignment();
        let err = SIG.check(&args).unwrap_err();
        assert!(matches!(err, LayoutError::KindMismatch { index: 1, name: "count", .. }));
    }

    #[test]
    fn missing_argument_is_reported() {
        let mut args = KernelArguments::new();
        args.append(DevicePtr(0x10)).append(4u32).apply_alignment();
        let err = SIG.check(&args).unwrap_err();
        assert!(matches!(err, LayoutError::ArgumentCount { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn unsealed_buffer_is_reported() {
        let mut args = KernelArguments::new();
        args.append(DevicePtr(0x10)).append(4u32).append(2.0f32);
        assert!(matches!(SIG.check(&args), Err(LayoutError::NotAligned { .. })));
    }

    #[test]
    fn wrong_alignment_is_reported() {
        let mut args = KernelArguments::with_alignment(32);
        args.append(DevicePtr(0x10)).append(4u32).append(2.0f32).apply_alignment();
        assert!(matches!(
            SIG.check(&args),
            Err(LayoutError::AlignmentMismatch { expected: 8, actual: 32, .. })
        ));
    }

    #[test]
    fn alignment_mismatch_is_caught_when_sizes_coincide() {
        // 16 bytes either way; only the sealing boundary differs.
        let mut args = KernelArguments::with_alignment(16);
        args.append(DevicePtr(0x10)).append(4u32).append(2.0f32).apply_alignment();
        assert_eq!(args.size(), SIG.buffer_size());
        assert!(matches!(
            SIG.check(&args),
            Err(LayoutError::AlignmentMismatch { expected: 8, actual: 16, .. })
        ));
    }
}
