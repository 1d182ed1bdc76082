//! `AMax_Ti_S_To_S_W_256_C_4`: absolute-max reduction over an f32 buffer.
//!
//! Built for gfx942 with 256 threads per workgroup and one row per workgroup.
//! Writes the reduced value into `dst[0]` and a scaled copy of the input into
//! the intermediate buffer.

use hipk_runtime::{
    DeviceBuffer, DeviceContext, DevicePtr, EmulatedMemory, HostKernel, HostLaunch, RocmError,
};
use tracing::trace;

use crate::args::{ArgKind, DEFAULT_ALIGNMENT, KernelArguments};
use crate::error::Result;
use crate::launch::TileShape;
use crate::reference::ScaleConvention;
use crate::signature::{KernelSignature, ParamSpec};

pub const ENTRY_POINT: &str = "AMax_Ti_S_To_S_W_256_C_4";
pub const CODE_OBJECT: &str = "A_S_S_256_4_gfx942.co";
pub const WORKGROUP_SIZE: u32 = 256;
pub const TILE: TileShape = TileShape::new(1, 256);
/// One f32 of LDS per thread.
pub const SHARED_MEM_BYTES: u32 = WORKGROUP_SIZE * size_of::<f32>() as u32;

pub const SIGNATURE: KernelSignature = KernelSignature {
    entry_point: ENTRY_POINT,
    version: 1,
    alignment: DEFAULT_ALIGNMENT,
    params: &[
        ParamSpec::new("dst", ArgKind::Pointer),
        ParamSpec::new("dst_intermediate", ArgKind::Pointer),
        ParamSpec::new("src", ArgKind::Pointer),
        ParamSpec::new("scale", ArgKind::Pointer),
        ParamSpec::new("num_elements", ArgKind::U32),
    ],
};

/// Typed view of the AMax argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmaxArgs {
    pub dst: DevicePtr,
    pub dst_intermediate: DevicePtr,
    pub src: DevicePtr,
    pub scale: DevicePtr,
    pub num_elements: u32,
}

impl AmaxArgs {
    /// Pack in signature order and seal.
    pub fn to_kernel_arguments(&self) -> KernelArguments {
        let mut args = KernelArguments::with_alignment(SIGNATURE.alignment);
        args.append(self.dst)
            .append(self.dst_intermediate)
            .append(self.src)
            .append(self.scale)
            .append(self.num_elements)
            .apply_alignment();
        args
    }

    /// Decode a raw argument buffer as the device kernel would read it.
    pub fn decode(bytes: &[u8]) -> hipk_runtime::Result<Self> {
        if bytes.len() < SIGNATURE.buffer_size() {
            return Err(RocmError::InvalidArgument(format!(
                "{ENTRY_POINT} expects {} argument bytes, got {}",
                SIGNATURE.buffer_size(),
                bytes.len()
            )));
        }
        let offsets = SIGNATURE.offsets();
        let ptr = |i: usize| {
            let at = offsets[i];
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            DevicePtr(u64::from_le_bytes(raw))
        };
        let at = offsets[4];
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[at..at + 4]);
        Ok(Self {
            dst: ptr(0),
            dst_intermediate: ptr(1),
            src: ptr(2),
            scale: ptr(3),
            num_elements: u32::from_le_bytes(count),
        })
    }
}

/// Device buffers for one AMax invocation.
#[derive(Debug)]
pub struct AmaxBuffers<'ctx> {
    pub dst: DeviceBuffer<'ctx>,
    pub dst_intermediate: DeviceBuffer<'ctx>,
    pub src: DeviceBuffer<'ctx>,
    pub scale: DeviceBuffer<'ctx>,
}

impl<'ctx> AmaxBuffers<'ctx> {
    /// Upload `input` and `scale`, and zero both outputs.
    ///
    /// The reduced output must start at zero: the kernel folds into it.
    pub fn allocate(ctx: &'ctx DeviceContext, input: &[f32], scale: f32) -> Result<Self> {
        let src = ctx.upload(input)?;
        let scale = ctx.upload(&[scale])?;
        let dst = ctx.alloc_zeroed(size_of::<f32>())?;
        let dst_intermediate = ctx.alloc_zeroed(size_of_val(input))?;
        Ok(Self { dst, dst_intermediate, src, scale })
    }

    pub fn args(&self, num_elements: u32) -> AmaxArgs {
        AmaxArgs {
            dst: self.dst.ptr(),
            dst_intermediate: self.dst_intermediate.ptr(),
            src: self.src.ptr(),
            scale: self.scale.ptr(),
            num_elements,
        }
    }

    pub fn read_reduced(&self) -> Result<f32> {
        let mut out = [0f32];
        self.dst.copy_to_host(&mut out)?;
        Ok(out[0])
    }

    pub fn read_intermediate(&self) -> Result<Vec<f32>> {
        Ok(self.dst_intermediate.to_vec()?)
    }
}

/// Host emulation of the AMax code object.
///
/// One element per work-item: elements beyond the launched grid are not
/// touched, so an undersized grid surfaces as a validation failure, as it
/// would on hardware. The reduced value is folded into `dst[0]` with max.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmaxHostKernel {
    pub convention: ScaleConvention,
}

impl AmaxHostKernel {
    pub fn new(convention: ScaleConvention) -> Self {
        Self { convention }
    }
}

impl HostKernel for AmaxHostKernel {
    fn execute(
        &self,
        launch: &HostLaunch<'_>,
        memory: &mut EmulatedMemory<'_>,
    ) -> hipk_runtime::Result<()> {
        let args = AmaxArgs::decode(launch.args)?;
        let covered = launch.config.total_threads().min(u64::from(args.num_elements)) as usize;
        trace!(entry_point = launch.entry_point, covered, "emulating amax");

        let scale = memory.read_slice::<f32>(args.scale, 1)?[0];
        let input = memory.read_slice::<f32>(args.src, covered)?;
        let scaled: Vec<f32> = input.iter().map(|x| x * scale).collect();
        memory.write_slice(args.dst_intermediate, &scaled)?;

        let reduced = match self.convention {
            ScaleConvention::Unscaled => &input,
            ScaleConvention::PreScaled => &scaled,
        };
        let amax = reduced.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
        let current = memory.read_slice::<f32>(args.dst, 1)?[0];
        memory.write_slice(args.dst, &[current.max(amax)])
    }
}
