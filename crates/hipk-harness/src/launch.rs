//! Launch geometry from problem size and a fixed tile shape.
//!
//! Pure arithmetic, no device calls. The tile shape and workgroup size are
//! compiled into the code object; nothing here can verify they match it, so a
//! wrong tile only shows up as a validation failure.

use hipk_runtime::LaunchConfig;

use crate::error::{HarnessError, Result};

/// Problem chunk assigned to one workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
    pub m: u32,
    pub n: u32,
}

impl TileShape {
    pub const fn new(m: u32, n: u32) -> Self {
        Self { m, n }
    }
}

/// Number of workgroups for an `m × n` problem: `ceil(m / tile.m)`.
///
/// Only the row dimension is tiled; `n` is covered inside each workgroup.
pub fn num_workgroups(m: u32, _n: u32, tile: TileShape) -> Result<u32> {
    if tile.m == 0 {
        return Err(HarnessError::InvalidArgument("tile height must be non-zero".into()));
    }
    Ok(m.div_ceil(tile.m))
}

/// Assemble the launch configuration for a tiled kernel.
///
/// The grid is given in work-items (`workgroups × workgroup_size`), as
/// `hipExtModuleLaunchKernel` expects.
pub fn tiled_launch_config(
    m: u32,
    n: u32,
    tile: TileShape,
    workgroup_size: u32,
    shared_mem_bytes: u32,
) -> Result<LaunchConfig> {
    if workgroup_size == 0 {
        return Err(HarnessError::InvalidArgument("workgroup size must be non-zero".into()));
    }
    let groups = num_workgroups(m, n, tile)?;
    if groups == 0 {
        return Err(HarnessError::InvalidArgument(format!("empty problem: m={m}, n={n}")));
    }
    let global = groups.checked_mul(workgroup_size).ok_or_else(|| {
        HarnessError::InvalidArgument(format!(
            "{groups} workgroups × {workgroup_size} threads overflows the grid"
        ))
    })?;
    Ok(LaunchConfig { grid: (global, 1, 1), block: (workgroup_size, 1, 1), shared_mem_bytes })
}
