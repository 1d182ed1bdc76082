//! Kernel launch geometry.

use crate::error::{Result, RocmError};

/// Grid/block dimensions for a module kernel launch.
///
/// `grid` is expressed in **work-items**, not workgroups: this is the
/// `hipExtModuleLaunchKernel` convention, where the global work size is the
/// workgroup count multiplied by the workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
    pub shared_mem_bytes: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self { grid: (256, 1, 1), block: (256, 1, 1), shared_mem_bytes: 0 }
    }
}

impl LaunchConfig {
    /// 1-D config covering `n` work-items, rounded up to whole workgroups.
    pub fn linear(n: u32, block_size: u32) -> Self {
        let groups = n.div_ceil(block_size);
        Self {
            grid: (groups * block_size, 1, 1),
            block: (block_size, 1, 1),
            ..Default::default()
        }
    }

    /// Number of workgroups along each axis.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (
            self.grid.0 / self.block.0.max(1),
            self.grid.1 / self.block.1.max(1),
            self.grid.2 / self.block.2.max(1),
        )
    }

    pub fn total_threads(&self) -> u64 {
        u64::from(self.grid.0) * u64::from(self.grid.1) * u64::from(self.grid.2)
    }

    /// Reject geometry the runtime would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        let (gx, gy, gz) = self.grid;
        let (bx, by, bz) = self.block;
        if gx == 0 || gy == 0 || gz == 0 {
            return Err(RocmError::InvalidArgument(format!(
                "grid dimensions cannot be zero: {:?}",
                self.grid
            )));
        }
        if bx == 0 || by == 0 || bz == 0 {
            return Err(RocmError::InvalidArgument(format!(
                "block dimensions cannot be zero: {:?}",
                self.block
            )));
        }
        if gx % bx != 0 || gy % by != 0 || gz % bz != 0 {
            return Err(RocmError::InvalidArgument(format!(
                "grid {:?} is not a whole number of {:?} workgroups",
                self.grid, self.block
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_rounds_up_to_whole_groups() {
        let cfg = LaunchConfig::linear(1000, 256);
        assert_eq!(cfg.grid, (1024, 1, 1));
        assert_eq!(cfg.workgroups(), (4, 1, 1));
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let cfg = LaunchConfig { grid: (0, 1, 1), ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = LaunchConfig { block: (256, 0, 1), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_workgroup_is_rejected() {
        let cfg = LaunchConfig { grid: (300, 1, 1), block: (256, 1, 1), shared_mem_bytes: 0 };
        assert!(cfg.validate().is_err());
    }
}
