//! Property-based tests for argument packing and launch geometry.
//!
//! Key invariants tested:
//! - Workgroup count is `ceil(m / tileM)` for every non-zero tile height
//! - The sealed argument buffer is a multiple of its alignment
//! - Sealing twice changes nothing
//! - Arguments land in append order at back-to-back offsets

use hipk_harness::{
    ArgKind, KernelArg, KernelArguments, TileShape, num_workgroups, tiled_launch_config,
};
use hipk_runtime::DevicePtr;
use proptest::prelude::*;

fn arb_arg() -> impl Strategy<Value = KernelArg> {
    prop_oneof![
        any::<u64>().prop_map(|p| KernelArg::Pointer(DevicePtr(p))),
        any::<u32>().prop_map(KernelArg::U32),
        any::<i32>().prop_map(KernelArg::I32),
        any::<u64>().prop_map(KernelArg::U64),
        any::<i64>().prop_map(KernelArg::I64),
        any::<f32>().prop_map(KernelArg::F32),
        any::<f64>().prop_map(KernelArg::F64),
    ]
}

fn arb_alignment() -> impl Strategy<Value = usize> {
    (0u32..7).prop_map(|shift| 1usize << shift)
}

// ── launch geometry ─────────────────────────────────────────────

proptest! {
    #[test]
    fn workgroups_cover_every_row(m in 0u32..1_000_000, tile_m in 1u32..4096) {
        let groups = num_workgroups(m, 4, TileShape::new(tile_m, 256)).unwrap();
        prop_assert_eq!(groups, m.div_ceil(tile_m));
        prop_assert!(u64::from(groups) * u64::from(tile_m) >= u64::from(m));
        if groups > 0 {
            prop_assert!(u64::from(groups - 1) * u64::from(tile_m) < u64::from(m));
        }
    }

    #[test]
    fn divisible_rows_split_exactly(k in 1u32..4096, tile_m in 1u32..256) {
        let groups = num_workgroups(k * tile_m, 4, TileShape::new(tile_m, 256)).unwrap();
        prop_assert_eq!(groups, k);
    }

    #[test]
    fn grid_is_whole_workgroups(
        m in 1u32..65_536,
        wg in prop::sample::select(vec![64u32, 128, 256, 512]),
    ) {
        let cfg = tiled_launch_config(m, 4, TileShape::new(1, 256), wg, 0).unwrap();
        prop_assert_eq!(cfg.grid.0 % wg, 0);
        prop_assert_eq!(cfg.grid.0 / wg, m);
        prop_assert!(cfg.validate().is_ok());
    }
}

// ── argument buffer ─────────────────────────────────────────────

proptest! {
    #[test]
    fn sealed_length_is_aligned(
        args in prop::collection::vec(arb_arg(), 0..16),
        align in arb_alignment(),
    ) {
        let mut buf = KernelArguments::with_alignment(align);
        for a in &args {
            buf.append(*a);
        }
        let packed: usize = args.iter().map(KernelArg::size).sum();
        buf.apply_alignment();
        prop_assert_eq!(buf.size() % align, 0);
        prop_assert!(buf.size() >= packed);
        prop_assert!(buf.size() - packed < align);
    }

    #[test]
    fn sealing_twice_is_a_no_op(
        args in prop::collection::vec(arb_arg(), 0..16),
        align in arb_alignment(),
    ) {
        let mut buf = KernelArguments::with_alignment(align);
        for a in &args {
            buf.append(*a);
        }
        buf.apply_alignment();
        let once = buf.buffer().to_vec();
        buf.apply_alignment();
        prop_assert_eq!(buf.buffer(), once.as_slice());
    }

    #[test]
    fn arguments_keep_append_order(args in prop::collection::vec(arb_arg(), 1..16)) {
        let mut buf = KernelArguments::new();
        for a in &args {
            buf.append(*a);
        }
        let mut cursor = 0;
        for ((offset, recorded), appended) in buf.arguments().iter().zip(&args) {
            prop_assert_eq!(*offset, cursor);
            prop_assert_eq!(recorded.kind(), appended.kind());
            cursor += appended.size();
        }
        prop_assert_eq!(buf.packed_size(), cursor);
    }

    #[test]
    fn u32_bytes_are_little_endian(value in any::<u32>(), lead in 0usize..4) {
        let mut buf = KernelArguments::new();
        for _ in 0..lead {
            buf.append(DevicePtr(0));
        }
        buf.append(value);
        let at = lead * ArgKind::Pointer.size();
        prop_assert_eq!(&buf.buffer()[at..at + 4], &value.to_le_bytes());
    }
}
