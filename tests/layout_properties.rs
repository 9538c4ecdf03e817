//! Property tests: moving a vector between arbitrary contiguous layouts
//! never changes the global vector it represents.

use distla::{DoubleVector, LinearAlgebraDistribution, ThreadComm};
use proptest::prelude::*;
use std::sync::Arc;

/// Turns arbitrary cut points into per-rank extents over `nrow` rows.
fn extents(nrow: usize, raw_cuts: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut cuts: Vec<usize> = raw_cuts.iter().map(|c| c % (nrow + 1)).collect();
    cuts.sort_unstable();
    let mut first = vec![0];
    first.extend(cuts);
    let counts = first
        .iter()
        .enumerate()
        .map(|(p, &f)| first.get(p + 1).copied().unwrap_or(nrow) - f)
        .collect();
    (first, counts)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn redistribute_keeps_rows_and_norm(
        nrow in 0usize..40,
        cuts in prop::collection::vec(0usize..1000, 0..4),
        replicated_start in any::<bool>(),
    ) {
        let nproc = cuts.len() + 1;
        let (first, counts) = extents(nrow, &cuts);
        let out = ThreadComm::run(nproc, |comm| {
            let global: Vec<f64> = (0..nrow).map(|g| (g as f64).sin()).collect();
            let start = Arc::new(LinearAlgebraDistribution::new(comm.clone(), nrow, !replicated_start));
            let mut v = DoubleVector::from_global(&start, &global).unwrap();
            let before = v.norm().unwrap();
            let target = Arc::new(
                LinearAlgebraDistribution::from_parts(comm, first.clone(), counts.clone()).unwrap(),
            );
            v.redistribute(&target).unwrap();
            let rows_ok = v.values() == &global[target.local_range()];
            (rows_ok, (v.norm().unwrap() - before).abs())
        });
        for (rows_ok, drift) in out {
            prop_assert!(rows_ok);
            prop_assert!(drift < 1e-12);
        }
    }
}
