//! Integration tests for distributed vectors.
//!
//! Every multi-rank test runs the same body on several `ThreadComm` ranks, the
//! way an MPI program runs on several processes, and checks the per-rank
//! results afterwards.

use approx::assert_abs_diff_eq;
use distla::vector::{concatenate, concatenate_without_communication, split, split_without_communication};
use distla::{Comm, DoubleVector, LaError, LinearAlgebraDistribution, OutputOptions, SerialComm, ThreadComm};
use rand::Rng;
use std::ptr::NonNull;
use std::sync::Arc;

/// Random contiguous extents of `nrow` rows over `nproc` ranks (some may be
/// empty).
fn random_extents(nrow: usize, nproc: usize) -> (Vec<usize>, Vec<usize>) {
    let mut rng = rand::thread_rng();
    let mut cuts: Vec<usize> = (0..nproc - 1).map(|_| rng.gen_range(0..=nrow)).collect();
    cuts.sort_unstable();
    let mut first = vec![0];
    first.extend(cuts);
    let counts = (0..nproc)
        .map(|p| {
            let end = if p + 1 < nproc { first[p + 1] } else { nrow };
            end - first[p]
        })
        .collect();
    (first, counts)
}

/// 10 rows on 2 ranks: norm of a constant vector, then a move from a 5/5
/// to a 7/3 split keeps every entry.
#[test]
fn norm_then_redistribute_five_five_to_seven_three() {
    let out = ThreadComm::run(2, |comm| {
        let uniform = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 10, true));
        assert_eq!(uniform.nrow_local(), 5);
        let mut v = DoubleVector::new(&uniform, 3.0);
        let norm = v.norm().unwrap();
        let skewed = Arc::new(LinearAlgebraDistribution::from_parts(comm, vec![0, 7], vec![7, 3]).unwrap());
        v.redistribute(&skewed).unwrap();
        (norm, v.values().to_vec())
    });
    for (norm, _) in &out {
        assert_abs_diff_eq!(*norm, 9.4868, epsilon = 1e-4);
    }
    assert_eq!(out[0].1, vec![3.0; 7]);
    assert_eq!(out[1].1, vec![3.0; 3]);
}

/// Moving through random layouts and back restores the original local parts.
#[test]
fn redistribute_round_trip_through_random_layouts() {
    let nproc = 4;
    let nrow = 23;
    let layouts: Vec<_> = (0..3).map(|_| random_extents(nrow, nproc)).collect();
    let out = ThreadComm::run(nproc, |comm| {
        let global: Vec<f64> = (0..nrow).map(|i| i as f64 * 0.5 - 3.0).collect();
        let home = Arc::new(LinearAlgebraDistribution::new(comm.clone(), nrow, true));
        let mut v = DoubleVector::from_global(&home, &global).unwrap();
        for (first, counts) in &layouts {
            let d = Arc::new(
                LinearAlgebraDistribution::from_parts(comm.clone(), first.clone(), counts.clone()).unwrap(),
            );
            v.redistribute(&d).unwrap();
            assert_eq!(v.values(), &global[d.local_range()]);
        }
        v.redistribute(&home).unwrap();
        v.values() == &global[home.local_range()]
    });
    assert!(out.into_iter().all(|ok| ok));
}

#[test]
fn dot_and_max_agree_on_every_rank() {
    let out = ThreadComm::run(3, |comm| {
        let d = Arc::new(LinearAlgebraDistribution::new(comm, 9, true));
        let global: Vec<f64> = (1..=9).map(|i| i as f64).collect();
        let a = DoubleVector::from_global(&d, &global).unwrap();
        let b = DoubleVector::new(&d, 2.0);
        (a.dot(&b).unwrap(), a.max().unwrap())
    });
    assert!(out.iter().all(|&(dot, max)| dot == 90.0 && max == 9.0));
}

#[test]
fn layouts_on_different_groups_do_not_mix() {
    let other = ThreadComm::group(2).remove(0);
    let out = ThreadComm::run(2, |comm| {
        let foreign: Arc<dyn Comm> = Arc::new(other.clone());
        let d = Arc::new(LinearAlgebraDistribution::new(comm, 4, true));
        let f = Arc::new(LinearAlgebraDistribution::new(foreign, 4, true));
        let mut v = DoubleVector::new(&d, 1.0);
        v.redistribute(&f)
    });
    assert!(out.iter().all(|r| *r == Err(LaError::CommunicatorMismatch("DoubleVector::redistribute"))));
}

/// Concatenating then splitting with communication returns the inputs.
#[test]
fn concatenate_then_split_restores_inputs() {
    let out = ThreadComm::run(3, |comm| {
        let da = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 5, true));
        let db = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 8, true));
        let ga: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let gb: Vec<f64> = (0..8).map(|i| 100.0 + i as f64).collect();
        let a = DoubleVector::from_global(&da, &ga).unwrap();
        let b = DoubleVector::from_global(&db, &gb).unwrap();

        let mut c = DoubleVector::default();
        concatenate(&[&a, &b], &mut c).unwrap();
        assert_eq!(c.nrow(), 13);
        let mut stacked = ga.clone();
        stacked.extend(&gb);
        assert_eq!(c.values(), &stacked[c.distribution().unwrap().local_range()]);

        let mut a2 = DoubleVector::new(&da, 0.0);
        let mut b2 = DoubleVector::new(&db, 0.0);
        split(&c, &mut [&mut a2, &mut b2]).unwrap();
        a2 == a && b2 == b
    });
    assert!(out.into_iter().all(|ok| ok));
}

#[test]
fn split_without_communication_inverts_concatenation() {
    let out = ThreadComm::run(2, |comm| {
        let da = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 3, true));
        let db = Arc::new(LinearAlgebraDistribution::new(comm, 5, true));
        let a = DoubleVector::from_global(&da, &[1.0, 2.0, 3.0]).unwrap();
        let b = DoubleVector::from_global(&db, &[4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        let mut c = DoubleVector::default();
        concatenate_without_communication(&[&a, &b], &mut c).unwrap();
        let local = c.values().to_vec();
        let mut a2 = DoubleVector::new(&da, 0.0);
        let mut b2 = DoubleVector::new(&db, 0.0);
        split_without_communication(&c, &mut [&mut a2, &mut b2]).unwrap();
        (local, a2 == a && b2 == b)
    });
    // rank 0 holds a[0..1] and b[0..2]; rank 1 holds a[1..3] and b[2..5]
    assert_eq!(out[0], (vec![1.0, 4.0, 5.0], true));
    assert_eq!(out[1], (vec![2.0, 3.0, 6.0, 7.0, 8.0], true));
}

#[test]
fn deletable_external_buffer_is_released_by_the_vector() {
    let d = Arc::new(LinearAlgebraDistribution::new(Arc::new(SerialComm), 4, false));
    let buf: Box<[f64]> = vec![1.0, 2.0, 3.0, 4.0].into_boxed_slice();
    let ptr = NonNull::new(Box::into_raw(buf) as *mut f64).unwrap();
    let mut v = DoubleVector::default();
    unsafe { v.set_external_values(&d, ptr, true) };
    assert!(!v.storage().is_owned());
    assert_abs_diff_eq!(v.norm().unwrap(), 30f64.sqrt(), epsilon = 1e-12);
    let copy = v.clone();
    drop(v);
    assert_eq!(copy.values(), &[1.0, 2.0, 3.0, 4.0]);
    assert!(copy.storage().is_owned());
}

#[test]
fn distributed_output_is_in_global_order() {
    let out = ThreadComm::run(2, |comm| {
        let d = Arc::new(LinearAlgebraDistribution::new(comm, 3, true));
        let v = DoubleVector::from_global(&d, &[0.5, 1.5, 2.5]).unwrap();
        let mut text = Vec::new();
        v.output(&mut text, &OutputOptions::with_precision(1)).unwrap();
        String::from_utf8(text).unwrap()
    });
    assert!(out.iter().all(|s| s == "0.5\n1.5\n2.5\n"));
}
