//! A [`DoubleVector`] with storage for halo entries.
//!
//! Halo values are refreshed only by explicit calls to
//! [`synchronise`](DoubleVectorWithHaloEntries::synchronise) or
//! [`sum_all_halo_and_haloed_values`](DoubleVectorWithHaloEntries::sum_all_halo_and_haloed_values);
//! between those calls the halo buffer holds whatever was last written to it.

use super::{DoubleVector, DoubleVectorHaloScheme};
use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct DoubleVectorWithHaloEntries {
    vector: DoubleVector,
    halo_scheme: Option<Arc<DoubleVectorHaloScheme>>,
    halo_values: Vec<f64>,
}

impl DoubleVectorWithHaloEntries {
    /// Builds on `dist` with every local entry set to `v` and `scheme`
    /// attached (if any).
    pub fn new(
        dist: &Arc<LinearAlgebraDistribution>,
        scheme: Option<Arc<DoubleVectorHaloScheme>>,
        v: f64,
    ) -> Result<Self> {
        Self::from_vector(DoubleVector::new(dist, v), scheme)
    }

    pub fn from_vector(vector: DoubleVector, scheme: Option<Arc<DoubleVectorHaloScheme>>) -> Result<Self> {
        let mut out = Self { vector, halo_scheme: None, halo_values: Vec::new() };
        out.build_halo_scheme(scheme)?;
        Ok(out)
    }

    /// Attaches (or with `None`, detaches) a halo scheme and resizes the halo
    /// buffer to match. The buffer is zeroed.
    pub fn build_halo_scheme(&mut self, scheme: Option<Arc<DoubleVectorHaloScheme>>) -> Result<()> {
        const OP: &str = "DoubleVectorWithHaloEntries::build_halo_scheme";
        if let Some(s) = &scheme {
            let dist = self.vector.dist(OP)?;
            if !Arc::ptr_eq(dist, s.distribution()) && **dist != **s.distribution() {
                return Err(LaError::DistributionMismatch(OP));
            }
        }
        self.halo_values = vec![0.0; scheme.as_ref().map_or(0, |s| s.n_halo_values())];
        self.halo_scheme = scheme;
        Ok(())
    }

    pub fn halo_scheme(&self) -> Option<&Arc<DoubleVectorHaloScheme>> {
        self.halo_scheme.as_ref()
    }

    pub fn halo_values(&self) -> &[f64] {
        &self.halo_values
    }

    pub fn into_vector(self) -> DoubleVector {
        self.vector
    }

    // the attached scheme must describe the layout the vector currently has
    fn check_layout(&self, op: &'static str) -> Result<&Arc<LinearAlgebraDistribution>> {
        let dist = self.vector.dist(op)?;
        if let Some(s) = &self.halo_scheme {
            if !Arc::ptr_eq(dist, s.distribution()) && **dist != **s.distribution() {
                return Err(LaError::DistributionMismatch(op));
            }
        }
        Ok(dist)
    }

    // local row index, or halo slot
    fn locate(&self, global: usize, op: &'static str) -> Result<Slot> {
        let dist = self.check_layout(op)?;
        if global >= dist.nrow() {
            return Err(LaError::IndexOutOfRange { op, index: global, len: dist.nrow() });
        }
        if dist.is_local(global) {
            let first = if dist.distributed() { dist.first_row() } else { 0 };
            return Ok(Slot::Local(global - first));
        }
        match &self.halo_scheme {
            Some(s) => Ok(Slot::Halo(s.local_index(global)?)),
            None => Err(LaError::NoHaloScheme(global)),
        }
    }

    /// Value of global equation `global`, from the local rows or the halo
    /// buffer.
    pub fn global_value(&self, global: usize) -> Result<f64> {
        Ok(match self.locate(global, "DoubleVectorWithHaloEntries::global_value")? {
            Slot::Local(i) => self.vector[i],
            Slot::Halo(k) => self.halo_values[k],
        })
    }

    pub fn global_value_mut(&mut self, global: usize) -> Result<&mut f64> {
        Ok(match self.locate(global, "DoubleVectorWithHaloEntries::global_value_mut")? {
            Slot::Local(i) => &mut self.vector[i],
            Slot::Halo(k) => &mut self.halo_values[k],
        })
    }

    fn scheme_for_exchange(&self, op: &'static str) -> Result<Option<Arc<DoubleVectorHaloScheme>>> {
        let dist = self.check_layout(op)?;
        if !dist.distributed() {
            return Ok(None);
        }
        self.halo_scheme.clone().map(Some).ok_or(LaError::NotBuilt(op))
    }

    /// Overwrites every halo entry with the owner's current value. Collective.
    pub fn synchronise(&mut self) -> Result<()> {
        const OP: &str = "DoubleVectorWithHaloEntries::synchronise";
        let Some(scheme) = self.scheme_for_exchange(OP)? else {
            return Ok(());
        };
        let comm = scheme.distribution().communicator().clone();
        let local = self.vector.values();
        let send: Vec<Vec<f64>> = (0..comm.size())
            .map(|p| scheme.haloed_for(p).iter().map(|&i| local[i]).collect())
            .collect();
        let recv = comm.all_to_all_v(&send);
        for (q, buf) in recv.iter().enumerate() {
            let slots = scheme.halo_from(q);
            if buf.len() != slots.len() {
                return Err(LaError::SizeMismatch { op: OP, expected: slots.len(), found: buf.len() });
            }
            for (&k, &v) in slots.iter().zip(buf) {
                self.halo_values[k] = v;
            }
        }
        Ok(())
    }

    /// Adds every rank's halo contributions into the owning rows, then
    /// [`synchronise`](Self::synchronise)s so all holders see the totals.
    /// Collective.
    ///
    /// Not idempotent: the halo buffer still holds the contributions
    /// afterwards (overwritten by the totals), so calling it again adds them a
    /// second time. Reset contributions with
    /// [`clear_halo_values`](Self::clear_halo_values) between accumulation
    /// rounds.
    pub fn sum_all_halo_and_haloed_values(&mut self) -> Result<()> {
        const OP: &str = "DoubleVectorWithHaloEntries::sum_all_halo_and_haloed_values";
        let Some(scheme) = self.scheme_for_exchange(OP)? else {
            return Ok(());
        };
        let comm = scheme.distribution().communicator().clone();
        let send: Vec<Vec<f64>> = (0..comm.size())
            .map(|q| scheme.halo_from(q).iter().map(|&k| self.halo_values[k]).collect())
            .collect();
        let recv = comm.all_to_all_v(&send);
        let local = self.vector.values_mut();
        for (p, buf) in recv.iter().enumerate() {
            let rows = scheme.haloed_for(p);
            if buf.len() != rows.len() {
                return Err(LaError::SizeMismatch { op: OP, expected: rows.len(), found: buf.len() });
            }
            for (&i, &v) in rows.iter().zip(buf) {
                local[i] += v;
            }
        }
        self.synchronise()
    }

    /// Zeroes the halo buffer.
    pub fn clear_halo_values(&mut self) {
        self.halo_values.fill(0.0);
    }
}

enum Slot {
    Local(usize),
    Halo(usize),
}

impl Deref for DoubleVectorWithHaloEntries {
    type Target = DoubleVector;
    fn deref(&self) -> &DoubleVector {
        &self.vector
    }
}

impl DerefMut for DoubleVectorWithHaloEntries {
    fn deref_mut(&mut self) -> &mut DoubleVector {
        &mut self.vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};

    #[test]
    fn synchronise_fetches_owner_value() {
        let out = ThreadComm::run(2, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 10, true));
            let required = if comm.rank() == 0 { vec![7] } else { vec![] };
            let scheme = Arc::new(DoubleVectorHaloScheme::new(&d, &required).unwrap());
            let mut v = DoubleVectorWithHaloEntries::new(&d, Some(scheme), 0.0).unwrap();
            if comm.rank() == 1 {
                *v.global_value_mut(7).unwrap() = 2.5;
            }
            v.synchronise().unwrap();
            v.global_value(7)
        });
        assert_eq!(out[0], Ok(2.5));
        assert_eq!(out[1], Ok(2.5));
    }

    #[test]
    fn halo_contributions_are_summed_on_the_owner() {
        let out = ThreadComm::run(3, |comm| {
            // 6 rows, 2 per rank; row 0 lives on rank 0
            let d = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 6, true));
            let required = if comm.rank() == 0 { vec![] } else { vec![0] };
            let scheme = Arc::new(DoubleVectorHaloScheme::new(&d, &required).unwrap());
            let mut v = DoubleVectorWithHaloEntries::new(&d, Some(scheme), 1.0).unwrap();
            if comm.rank() > 0 {
                *v.global_value_mut(0).unwrap() = comm.rank() as f64 * 10.0;
            }
            v.sum_all_halo_and_haloed_values().unwrap();
            v.global_value(0).unwrap()
        });
        // 1 + 10 + 20
        assert_eq!(out, vec![31.0; 3]);
    }

    #[test]
    fn off_process_access_needs_a_scheme() {
        let out = ThreadComm::run(2, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm, 4, true));
            let v = DoubleVectorWithHaloEntries::new(&d, None, 0.0).unwrap();
            v.global_value(if d.communicator().rank() == 0 { 3 } else { 0 })
        });
        assert_eq!(out[0], Err(LaError::NoHaloScheme(3)));
        assert_eq!(out[1], Err(LaError::NoHaloScheme(0)));
    }

    #[test]
    fn replicated_vectors_resolve_locally() {
        let d = Arc::new(LinearAlgebraDistribution::new(Arc::new(SerialComm), 3, true));
        let mut v = DoubleVectorWithHaloEntries::new(&d, None, 0.0).unwrap();
        *v.global_value_mut(2).unwrap() = 4.0;
        v.synchronise().unwrap();
        v.sum_all_halo_and_haloed_values().unwrap();
        assert_eq!(v.global_value(2), Ok(4.0));
        assert_eq!(v.values(), &[0.0, 0.0, 4.0]);
    }

    #[test]
    fn distributed_synchronise_without_scheme_is_an_error() {
        let out = ThreadComm::run(2, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm, 4, true));
            let mut v = DoubleVectorWithHaloEntries::new(&d, None, 0.0).unwrap();
            v.synchronise()
        });
        assert!(out
            .iter()
            .all(|r| *r == Err(LaError::NotBuilt("DoubleVectorWithHaloEntries::synchronise"))));
    }

    #[test]
    fn scheme_must_share_the_layout() {
        let out = ThreadComm::run(2, |comm| {
            let d4 = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 4, true));
            let d6 = Arc::new(LinearAlgebraDistribution::new(comm, 6, true));
            let scheme = Arc::new(DoubleVectorHaloScheme::new(&d6, &[]).unwrap());
            DoubleVectorWithHaloEntries::new(&d4, Some(scheme), 0.0).map(|_| ())
        });
        assert!(out.iter().all(|r| matches!(r, Err(LaError::DistributionMismatch(_)))));
    }

    #[test]
    fn moving_the_vector_off_the_scheme_layout_is_reported() {
        let out = ThreadComm::run(2, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm.clone(), 10, true));
            let required = if comm.rank() == 0 { vec![7] } else { vec![] };
            let scheme = Arc::new(DoubleVectorHaloScheme::new(&d, &required).unwrap());
            let global: Vec<f64> = (0..10).map(|g| g as f64).collect();
            let mut v = DoubleVectorWithHaloEntries::new(&d, Some(scheme), 0.0).unwrap();
            v.initialise_from_global(&global).unwrap();
            let skewed = Arc::new(LinearAlgebraDistribution::from_parts(comm, vec![0, 7], vec![7, 3]).unwrap());
            v.redistribute(&skewed).unwrap();
            (v.synchronise(), v.sum_all_halo_and_haloed_values(), v.global_value(7))
        });
        for (sync, sum, lookup) in out {
            assert_eq!(sync, Err(LaError::DistributionMismatch("DoubleVectorWithHaloEntries::synchronise")));
            assert_eq!(
                sum,
                Err(LaError::DistributionMismatch("DoubleVectorWithHaloEntries::sum_all_halo_and_haloed_values"))
            );
            assert_eq!(lookup, Err(LaError::DistributionMismatch("DoubleVectorWithHaloEntries::global_value")));
        }
    }
}
