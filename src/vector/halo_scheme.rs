//! Communication plan for halo (ghost) entries of distributed vectors.
//!
//! A [`DoubleVectorHaloScheme`] records, for one distribution, which global
//! rows owned elsewhere this rank reads ("halo") and which of its own rows
//! other ranks read ("haloed"). The plans are stored in all-to-all-v form:
//! one packed index list per direction with per-rank counts and
//! displacements. A scheme is built once per dof layout and shared by every
//! vector on that layout.

use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub struct DoubleVectorHaloScheme {
    distribution: Arc<LinearAlgebraDistribution>,
    // global eqn -> slot in the halo buffer
    local_index: BTreeMap<usize, usize>,
    // local rows to send, packed by destination rank
    haloed_eqns: Vec<usize>,
    haloed_counts: Vec<usize>,
    haloed_displacements: Vec<usize>,
    // halo slots filled by the receive buffer, packed by source rank
    halo_eqns: Vec<usize>,
    halo_counts: Vec<usize>,
    halo_displacements: Vec<usize>,
}

fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

impl DoubleVectorHaloScheme {
    /// Builds the scheme from the global equations this rank needs.
    /// Collective: two all-to-all exchanges (counts, then indices).
    ///
    /// Locally owned and duplicate entries in `required_global_eqns` are
    /// ignored. Halo slots are numbered in ascending global order.
    pub fn new(distribution: &Arc<LinearAlgebraDistribution>, required_global_eqns: &[usize]) -> Result<Self> {
        const OP: &str = "DoubleVectorHaloScheme::new";
        let dist = distribution.clone();
        let nproc = dist.communicator().size();
        let nrow = dist.nrow();

        let in_range = match required_global_eqns.iter().find(|&&g| g >= nrow) {
            Some(&bad) => Err(LaError::IndexOutOfRange { op: OP, index: bad, len: nrow }),
            None => Ok(()),
        };
        if !dist.distributed() {
            in_range?;
            // every row is local; nothing to exchange
            return Ok(Self {
                distribution: dist,
                local_index: BTreeMap::new(),
                haloed_eqns: Vec::new(),
                haloed_counts: vec![0; nproc],
                haloed_displacements: vec![0; nproc],
                halo_eqns: Vec::new(),
                halo_counts: vec![0; nproc],
                halo_displacements: vec![0; nproc],
            });
        }

        let comm = dist.communicator();
        comm.agree(OP, in_range)?;

        let required: BTreeSet<usize> = required_global_eqns
            .iter()
            .copied()
            .filter(|&g| !dist.is_local(g))
            .collect();
        let local_index: BTreeMap<usize, usize> =
            required.iter().enumerate().map(|(slot, &g)| (g, slot)).collect();

        // requests grouped by owning rank, ascending within each rank
        let mut requests: Vec<Vec<usize>> = vec![Vec::new(); nproc];
        for &g in &required {
            let owner = dist
                .rank_of_row(g)
                .ok_or(LaError::IndexOutOfRange { op: OP, index: g, len: nrow })?;
            requests[owner].push(g);
        }
        let halo_counts: Vec<usize> = requests.iter().map(Vec::len).collect();
        let halo_displacements = displacements(&halo_counts);
        let halo_eqns: Vec<usize> = requests.iter().flatten().map(|g| local_index[g]).collect();

        let count_msgs: Vec<Vec<usize>> = halo_counts.iter().map(|&c| vec![c]).collect();
        let haloed_counts: Vec<usize> = comm
            .all_to_all_v(&count_msgs)
            .into_iter()
            .map(|m| m[0])
            .collect();
        let asked = comm.all_to_all_v(&requests);

        let first = dist.first_row();
        let haloed = (|| {
            let mut haloed_eqns = Vec::with_capacity(haloed_counts.iter().sum());
            for (q, globals) in asked.iter().enumerate() {
                if globals.len() != haloed_counts[q] {
                    return Err(LaError::SizeMismatch { op: OP, expected: haloed_counts[q], found: globals.len() });
                }
                for &g in globals {
                    if !dist.is_local(g) {
                        // the requester used a different layout
                        return Err(LaError::DistributionMismatch(OP));
                    }
                    haloed_eqns.push(g - first);
                }
            }
            Ok(haloed_eqns)
        })();
        let haloed_eqns = comm.agree(OP, haloed)?;
        let haloed_displacements = displacements(&haloed_counts);
        log::debug!(
            "rank {}: halo scheme with {} halo and {} haloed entries",
            comm.rank(),
            halo_eqns.len(),
            haloed_eqns.len()
        );

        Ok(Self {
            distribution: dist,
            local_index,
            haloed_eqns,
            haloed_counts,
            haloed_displacements,
            halo_eqns,
            halo_counts,
            halo_displacements,
        })
    }

    pub fn distribution(&self) -> &Arc<LinearAlgebraDistribution> {
        &self.distribution
    }

    /// Number of distinct halo entries on this rank.
    pub fn n_halo_values(&self) -> usize {
        self.local_index.len()
    }

    /// Number of local entries sent out (with repetition across ranks).
    pub fn n_haloed_values(&self) -> usize {
        self.haloed_eqns.len()
    }

    /// Halo-buffer slot of a registered halo equation.
    pub fn local_index(&self, global_eqn: usize) -> Result<usize> {
        self.local_index
            .get(&global_eqn)
            .copied()
            .ok_or(LaError::HaloNotRegistered(global_eqn))
    }

    /// Orders caller data keyed by global halo equation by halo slot, so the
    /// result can be indexed with [`local_index`](Self::local_index).
    pub fn setup_halo_dofs<T: Clone>(&self, halo_data: &HashMap<usize, T>) -> Result<Vec<T>> {
        self.local_index
            .keys()
            .map(|g| halo_data.get(g).cloned().ok_or(LaError::MissingHaloData(*g)))
            .collect()
    }

    /// Local rows to send, packed by destination rank.
    pub fn haloed_eqns(&self) -> &[usize] {
        &self.haloed_eqns
    }

    pub fn haloed_counts(&self) -> &[usize] {
        &self.haloed_counts
    }

    pub fn haloed_displacements(&self) -> &[usize] {
        &self.haloed_displacements
    }

    /// Halo slots in receive order, packed by source rank.
    pub fn halo_eqns(&self) -> &[usize] {
        &self.halo_eqns
    }

    pub fn halo_counts(&self) -> &[usize] {
        &self.halo_counts
    }

    pub fn halo_displacements(&self) -> &[usize] {
        &self.halo_displacements
    }

    /// `haloed_eqns` destined for rank `p`.
    pub fn haloed_for(&self, p: usize) -> &[usize] {
        let d = self.haloed_displacements[p];
        &self.haloed_eqns[d..d + self.haloed_counts[p]]
    }

    /// `halo_eqns` received from rank `p`.
    pub fn halo_from(&self, p: usize) -> &[usize] {
        let d = self.halo_displacements[p];
        &self.halo_eqns[d..d + self.halo_counts[p]]
    }
}
