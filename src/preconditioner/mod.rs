//! Preconditioners for linear solvers.
//!
//! A preconditioner is set up once against a matrix and then applied
//! repeatedly, `z = M⁻¹ r`, during an iterative solve. Every implementation
//! embeds a [`PreconditionerBase`] holding the matrix, the communicator and
//! the setup time; the provided [`Preconditioner::setup`] fills it in and
//! calls the implementation's [`Preconditioner::setup_hook`].

use crate::config::PcOptions;
use crate::core::{DoubleMatrix, LinearAlgebraDistribution};
use crate::error::{LaError, Result};
use crate::parallel::Comm;
use crate::vector::DoubleVector;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared by every preconditioner.
#[derive(Default)]
pub struct PreconditionerBase {
    matrix: Option<Arc<dyn DoubleMatrix>>,
    comm: Option<Arc<dyn Comm>>,
    setup_time: Duration,
    options: PcOptions,
}

impl PreconditionerBase {
    pub fn new(options: PcOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> &PcOptions {
        &self.options
    }

    /// Row distribution of the stored matrix, if it has one.
    pub fn matrix_distribution(&self) -> Option<&Arc<LinearAlgebraDistribution>> {
        self.matrix
            .as_ref()?
            .as_distributable()
            .map(|d| d.distribution())
    }
}

/// A preconditioner M ≈ A⁻¹.
pub trait Preconditioner {
    fn base(&self) -> &PreconditionerBase;
    fn base_mut(&mut self) -> &mut PreconditionerBase;

    /// Implementation-specific setup against [`Preconditioner::matrix`].
    fn setup_hook(&mut self) -> Result<()>;

    /// Stores `matrix`, takes the communicator from its distribution (none
    /// for non-distributable matrices) and runs the timed setup hook.
    /// Collective when the hook is.
    fn setup(&mut self, matrix: Arc<dyn DoubleMatrix>) -> Result<()> {
        let comm = matrix
            .as_distributable()
            .map(|d| d.distribution().communicator().clone());
        {
            let base = self.base_mut();
            base.matrix = Some(matrix);
            base.comm = comm;
        }
        let start = Instant::now();
        self.setup_hook()?;
        let elapsed = start.elapsed();
        let base = self.base_mut();
        base.setup_time = elapsed;
        if !base.options.silent_setup {
            log::info!("preconditioner setup took {:.3e} s", elapsed.as_secs_f64());
        }
        Ok(())
    }

    /// Apply M⁻¹ to `r`, writing `z`. `z` is built on `r`'s distribution if
    /// unbuilt.
    fn preconditioner_solve(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()>;

    /// Apply M⁻ᵀ to `r`, writing `z`.
    fn preconditioner_solve_transpose(&self, _r: &DoubleVector, _z: &mut DoubleVector) -> Result<()> {
        Err(LaError::NotImplemented("Preconditioner::preconditioner_solve_transpose"))
    }

    /// Releases factorisation data; `setup` must be called again before the
    /// next solve.
    fn clean_up_memory(&mut self) {}

    fn matrix(&self) -> Result<&Arc<dyn DoubleMatrix>> {
        self.base()
            .matrix
            .as_ref()
            .ok_or(LaError::SetupRequired("Preconditioner::matrix"))
    }

    fn comm(&self) -> Option<&Arc<dyn Comm>> {
        self.base().comm.as_ref()
    }

    fn setup_time(&self) -> Duration {
        self.base().setup_time
    }

    fn enable_silent_preconditioner_setup(&mut self) {
        self.base_mut().options.silent_setup = true;
    }

    fn disable_silent_preconditioner_setup(&mut self) {
        self.base_mut().options.silent_setup = false;
    }

    /// Capability query: preconditioners that can act as a subsidiary block
    /// of a block preconditioner return themselves here.
    fn as_block_compatible(&mut self) -> Option<&mut dyn BlockCompatible> {
        None
    }
}

/// Dof type of every local row of a block preconditioner's matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DofTypeLayout {
    dof_types: Vec<usize>,
    ndof_types: usize,
}

impl DofTypeLayout {
    /// `dof_types[i]` is the type of local row `i`; the number of types is
    /// one more than the largest label.
    pub fn new(dof_types: Vec<usize>) -> Self {
        let ndof_types = dof_types.iter().max().map_or(0, |&m| m + 1);
        Self { dof_types, ndof_types }
    }

    /// Like [`DofTypeLayout::new`], but with an explicit type count (types
    /// without rows are allowed).
    pub fn with_ndof_types(dof_types: Vec<usize>, ndof_types: usize) -> Result<Self> {
        if let Some(&bad) = dof_types.iter().find(|&&t| t >= ndof_types) {
            return Err(LaError::IndexOutOfRange { op: "DofTypeLayout::with_ndof_types", index: bad, len: ndof_types });
        }
        Ok(Self { dof_types, ndof_types })
    }

    pub fn ndof_types(&self) -> usize {
        self.ndof_types
    }

    pub fn nrow_local(&self) -> usize {
        self.dof_types.len()
    }

    pub fn dof_type(&self, local_row: usize) -> usize {
        self.dof_types[local_row]
    }

    /// Local rows of every type in `types`, ascending.
    pub fn rows_of(&self, types: &[usize]) -> Vec<usize> {
        self.dof_types
            .iter()
            .enumerate()
            .filter(|(_, t)| types.contains(t))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A preconditioner that can be nested in a block preconditioner.
pub trait BlockCompatible {
    /// Makes this preconditioner operate on a subset of `master`'s dof
    /// types. Subsidiary dof type `i` is master type `doftype_in_master[i]`.
    /// With `coarsen_map`, subsidiary type `c` merges the fine types
    /// `coarsen_map[c]`; without it every fine type stays separate.
    fn turn_into_subsidiary_block_preconditioner(
        &mut self,
        master: &DofTypeLayout,
        doftype_in_master: &[usize],
        coarsen_map: Option<&[Vec<usize>]>,
    ) -> Result<()>;
}

/// Checks `r` against `dist` and prepares `z` to receive the result.
pub(crate) fn check_solve_vectors(
    dist: &Arc<LinearAlgebraDistribution>,
    r: &DoubleVector,
    z: &mut DoubleVector,
    op: &'static str,
) -> Result<()> {
    if **r.dist(op)? != **dist {
        return Err(LaError::DistributionMismatch(op));
    }
    match z.distribution() {
        Some(d) if **d != **dist => Err(LaError::DistributionMismatch(op)),
        Some(_) => Ok(()),
        None => {
            z.build(dist, 0.0);
            Ok(())
        }
    }
}

pub mod block_jacobi;
pub mod identity;
pub mod jacobi;

pub use block_jacobi::BlockJacobi;
pub use identity::IdentityPreconditioner;
pub use jacobi::Jacobi;
