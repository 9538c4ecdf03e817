// Jacobi preconditioner implementation

use super::{check_solve_vectors, Preconditioner, PreconditionerBase};
use crate::config::PcOptions;
use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use crate::vector::DoubleVector;
use std::sync::Arc;

/// Jacobi preconditioner: M⁻¹ = D⁻¹ over the local rows.
///
/// Zero diagonal entries give a zero inverse (the row is dropped from `z`).
#[derive(Default)]
pub struct Jacobi {
    base: PreconditionerBase,
    distribution: Option<Arc<LinearAlgebraDistribution>>,
    pub(crate) inv_diag: Vec<f64>,
}

impl Jacobi {
    /// new with empty state; user must call `setup`.
    pub fn new(options: PcOptions) -> Self {
        Self { base: PreconditionerBase::new(options), ..Self::default() }
    }

    fn apply(&self, r: &DoubleVector, z: &mut DoubleVector, op: &'static str) -> Result<()> {
        let dist = self.distribution.as_ref().ok_or(LaError::SetupRequired(op))?;
        check_solve_vectors(dist, r, z, op)?;
        for ((zi, &ri), &d) in z.values_mut().iter_mut().zip(r.values()).zip(&self.inv_diag) {
            *zi = d * ri;
        }
        Ok(())
    }
}

impl Preconditioner for Jacobi {
    fn base(&self) -> &PreconditionerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PreconditionerBase {
        &mut self.base
    }

    fn setup_hook(&mut self) -> Result<()> {
        const OP: &str = "Jacobi::setup";
        let matrix = self.matrix()?.clone();
        let dist = self
            .base
            .matrix_distribution()
            .cloned()
            .ok_or(LaError::NotImplemented("Jacobi::setup: matrix has no distribution"))?;
        let first = dist.first_row();
        let mut inv_diag = Vec::with_capacity(dist.nrow_local());
        for i in 0..dist.nrow_local() {
            let row = matrix
                .local_row(i)
                .ok_or(LaError::NotImplemented("Jacobi::setup: matrix does not expose its rows"))?;
            let d = row
                .cols
                .iter()
                .zip(row.vals)
                .find(|(c, _)| **c == first + i)
                .map_or(0.0, |(_, v)| *v);
            if d == 0.0 {
                log::warn!("{OP}: zero diagonal in global row {}", first + i);
                inv_diag.push(0.0);
            } else {
                inv_diag.push(1.0 / d);
            }
        }
        self.inv_diag = inv_diag;
        self.distribution = Some(dist);
        Ok(())
    }

    fn preconditioner_solve(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, "Jacobi::preconditioner_solve")
    }

    /// D is symmetric, so the transpose solve is the solve.
    fn preconditioner_solve_transpose(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, "Jacobi::preconditioner_solve_transpose")
    }

    fn clean_up_memory(&mut self) {
        self.inv_diag.clear();
        self.distribution = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CrDoubleMatrix;
    use crate::parallel::ThreadComm;
    use approx::assert_abs_diff_eq;

    #[test]
    fn scales_by_inverse_diagonal_on_each_rank() {
        let out = ThreadComm::run(2, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm, 4, true));
            let a = CrDoubleMatrix::from_row_fn(&d, 4, |g| vec![(g, (g + 1) as f64), (3 - g, 0.5)]).unwrap();
            let mut pc = Jacobi::default();
            pc.setup(Arc::new(a)).unwrap();
            let r = DoubleVector::new(&d, 12.0);
            let mut z = DoubleVector::default();
            pc.preconditioner_solve(&r, &mut z).unwrap();
            z.values().to_vec()
        });
        let all: Vec<f64> = out.into_iter().flatten().collect();
        for (got, want) in all.iter().zip([12.0, 6.0, 4.0, 3.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-14);
        }
    }

    #[test]
    fn cleaned_up_preconditioner_needs_setup() {
        let out = ThreadComm::run(1, |comm| {
            let d = Arc::new(LinearAlgebraDistribution::new(comm, 2, false));
            let a = CrDoubleMatrix::from_row_fn(&d, 2, |g| vec![(g, 2.0)]).unwrap();
            let mut pc = Jacobi::default();
            pc.setup(Arc::new(a)).unwrap();
            pc.clean_up_memory();
            let r = DoubleVector::new(&d, 1.0);
            let mut z = DoubleVector::default();
            pc.preconditioner_solve(&r, &mut z)
        });
        assert_eq!(out[0], Err(LaError::SetupRequired("Jacobi::preconditioner_solve")));
    }
}
