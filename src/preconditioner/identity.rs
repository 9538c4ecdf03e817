// Identity preconditioner: z = r

use super::{check_solve_vectors, Preconditioner, PreconditionerBase};
use crate::config::PcOptions;
use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use crate::vector::DoubleVector;
use std::sync::Arc;

/// M = I. The reference implementation of the preconditioner contract.
#[derive(Default)]
pub struct IdentityPreconditioner {
    base: PreconditionerBase,
    distribution: Option<Arc<LinearAlgebraDistribution>>,
    set_up: bool,
}

impl IdentityPreconditioner {
    pub fn new(options: PcOptions) -> Self {
        Self { base: PreconditionerBase::new(options), distribution: None, set_up: false }
    }

    fn apply(&self, r: &DoubleVector, z: &mut DoubleVector, op: &'static str) -> Result<()> {
        if !self.set_up {
            return Err(LaError::SetupRequired(op));
        }
        match &self.distribution {
            Some(dist) => check_solve_vectors(dist, r, z, op)?,
            None => {
                // non-distributable matrix: only the row count is known
                let nrow = self.matrix()?.nrow();
                let dist = r.dist(op)?.clone();
                if dist.nrow() != nrow {
                    return Err(LaError::SizeMismatch { op, expected: nrow, found: dist.nrow() });
                }
                check_solve_vectors(&dist, r, z, op)?;
            }
        }
        z.values_mut().copy_from_slice(r.values());
        Ok(())
    }
}

impl Preconditioner for IdentityPreconditioner {
    fn base(&self) -> &PreconditionerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PreconditionerBase {
        &mut self.base
    }

    fn setup_hook(&mut self) -> Result<()> {
        self.distribution = self.base.matrix_distribution().cloned();
        self.set_up = true;
        Ok(())
    }

    fn preconditioner_solve(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, "IdentityPreconditioner::preconditioner_solve")
    }

    fn preconditioner_solve_transpose(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, "IdentityPreconditioner::preconditioner_solve_transpose")
    }

    fn clean_up_memory(&mut self) {
        self.distribution = None;
        self.set_up = false;
    }
}
