use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as SparseSolve;

/// Sparse LU through `faer`. The symbolic factorization is computed once and reused.
#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl SparseSolve for FaerSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), &'static str> {
        if Ap.len() != n + 1 || b.len() != n {
            return Err("system dimension does not match the matrix");
        }
        let structure = SymbolicSparseColMatRef::new_checked(n, n, Ap, None, Ai);
        let mat = SparseColMatRef::new(structure, Ax);
        let symbolic = match self.symbolic.take() {
            Some(symbolic) => symbolic,
            None => SymbolicLu::try_new(structure).map_err(|_| "symbolic factorization failed")?,
        };
        let lu = Lu::try_new_with_symbolic(symbolic.clone(), mat)
            .map_err(|_| "numeric factorization failed")?;
        self.symbolic = Some(symbolic);
        lu.solve_in_place(MatMut::from_column_major_slice_mut(b, n, 1));
        if b.iter().any(|x| !x.is_finite()) {
            return Err("LU factorization is singular");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}
