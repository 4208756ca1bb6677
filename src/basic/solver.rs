#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A trait for solving real sparse linear systems given in compressed column form.
///
/// Implementations may cache the symbolic analysis of the first matrix they see and reuse it for
/// later matrices with the same sparsity pattern. Call [`Solve::reset`] before solving a system
/// with a different pattern.
pub trait Solve {
    /// Solves `A x = b`, overwriting `b` with `x`.
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `b` - Right-hand side vector.
    /// * `n` - Dimension of the system.
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), &'static str>;

    /// Drops any cached symbolic analysis.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};
    use nalgebra_sparse::{CooMatrix, CscMatrix};

    fn check_solver<S: Solve>(solver: &mut S) {
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 4.0);
        coo.push(0, 2, 1.0);
        coo.push(1, 1, -3.0);
        coo.push(2, 0, 2.0);
        coo.push(2, 1, 1.0);
        coo.push(2, 2, 5.0);
        let a = CscMatrix::from(&coo);
        let expected = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let rhs = DMatrix::from(&a) * &expected;

        // the second solve reuses the cached symbolic analysis
        for scale in [1.0, 2.0] {
            let (mut ap, mut ai, ax) = a.clone().disassemble();
            let mut ax: Vec<f64> = ax.iter().map(|x| x * scale).collect();
            let mut b: Vec<f64> = rhs.iter().map(|x| x * scale).collect();
            solver.solve(&mut ap, &mut ai, &mut ax, &mut b, 3).unwrap();
            for (x, e) in b.iter().zip(expected.iter()) {
                assert!((x - e).abs() < 1e-12);
            }
        }
        solver.reset();
    }

    #[test]
    fn test_default_solver() {
        let mut solver = DefaultSolver::default();
        check_solver(&mut solver);
    }
}
