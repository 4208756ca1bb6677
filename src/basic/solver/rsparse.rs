use rsparse::{
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;

/// Sparse LU through `rsparse`. The symbolic analysis is computed once and reused.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
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
        let p: Vec<isize> = Ap.iter().map(|&v| v as isize).collect();
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p,
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        let symbolic = self.symbolic.get_or_insert_with(|| sqr(&a, 1, false));
        if self.x.len() != n {
            self.x = vec![0.0; n];
        }
        let numeric = lu(&a, symbolic, 1e-6).map_err(|_| "LU factorization failed")?;
        ipvec(&numeric.pinv, b, &mut self.x); // x = P*b
        lsolve(&numeric.l, &mut self.x); // x = L\x
        usolve(&numeric.u, &mut self.x); // x = U\x
        ipvec(&symbolic.q, &self.x, b); // b = Q*x
        if b.iter().any(|x| !x.is_finite()) {
            return Err("LU factorization is singular");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => {
            for k in 0..b.len() {
                x[pvec[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}
