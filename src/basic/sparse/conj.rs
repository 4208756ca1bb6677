use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Trait for computing the conjugate of a matrix.
pub(crate) trait Conjugate {
    type Mat;

    /// Returns the conjugate of the matrix.
    fn conjugate(&self) -> Self::Mat;

    /// Computes the conjugate of the matrix in-place.
    fn conjugate_mut(&mut self);
}

impl Conjugate for CscMatrix<Complex64> {
    type Mat = CscMatrix<Complex64>;

    fn conjugate(&self) -> Self::Mat {
        let mut out = self.clone();
        out.conjugate_mut();
        out
    }

    fn conjugate_mut(&mut self) {
        self.values_mut().iter_mut().for_each(|x| *x = x.conj());
    }
}

/// Trait for extracting the real and imaginary parts of a matrix.
///
/// Both parts keep the sparsity pattern of the complex matrix, explicit zeros included, so the
/// Jacobian blocks built from them share one structure between iterations.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real and imaginary parts of the matrix.
    fn real_imag(&self) -> (Self::Mat, Self::Mat);

    /// Returns the real part of the matrix.
    fn real(&self) -> Self::Mat;

    /// Returns the imaginary part of the matrix.
    fn imag(&self) -> Self::Mat;
}

impl RealImage for CscMatrix<Complex64> {
    type Mat = CscMatrix<f64>;

    fn real(&self) -> Self::Mat {
        map_values(self, |x| x.re)
    }

    fn imag(&self) -> Self::Mat {
        map_values(self, |x| x.im)
    }

    fn real_imag(&self) -> (Self::Mat, Self::Mat) {
        (self.real(), self.imag())
    }
}

fn map_values(mat: &CscMatrix<Complex64>, f: impl Fn(&Complex64) -> f64) -> CscMatrix<f64> {
    let (offsets, indices, values) = mat.clone().disassemble();
    let values = values.iter().map(f).collect();
    CscMatrix::try_from_csc_data(mat.nrows(), mat.ncols(), offsets, indices, values)
        .unwrap_or_else(|_| CscMatrix::zeros(mat.nrows(), mat.ncols()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    fn sample(sign: f64) -> CscMatrix<Complex64> {
        let mut a = CooMatrix::new(4, 4);
        a.push(0, 0, Complex64::new(1.0, -sign));
        a.push(2, 1, Complex64::new(3.0, sign));
        a.push(3, 3, Complex64::new(5.0, -2.0 * sign));
        CscMatrix::from(&a)
    }

    #[test]
    fn test_conj() {
        let a = sample(1.0);
        let b = sample(-1.0);
        assert!(a.conjugate() == b, "matrices do not match!");
        let mut c = a.clone();
        c.conjugate_mut();
        assert!(c == b, "matrices do not match!");
    }

    #[test]
    fn test_real_imag_keeps_pattern() {
        let a = sample(1.0);
        let (re, im) = a.real_imag();
        assert_eq!(re.pattern(), a.pattern());
        assert_eq!(im.pattern(), a.pattern());
        let dense = DMatrix::from(&im);
        assert_eq!(dense[(2, 1)], 1.0);
        assert_eq!(DMatrix::from(&re)[(3, 3)], 5.0);
    }
}
