use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Places the matrices side by side. All of them must have the same number of rows.
pub(crate) fn csc_hstack(matrices: &[&CscMatrix<f64>]) -> CscMatrix<f64> {
    let nrows = matrices.first().map_or(0, |m| m.nrows());
    let ncols = matrices.iter().map(|m| m.ncols()).sum();
    let mut coo = CooMatrix::new(nrows, ncols);
    let mut offset = 0;
    for mat in matrices {
        assert_eq!(mat.nrows(), nrows, "All matrices must have the same number of rows");
        mat.triplet_iter().for_each(|(r, c, v)| coo.push(r, c + offset, *v));
        offset += mat.ncols();
    }
    CscMatrix::from(&coo)
}

/// Places the matrices on top of each other. All of them must have the same number of columns.
pub(crate) fn csc_vstack(matrices: &[&CscMatrix<f64>]) -> CscMatrix<f64> {
    let ncols = matrices.first().map_or(0, |m| m.ncols());
    let nrows = matrices.iter().map(|m| m.nrows()).sum();
    let mut coo = CooMatrix::new(nrows, ncols);
    let mut offset = 0;
    for mat in matrices {
        assert_eq!(mat.ncols(), ncols, "All matrices must have the same number of cols");
        mat.triplet_iter().for_each(|(r, c, v)| coo.push(r + offset, c, *v));
        offset += mat.nrows();
    }
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_csc_hstack() {
        let mut mat1 = CooMatrix::new(3, 2);
        mat1.push(2, 1, 3.0);
        let mut mat2 = CooMatrix::new(3, 3);
        mat2.push(0, 0, 2.0);
        mat2.push(1, 1, 4.0);
        mat2.push(2, 2, 6.0);

        let mut mat3 = CooMatrix::new(3, 5);
        mat3.push(2, 1, 3.0);
        mat3.push(0, 2, 2.0);
        mat3.push(1, 3, 4.0);
        mat3.push(2, 4, 6.0);

        let a = csc_hstack(&[&CscMatrix::from(&mat1), &CscMatrix::from(&mat2)]);
        assert_eq!(DMatrix::from(&a), DMatrix::from(&CscMatrix::from(&mat3)));
    }

    #[test]
    fn test_csc_vstack() {
        let mut mat1 = CooMatrix::new(2, 3);
        mat1.push(1, 2, 3.0);
        let mut mat2 = CooMatrix::new(3, 3);
        mat2.push(0, 0, 2.0);
        mat2.push(1, 1, 4.0);
        mat2.push(2, 2, 6.0);

        let mut mat3 = CooMatrix::new(5, 3);
        mat3.push(1, 2, 3.0);
        mat3.push(2, 0, 2.0);
        mat3.push(3, 1, 4.0);
        mat3.push(4, 2, 6.0);

        let a = csc_vstack(&[&CscMatrix::from(&mat1), &CscMatrix::from(&mat2)]);
        assert_eq!(DMatrix::from(&a), DMatrix::from(&CscMatrix::from(&mat3)));
    }
}
