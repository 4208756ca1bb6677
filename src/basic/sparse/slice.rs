use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Extracts the block starting at `start_pos` (row, column) with the given `shape`.
///
/// Empty shapes are allowed and yield an empty matrix.
pub(crate) fn slice_csc_matrix_block(
    mat: &CscMatrix<f64>,
    start_pos: (usize, usize),
    shape: (usize, usize),
) -> CscMatrix<f64> {
    let (start_row, start_col) = start_pos;
    let (end_row, end_col) = (start_row + shape.0, start_col + shape.1);

    let mut coo = CooMatrix::new(shape.0, shape.1);
    mat.triplet_iter()
        .filter(|(r, c, _)| *r >= start_row && *r < end_row && *c >= start_col && *c < end_col)
        .for_each(|(r, c, v)| coo.push(r - start_row, c - start_col, *v));
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_block() {
        let dense = DMatrix::from_fn(4, 4, |r, c| (r * 4 + c) as f64 + 1.0);
        let csc = CscMatrix::from(&dense);
        let block = slice_csc_matrix_block(&csc, (1, 2), (2, 2));
        let expected = DMatrix::from_row_slice(2, 2, &[7.0, 8.0, 11.0, 12.0]);
        assert_eq!(DMatrix::from(&block), expected);

        let empty = slice_csc_matrix_block(&csc, (0, 4), (4, 0));
        assert_eq!((empty.nrows(), empty.ncols()), (4, 0));
    }
}
