//! Helpers shared by the Jacobian based load-flow methods.
//!
//! Bus ordering inside these helpers is always PV buses first, then PQ buses, then any buses whose
//! voltage is fixed. The state vector holds the angles of all PV and PQ buses followed by the
//! magnitudes of the PQ buses.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

use crate::basic::sparse::{
    conj::RealImage,
    slice::slice_csc_matrix_block,
    stack::{csc_hstack, csc_vstack},
};

trait Slice {
    type Mat;
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat;
    fn columns(&self, start_col: usize, end_col: usize) -> Self::Mat;
}

impl Slice for CscMatrix<f64> {
    type Mat = CscMatrix<f64>;
    #[inline(always)]
    fn block(&self, start_pos: (usize, usize), shape: (usize, usize)) -> Self::Mat {
        slice_csc_matrix_block(self, start_pos, shape)
    }
    #[inline(always)]
    fn columns(&self, start_col: usize, end_col: usize) -> Self::Mat {
        slice_csc_matrix_block(self, (0, start_col), (self.nrows(), end_col - start_col))
    }
}

/// Power mismatch `v ⊙ conj(Y v - c) - s`.
pub(crate) fn power_mismatch(
    ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    constant_currents: &DVector<Complex64>,
    sbus: &DVector<Complex64>,
) -> DVector<Complex64> {
    v.component_mul(&(ybus * v - constant_currents).conjugate()) - sbus
}

/// Writes the real mismatch of all PV and PQ buses and the reactive mismatch of the PQ buses.
#[inline(always)]
pub(crate) fn assemble_f(f: &mut DVector<f64>, mis: &DVector<Complex64>, npv: usize, npq: usize) {
    let n_bus = npv + npq;
    f.rows_range_mut(0..n_bus)
        .zip_apply(&mis.rows_range(0..n_bus), |a, b| *a = b.re);
    f.rows_range_mut(n_bus..n_bus + npq)
        .zip_apply(&mis.rows_range(npv..n_bus), |a, b| *a = b.im);
}

/// Applies the Newton correction `dx` (already solved, sign as in `J dx = F`).
#[inline(always)]
pub(crate) fn update_v(
    v_a: &mut DVector<f64>,
    v_m: &mut DVector<f64>,
    dx: &DVector<f64>,
    npv: usize,
    npq: usize,
    v_norm: &mut DVector<Complex64>,
    v: &mut DVector<Complex64>,
) {
    let n_bus = npv + npq;
    v_a.rows_range_mut(0..n_bus)
        .zip_apply(&dx.rows_range(0..n_bus), |a, b| {
            *a -= b;
            *a = a.rem_euclid(2.0 * PI);
        });
    v_m.rows_range_mut(npv..n_bus)
        .zip_apply(&dx.rows_range(n_bus..n_bus + npq), |a, b| *a -= b);
    polar_to_complex(v_a, v_m, v_norm, v);
}

#[inline(always)]
pub(crate) fn polar_to_complex(
    v_a: &DVector<f64>,
    v_m: &DVector<f64>,
    v_norm: &mut DVector<Complex64>,
    v: &mut DVector<Complex64>,
) {
    v_norm.zip_apply(v_a, |a, va| *a = Complex64::from_polar(1.0, va));
    v.zip_zip_apply(v_norm, v_m, |a, e, vm| *a = vm * e);
}

/// Unit phasors `v / |v|`; zero voltages map to angle zero.
pub(crate) fn unit_phasors(v: &DVector<Complex64>) -> DVector<Complex64> {
    v.map(|e| if e.norm() > 0.0 { e / e.norm() } else { Complex64::new(1.0, 0.0) })
}

/// Full Jacobian `[[dP/dθ, dP/d|V|], [dQ/dθ, dQ/d|V|]]` restricted to the state variables.
///
/// With no PQ bus the matrix reduces to `dP/dθ`.
#[allow(non_snake_case)]
pub(crate) fn build_jacobian(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    npv: usize,
    npq: usize,
) -> CscMatrix<f64> {
    let n_bus = npv + npq;
    let (real, imag) = ds_dva.real_imag();
    let (real2, imag2) = ds_dvm.real_imag();
    let J11 = real.block((0, 0), (n_bus, n_bus));
    let J12 = real2.block((0, 0), (n_bus, n_bus)).columns(npv, n_bus);
    let J21 = imag.block((npv, 0), (npq, n_bus));
    let J22 = imag2.block((npv, npv), (npq, npq));

    csc_vstack(&[&csc_hstack(&[&J11, &J12]), &csc_hstack(&[&J21, &J22])])
}

/// The diagonal blocks `dP/dθ` and `dQ/d|V|` of the Jacobian as dense matrices.
pub(crate) fn decoupled_blocks(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    npv: usize,
    npq: usize,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n_bus = npv + npq;
    let p_theta = ds_dva.real().block((0, 0), (n_bus, n_bus));
    let q_magnitude = ds_dvm.imag().block((npv, npv), (npq, npq));
    (DMatrix::from(&p_theta), DMatrix::from(&q_magnitude))
}

/// Reorders rows and columns: entry `(order[a], order[b])` moves to `(a, b)`.
pub(crate) fn permute(ybus: &CscMatrix<Complex64>, order: &[usize]) -> CscMatrix<Complex64> {
    let mut position = vec![usize::MAX; ybus.nrows()];
    for (k, &i) in order.iter().enumerate() {
        position[i] = k;
    }
    let mut coo = CooMatrix::new(order.len(), order.len());
    for (r, c, y) in ybus.triplet_iter() {
        if position[r] != usize::MAX && position[c] != usize::MAX {
            coo.push(position[r], position[c], *y);
        }
    }
    CscMatrix::from(&coo)
}

/// Largest elementwise distance between two voltage vectors.
pub(crate) fn max_change(a: &DVector<Complex64>, b: &DVector<Complex64>) -> f64 {
    a.iter().zip(b.iter()).fold(0.0, |acc, (x, y)| f64::max(acc, (x - y).norm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::dsbus_dv::dSbus_dV;

    #[test]
    fn test_jacobian_shape_and_pv_only() {
        let mut coo = CooMatrix::new(3, 3);
        for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 1), (2, 2)] {
            let y = if r == c { Complex64::new(2.0, -6.0) } else { Complex64::new(-1.0, 3.0) };
            coo.push(r, c, y);
        }
        let y = CscMatrix::from(&coo);
        let v = DVector::from_element(3, Complex64::new(1.0, 0.0));
        let c = DVector::zeros(3);
        let (dvm, dva) = dSbus_dV(&y, &v, &unit_phasors(&v), &c);

        let j = build_jacobian(&dvm, &dva, 1, 1);
        assert_eq!((j.nrows(), j.ncols()), (3, 3));
        let dense = DMatrix::from(&j);
        let full_p = DMatrix::from(&dva.real());
        assert_eq!(dense.view((0, 0), (2, 2)), full_p.view((0, 0), (2, 2)));

        let j = build_jacobian(&dvm, &dva, 2, 0);
        assert_eq!((j.nrows(), j.ncols()), (2, 2));

        let (p, q) = decoupled_blocks(&dvm, &dva, 1, 1);
        assert_eq!((p.nrows(), q.nrows()), (2, 1));
    }

    #[test]
    fn test_permute() {
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 1, Complex64::new(1.0, 0.0));
        coo.push(2, 2, Complex64::new(5.0, 0.0));
        let p = DMatrix::from(&permute(&CscMatrix::from(&coo), &[2, 0, 1]));
        assert_eq!(p[(1, 2)], Complex64::new(1.0, 0.0));
        assert_eq!(p[(0, 0)], Complex64::new(5.0, 0.0));
    }

    #[test]
    fn test_mismatch_vector_layout() {
        let mis = DVector::from_vec(vec![
            Complex64::new(1.0, 10.0),
            Complex64::new(2.0, 20.0),
            Complex64::new(3.0, 30.0),
        ]);
        let mut f = DVector::zeros(5);
        assemble_f(&mut f, &mis, 1, 2);
        assert_eq!(f.as_slice(), &[1.0, 2.0, 3.0, 20.0, 30.0]);
    }
}
