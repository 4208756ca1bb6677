use crate::basic::sparse::conj::Conjugate;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

fn diagonal(values: &DVector<Complex64>) -> CscMatrix<Complex64> {
    let mut diag = CscMatrix::identity(values.len());
    diag.values_mut().copy_from_slice(values.as_slice());
    diag
}

/// Partial derivatives of the injected power with respect to voltage magnitudes and angles.
///
/// The injected power of a bus is `S = v ⊙ conj(Y v - c)` where `c` holds constant currents
/// flowing into the buses from outside the modelled system (the folded-in slack voltages of a
/// reduced network). `c` does not depend on `v`, so it only enters through the bus currents.
///
/// Returns `(dS_dVm, dS_dVa)`.
///
/// # Notes
///
/// * The complex matrix form follows R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///   their Derivatives using Complex Matrix Notation", MATPOWER Technical Note 2, February 2010.
/// * `v_norm` is `v / |v|` elementwise.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    v_norm: &DVector<Complex64>,
    constant_currents: &DVector<Complex64>,
) -> (CscMatrix<Complex64>, CscMatrix<Complex64>) {
    let ibus = Ybus * v - constant_currents;
    let diagVnorm = diagonal(v_norm);
    let diagV = diagonal(v);
    let diagIbus = diagonal(&ibus);

    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = &diagV * (diagIbus - Ybus * &diagV).conjugate() * Complex64::i();
    (dS_dVm, dS_dVa)
}
