use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::{
    dsbus_dv::dSbus_dV,
    error::{LoadFlowError, Result},
    jacobian::{assemble_f, build_jacobian, max_change, power_mismatch, unit_phasors, update_v},
    methods::IterationOutcome,
    solver::Solve,
};

/// Options of a polar Newton-Raphson run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PolarOptions {
    /// Largest absolute power mismatch accepted.
    pub tolerance: f64,
    pub max_iter: usize,
    /// Divides the recorded voltage changes.
    pub voltage_scale: f64,
}

/// Newton-Raphson on `s = v ⊙ conj(Y v - c)` in polar coordinates.
///
/// Buses are ordered PV, PQ, then buses with fixed voltage. The angles of all PV and PQ buses and
/// the magnitudes of the PQ buses are the unknowns; the magnitudes of `v_init` at PV buses are
/// kept. A singular Jacobian at the first iteration is an error, later it ends the iteration.
#[allow(non_snake_case)]
pub(crate) fn newton_raphson_polar<Solver: Solve>(
    Ybus: &CscMatrix<Complex64>,
    constant_currents: &DVector<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    options: PolarOptions,
    solver: &mut Solver,
) -> Result<IterationOutcome> {
    let mut v = v_init.clone();
    let mut v_norm = unit_phasors(&v);
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());

    let num_state = npv + 2 * npq;
    let mut mis = power_mismatch(Ybus, &v, constant_currents, Sbus);
    let mut F = DVector::zeros(num_state);
    assemble_f(&mut F, &mis, npv, npq);

    let mut max_changes = Vec::new();
    if num_state == 0 || F.amax() < options.tolerance {
        return Ok(IterationOutcome { voltages: v, iterations: 0, max_changes, converged: true });
    }

    solver.reset();
    for iteration in 1..=options.max_iter {
        let (dS_dVm, dS_dVa) = dSbus_dV(Ybus, &v, &v_norm, constant_currents);
        let jacobian = build_jacobian(&dS_dVm, &dS_dVa, npv, npq);

        let n = jacobian.nrows();
        let (mut Ap, mut Ai, mut Ax) = jacobian.disassemble();
        if let Err(reason) = solver.solve(&mut Ap, &mut Ai, &mut Ax, F.as_mut_slice(), n) {
            if iteration == 1 {
                return Err(LoadFlowError::singular(format!("Jacobian: {reason}")));
            }
            warn!("newton-raphson: Jacobian solve failed at iteration {iteration}: {reason}");
            break;
        }

        let previous = v.clone();
        update_v(&mut v_a, &mut v_m, &F, npv, npq, &mut v_norm, &mut v);
        let change = max_change(&v, &previous) / options.voltage_scale;
        max_changes.push(change);

        mis = power_mismatch(Ybus, &v, constant_currents, Sbus);
        assemble_f(&mut F, &mis, npv, npq);

        let residual = F.amax();
        if !residual.is_finite() || !change.is_finite() {
            debug!("newton-raphson: diverged after {iteration} iterations");
            break;
        }
        if residual < options.tolerance {
            debug!("newton-raphson: converged after {iteration} iterations, mismatch {residual:e}");
            return Ok(IterationOutcome { voltages: v, iterations: iteration, max_changes, converged: true });
        }
    }
    if max_changes.len() == options.max_iter {
        warn!("newton-raphson: stopped at the maximum of {} iterations", options.max_iter);
    }
    Ok(IterationOutcome { voltages: v, iterations: max_changes.len(), max_changes, converged: false })
}

/// Full-system Newton-Raphson power flow.
///
/// `Sbus` holds the specified injections, buses ordered PV, PQ, then slack. The voltage of every
/// slack bus and the magnitude of every PV bus are taken from `v_init`.
///
/// Defaults: tolerance 1e-6 on the largest power mismatch, 100 iterations.
#[allow(non_snake_case, clippy::too_many_arguments)]
pub fn newton_pf<Solver: Solve>(
    Ybus: &CscMatrix<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    tolerance: Option<f64>,
    max_iter: Option<usize>,
    solver: &mut Solver,
) -> Result<IterationOutcome> {
    let n = v_init.len();
    for (expected, actual) in [(n, Ybus.nrows()), (n, Ybus.ncols()), (n, Sbus.len())] {
        if expected != actual {
            return Err(LoadFlowError::DimensionMismatch { expected, actual });
        }
    }
    if npv + npq > n {
        return Err(LoadFlowError::DimensionMismatch { expected: n, actual: npv + npq });
    }
    let options = PolarOptions {
        tolerance: tolerance.unwrap_or(1e-6),
        max_iter: max_iter.unwrap_or(100),
        voltage_scale: 1.0,
    };
    newton_raphson_polar(Ybus, &DVector::zeros(n), Sbus, v_init, npv, npq, options, solver)
}
