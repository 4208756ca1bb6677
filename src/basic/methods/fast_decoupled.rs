use log::{debug, warn};
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_MAXIMUM_POWER_ERROR, IterationOutcome, NodeVoltageCalculator, PolarOrdering,
    check_count, check_power_error, check_precision, check_reduced_system, specified_powers,
};
use crate::basic::{
    dsbus_dv::dSbus_dV,
    error::{LoadFlowError, Result},
    jacobian::{decoupled_blocks, max_change, permute, polar_to_complex, power_mismatch, unit_phasors},
    system::{AdmittanceMatrix, PqBus, PvBus},
};

/// Decoupled Newton-Raphson with constant matrices.
///
/// `dP/dθ` and `dQ/d|V|` are evaluated once at the initial voltages and factorized once; every
/// iteration corrects all angles from the real mismatch, then the PQ magnitudes from the reactive
/// mismatch. Converges linearly. On networks without reactance `dP/dθ` vanishes at a flat start
/// and the method reports a singular matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastDecoupledMethod {
    pub target_precision: f64,
    pub maximum_iterations: usize,
    pub maximum_power_error: f64,
}

impl Default for FastDecoupledMethod {
    fn default() -> Self {
        Self {
            target_precision: 1e-9,
            maximum_iterations: 1000,
            maximum_power_error: DEFAULT_MAXIMUM_POWER_ERROR,
        }
    }
}

/// Largest real mismatch of all buses and reactive mismatch of the PQ buses.
fn largest_mismatch(mis: &DVector<Complex64>, npv: usize) -> f64 {
    if mis.iter().any(|s| !s.is_finite()) {
        return f64::INFINITY;
    }
    mis.iter().enumerate().fold(0.0, |acc: f64, (k, s)| {
        let q = if k < npv { 0.0 } else { s.im.abs() };
        acc.max(s.re.abs()).max(q)
    })
}

impl FastDecoupledMethod {
    pub fn new(target_precision: f64, maximum_iterations: usize) -> Result<Self> {
        let method = Self { target_precision, maximum_iterations, ..Self::default() };
        method.validate()?;
        Ok(method)
    }

    pub fn validate(&self) -> Result<()> {
        check_precision(self.target_precision)?;
        check_count("maximum iterations", self.maximum_iterations)?;
        check_power_error(self.maximum_power_error)
    }

    pub fn iterate(
        &self,
        admittances: &AdmittanceMatrix,
        nominal_voltage: f64,
        initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<IterationOutcome> {
        self.validate()?;
        check_reduced_system(admittances, &[initial_voltages, constant_currents], pq_buses, pv_buses)?;
        let ordering = PolarOrdering::new(pq_buses, pv_buses);
        let (npv, npq) = (ordering.npv, ordering.npq);
        let n_bus = npv + npq;
        let ybus = permute(&admittances.to_csc(), ordering.order());
        let sbus = ordering.gather(&specified_powers(admittances.dimension(), pq_buses, pv_buses));
        let c = ordering.gather(constant_currents);
        let mut v = ordering.initial_voltages(initial_voltages, pv_buses);
        let mut v_norm = unit_phasors(&v);
        let mut v_m = v.map(|e| e.norm());
        let mut v_a = v.map(|e| e.arg());

        let (ds_dvm, ds_dva) = dSbus_dV(&ybus, &v, &v_norm, &c);
        let (p_theta, q_magnitude) = decoupled_blocks(&ds_dvm, &ds_dva, npv, npq);
        let p_theta = p_theta.lu();
        let q_magnitude = q_magnitude.lu();
        if n_bus > 0 && !p_theta.is_invertible() {
            return Err(LoadFlowError::singular("real power / angle block is not invertible"));
        }
        if npq > 0 && !q_magnitude.is_invertible() {
            return Err(LoadFlowError::singular("reactive power / magnitude block is not invertible"));
        }

        let tolerance = self.target_precision * nominal_voltage;
        let mut mis = power_mismatch(&ybus, &v, &c, &sbus);
        let mut max_changes = Vec::new();
        let mut converged = false;
        for _ in 0..self.maximum_iterations {
            let residual = largest_mismatch(&mis, npv);
            if !residual.is_finite() {
                break;
            }
            if residual < tolerance {
                converged = true;
                break;
            }
            let previous = v.clone();

            let dp = mis.map(|s| s.re);
            if let Some(d_theta) = p_theta.solve(&dp) {
                v_a.rows_range_mut(0..n_bus).zip_apply(&d_theta, |a, d| *a -= d);
                polar_to_complex(&v_a, &v_m, &mut v_norm, &mut v);
            }

            if npq > 0 {
                mis = power_mismatch(&ybus, &v, &c, &sbus);
                let dq = mis.rows_range(npv..n_bus).map(|s| s.im);
                if let Some(d_magnitude) = q_magnitude.solve(&dq) {
                    v_m.rows_range_mut(npv..n_bus).zip_apply(&d_magnitude, |a, d| *a -= d);
                    polar_to_complex(&v_a, &v_m, &mut v_norm, &mut v);
                }
            }

            max_changes.push(max_change(&v, &previous) / nominal_voltage);
            mis = power_mismatch(&ybus, &v, &c, &sbus);
        }
        if !converged && largest_mismatch(&mis, npv) < tolerance {
            converged = true;
        }

        if converged {
            debug!("fast decoupled: converged after {} iterations", max_changes.len());
        } else if max_changes.len() == self.maximum_iterations {
            warn!("fast decoupled: stopped at the maximum of {} iterations", self.maximum_iterations);
        }
        Ok(IterationOutcome {
            voltages: ordering.scatter(&v),
            iterations: max_changes.len(),
            max_changes,
            converged,
        })
    }
}

impl NodeVoltageCalculator for FastDecoupledMethod {
    fn calculate_unknown_voltages(
        &self,
        admittances: &AdmittanceMatrix,
        _total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>> {
        self.iterate(admittances, nominal_voltage, initial_voltages, constant_currents, pq_buses, pv_buses)
            .map(|outcome| outcome.voltages)
    }

    fn maximum_power_error(&self) -> f64 {
        self.maximum_power_error
    }
}
