use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_MAXIMUM_POWER_ERROR, IterationOutcome, NodePotentialMethod, NodeVoltageCalculator,
    check_count, check_power_error, check_precision, check_reduced_system, specified_powers,
    with_magnitude,
};
use crate::basic::{
    error::{LoadFlowError, Result},
    system::{AdmittanceMatrix, PqBus, PvBus},
};

/// Gauss-Seidel iteration on the bus currents.
///
/// Every sweep updates each bus from one row of `Y v = c + conj(s / v)`, using the newest value
/// of every other bus. PV buses are projected back onto their magnitude after each update and
/// their reactive power is re-estimated from the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentIterationMethod {
    pub target_precision: f64,
    pub maximum_iterations: usize,
    pub maximum_power_error: f64,
    /// Start from the node potential solution instead of the supplied initial voltages.
    pub seed_with_node_potential: bool,
}

impl Default for CurrentIterationMethod {
    fn default() -> Self {
        Self {
            target_precision: 1e-9,
            maximum_iterations: 1000,
            maximum_power_error: DEFAULT_MAXIMUM_POWER_ERROR,
            seed_with_node_potential: true,
        }
    }
}

/// Row of the system each bus is updated from.
///
/// Buses without self admittance (the internal nodes of controlled sources) swap rows with the
/// bus they are most strongly coupled to.
fn assign_equation_rows(dense: &DMatrix<Complex64>) -> Result<Vec<usize>> {
    let n = dense.nrows();
    let scale = dense.iter().fold(0.0, |acc: f64, y| acc.max(y.norm()));
    let threshold = scale * 1e-12;
    let mut rows: Vec<usize> = (0..n).collect();
    for i in 0..n {
        if rows[i] != i || dense[(i, i)].norm() > threshold {
            continue;
        }
        let pivot = (0..n)
            .filter(|&r| {
                r != i
                    && rows[r] == r
                    && dense[(r, i)].norm() > threshold
                    && dense[(i, r)].norm() > threshold
            })
            .max_by(|&a, &b| dense[(a, i)].norm().total_cmp(&dense[(b, i)].norm()))
            .ok_or_else(|| {
                LoadFlowError::singular(format!("bus {i} has no self admittance and no pivot row"))
            })?;
        debug!("current iteration: bus {i} is solved from row {pivot}");
        rows.swap(i, pivot);
    }
    Ok(rows)
}

/// `Σ_j Y_rj v_j` over the row, skipping column `skip`, and the skipped coefficient.
fn row_product(y: &CsrMatrix<Complex64>, row: usize, skip: usize, v: &DVector<Complex64>) -> (Complex64, Complex64) {
    let row = y.row(row);
    row.col_indices().iter().zip(row.values()).fold(
        (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)),
        |(sum, coefficient), (&j, y)| {
            if j == skip { (sum, coefficient + y) } else { (sum + y * v[j], coefficient) }
        },
    )
}

impl CurrentIterationMethod {
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

    /// Iterates from `initial_voltages`.
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
        let n = admittances.dimension();
        let y = admittances.to_csr();
        let rows = assign_equation_rows(&admittances.to_dense())?;

        let mut magnitudes = vec![None; n];
        pv_buses.iter().for_each(|b| magnitudes[b.index] = Some(b.voltage_magnitude));
        let mut powers = specified_powers(n, pq_buses, pv_buses);
        let mut v = initial_voltages.clone();
        for bus in pv_buses {
            v[bus.index] = with_magnitude(v[bus.index], bus.voltage_magnitude);
        }
        for bus in pv_buses {
            let (sum, own) = row_product(&y, bus.index, bus.index, &v);
            let current = sum + own * v[bus.index] - constant_currents[bus.index];
            powers[bus.index].im = (v[bus.index] * current.conj()).im;
        }

        let power_tolerance = self.target_precision;
        let mut max_changes = Vec::new();
        let mut converged = false;
        for _ in 0..self.maximum_iterations {
            let mut max_change: f64 = 0.0;
            let mut finite = true;
            let mut power_error_too_big = false;
            for k in 0..n {
                let row = rows[k];
                let (sum, coefficient) = row_product(&y, row, k, &v);
                let load = (powers[row] / v[row]).conj();
                let mut updated = (constant_currents[row] + load - sum) / coefficient;
                if let Some(magnitude) = magnitudes[k] {
                    updated = with_magnitude(updated, magnitude);
                }
                finite &= updated.is_finite();
                max_change = max_change.max((updated - v[k]).norm());
                v[k] = updated;

                if magnitudes[k].is_some() {
                    let (sum, own) = row_product(&y, k, k, &v);
                    let current = sum + own * v[k] - constant_currents[k];
                    let power = v[k] * current.conj();
                    power_error_too_big |= (power.re - powers[k].re).abs() > power_tolerance;
                    powers[k].im = power.im;
                }
            }
            let relative_change = if finite { max_change / nominal_voltage } else { f64::INFINITY };
            max_changes.push(relative_change);
            if !finite {
                debug!("current iteration: diverged after {} iterations", max_changes.len());
                break;
            }
            if relative_change < self.target_precision / 10.0 && !power_error_too_big {
                converged = true;
                break;
            }
        }

        if converged {
            debug!("current iteration: converged after {} iterations", max_changes.len());
        } else if max_changes.len() == self.maximum_iterations {
            warn!("current iteration: stopped at the maximum of {} iterations", self.maximum_iterations);
        }
        Ok(IterationOutcome { voltages: v, iterations: max_changes.len(), max_changes, converged })
    }
}

impl NodeVoltageCalculator for CurrentIterationMethod {
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
        let seed = if self.seed_with_node_potential {
            NodePotentialMethod.solve(admittances, nominal_voltage, constant_currents, pq_buses, pv_buses)?
        } else {
            initial_voltages.clone()
        };
        let outcome =
            self.iterate(admittances, nominal_voltage, &seed, constant_currents, pq_buses, pv_buses)?;
        Ok(outcome.voltages)
    }

    fn maximum_power_error(&self) -> f64 {
        self.maximum_power_error
    }
}
