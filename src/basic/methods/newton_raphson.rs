use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_MAXIMUM_POWER_ERROR, IterationOutcome, NodeVoltageCalculator, PolarOrdering,
    check_count, check_power_error, check_precision, check_reduced_system, specified_powers,
};
use crate::basic::{
    error::Result,
    jacobian::permute,
    newtonpf::{PolarOptions, newton_raphson_polar},
    solver::DefaultSolver,
    system::{AdmittanceMatrix, PqBus, PvBus},
};

/// Newton-Raphson in polar coordinates with the full Jacobian, rebuilt every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonRaphsonMethod {
    pub target_precision: f64,
    pub maximum_iterations: usize,
    pub maximum_power_error: f64,
}

impl Default for NewtonRaphsonMethod {
    fn default() -> Self {
        Self {
            target_precision: 1e-9,
            maximum_iterations: 100,
            maximum_power_error: DEFAULT_MAXIMUM_POWER_ERROR,
        }
    }
}

impl NewtonRaphsonMethod {
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

    /// Iterates from `initial_voltages`, with the PV magnitudes applied first. Converged once the
    /// largest power mismatch drops below `target_precision * nominal_voltage`.
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
        let ybus = permute(&admittances.to_csc(), ordering.order());
        let sbus = ordering.gather(&specified_powers(admittances.dimension(), pq_buses, pv_buses));
        let options = PolarOptions {
            tolerance: self.target_precision * nominal_voltage,
            max_iter: self.maximum_iterations,
            voltage_scale: nominal_voltage,
        };
        let mut outcome = newton_raphson_polar(
            &ybus,
            &ordering.gather(constant_currents),
            &sbus,
            &ordering.initial_voltages(initial_voltages, pv_buses),
            ordering.npv,
            ordering.npq,
            options,
            &mut DefaultSolver::default(),
        )?;
        outcome.voltages = ordering.scatter(&outcome.voltages);
        Ok(outcome)
    }
}

impl NodeVoltageCalculator for NewtonRaphsonMethod {
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
