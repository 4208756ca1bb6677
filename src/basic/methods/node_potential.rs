use log::debug;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{NodeVoltageCalculator, check_reduced_system, specified_powers};
use crate::basic::{
    error::Result,
    system::{AdmittanceMatrix, PqBus, PvBus},
};

/// Direct solve treating every load as a constant current drawn at nominal voltage.
///
/// One factorization and one solve, no iteration. Exact only for networks without loads; mostly
/// useful as the starting point of the iterative methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePotentialMethod;

impl NodePotentialMethod {
    pub const MAXIMUM_POWER_ERROR: f64 = 10.0;

    pub fn new() -> Self {
        Self
    }

    /// Solves `Y v = c + conj(s / V_nominal)`.
    pub fn solve(
        &self,
        admittances: &AdmittanceMatrix,
        nominal_voltage: f64,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>> {
        check_reduced_system(admittances, &[constant_currents], pq_buses, pv_buses)?;
        let powers = specified_powers(admittances.dimension(), pq_buses, pv_buses);
        let load_currents = powers.map(|s| (s / nominal_voltage).conj());
        let factorization = admittances.calculate_factorization()?;
        debug!("node potential: solving {} unknown voltages", admittances.dimension());
        factorization.solve(&(constant_currents + load_currents))
    }
}

impl NodeVoltageCalculator for NodePotentialMethod {
    fn calculate_unknown_voltages(
        &self,
        admittances: &AdmittanceMatrix,
        _total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        _initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>> {
        self.solve(admittances, nominal_voltage, constant_currents, pq_buses, pv_buses)
    }

    fn maximum_power_error(&self) -> f64 {
        Self::MAXIMUM_POWER_ERROR
    }
}
