use log::debug;
use nalgebra::DVector;
use num_complex::Complex64;

use super::NodeVoltageCalculator;
use crate::basic::{
    error::Result,
    system::{AdmittanceMatrix, PqBus, PvBus},
};

/// Runs `seed` and hands its voltages to `refine` as the initial guess.
///
/// The refining method decides the accepted power error. It must start from the initial voltages
/// it is given, e.g. a current iteration with `seed_with_node_potential` switched off.
#[derive(Debug, Clone, PartialEq)]
pub struct SeededMethod<S, R> {
    pub seed: S,
    pub refine: R,
}

impl<S, R> SeededMethod<S, R> {
    pub fn new(seed: S, refine: R) -> Self {
        Self { seed, refine }
    }
}

impl<S: NodeVoltageCalculator, R: NodeVoltageCalculator> NodeVoltageCalculator for SeededMethod<S, R> {
    fn calculate_unknown_voltages(
        &self,
        admittances: &AdmittanceMatrix,
        total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>> {
        let seed = self.seed.calculate_unknown_voltages(
            admittances,
            total_row_sums,
            nominal_voltage,
            initial_voltages,
            constant_currents,
            pq_buses,
            pv_buses,
        )?;
        debug!("seeded method: refining {} seed voltages", seed.len());
        self.refine.calculate_unknown_voltages(
            admittances,
            total_row_sums,
            nominal_voltage,
            &seed,
            constant_currents,
            pq_buses,
            pv_buses,
        )
    }

    fn maximum_power_error(&self) -> f64 {
        self.refine.maximum_power_error()
    }
}
