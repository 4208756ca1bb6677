//! Interchangeable strategies computing the unknown node voltages of a reduced system.

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{LoadFlowError, Result},
    system::{AdmittanceMatrix, PqBus, PvBus},
};

pub mod current_iteration;
pub mod fast_decoupled;
pub mod newton_raphson;
pub mod node_potential;
pub mod seeded;

pub use current_iteration::CurrentIterationMethod;
pub use fast_decoupled::FastDecoupledMethod;
pub use newton_raphson::NewtonRaphsonMethod;
pub use node_potential::NodePotentialMethod;
pub use seeded::SeededMethod;

/// Relative power error accepted by the iterative methods unless configured otherwise.
///
/// Loads a hair past the transfer limit of a line leave residuals around 1e-4; converged results
/// stay below 1e-9.
pub const DEFAULT_MAXIMUM_POWER_ERROR: f64 = 1e-7;

/// A strategy solving the reduced load-flow problem
/// `Y v = c + conj(s / v)` for the unknown voltages `v`.
///
/// Bus indices of `pq_buses` and `pv_buses` refer to rows of `admittances`; together they cover
/// every row exactly once. Implementations keep no state between calls.
pub trait NodeVoltageCalculator {
    #[allow(clippy::too_many_arguments)]
    fn calculate_unknown_voltages(
        &self,
        admittances: &AdmittanceMatrix,
        total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>>;

    /// Relative power error above which the orchestrator reports a voltage collapse.
    fn maximum_power_error(&self) -> f64;
}

impl<T: NodeVoltageCalculator + ?Sized> NodeVoltageCalculator for Box<T> {
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
        (**self).calculate_unknown_voltages(
            admittances,
            total_row_sums,
            nominal_voltage,
            initial_voltages,
            constant_currents,
            pq_buses,
            pv_buses,
        )
    }

    fn maximum_power_error(&self) -> f64 {
        (**self).maximum_power_error()
    }
}

/// Result of an iterative method, kept for inspection of its convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub voltages: DVector<Complex64>,
    pub iterations: usize,
    /// Largest voltage change of every iteration, relative to the nominal voltage.
    pub max_changes: Vec<f64>,
    pub converged: bool,
}

/// Checks that all inputs describe the same reduced system.
pub(crate) fn check_reduced_system(
    admittances: &AdmittanceMatrix,
    vectors: &[&DVector<Complex64>],
    pq_buses: &[PqBus],
    pv_buses: &[PvBus],
) -> Result<()> {
    let dimension = admittances.dimension();
    for vector in vectors {
        if vector.len() != dimension {
            return Err(LoadFlowError::DimensionMismatch { expected: dimension, actual: vector.len() });
        }
    }
    if pq_buses.len() + pv_buses.len() != dimension {
        return Err(LoadFlowError::DimensionMismatch {
            expected: dimension,
            actual: pq_buses.len() + pv_buses.len(),
        });
    }
    let mut seen = vec![false; dimension];
    for index in pq_buses.iter().map(|b| b.index).chain(pv_buses.iter().map(|b| b.index)) {
        if index >= dimension {
            return Err(LoadFlowError::IndexOutOfRange { index, dimension });
        }
        if std::mem::replace(&mut seen[index], true) {
            return Err(LoadFlowError::AmbiguousBusType { node: index });
        }
    }
    Ok(())
}

/// Specified injections of the reduced system; PV buses contribute their real power only.
pub(crate) fn specified_powers(dimension: usize, pq_buses: &[PqBus], pv_buses: &[PvBus]) -> DVector<Complex64> {
    let mut powers = DVector::zeros(dimension);
    pq_buses.iter().for_each(|b| powers[b.index] = b.power);
    pv_buses.iter().for_each(|b| powers[b.index] = Complex64::new(b.real_power, 0.0));
    powers
}

/// `voltage` rotated onto the circle of radius `magnitude`; zero maps to angle zero.
pub(crate) fn with_magnitude(voltage: Complex64, magnitude: f64) -> Complex64 {
    Complex64::from_polar(magnitude, if voltage.norm() > 0.0 { voltage.arg() } else { 0.0 })
}

/// Reordering of a reduced system into the PV-first layout of the Jacobian helpers.
pub(crate) struct PolarOrdering {
    order: Vec<usize>,
    pub npv: usize,
    pub npq: usize,
}

impl PolarOrdering {
    pub fn new(pq_buses: &[PqBus], pv_buses: &[PvBus]) -> Self {
        let order = pv_buses.iter().map(|b| b.index).chain(pq_buses.iter().map(|b| b.index)).collect();
        Self { order, npv: pv_buses.len(), npq: pq_buses.len() }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn gather(&self, values: &DVector<Complex64>) -> DVector<Complex64> {
        DVector::from_iterator(self.order.len(), self.order.iter().map(|&i| values[i]))
    }

    pub fn scatter(&self, values: &DVector<Complex64>) -> DVector<Complex64> {
        let mut out = DVector::zeros(self.order.len());
        self.order.iter().zip(values.iter()).for_each(|(&i, v)| out[i] = *v);
        out
    }

    /// Flat start in PV-first order with the PV magnitudes applied.
    pub fn initial_voltages(&self, initial_voltages: &DVector<Complex64>, pv_buses: &[PvBus]) -> DVector<Complex64> {
        let mut v = self.gather(initial_voltages);
        pv_buses.iter().enumerate().for_each(|(k, b)| v[k] = with_magnitude(v[k], b.voltage_magnitude));
        v
    }
}

pub(crate) fn check_precision(target_precision: f64) -> Result<()> {
    if !(target_precision.is_finite() && target_precision > 0.0) {
        return Err(LoadFlowError::config(format!(
            "target precision must be finite and positive, got {target_precision}"
        )));
    }
    Ok(())
}

pub(crate) fn check_count(name: &str, count: usize) -> Result<()> {
    if count == 0 {
        return Err(LoadFlowError::config(format!("{name} must be positive")));
    }
    Ok(())
}

pub(crate) fn check_power_error(maximum_power_error: f64) -> Result<()> {
    if !(maximum_power_error.is_finite() && maximum_power_error > 0.0) {
        return Err(LoadFlowError::config(format!(
            "maximum power error must be finite and positive, got {maximum_power_error}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::testing::*;
    use proptest::prelude::*;

    #[test]
    fn test_reduced_system_checks() {
        let y = AdmittanceMatrix::new(2);
        let v = DVector::zeros(2);
        let pq = [PqBus { index: 1, power: Complex64::new(-1.0, 0.0) }];
        let pv = [PvBus { index: 0, real_power: 0.5, voltage_magnitude: 1.0 }];
        assert!(check_reduced_system(&y, &[&v], &pq, &pv).is_ok());

        let short = DVector::zeros(1);
        assert!(matches!(
            check_reduced_system(&y, &[&short], &pq, &pv),
            Err(LoadFlowError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        let twice = [PqBus { index: 0, power: Complex64::new(-1.0, 0.0) }];
        assert!(matches!(
            check_reduced_system(&y, &[&v], &twice, &pv),
            Err(LoadFlowError::AmbiguousBusType { node: 0 })
        ));

        let s = specified_powers(2, &pq, &pv);
        assert_eq!(s[0], Complex64::new(0.5, 0.0));
        assert_eq!(s[1], Complex64::new(-1.0, 0.0));

        let ordering = PolarOrdering::new(&pq, &pv);
        assert_eq!(ordering.order(), &[0, 1]);
        let x = DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)]);
        assert_eq!(ordering.scatter(&ordering.gather(&x)), x);
    }

    #[test]
    fn test_pv_first_ordering() {
        let pq = [PqBus { index: 0, power: Complex64::new(-1.0, 0.0) }];
        let pv = [PvBus { index: 1, real_power: 0.5, voltage_magnitude: 1.05 }];
        let ordering = PolarOrdering::new(&pq, &pv);
        assert_eq!(ordering.order(), &[1, 0]);
        let flat = DVector::from_element(2, Complex64::new(0.0, 1.0));
        let v = ordering.initial_voltages(&flat, &pv);
        assert!((v[0] - Complex64::new(0.0, 1.05)).norm() < 1e-15);
        assert_eq!(v[1], Complex64::new(0.0, 1.0));
    }

    #[test]
    fn test_option_checks() {
        assert!(check_precision(1e-9).is_ok());
        assert!(check_precision(0.0).is_err());
        assert!(check_precision(f64::NAN).is_err());
        assert!(check_count("maximum iterations", 0).is_err());
        assert!(check_power_error(-1.0).is_err());
    }

    fn settles(changes: &[f64]) -> bool {
        changes.windows(2).filter(|w| w[0] < 0.5).all(|w| w[1] <= w[0] + 1e-15)
    }

    proptest! {
        #[test]
        fn test_changes_shrink_once_close(load in 0.01f64..0.15, reactance in 0.0f64..2.0) {
            let y_line = Complex64::new(1.0, -reactance);
            let (y, c, pq) = two_bus_reduced(y_line, Complex64::new(-load, 0.0));
            let iteration = CurrentIterationMethod { seed_with_node_potential: false, ..Default::default() }
                .iterate(&y, 1.0, &flat(1), &c, &pq, &[])
                .unwrap();
            prop_assert!(iteration.converged);
            prop_assert!(settles(&iteration.max_changes), "{:?}", iteration.max_changes);

            let newton = NewtonRaphsonMethod::default().iterate(&y, 1.0, &flat(1), &c, &pq, &[]).unwrap();
            prop_assert!(newton.converged);
            prop_assert!(settles(&newton.max_changes), "{:?}", newton.max_changes);
        }
    }
}
