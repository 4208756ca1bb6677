//! Holomorphic embedded load flow (HELM) behind a handle based calculator interface.
//!
//! A back end holds any number of calculators, each addressed by the integer handle returned from
//! [`HelmBackend::create`]. [`HelmSession`] owns one handle and deletes it when dropped, so the
//! handle never leaves this module.

use log::debug;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    error::{LoadFlowError, Result},
    methods::{
        CurrentIterationMethod, DEFAULT_MAXIMUM_POWER_ERROR, NodeVoltageCalculator, SeededMethod,
        check_count, check_power_error, check_precision, check_reduced_system,
    },
    system::{AdmittanceMatrix, PqBus, PvBus},
};

#[cfg(feature = "native-helm")]
mod native;
mod series;

#[cfg(feature = "native-helm")]
pub use native::NativeHelm;
pub use series::SeriesHelm;

/// Arguments of [`HelmBackend::create`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HelmParameters {
    pub target_precision: f64,
    pub number_of_coefficients: usize,
    pub node_count: usize,
    pub pq_count: usize,
    pub pv_count: usize,
    pub nominal_voltage: f64,
    pub bit_precision: usize,
}

/// The calculator interface of a HELM implementation. Every call is synchronous.
///
/// `create` returns a negative handle on failure. Any other call with a handle that was not
/// created, or was already deleted, is ignored by well behaved back ends.
pub trait HelmBackend {
    fn create(&self, parameters: &HelmParameters) -> i32;
    fn set_admittance(&self, handle: i32, row: usize, column: usize, value: Complex64);
    fn set_admittance_row_sum(&self, handle: i32, row: usize, value: Complex64);
    fn set_pq_bus(&self, handle: i32, id: usize, node: usize, power: Complex64);
    fn set_pv_bus(&self, handle: i32, id: usize, node: usize, real_power: f64, voltage_magnitude: f64);
    fn set_constant_current(&self, handle: i32, node: usize, value: Complex64);
    fn calculate(&self, handle: i32);
    fn voltage(&self, handle: i32, node: usize) -> Complex64;
    /// Series coefficient `step` of `node`, for diagnostics.
    fn coefficient(&self, handle: i32, step: usize, node: usize) -> Complex64;
    fn delete(&self, handle: i32);
}

/// One calculator of a back end, deleted on drop.
pub struct HelmSession<'a, B: HelmBackend + ?Sized> {
    backend: &'a B,
    handle: i32,
}

impl<'a, B: HelmBackend + ?Sized> HelmSession<'a, B> {
    pub fn new(backend: &'a B, parameters: &HelmParameters) -> Result<Self> {
        let handle = backend.create(parameters);
        if handle < 0 {
            return Err(LoadFlowError::HelmConstruction { handle });
        }
        debug!("helm: created calculator {handle}");
        Ok(Self { backend, handle })
    }

    pub fn set_admittance(&self, row: usize, column: usize, value: Complex64) {
        self.backend.set_admittance(self.handle, row, column, value)
    }

    pub fn set_admittance_row_sum(&self, row: usize, value: Complex64) {
        self.backend.set_admittance_row_sum(self.handle, row, value)
    }

    pub fn set_pq_bus(&self, id: usize, bus: &PqBus) {
        self.backend.set_pq_bus(self.handle, id, bus.index, bus.power)
    }

    pub fn set_pv_bus(&self, id: usize, bus: &PvBus) {
        self.backend.set_pv_bus(self.handle, id, bus.index, bus.real_power, bus.voltage_magnitude)
    }

    pub fn set_constant_current(&self, node: usize, value: Complex64) {
        self.backend.set_constant_current(self.handle, node, value)
    }

    pub fn calculate(&self) {
        self.backend.calculate(self.handle)
    }

    pub fn voltage(&self, node: usize) -> Complex64 {
        self.backend.voltage(self.handle, node)
    }

    pub fn coefficient(&self, step: usize, node: usize) -> Complex64 {
        self.backend.coefficient(self.handle, step, node)
    }
}

impl<B: HelmBackend + ?Sized> Drop for HelmSession<'_, B> {
    fn drop(&mut self) {
        debug!("helm: deleting calculator {}", self.handle);
        self.backend.delete(self.handle);
    }
}

/// Options of [`HolomorphicEmbeddedLoadFlowMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub target_precision: f64,
    pub number_of_coefficients: usize,
    pub bit_precision: usize,
    pub maximum_power_error: f64,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            target_precision: 1e-9,
            number_of_coefficients: 50,
            bit_precision: 64,
            maximum_power_error: DEFAULT_MAXIMUM_POWER_ERROR,
        }
    }
}

impl HelmConfig {
    pub fn validate(&self) -> Result<()> {
        check_precision(self.target_precision)?;
        check_count("number of coefficients", self.number_of_coefficients)?;
        check_count("bit precision", self.bit_precision)?;
        check_power_error(self.maximum_power_error)
    }
}

/// HELM as a node voltage calculator. Each call runs in its own calculator of the back end.
#[derive(Debug, Clone)]
pub struct HolomorphicEmbeddedLoadFlowMethod<B> {
    backend: B,
    config: HelmConfig,
}

/// Solution of one HELM run with its series coefficients, `coefficients[step][node]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HelmSolution {
    pub voltages: DVector<Complex64>,
    pub coefficients: Vec<DVector<Complex64>>,
}

impl<B: HelmBackend> HolomorphicEmbeddedLoadFlowMethod<B> {
    pub fn new(backend: B, config: HelmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &HelmConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs the calculator and reads back the voltages and all series coefficients.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        admittances: &AdmittanceMatrix,
        total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<HelmSolution> {
        check_reduced_system(admittances, &[total_row_sums, constant_currents], pq_buses, pv_buses)?;
        let n = admittances.dimension();
        let parameters = HelmParameters {
            target_precision: self.config.target_precision,
            number_of_coefficients: self.config.number_of_coefficients,
            node_count: n,
            pq_count: pq_buses.len(),
            pv_count: pv_buses.len(),
            nominal_voltage,
            bit_precision: self.config.bit_precision,
        };
        let session = HelmSession::new(&self.backend, &parameters)?;
        for (row, column, value) in admittances.to_csc().triplet_iter() {
            session.set_admittance(row, column, *value);
        }
        for (row, value) in total_row_sums.iter().enumerate() {
            session.set_admittance_row_sum(row, *value);
        }
        pq_buses.iter().enumerate().for_each(|(id, bus)| session.set_pq_bus(id, bus));
        pv_buses.iter().enumerate().for_each(|(id, bus)| session.set_pv_bus(id, bus));
        for (node, value) in constant_currents.iter().enumerate() {
            session.set_constant_current(node, *value);
        }
        session.calculate();

        let voltages = DVector::from_fn(n, |node, _| session.voltage(node));
        let coefficients = (0..self.config.number_of_coefficients)
            .map(|step| DVector::from_fn(n, |node, _| session.coefficient(step, node)))
            .collect();
        Ok(HelmSolution { voltages, coefficients })
    }
}

impl<B: HelmBackend> NodeVoltageCalculator for HolomorphicEmbeddedLoadFlowMethod<B> {
    fn calculate_unknown_voltages(
        &self,
        admittances: &AdmittanceMatrix,
        total_row_sums: &DVector<Complex64>,
        nominal_voltage: f64,
        _initial_voltages: &DVector<Complex64>,
        constant_currents: &DVector<Complex64>,
        pq_buses: &[PqBus],
        pv_buses: &[PvBus],
    ) -> Result<DVector<Complex64>> {
        self.solve(admittances, total_row_sums, nominal_voltage, constant_currents, pq_buses, pv_buses)
            .map(|solution| solution.voltages)
    }

    fn maximum_power_error(&self) -> f64 {
        self.config.maximum_power_error
    }
}

/// HELM followed by a current iteration started from its voltages.
pub type HelmWithCurrentIteration<B> =
    SeededMethod<HolomorphicEmbeddedLoadFlowMethod<B>, CurrentIterationMethod>;

impl<B: HelmBackend> HelmWithCurrentIteration<B> {
    pub fn with_iteration(backend: B, config: HelmConfig, iteration: CurrentIterationMethod) -> Result<Self> {
        iteration.validate()?;
        let refine = CurrentIterationMethod { seed_with_node_potential: false, ..iteration };
        Ok(SeededMethod::new(HolomorphicEmbeddedLoadFlowMethod::new(backend, config)?, refine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::testing::*;
    use std::cell::RefCell;

    /// Records every call, answers voltage reads with the node index.
    #[derive(Default)]
    struct Recorder {
        handle: i32,
        calls: RefCell<Vec<String>>,
    }

    impl HelmBackend for Recorder {
        fn create(&self, parameters: &HelmParameters) -> i32 {
            self.calls.borrow_mut().push(format!("create {}", parameters.node_count));
            self.handle
        }
        fn set_admittance(&self, handle: i32, row: usize, column: usize, _value: Complex64) {
            self.calls.borrow_mut().push(format!("admittance {handle} {row} {column}"));
        }
        fn set_admittance_row_sum(&self, _handle: i32, row: usize, _value: Complex64) {
            self.calls.borrow_mut().push(format!("row sum {row}"));
        }
        fn set_pq_bus(&self, _handle: i32, id: usize, node: usize, _power: Complex64) {
            self.calls.borrow_mut().push(format!("pq {id} {node}"));
        }
        fn set_pv_bus(&self, _handle: i32, id: usize, node: usize, _p: f64, _v: f64) {
            self.calls.borrow_mut().push(format!("pv {id} {node}"));
        }
        fn set_constant_current(&self, _handle: i32, node: usize, _value: Complex64) {
            self.calls.borrow_mut().push(format!("current {node}"));
        }
        fn calculate(&self, handle: i32) {
            self.calls.borrow_mut().push(format!("calculate {handle}"));
        }
        fn voltage(&self, _handle: i32, node: usize) -> Complex64 {
            Complex64::new(node as f64, 0.0)
        }
        fn coefficient(&self, _handle: i32, step: usize, _node: usize) -> Complex64 {
            Complex64::new(step as f64, 0.0)
        }
        fn delete(&self, handle: i32) {
            self.calls.borrow_mut().push(format!("delete {handle}"));
        }
    }

    fn config() -> HelmConfig {
        HelmConfig { number_of_coefficients: 3, ..Default::default() }
    }

    #[test]
    fn test_session_uploads_and_releases() {
        let mut y = AdmittanceMatrix::new(2);
        y.add_connection(0, 1, Complex64::new(1.0, -1.0)).unwrap();
        y.add_shunt(1, Complex64::new(0.5, 0.0)).unwrap();
        let pq = [PqBus { index: 1, power: Complex64::new(-0.1, 0.0) }];
        let pv = [PvBus { index: 0, real_power: 0.1, voltage_magnitude: 1.0 }];
        let method = HolomorphicEmbeddedLoadFlowMethod::new(Recorder { handle: 7, ..Default::default() }, config())
            .unwrap();
        let solution = method.solve(&y, &y.row_sums(), 1.0, &DVector::zeros(2), &pq, &pv).unwrap();
        assert_eq!(solution.voltages[1], Complex64::new(1.0, 0.0));
        assert_eq!(solution.coefficients.len(), 3);
        assert_eq!(solution.coefficients[2][0], Complex64::new(2.0, 0.0));

        let calls = method.backend().calls.borrow();
        assert_eq!(calls.first().map(String::as_str), Some("create 2"));
        assert_eq!(calls.last().map(String::as_str), Some("delete 7"));
        assert_eq!(calls.iter().filter(|c| c.starts_with("admittance 7")).count(), 4);
        assert!(calls.contains(&"pq 0 1".to_string()) && calls.contains(&"pv 0 0".to_string()));
    }

    #[test]
    fn test_negative_handle_is_an_error() {
        let method =
            HolomorphicEmbeddedLoadFlowMethod::new(Recorder { handle: -3, ..Default::default() }, config())
                .unwrap();
        let (y, c, pq) = two_bus_reduced(Complex64::new(1.0, -1.0), Complex64::new(-0.1, 0.0));
        let err = method.solve(&y, &DVector::zeros(1), 1.0, &c, &pq, &[]).unwrap_err();
        assert_eq!(err, LoadFlowError::HelmConstruction { handle: -3 });
        // nothing to release
        assert!(!method.backend().calls.borrow().iter().any(|c| c.starts_with("delete")));
    }

    #[test]
    fn test_invalid_config() {
        let config = HelmConfig { number_of_coefficients: 0, ..Default::default() };
        assert!(HolomorphicEmbeddedLoadFlowMethod::new(SeriesHelm::default(), config).is_err());
    }
}
