use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicI32, Ordering},
    },
};

use log::debug;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::{HelmBackend, HelmParameters};

/// Double precision HELM for networks with PQ buses only.
///
/// The load flow `Y v = c + conj(s / v)` is embedded as
/// `(Y - diag(r)) v(z) = c + z conj(s) conj(w(z)) - z r ⊙ v(z)` with `w = 1 / v` and `r` the row
/// sums. The coefficients of `v` follow from one factorization; the voltages are the plain sum of
/// the series at `z = 1`. No analytic continuation is applied, so heavily loaded networks yield
/// large or non-finite voltages, which the power balance check of the load flow rejects.
#[derive(Debug, Default)]
pub struct SeriesHelm {
    calculators: Mutex<HashMap<i32, SeriesCalculator>>,
    next_handle: AtomicI32,
}

#[derive(Debug)]
struct SeriesCalculator {
    parameters: HelmParameters,
    admittances: DMatrix<Complex64>,
    row_sums: DVector<Complex64>,
    powers: DVector<Complex64>,
    constant_currents: DVector<Complex64>,
    voltages: DVector<Complex64>,
    coefficients: Vec<DVector<Complex64>>,
}

impl SeriesCalculator {
    fn new(parameters: HelmParameters) -> Self {
        let n = parameters.node_count;
        Self {
            parameters,
            admittances: DMatrix::zeros(n, n),
            row_sums: DVector::zeros(n),
            powers: DVector::zeros(n),
            constant_currents: DVector::zeros(n),
            voltages: DVector::from_element(n, Complex64::new(f64::NAN, f64::NAN)),
            coefficients: Vec::new(),
        }
    }

    fn calculate(&mut self) {
        let n = self.parameters.node_count;
        let embedded = &self.admittances - DMatrix::from_diagonal(&self.row_sums);
        let lu = embedded.lu();
        let Some(first) = lu.solve(&self.constant_currents).filter(|_| lu.is_invertible()) else {
            debug!("series helm: embedded admittance matrix is singular");
            self.voltages = DVector::from_element(n, Complex64::new(f64::NAN, f64::NAN));
            return;
        };

        let load = self.powers.map(|s| s.conj());
        let mut inverse = vec![first.map(|v| Complex64::new(1.0, 0.0) / v)];
        self.coefficients = vec![first];
        let tolerance = self.parameters.target_precision * self.parameters.nominal_voltage;
        for step in 1..self.parameters.number_of_coefficients {
            let previous = &self.coefficients[step - 1];
            let rhs = load.component_mul(&inverse[step - 1].map(|w| w.conj()))
                - self.row_sums.component_mul(previous);
            let Some(next) = lu.solve(&rhs) else { break };

            let mut w = DVector::<Complex64>::zeros(n);
            for k in 0..step {
                w -= inverse[k].component_mul(if k == 0 { &next } else { &self.coefficients[step - k] });
            }
            let w = w.component_div(&self.coefficients[0]);

            let small = next.iter().all(|c| c.norm() < tolerance);
            self.coefficients.push(next);
            inverse.push(w);
            if small {
                break;
            }
        }
        self.voltages = self.coefficients.iter().fold(DVector::zeros(n), |sum, c| sum + c);
        debug!("series helm: summed {} coefficients", self.coefficients.len());
    }
}

impl SeriesHelm {
    fn with_calculator<T>(&self, handle: i32, f: impl FnOnce(&mut SeriesCalculator) -> T) -> Option<T> {
        let mut calculators = self.calculators.lock().unwrap_or_else(|e| e.into_inner());
        calculators.get_mut(&handle).map(f)
    }

    /// Number of live calculators.
    pub fn calculator_count(&self) -> usize {
        self.calculators.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl HelmBackend for SeriesHelm {
    fn create(&self, parameters: &HelmParameters) -> i32 {
        if parameters.pv_count > 0
            || parameters.pq_count != parameters.node_count
            || parameters.number_of_coefficients == 0
            || !(parameters.target_precision > 0.0)
        {
            return -1;
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if handle < 0 {
            return -2;
        }
        self.calculators
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle, SeriesCalculator::new(*parameters));
        handle
    }

    fn set_admittance(&self, handle: i32, row: usize, column: usize, value: Complex64) {
        self.with_calculator(handle, |c| {
            if row < c.parameters.node_count && column < c.parameters.node_count {
                c.admittances[(row, column)] = value;
            }
        });
    }

    fn set_admittance_row_sum(&self, handle: i32, row: usize, value: Complex64) {
        self.with_calculator(handle, |c| {
            if let Some(sum) = c.row_sums.get_mut(row) {
                *sum = value;
            }
        });
    }

    fn set_pq_bus(&self, handle: i32, _id: usize, node: usize, power: Complex64) {
        self.with_calculator(handle, |c| {
            if let Some(s) = c.powers.get_mut(node) {
                *s = power;
            }
        });
    }

    fn set_pv_bus(&self, _handle: i32, _id: usize, _node: usize, _real_power: f64, _voltage_magnitude: f64) {
        // unreachable: calculators with PV buses are never created
    }

    fn set_constant_current(&self, handle: i32, node: usize, value: Complex64) {
        self.with_calculator(handle, |c| {
            if let Some(current) = c.constant_currents.get_mut(node) {
                *current = value;
            }
        });
    }

    fn calculate(&self, handle: i32) {
        self.with_calculator(handle, SeriesCalculator::calculate);
    }

    fn voltage(&self, handle: i32, node: usize) -> Complex64 {
        self.with_calculator(handle, |c| c.voltages.get(node).copied())
            .flatten()
            .unwrap_or(Complex64::new(f64::NAN, f64::NAN))
    }

    fn coefficient(&self, handle: i32, step: usize, node: usize) -> Complex64 {
        self.with_calculator(handle, |c| c.coefficients.get(step).and_then(|v| v.get(node).copied()))
            .flatten()
            .unwrap_or(Complex64::new(0.0, 0.0))
    }

    fn delete(&self, handle: i32) {
        self.calculators.lock().unwrap_or_else(|e| e.into_inner()).remove(&handle);
    }
}
