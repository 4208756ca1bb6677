use std::os::raw::c_int;

use num_complex::Complex64;

use super::{HelmBackend, HelmParameters};

#[link(name = "helm")]
unsafe extern "C" {
    fn helm_create(
        target_precision: f64,
        number_of_coefficients: c_int,
        node_count: c_int,
        pq_count: c_int,
        pv_count: c_int,
        nominal_voltage: f64,
        bit_precision: c_int,
    ) -> c_int;
    fn helm_set_admittance(calculator: c_int, row: c_int, column: c_int, real: f64, imaginary: f64);
    fn helm_set_admittance_row_sum(calculator: c_int, row: c_int, real: f64, imaginary: f64);
    fn helm_set_pq_bus(calculator: c_int, id: c_int, node: c_int, real: f64, imaginary: f64);
    fn helm_set_pv_bus(calculator: c_int, id: c_int, node: c_int, real_power: f64, voltage_magnitude: f64);
    fn helm_set_constant_current(calculator: c_int, node: c_int, real: f64, imaginary: f64);
    fn helm_calculate(calculator: c_int);
    fn helm_get_voltage_real(calculator: c_int, node: c_int) -> f64;
    fn helm_get_voltage_imaginary(calculator: c_int, node: c_int) -> f64;
    fn helm_get_coefficient_real(calculator: c_int, step: c_int, node: c_int) -> f64;
    fn helm_get_coefficient_imaginary(calculator: c_int, step: c_int, node: c_int) -> f64;
    fn helm_delete(calculator: c_int);
}

fn int(value: usize) -> Option<c_int> {
    c_int::try_from(value).ok()
}

/// The external arbitrary precision HELM library, linked as `libhelm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHelm;

impl HelmBackend for NativeHelm {
    fn create(&self, p: &HelmParameters) -> i32 {
        let (Some(coefficients), Some(nodes), Some(pq), Some(pv), Some(bits)) = (
            int(p.number_of_coefficients),
            int(p.node_count),
            int(p.pq_count),
            int(p.pv_count),
            int(p.bit_precision),
        ) else {
            return -1;
        };
        // SAFETY: plain value arguments, the library validates them and signals failure by a
        // negative handle
        unsafe { helm_create(p.target_precision, coefficients, nodes, pq, pv, p.nominal_voltage, bits) }
    }

    fn set_admittance(&self, handle: i32, row: usize, column: usize, value: Complex64) {
        if let (Some(row), Some(column)) = (int(row), int(column)) {
            // SAFETY: value arguments only
            unsafe { helm_set_admittance(handle, row, column, value.re, value.im) }
        }
    }

    fn set_admittance_row_sum(&self, handle: i32, row: usize, value: Complex64) {
        if let Some(row) = int(row) {
            // SAFETY: value arguments only
            unsafe { helm_set_admittance_row_sum(handle, row, value.re, value.im) }
        }
    }

    fn set_pq_bus(&self, handle: i32, id: usize, node: usize, power: Complex64) {
        if let (Some(id), Some(node)) = (int(id), int(node)) {
            // SAFETY: value arguments only
            unsafe { helm_set_pq_bus(handle, id, node, power.re, power.im) }
        }
    }

    fn set_pv_bus(&self, handle: i32, id: usize, node: usize, real_power: f64, voltage_magnitude: f64) {
        if let (Some(id), Some(node)) = (int(id), int(node)) {
            // SAFETY: value arguments only
            unsafe { helm_set_pv_bus(handle, id, node, real_power, voltage_magnitude) }
        }
    }

    fn set_constant_current(&self, handle: i32, node: usize, value: Complex64) {
        if let Some(node) = int(node) {
            // SAFETY: value arguments only
            unsafe { helm_set_constant_current(handle, node, value.re, value.im) }
        }
    }

    fn calculate(&self, handle: i32) {
        // SAFETY: value arguments only
        unsafe { helm_calculate(handle) }
    }

    fn voltage(&self, handle: i32, node: usize) -> Complex64 {
        let Some(node) = int(node) else { return Complex64::new(f64::NAN, f64::NAN) };
        // SAFETY: value arguments only
        unsafe {
            Complex64::new(helm_get_voltage_real(handle, node), helm_get_voltage_imaginary(handle, node))
        }
    }

    fn coefficient(&self, handle: i32, step: usize, node: usize) -> Complex64 {
        let (Some(step), Some(node)) = (int(step), int(node)) else {
            return Complex64::new(f64::NAN, f64::NAN);
        };
        // SAFETY: value arguments only
        unsafe {
            Complex64::new(
                helm_get_coefficient_real(handle, step, node),
                helm_get_coefficient_imaginary(handle, step, node),
            )
        }
    }

    fn delete(&self, handle: i32) {
        // SAFETY: value arguments only
        unsafe { helm_delete(handle) }
    }
}
