//! Small networks shared by the unit tests.

use nalgebra::DVector;
use num_complex::Complex64;

use super::system::{AdmittanceMatrix, Node, Port2, PqBus};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

pub(crate) fn flat(n: usize) -> DVector<Complex64> {
    DVector::from_element(n, c(1.0, 0.0))
}

/// Slack at 1.0 feeding one PQ bus through `y_line`, reduced to the PQ bus.
pub(crate) fn two_bus_reduced(y_line: Complex64, power: Complex64) -> (AdmittanceMatrix, DVector<Complex64>, [PqBus; 1]) {
    let mut full = AdmittanceMatrix::new(2);
    full.add_connection(0, 1, y_line).unwrap();
    let (y, constant_currents) = full.create_reduced_admittance_matrix(&[1], &[0], &flat(1)).unwrap();
    (y, constant_currents, [PqBus { index: 0, power }])
}

/// Slack at 1.0 and one generator bus behind `1 - 10j`, reduced to the generator bus.
pub(crate) fn pv_two_bus_reduced() -> (AdmittanceMatrix, DVector<Complex64>) {
    let mut full = AdmittanceMatrix::new(2);
    full.add_connection(0, 1, c(1.0, -10.0)).unwrap();
    full.create_reduced_admittance_matrix(&[1], &[0], &flat(1)).unwrap()
}

/// Ideal 2:1 transformer from the slack node 0 to node 2 through the internal node 1, with a unit
/// shunt and a load of 0.1 at node 2. Solution: `v1 = 0.7`, `v2 = 0.5`.
pub(crate) fn transformer_reduced() -> (AdmittanceMatrix, DVector<Complex64>, Vec<PqBus>) {
    let mut full = AdmittanceMatrix::new(3);
    full.add_ideal_transformer(Port2::grounded(0), Port2::grounded(2), 1, c(2.0, 0.0), 1.0).unwrap();
    full.add_shunt(2, c(1.0, 0.0)).unwrap();
    let (y, constant_currents) = full.create_reduced_admittance_matrix(&[1, 2], &[0], &flat(1)).unwrap();
    let pq = vec![PqBus { index: 0, power: c(0.0, 0.0) }, PqBus { index: 1, power: c(-0.1, 0.0) }];
    (y, constant_currents, pq)
}

fn three_bus_matrix(slack: usize, first: usize, second: usize) -> AdmittanceMatrix {
    let mut y = AdmittanceMatrix::new(3);
    y.add_connection(first, second, c(5.0, -15.0)).unwrap();
    y.add_connection(second, slack, c(4.0, -12.0)).unwrap();
    y.add_connection(first, slack, c(3.0, -10.0)).unwrap();
    y
}

/// Two generators and a slack in the PV, PV, slack layout of `newton_pf`.
/// Generator 0 feeds 0.5 at 1.02, generator 1 draws 0.3 at 0.98.
pub(crate) fn three_bus_full_system() -> (AdmittanceMatrix, DVector<Complex64>, DVector<Complex64>) {
    let y = three_bus_matrix(2, 0, 1);
    let sbus = DVector::from_vec(vec![c(0.5, 0.0), c(-0.3, 0.0), c(0.0, 0.0)]);
    let v_init = DVector::from_vec(vec![c(1.02, 0.0), c(0.98, 0.0), c(1.0, 0.0)]);
    (y, sbus, v_init)
}

/// The generators of [`three_bus_full_system`] as nodes, slack first.
pub(crate) fn three_bus_nodes() -> (AdmittanceMatrix, Vec<Node>) {
    let y = three_bus_matrix(0, 1, 2);
    let nodes = vec![Node::slack(c(1.0, 0.0)), Node::pv(0.5, 1.02), Node::pv(-0.3, 0.98)];
    (y, nodes)
}
