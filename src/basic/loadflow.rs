use log::{debug, warn};
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    error::{LoadFlowError, Result},
    methods::{NodeVoltageCalculator, with_magnitude},
    post_processing::bus_table,
    system::{AdmittanceMatrix, BusType, Node, PqBus, PvBus, classify_buses},
};

/// Below this total absolute power the absolute power error is reported instead of the relative one.
const NEGLIGIBLE_POWER: f64 = 1e-12;

/// Solves single voltage level load flows with one [`NodeVoltageCalculator`].
///
/// Every call classifies the nodes, reduces the admittance matrix to the unknown voltages, solves
/// the reduced system and checks the power balance of the result. Nothing is kept between calls.
#[derive(Debug, Clone)]
pub struct LoadFlowCalculator<M> {
    method: M,
}

/// Solved nodes and the power balance verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFlowResult {
    /// Every node with voltage and power known.
    pub nodes: Vec<Node>,
    pub relative_power_error: f64,
    /// The power balance failed or the result is not finite.
    pub voltage_collapse: bool,
    bus_types: Vec<String>,
}

impl LoadFlowResult {
    pub fn voltages(&self) -> Result<DVector<Complex64>> {
        let voltages = self.nodes.iter().map(Node::voltage).collect::<Result<Vec<_>>>()?;
        Ok(DVector::from_vec(voltages))
    }

    pub fn powers(&self) -> Result<DVector<Complex64>> {
        let powers = self.nodes.iter().map(Node::power).collect::<Result<Vec<_>>>()?;
        Ok(DVector::from_vec(powers))
    }

    /// Markdown table of the bus results.
    pub fn bus_table(&self) -> String {
        bus_table(&self.nodes, &self.bus_types)
    }
}

impl std::fmt::Display for LoadFlowResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.bus_table())?;
        write!(
            f,
            "relative power error: {:e}, voltage collapse: {}",
            self.relative_power_error, self.voltage_collapse
        )
    }
}

fn bus_type_name(bus_type: &BusType) -> &'static str {
    match bus_type {
        BusType::Slack { .. } => "slack",
        BusType::Pq { .. } => "PQ",
        BusType::Pv { .. } => "PV",
    }
}

impl<M: NodeVoltageCalculator> LoadFlowCalculator<M> {
    pub fn new(method: M) -> Self {
        Self { method }
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    /// Solves the load flow of `nodes` connected by `admittances`.
    ///
    /// Fails on invalid input only; a result that does not satisfy the power balance is returned
    /// with `voltage_collapse` set.
    pub fn calculate_node_voltages_and_powers(
        &self,
        admittances: &AdmittanceMatrix,
        nominal_voltage: f64,
        nodes: &[Node],
    ) -> Result<LoadFlowResult> {
        if !(nominal_voltage.is_finite() && nominal_voltage > 0.0) {
            return Err(LoadFlowError::config(format!(
                "nominal voltage must be finite and positive, got {nominal_voltage}"
            )));
        }
        if nodes.len() != admittances.dimension() {
            return Err(LoadFlowError::DimensionMismatch {
                expected: admittances.dimension(),
                actual: nodes.len(),
            });
        }
        let classes = classify_buses(nodes)?;
        debug!(
            "load flow: {} slack, {} PQ, {} PV buses",
            classes.slack.len(),
            classes.pq.len(),
            classes.pv.len()
        );

        let mut voltages = DVector::<Complex64>::zeros(nodes.len());
        classes.slack.iter().for_each(|(i, v)| voltages[*i] = *v);

        let unknown = classes.unknown_indices();
        if !unknown.is_empty() {
            let known = classes.known_indices();
            let known_voltages = DVector::from_iterator(known.len(), classes.slack.iter().map(|(_, v)| *v));
            let (reduced, constant_currents) =
                admittances.create_reduced_admittance_matrix(&unknown, &known, &known_voltages)?;
            let full_row_sums = admittances.row_sums();
            let row_sums = DVector::from_iterator(unknown.len(), unknown.iter().map(|&i| full_row_sums[i]));
            let npq = classes.pq.len();
            let pq_buses: Vec<PqBus> = classes
                .pq
                .iter()
                .enumerate()
                .map(|(k, b)| PqBus { index: k, power: b.power })
                .collect();
            let pv_buses: Vec<PvBus> = classes
                .pv
                .iter()
                .enumerate()
                .map(|(k, b)| PvBus { index: npq + k, ..*b })
                .collect();
            let initial = DVector::from_element(unknown.len(), Complex64::new(nominal_voltage, 0.0));

            let solved = self.method.calculate_unknown_voltages(
                &reduced,
                &row_sums,
                nominal_voltage,
                &initial,
                &constant_currents,
                &pq_buses,
                &pv_buses,
            )?;
            if solved.len() != unknown.len() {
                return Err(LoadFlowError::DimensionMismatch { expected: unknown.len(), actual: solved.len() });
            }
            unknown.iter().zip(solved.iter()).for_each(|(&i, v)| voltages[i] = *v);
            if solved.iter().all(|v| v.is_finite()) {
                for bus in &classes.pv {
                    voltages[bus.index] = with_magnitude(voltages[bus.index], bus.voltage_magnitude);
                }
            } else {
                debug!("load flow: solver returned non-finite voltages");
            }
        }

        let mut powers = admittances.calculate_all_powers(&voltages)?;
        classes.pq.iter().for_each(|b| powers[b.index] = b.power);
        classes.pv.iter().for_each(|b| powers[b.index].re = b.real_power);

        let loss = admittances.calculate_power_loss(&voltages)?;
        let absolute_error = (loss - powers.sum()).norm();
        let total = powers.iter().map(|s| s.re.abs() + s.im.abs()).sum::<f64>();
        let relative_power_error = if total > NEGLIGIBLE_POWER { absolute_error / total } else { absolute_error };

        let finite = voltages.iter().chain(powers.iter()).all(|x| x.is_finite());
        let voltage_collapse = !finite
            || !relative_power_error.is_finite()
            || relative_power_error > self.method.maximum_power_error();
        if voltage_collapse {
            warn!("load flow: voltage collapse, relative power error {relative_power_error:e}");
        } else {
            debug!("load flow: relative power error {relative_power_error:e}");
        }

        let bus_types = nodes
            .iter()
            .map(|n| n.bus_type().map_or("-", |t| bus_type_name(&t)).to_string())
            .collect();
        Ok(LoadFlowResult {
            nodes: voltages.iter().zip(powers.iter()).map(|(v, s)| Node::solved(*v, *s)).collect(),
            relative_power_error,
            voltage_collapse,
            bus_types,
        })
    }
}
