use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::error::{LoadFlowError, Result};

/// One bus of the network as handed to the load-flow calculator.
///
/// A node carries up to four known values. Setting the complex power also fixes the real power,
/// setting the complex voltage also fixes the voltage magnitude. Setting only the real power or
/// only the magnitude forgets the complex value it was derived from, so a PQ node turns into a PV
/// node by assigning real power and magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    power: Option<Complex64>,
    voltage: Option<Complex64>,
    voltage_magnitude: Option<f64>,
    real_power: Option<f64>,
}

/// Role of a node, carrying exactly the values that role specifies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BusType {
    Slack { voltage: Complex64 },
    Pq { power: Complex64 },
    Pv { real_power: f64, voltage_magnitude: f64 },
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slack(voltage: Complex64) -> Self {
        let mut node = Self::new();
        node.set_voltage(voltage);
        node
    }

    pub fn pq(power: Complex64) -> Self {
        let mut node = Self::new();
        node.set_power(power);
        node
    }

    pub fn pv(real_power: f64, voltage_magnitude: f64) -> Self {
        let mut node = Self::new();
        node.set_real_power(real_power);
        node.set_voltage_magnitude(voltage_magnitude);
        node
    }

    /// A node with every value known, as produced by a solve.
    pub fn solved(voltage: Complex64, power: Complex64) -> Self {
        let mut node = Self::new();
        node.set_voltage(voltage);
        node.set_power(power);
        node
    }

    pub fn set_power(&mut self, power: Complex64) {
        self.power = Some(power);
        self.real_power = Some(power.re);
    }

    pub fn set_voltage(&mut self, voltage: Complex64) {
        self.voltage = Some(voltage);
        self.voltage_magnitude = Some(voltage.norm());
    }

    pub fn set_real_power(&mut self, real_power: f64) {
        self.real_power = Some(real_power);
        self.power = None;
    }

    pub fn set_voltage_magnitude(&mut self, voltage_magnitude: f64) {
        self.voltage_magnitude = Some(voltage_magnitude);
        self.voltage = None;
    }

    pub fn power(&self) -> Result<Complex64> {
        self.power.ok_or(LoadFlowError::UnknownValue { field: "power" })
    }

    pub fn voltage(&self) -> Result<Complex64> {
        self.voltage.ok_or(LoadFlowError::UnknownValue { field: "voltage" })
    }

    pub fn voltage_magnitude(&self) -> Result<f64> {
        self.voltage_magnitude.ok_or(LoadFlowError::UnknownValue { field: "voltage magnitude" })
    }

    pub fn real_power(&self) -> Result<f64> {
        self.real_power.ok_or(LoadFlowError::UnknownValue { field: "real power" })
    }

    pub fn power_is_known(&self) -> bool {
        self.power.is_some()
    }

    pub fn voltage_is_known(&self) -> bool {
        self.voltage.is_some()
    }

    pub fn voltage_magnitude_is_known(&self) -> bool {
        self.voltage_magnitude.is_some()
    }

    pub fn real_power_is_known(&self) -> bool {
        self.real_power.is_some()
    }

    pub fn is_slack_bus(&self) -> bool {
        self.voltage.is_some() && self.power.is_none() && self.real_power.is_none()
    }

    pub fn is_pq_bus(&self) -> bool {
        self.power.is_some() && self.voltage.is_none() && self.voltage_magnitude.is_none()
    }

    pub fn is_pv_bus(&self) -> bool {
        self.voltage_magnitude.is_some()
            && self.real_power.is_some()
            && self.voltage.is_none()
            && self.power.is_none()
    }

    /// The role of this node, `None` if the known values match no role.
    pub fn bus_type(&self) -> Option<BusType> {
        match (self.voltage, self.power, self.real_power, self.voltage_magnitude) {
            (Some(voltage), None, None, _) => Some(BusType::Slack { voltage }),
            (None, Some(power), _, None) => Some(BusType::Pq { power }),
            (None, None, Some(real_power), Some(voltage_magnitude)) => {
                Some(BusType::Pv { real_power, voltage_magnitude })
            }
            _ => None,
        }
    }
}

/// A PQ bus of the reduced system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PqBus {
    pub index: usize,
    pub power: Complex64,
}

/// A PV bus of the reduced system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PvBus {
    pub index: usize,
    pub real_power: f64,
    pub voltage_magnitude: f64,
}

/// The node list split into its three disjoint roles. Indices refer to the node list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusClassification {
    pub slack: Vec<(usize, Complex64)>,
    pub pq: Vec<PqBus>,
    pub pv: Vec<PvBus>,
}

impl BusClassification {
    /// Indices of the nodes whose voltage is unknown, PQ buses first.
    pub fn unknown_indices(&self) -> Vec<usize> {
        self.pq.iter().map(|b| b.index).chain(self.pv.iter().map(|b| b.index)).collect()
    }

    pub fn known_indices(&self) -> Vec<usize> {
        self.slack.iter().map(|(i, _)| *i).collect()
    }
}

/// Classifies every node; fails on the first node without a unique role or without any slack bus.
pub fn classify_buses(nodes: &[Node]) -> Result<BusClassification> {
    let mut classification = BusClassification::default();
    for (index, node) in nodes.iter().enumerate() {
        match node.bus_type() {
            Some(BusType::Slack { voltage }) => classification.slack.push((index, voltage)),
            Some(BusType::Pq { power }) => classification.pq.push(PqBus { index, power }),
            Some(BusType::Pv { real_power, voltage_magnitude }) => {
                classification.pv.push(PvBus { index, real_power, voltage_magnitude })
            }
            None => return Err(LoadFlowError::AmbiguousBusType { node: index }),
        }
    }
    if classification.slack.is_empty() {
        return Err(LoadFlowError::NoSlackBus);
    }
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_keep_derived_values() {
        let mut node = Node::new();
        node.set_power(Complex64::new(-2.0, -1.0));
        assert!(node.power_is_known() && node.real_power_is_known());
        assert_eq!(node.real_power().unwrap(), -2.0);
        assert!(node.is_pq_bus());

        node.set_real_power(-1.5);
        assert!(!node.power_is_known());
        assert_eq!(node.power(), Err(LoadFlowError::UnknownValue { field: "power" }));
        assert!(!node.is_pq_bus() && !node.is_pv_bus());

        node.set_voltage_magnitude(1.02);
        assert!(node.is_pv_bus());

        node.set_voltage(Complex64::new(0.6, 0.8));
        assert_eq!(node.voltage_magnitude().unwrap(), 1.0);
        node.set_voltage_magnitude(0.9);
        assert!(!node.voltage_is_known());
        assert!(node.is_pv_bus());
    }

    #[test]
    fn test_roles_are_exclusive() {
        let nodes = [
            Node::slack(Complex64::new(1.0, 0.0)),
            Node::pq(Complex64::new(-1.0, 0.5)),
            Node::pv(0.3, 1.01),
            Node::solved(Complex64::new(1.0, 0.0), Complex64::new(0.1, 0.0)),
            Node::new(),
        ];
        let roles: Vec<_> = nodes
            .iter()
            .map(|n| (n.is_slack_bus(), n.is_pq_bus(), n.is_pv_bus()))
            .collect();
        assert_eq!(roles[0], (true, false, false));
        assert_eq!(roles[1], (false, true, false));
        assert_eq!(roles[2], (false, false, true));
        assert_eq!(roles[3], (false, false, false));
        assert_eq!(roles[4], (false, false, false));
        assert_eq!(nodes[3].bus_type(), None);
    }

    #[test]
    fn test_classification() {
        let nodes = [
            Node::pv(0.3, 1.01),
            Node::slack(Complex64::new(1.0, 0.0)),
            Node::pq(Complex64::new(-1.0, 0.5)),
        ];
        let classes = classify_buses(&nodes).unwrap();
        assert_eq!(classes.known_indices(), vec![1]);
        assert_eq!(classes.unknown_indices(), vec![2, 0]);

        let err = classify_buses(&[Node::pq(Complex64::new(1.0, 0.0))]).unwrap_err();
        assert_eq!(err, LoadFlowError::NoSlackBus);

        let err = classify_buses(&[Node::slack(Complex64::new(1.0, 0.0)), Node::new()]).unwrap_err();
        assert_eq!(err, LoadFlowError::AmbiguousBusType { node: 1 });
    }
}
