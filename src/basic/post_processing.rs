use std::fmt;

use tabled::{Table, Tabled, settings::Style};

use super::system::Node;

/// A wrapper around a float that limits the number of decimal places when printed.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

/// Table row for display of bus results.
#[derive(Debug, Tabled)]
#[allow(non_snake_case)]
pub(crate) struct BusResTable {
    pub(crate) Bus: usize,
    pub(crate) Type: String,
    pub(crate) Vm: FloatWrapper,
    pub(crate) Va_degree: FloatWrapper,
    pub(crate) P: FloatWrapper,
    pub(crate) Q: FloatWrapper,
}

/// Markdown table of solved nodes. `types` names the role each node had before the solve.
pub(crate) fn bus_table(nodes: &[Node], types: &[String]) -> String {
    let nan = num_complex::Complex64::new(f64::NAN, f64::NAN);
    let rows = nodes.iter().enumerate().map(|(bus, node)| {
        let v = node.voltage().unwrap_or(nan);
        let s = node.power().unwrap_or(nan);
        BusResTable {
            Bus: bus,
            Type: types.get(bus).cloned().unwrap_or_else(|| "-".to_string()),
            Vm: FloatWrapper::new(v.norm(), 5),
            Va_degree: FloatWrapper::new(v.arg().to_degrees(), 3),
            P: FloatWrapper::new(s.re, 5),
            Q: FloatWrapper::new(s.im, 5),
        }
    });
    Table::new(rows).with(Style::markdown()).to_string()
}
