mod basic;

pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::helm::{
        HelmBackend, HelmConfig, HelmParameters, HelmWithCurrentIteration, HolomorphicEmbeddedLoadFlowMethod,
        SeriesHelm,
    };
    pub use basic::methods::{
        CurrentIterationMethod, FastDecoupledMethod, IterationOutcome, NewtonRaphsonMethod, NodePotentialMethod,
        NodeVoltageCalculator, SeededMethod,
    };
    pub use basic::system::{AdmittanceMatrix, BusType, Node, Port2, PqBus, PvBus, GND};
}
